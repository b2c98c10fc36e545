pub mod dedup;
pub mod error;
pub mod normalizer;
