pub mod deriver;
pub mod error;
