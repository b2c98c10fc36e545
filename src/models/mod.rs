pub mod direct;
pub mod error;
pub mod forest;
pub mod grid;
pub mod hybrid;
pub mod matrix;
pub mod metrics;
pub mod optimizer;
pub mod persist;
pub mod sarimax;
pub mod split;
