pub mod error;
pub mod fuser;
