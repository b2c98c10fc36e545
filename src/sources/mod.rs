pub mod error;
pub mod gdelt;
pub mod loader;
pub mod open_meteo;
pub mod placeholders;
