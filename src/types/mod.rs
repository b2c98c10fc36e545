pub mod country;
pub mod covariate;
pub mod feature_spec;
pub mod fill_policy;
pub mod month;
pub mod observation;
