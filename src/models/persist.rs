//! Binary model files, encoded with bincode's serde integration.

use crate::models::error::ModelError;
use bincode::config::{Configuration, Fixint, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

pub fn direct_model_file(horizon: usize) -> String {
    format!("rf_model_t{horizon}.bin")
}

pub fn direct_predictions_file(horizon: usize) -> String {
    format!("predictions_t{horizon}.csv")
}

pub fn direct_forecasts_file(horizon: usize) -> String {
    format!("forecasts_t{horizon}.csv")
}

pub const HYBRID_MODEL_FILE: &str = "hybrid_model.bin";
pub const HYBRID_PREDICTIONS_FILE: &str = "hybrid_predictions.csv";

pub fn save_model<T: Serialize>(model: &T, path: &Path) -> Result<(), ModelError> {
    let bytes = bincode::serde::encode_to_vec(model, BINCODE_CONFIG)
        .map_err(|e| ModelError::ModelEncode(Box::new(e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ModelError::ModelWrite(parent.to_path_buf(), e))?;
    }
    std::fs::write(path, bytes).map_err(|e| ModelError::ModelWrite(path.to_path_buf(), e))
}

pub fn load_model<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let bytes = std::fs::read(path).map_err(|e| ModelError::ModelRead(path.to_path_buf(), e))?;
    let (model, _) = bincode::serde::decode_from_slice::<T, _>(&bytes, BINCODE_CONFIG)
        .map_err(|e| ModelError::ModelDecode(path.to_path_buf(), Box::new(e)))?;
    Ok(model)
}
