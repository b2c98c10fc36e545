use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Held-out accuracy of one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub n: usize,
}

impl Metrics {
    /// Scores `predicted` against `actual`. Both slices must have the same length.
    ///
    /// R² follows the usual convention for a constant target: 1.0 for a perfect fit,
    /// 0.0 otherwise.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Metrics {
                mae: f64::NAN,
                rmse: f64::NAN,
                r2: f64::NAN,
                n: 0,
            };
        }
        let pairs = || actual.iter().zip(predicted).take(n);
        let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64;
        let ss_res: f64 = pairs().map(|(a, p)| (a - p).powi(2)).sum();
        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        Metrics {
            mae,
            rmse: (ss_res / n as f64).sqrt(),
            r2,
            n,
        }
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE: {:.2}; RMSE: {:.2}; R-squared: {:.2} (n={})",
            self.mae, self.rmse, self.r2, self.n
        )
    }
}
