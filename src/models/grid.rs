use crate::models::error::ModelError;
use crate::models::sarimax::{SarimaOrder, Sarimax};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Inclusive upper bounds for a brute-force SARIMAX order search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SarimaGrid {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_d: usize,
    pub max_seasonal_q: usize,
    pub period: usize,
}

impl Default for SarimaGrid {
    fn default() -> Self {
        Self {
            max_p: 2,
            max_d: 1,
            max_q: 2,
            max_seasonal_p: 1,
            max_seasonal_d: 1,
            max_seasonal_q: 1,
            period: 12,
        }
    }
}

impl SarimaGrid {
    /// Every order within the bounds, in lexicographic order.
    pub fn orders(&self) -> Vec<SarimaOrder> {
        let mut orders = Vec::new();
        for p in 0..=self.max_p {
            for d in 0..=self.max_d {
                for q in 0..=self.max_q {
                    for sp in 0..=self.max_seasonal_p {
                        for sd in 0..=self.max_seasonal_d {
                            for sq in 0..=self.max_seasonal_q {
                                orders.push(
                                    SarimaOrder::new(p, d, q).with_seasonal(sp, sd, sq, self.period),
                                );
                            }
                        }
                    }
                }
            }
        }
        orders
    }
}

#[derive(Debug, Clone)]
pub struct GridOutcome {
    pub best: Sarimax,
    pub evaluated: usize,
    pub failed: usize,
}

/// Fits every order of `grid` in parallel and keeps the lowest AIC.
///
/// Every order is scored on the same months: those after the longest warm-up among the
/// orders the series is long enough for. Orders that fail to fit are skipped. Ties go to
/// the order listed first.
pub fn search(y: &[f64], exog: &[Vec<f64>], grid: &SarimaGrid) -> Result<GridOutcome, ModelError> {
    let orders = grid.orders();
    let scored_from = common_scoring_start(&orders, y.len(), exog.first().map_or(0, Vec::len));
    debug!("Scoring SARIMAX candidates from observation {}", scored_from);
    let fits: Vec<Option<Sarimax>> = orders
        .par_iter()
        .map(|order| match Sarimax::fit_scored_from(y, exog, *order, scored_from) {
            Ok(model) => Some(model),
            Err(e) => {
                debug!("Skipping SARIMAX{}: {}", order, e);
                None
            }
        })
        .collect();

    let failed = fits.iter().filter(|f| f.is_none()).count();
    let best = fits
        .into_iter()
        .flatten()
        .min_by(|a, b| a.aic().total_cmp(&b.aic()))
        .ok_or(ModelError::NoViableOrder)?;
    info!(
        "Selected SARIMAX{} with AIC {:.2} ({} of {} orders failed)",
        best.order(),
        best.aic(),
        failed,
        orders.len()
    );
    Ok(GridOutcome {
        best,
        evaluated: orders.len(),
        failed,
    })
}

fn common_scoring_start(orders: &[SarimaOrder], n: usize, n_exog: usize) -> usize {
    orders
        .iter()
        .filter(|o| o.min_observations(n_exog, 0) <= n)
        .map(SarimaOrder::warm_up)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> SarimaGrid {
        SarimaGrid {
            max_p: 1,
            max_d: 1,
            max_q: 1,
            max_seasonal_p: 0,
            max_seasonal_d: 1,
            max_seasonal_q: 0,
            period: 4,
        }
    }

    #[test]
    fn test_grid_enumerates_all_orders() {
        assert_eq!(small_grid().orders().len(), 16);
        assert_eq!(SarimaGrid::default().orders().len(), 144);
    }

    #[test]
    fn test_search_prefers_seasonal_differencing_for_seasonal_series() -> Result<(), ModelError> {
        let pattern = [10.0, 40.0, 25.0, 5.0];
        let y: Vec<f64> = (0..32).map(|i| pattern[i % 4] + i as f64 * 0.01).collect();
        let outcome = search(&y, &[], &small_grid())?;
        assert_eq!(outcome.evaluated, 16);
        assert_eq!(outcome.best.order().seasonal_d, 1);
        Ok(())
    }

    #[test]
    fn test_candidates_share_one_scoring_window() -> Result<(), ModelError> {
        let grid = small_grid();
        let y: Vec<f64> = (0..32).map(|i| ((i * 7) % 5) as f64 + i as f64 * 0.3).collect();
        let start = common_scoring_start(&grid.orders(), y.len(), 0);
        // (1,1,1)(0,1,0)[4]: one regular and one seasonal difference plus one AR lag.
        assert_eq!(start, 1 + 4 + 1);

        let outcome = search(&y, &[], &grid)?;
        let rescored = Sarimax::fit_scored_from(&y, &[], outcome.best.order(), start)?;
        assert_eq!(rescored.aic(), outcome.best.aic());
        for order in grid.orders() {
            if let Ok(model) = Sarimax::fit_scored_from(&y, &[], order, start) {
                assert!(model.aic() >= outcome.best.aic());
            }
        }
        Ok(())
    }

    #[test]
    fn test_scoring_start_ignores_orders_that_cannot_fit() {
        let orders = vec![
            SarimaOrder::new(1, 0, 0),
            SarimaOrder::new(0, 0, 0).with_seasonal(1, 1, 0, 12),
        ];
        assert_eq!(common_scoring_start(&orders, 20, 0), 1);
        assert_eq!(common_scoring_start(&orders, 60, 0), 24);
    }

    #[test]
    fn test_search_fails_when_nothing_fits() {
        assert!(matches!(
            search(&[1.0, 2.0], &[], &small_grid()),
            Err(ModelError::NoViableOrder)
        ));
    }
}
