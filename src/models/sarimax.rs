//! Regression with seasonal ARIMA errors, fitted by conditional sum of squares.
//!
//! The model is `y_t = x_t'b + u_t` where `u_t` follows a multiplicative
//! `(p,d,q)(P,D,Q)[s]` process. Both sides are differenced with
//! `(1-B)^d (1-B^s)^D`, the regression is solved by least squares on the differenced data,
//! and the ARMA part of the remainder is fitted by minimizing the conditional sum of
//! squared one-step errors.

use crate::models::error::ModelError;
use crate::models::optimizer::{minimize, SimplexOptions};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::fmt::{Display, Formatter};

const COEFFICIENT_BOUNDS: (f64, f64) = (-0.99, 0.99);
const RIDGE: f64 = 1e-8;
const MIN_SIGMA2: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SarimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl SarimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            period: 0,
        }
    }

    pub fn with_seasonal(mut self, p: usize, d: usize, q: usize, period: usize) -> Self {
        self.seasonal_p = p;
        self.seasonal_d = d;
        self.seasonal_q = q;
        self.period = period;
        self
    }

    fn has_seasonal_terms(&self) -> bool {
        self.seasonal_p + self.seasonal_d + self.seasonal_q > 0
    }

    /// Number of ARMA coefficients estimated.
    pub fn arma_params(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    /// Number of observations consumed by differencing.
    pub fn differencing_lag(&self) -> usize {
        self.d + self.seasonal_d * self.period
    }

    /// Largest autoregressive lag of the expanded polynomial.
    pub fn ar_lag(&self) -> usize {
        self.p + self.seasonal_p * self.period
    }

    /// Leading observations without a conditional innovation.
    pub fn warm_up(&self) -> usize {
        self.differencing_lag() + self.ar_lag()
    }

    /// Parameters counted by the AIC, with `n_exog` regressors.
    fn n_params(&self, n_exog: usize) -> usize {
        let with_intercept = self.d + self.seasonal_d == 0;
        self.arma_params() + n_exog + usize::from(with_intercept) + 1
    }

    /// Shortest series this order can be fitted to when scoring starts at `scored_from`.
    pub fn min_observations(&self, n_exog: usize, scored_from: usize) -> usize {
        self.warm_up().max(scored_from) + self.n_params(n_exog) + 2
    }
}

impl Display for SarimaOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sarimax {
    order: SarimaOrder,
    exog_mean: Vec<f64>,
    exog_scale: Vec<f64>,
    intercept: f64,
    beta: Vec<f64>,
    params: Vec<f64>,
    ar: Vec<f64>,
    ma: Vec<f64>,
    delta: Vec<f64>,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    y: Vec<f64>,
    exog: Vec<Vec<f64>>,
    w: Vec<f64>,
    innovations: Vec<f64>,
}

impl Sarimax {
    /// Fits the model to `y` with exogenous rows `exog` (one row per observation, or an
    /// empty slice for no regressors).
    ///
    /// # Errors
    ///
    /// * [`ModelError::SeriesTooShort`] when differencing and AR lags leave too few points.
    /// * [`ModelError::DimensionMismatch`] when `exog` does not line up with `y`.
    /// * [`ModelError::NonFiniteFit`] when the likelihood cannot be evaluated.
    pub fn fit(y: &[f64], exog: &[Vec<f64>], order: SarimaOrder) -> Result<Self, ModelError> {
        Self::fit_scored_from(y, exog, order, 0)
    }

    /// Like [`Sarimax::fit`], but the sum of squares, likelihood and AIC only count
    /// innovations at positions `scored_from` and later of `y`.
    ///
    /// Orders fitted with the same `scored_from` (at least as large as each order's
    /// [`SarimaOrder::warm_up`]) are scored on the same months, so their AICs compare.
    pub fn fit_scored_from(
        y: &[f64],
        exog: &[Vec<f64>],
        order: SarimaOrder,
        scored_from: usize,
    ) -> Result<Self, ModelError> {
        if order.period < 2 && order.has_seasonal_terms() {
            return Err(ModelError::InvalidOrder(order.to_string()));
        }
        let n = y.len();
        let n_exog = exog.first().map_or(0, Vec::len);
        if !exog.is_empty() && exog.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                found: exog.len(),
            });
        }
        if let Some(bad) = exog.iter().find(|row| row.len() != n_exog) {
            return Err(ModelError::DimensionMismatch {
                expected: n_exog,
                found: bad.len(),
            });
        }

        let delta = differencing_polynomial(order);
        let lag = delta.len() - 1;
        let with_intercept = order.d + order.seasonal_d == 0;
        let n_params = order.n_params(n_exog);
        let needed = order.min_observations(n_exog, scored_from);
        if n < needed {
            return Err(ModelError::SeriesTooShort { needed, found: n });
        }

        let (exog_mean, exog_scale) = column_moments(exog, n_exog);
        let exog: Vec<Vec<f64>> = exog
            .iter()
            .map(|row| standardize(row, &exog_mean, &exog_scale))
            .collect();

        let dy = difference(y, &delta);
        let dx: Vec<Vec<f64>> = (lag..n)
            .map(|t| differenced_row(&exog, &delta, t, n_exog))
            .collect();
        let design: Vec<Vec<f64>> = dx
            .iter()
            .map(|row| {
                let mut r = Vec::with_capacity(row.len() + 1);
                if with_intercept {
                    r.push(1.0);
                }
                r.extend_from_slice(row);
                r
            })
            .collect();
        let mut coefficients = least_squares(&design, &dy)?;
        let intercept = if with_intercept {
            coefficients.remove(0)
        } else {
            0.0
        };
        let beta = coefficients;

        let w: Vec<f64> = dy
            .iter()
            .zip(&dx)
            .map(|(v, row)| v - intercept - dot(row, &beta))
            .collect();

        // Index into `w` of the first scored innovation.
        let skip = order.warm_up().max(scored_from) - lag;
        let objective = |params: &[f64]| {
            let (ar, ma) = lag_polynomials(order, params);
            sum_of_squares(&css_innovations(&w, &ar, &ma), skip)
        };
        let start = vec![0.0; order.arma_params()];
        let best = minimize(objective, &start, COEFFICIENT_BOUNDS, SimplexOptions::default());

        let params = best.point;
        let (ar, ma) = lag_polynomials(order, &params);
        let innovations = css_innovations(&w, &ar, &ma);
        let n_eff = (w.len() - skip) as f64;
        let sigma2 = (sum_of_squares(&innovations, skip) / n_eff).max(MIN_SIGMA2);
        let log_likelihood = -0.5 * n_eff * ((2.0 * PI * sigma2).ln() + 1.0);
        let aic = -2.0 * log_likelihood + 2.0 * n_params as f64;
        if !aic.is_finite() {
            return Err(ModelError::NonFiniteFit {
                order: order.to_string(),
            });
        }

        Ok(Sarimax {
            order,
            exog_mean,
            exog_scale,
            intercept,
            beta,
            params,
            ar,
            ma,
            delta,
            sigma2,
            log_likelihood,
            aic,
            y: y.to_vec(),
            exog,
            w,
            innovations,
        })
    }

    /// Forecasts `steps` points past the end of the training series.
    ///
    /// `future_exog` must hold at least `steps` raw (unstandardized) rows when the model has
    /// regressors; it is ignored otherwise.
    pub fn forecast(&self, steps: usize, future_exog: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let n_exog = self.beta.len();
        if n_exog > 0 && future_exog.len() < steps {
            return Err(ModelError::DimensionMismatch {
                expected: steps,
                found: future_exog.len(),
            });
        }
        if let Some(bad) = future_exog
            .iter()
            .take(steps)
            .find(|row| n_exog > 0 && row.len() != n_exog)
        {
            return Err(ModelError::DimensionMismatch {
                expected: n_exog,
                found: bad.len(),
            });
        }

        let n = self.y.len();
        let mut y = self.y.clone();
        let mut exog = self.exog.clone();
        let mut w = self.w.clone();
        let mut innovations = self.innovations.clone();
        for step in 0..steps {
            let row = if n_exog > 0 {
                standardize(&future_exog[step], &self.exog_mean, &self.exog_scale)
            } else {
                vec![]
            };
            exog.push(row);
            let t = y.len();

            let m = w.len();
            let ar_part: f64 = self
                .ar
                .iter()
                .enumerate()
                .filter(|(i, _)| *i < m)
                .map(|(i, a)| a * w[m - 1 - i])
                .sum();
            let ma_part: f64 = self
                .ma
                .iter()
                .enumerate()
                .filter(|(j, _)| *j < m)
                .map(|(j, b)| b * innovations[m - 1 - j])
                .sum();
            let w_hat = ar_part + ma_part;
            w.push(w_hat);
            innovations.push(0.0);

            let dx = differenced_row(&exog, &self.delta, t, n_exog);
            let dy = w_hat + self.intercept + dot(&dx, &self.beta);
            let carried: f64 = self
                .delta
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, c)| c * y[t - i])
                .sum();
            y.push(dy - carried);
        }
        Ok(y.split_off(n))
    }

    /// One-step in-sample errors aligned with the training series; `None` where the
    /// differencing and AR warm-up leave no prediction.
    pub fn residuals(&self) -> Vec<Option<f64>> {
        let warm_up = self.delta.len() - 1 + self.order.ar_lag();
        (0..self.y.len())
            .map(|t| {
                if t < warm_up {
                    None
                } else {
                    self.innovations.get(t + 1 - self.delta.len()).copied()
                }
            })
            .collect()
    }

    pub fn order(&self) -> SarimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Raw coefficients: non-seasonal AR, non-seasonal MA, seasonal AR, seasonal MA.
    pub fn arma_coefficients(&self) -> &[f64] {
        &self.params
    }

    /// Regression coefficients on the standardized regressors.
    pub fn exog_coefficients(&self) -> &[f64] {
        &self.beta
    }

    pub fn n_obs(&self) -> usize {
        self.y.len()
    }
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn seasonal_poly(coefficients: &[f64], period: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefficients.len() * period + 1];
    poly[0] = 1.0;
    for (i, c) in coefficients.iter().enumerate() {
        poly[(i + 1) * period] = sign * c;
    }
    poly
}

/// Coefficients of `(1-B)^d (1-B^s)^D`, constant term first.
fn differencing_polynomial(order: SarimaOrder) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..order.d {
        poly = poly_mul(&poly, &[1.0, -1.0]);
    }
    for _ in 0..order.seasonal_d {
        poly = poly_mul(&poly, &seasonal_poly(&[1.0], order.period, -1.0));
    }
    poly
}

/// Expands the multiplicative AR and MA polynomials into per-lag coefficients (lag 1 first).
fn lag_polynomials(order: SarimaOrder, params: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let (phi, rest) = params.split_at(order.p);
    let (theta, rest) = rest.split_at(order.q);
    let (seasonal_phi, seasonal_theta) = rest.split_at(order.seasonal_p);

    let ar_poly = poly_mul(
        &seasonal_poly(phi, 1, -1.0),
        &seasonal_poly(seasonal_phi, order.period.max(1), -1.0),
    );
    let ma_poly = poly_mul(
        &seasonal_poly(theta, 1, 1.0),
        &seasonal_poly(seasonal_theta, order.period.max(1), 1.0),
    );
    let ar = ar_poly[1..].iter().map(|c| -c).collect();
    let ma = ma_poly[1..].to_vec();
    (ar, ma)
}

fn difference(z: &[f64], delta: &[f64]) -> Vec<f64> {
    let lag = delta.len() - 1;
    (lag..z.len())
        .map(|t| delta.iter().enumerate().map(|(j, c)| c * z[t - j]).sum())
        .collect()
}

fn differenced_row(exog: &[Vec<f64>], delta: &[f64], t: usize, n_exog: usize) -> Vec<f64> {
    (0..n_exog)
        .map(|col| {
            delta
                .iter()
                .enumerate()
                .map(|(j, c)| c * exog[t - j][col])
                .sum()
        })
        .collect()
}

/// Conditional one-step errors; the first `ar.len()` entries are fixed at zero.
fn css_innovations(w: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let r = ar.len();
    let mut e = vec![0.0; w.len()];
    for t in r..w.len() {
        let ar_part: f64 = ar.iter().enumerate().map(|(i, a)| a * w[t - 1 - i]).sum();
        let ma_part: f64 = ma
            .iter()
            .enumerate()
            .filter(|(j, _)| *j < t)
            .map(|(j, b)| b * e[t - 1 - j])
            .sum();
        e[t] = w[t] - ar_part - ma_part;
    }
    e
}

fn sum_of_squares(e: &[f64], skip: usize) -> f64 {
    e.iter().skip(skip).map(|v| v * v).sum()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn column_moments(rows: &[Vec<f64>], n_cols: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len().max(1) as f64;
    let means: Vec<f64> = (0..n_cols)
        .map(|c| rows.iter().map(|r| r[c]).sum::<f64>() / n)
        .collect();
    let scales = (0..n_cols)
        .map(|c| {
            let var = rows.iter().map(|r| (r[c] - means[c]).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            if sd > 0.0 {
                sd
            } else {
                1.0
            }
        })
        .collect();
    (means, scales)
}

fn standardize(row: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means.iter().zip(scales))
        .map(|(v, (m, s))| (v - m) / s)
        .collect()
}

/// Solves ridge-stabilized normal equations `(X'X + eps I) b = X'y`.
fn least_squares(x: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, ModelError> {
    let k = x.first().map_or(0, Vec::len);
    if k == 0 {
        return Ok(vec![]);
    }
    let mut a = vec![vec![0.0; k + 1]; k];
    for (row, target) in x.iter().zip(y) {
        for i in 0..k {
            for j in 0..k {
                a[i][j] += row[i] * row[j];
            }
            a[i][k] += row[i] * target;
        }
    }
    for (i, r) in a.iter_mut().enumerate() {
        r[i] += RIDGE;
    }

    for pivot in 0..k {
        let best = (pivot..k)
            .max_by(|&i, &j| a[i][pivot].abs().total_cmp(&a[j][pivot].abs()))
            .unwrap_or(pivot);
        if a[best][pivot].abs() < 1e-14 {
            return Err(ModelError::SingularMatrix);
        }
        a.swap(pivot, best);
        for i in 0..k {
            if i == pivot {
                continue;
            }
            let factor = a[i][pivot] / a[pivot][pivot];
            if factor == 0.0 {
                continue;
            }
            for j in pivot..=k {
                a[i][j] -= factor * a[pivot][j];
            }
        }
    }
    Ok((0..k).map(|i| a[i][k] / a[i][i]).collect())
}
