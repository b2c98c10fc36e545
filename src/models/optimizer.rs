//! Bounded Nelder-Mead simplex minimization for small parameter vectors.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_iter: usize,
    /// Largest spread of objective values across the simplex at convergence.
    pub tolerance: f64,
    /// Largest distance (max norm) of any vertex from the best one at convergence.
    pub point_tolerance: f64,
    pub initial_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-8,
            point_tolerance: 1e-6,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimizes `objective` starting at `start`, clamping every candidate to `bounds`.
///
/// An empty `start` evaluates the objective once and returns immediately.
pub fn minimize<F>(objective: F, start: &[f64], bounds: (f64, f64), options: SimplexOptions) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let clamp = |p: Vec<f64>| -> Vec<f64> { p.into_iter().map(|v| v.clamp(bounds.0, bounds.1)).collect() };
    let eval = |p: &[f64]| {
        let v = objective(p);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let n = start.len();
    let start = clamp(start.to_vec());
    if n == 0 {
        let value = eval(&start);
        return Minimum {
            point: start,
            value,
            converged: true,
        };
    }

    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        vertex[i] += if vertex[i] + options.initial_step <= bounds.1 {
            options.initial_step
        } else {
            -options.initial_step
        };
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();
    let mut converged = false;

    for _ in 0..options.max_iter {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));
        let (best, second_worst, worst) = (order[0], order[n - 1], order[n]);

        // Equal values alone are not enough: a simplex can straddle the minimum.
        if (values[worst] - values[best]).abs() < options.tolerance
            && diameter(&simplex, best) < options.point_tolerance
        {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| {
                simplex
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != worst)
                    .map(|(_, v)| v[j])
                    .sum::<f64>()
                    / n as f64
            })
            .collect();
        let towards = |from: &[f64], coefficient: f64| -> Vec<f64> {
            clamp(
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, p)| c + coefficient * (p - c))
                    .collect(),
            )
        };

        let reflected = towards(&simplex[worst], -REFLECT);
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = towards(&reflected, EXPAND);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }
        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, limit) = if reflected_value < values[worst] {
            (towards(&reflected, CONTRACT), reflected_value)
        } else {
            (towards(&simplex[worst], CONTRACT), values[worst])
        };
        let contracted_value = eval(&contracted);
        if contracted_value < limit {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in (0..=n).filter(|i| *i != best) {
            let shrunk = anchor
                .iter()
                .zip(&simplex[i])
                .map(|(a, v)| a + SHRINK * (v - a))
                .collect();
            simplex[i] = clamp(shrunk);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal))
        .unwrap_or(0);
    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        converged,
    }
}

fn diameter(simplex: &[Vec<f64>], best: usize) -> f64 {
    simplex
        .iter()
        .flat_map(|v| v.iter().zip(&simplex[best]).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max)
}
