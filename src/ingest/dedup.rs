use crate::types::month::Month;
use crate::types::observation::{Observation, ObservationTable};
use log::info;
use std::collections::BTreeMap;

/// Drops primary rows on or after `cutoff`. Those months hold placeholder or projected
/// values in the recent sheet.
pub fn apply_cutoff(rows: Vec<Observation>, cutoff: Option<Month>) -> Vec<Observation> {
    let Some(cutoff) = cutoff else {
        return rows;
    };
    let before = rows.len();
    let kept: Vec<Observation> = rows.into_iter().filter(|o| o.month < cutoff).collect();
    if kept.len() != before {
        info!(
            "Dropped {} primary rows dated {} or later",
            before - kept.len(),
            cutoff
        );
    }
    kept
}

/// Merges two overlapping observation sets into one table keyed on `(nationality, month)`.
///
/// When a key occurs in both, the primary value wins. Within a single source the last
/// occurrence wins.
pub fn deduplicate(primary: Vec<Observation>, secondary: Vec<Observation>) -> ObservationTable {
    let mut merged: BTreeMap<(String, Month), i64> = BTreeMap::new();
    let total = primary.len() + secondary.len();

    for o in secondary.into_iter().chain(primary) {
        merged.insert((o.nationality, o.month), o.encounters);
    }

    let rows: Vec<Observation> = merged
        .into_iter()
        .map(|((nationality, month), encounters)| Observation {
            nationality,
            month,
            encounters,
        })
        .collect();
    info!(
        "Deduplicated {} rows into {} unique (nationality, month) keys",
        total,
        rows.len()
    );
    ObservationTable::from_sorted_unique(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_value_wins_on_collision() {
        let primary = vec![Observation::new("Mexico", Month::new(1, 2020), 100)];
        let secondary = vec![
            Observation::new("Mexico", Month::new(1, 2020), 1),
            Observation::new("Mexico", Month::new(12, 2019), 2),
        ];
        let table = deduplicate(primary, secondary);
        assert_eq!(
            table.rows(),
            &[
                Observation::new("Mexico", Month::new(12, 2019), 2),
                Observation::new("Mexico", Month::new(1, 2020), 100),
            ]
        );
    }

    #[test]
    fn test_output_is_sorted_by_nationality_then_month() {
        let table = deduplicate(
            vec![
                Observation::new("Peru", Month::new(2, 2020), 3),
                Observation::new("Cuba", Month::new(2, 2020), 2),
                Observation::new("Peru", Month::new(1, 2020), 1),
            ],
            vec![],
        );
        let keys: Vec<(&str, Month)> = table
            .rows()
            .iter()
            .map(|o| (o.nationality.as_str(), o.month))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Cuba", Month::new(2, 2020)),
                ("Peru", Month::new(1, 2020)),
                ("Peru", Month::new(2, 2020)),
            ]
        );
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        let rows = vec![
            Observation::new("Mexico", Month::new(6, 2024), 1),
            Observation::new("Mexico", Month::new(7, 2024), 2),
            Observation::new("Mexico", Month::new(8, 2024), 3),
        ];
        let kept = apply_cutoff(rows.clone(), Some(Month::new(7, 2024)));
        assert_eq!(kept, vec![Observation::new("Mexico", Month::new(6, 2024), 1)]);
        assert_eq!(apply_cutoff(rows.clone(), None), rows);
    }
}
