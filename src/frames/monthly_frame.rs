//! Typed wrappers around the per-(nationality, month) frames handed between stages.

use crate::frames::error::FrameError;
use crate::types::month::Month;
use crate::types::observation::{NATIONALITY, PERIOD};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Shared read access for frames keyed on `(nationality, period)`.
pub trait MonthlyFrame {
    fn data(&self) -> &DataFrame;

    fn height(&self) -> usize {
        self.data().height()
    }

    fn is_empty(&self) -> bool {
        self.data().height() == 0
    }

    /// Rows matching an arbitrary predicate.
    fn filter(&self, predicate: Expr) -> LazyFrame {
        self.data().clone().lazy().filter(predicate)
    }

    /// Rows from `start` to `end`, both inclusive.
    ///
    /// # Example
    ///
    /// ```
    /// # use border_flows::{Month, MonthlyFrame, FusedFrame};
    /// # use polars::prelude::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let frame = FusedFrame::new(df!(
    ///     "nationality" => ["Mexico", "Mexico", "Mexico"],
    ///     "period" => [Month::new(1, 2020).period_index(), Month::new(2, 2020).period_index(), Month::new(3, 2020).period_index()],
    ///     "encounters" => [1i64, 2, 3],
    /// )?);
    /// let spring = frame.get_range(Month::new(2, 2020), Month::new(3, 2020)).collect()?;
    /// assert_eq!(spring.height(), 2);
    /// # Ok(())
    /// # }
    /// ```
    fn get_range(&self, start: Month, end: Month) -> LazyFrame {
        self.filter(
            col(PERIOD)
                .gt_eq(lit(start.period_index()))
                .and(col(PERIOD).lt_eq(lit(end.period_index()))),
        )
    }

    /// Rows for a single month, one per nationality.
    fn get_at(&self, month: Month) -> LazyFrame {
        self.filter(col(PERIOD).eq(lit(month.period_index())))
    }

    fn for_nationality(&self, nationality: &str) -> LazyFrame {
        self.filter(col(NATIONALITY).eq(lit(nationality)))
    }

    /// True when no `(nationality, period)` pair occurs twice.
    fn keys_are_unique(&self) -> PolarsResult<bool> {
        let distinct = self
            .data()
            .clone()
            .lazy()
            .group_by([col(NATIONALITY), col(PERIOD)])
            .agg([len().alias("rows")])
            .collect()?
            .height();
        Ok(distinct == self.data().height())
    }

    /// Writes the frame as a headered CSV artifact, creating parent directories.
    fn write_csv(&self, path: &Path) -> Result<(), FrameError> {
        write_csv(self.data(), path)
    }
}

pub(crate) fn write_csv(df: &DataFrame, path: &Path) -> Result<(), FrameError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| FrameError::OutputDirCreation(parent.to_path_buf(), e))?;
    }
    let mut file =
        File::create(path).map_err(|e| FrameError::CsvWriteIo(path.to_path_buf(), e))?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .map_err(|e| FrameError::CsvWritePolars(path.to_path_buf(), e))
}

/// Observations with every covariate joined and fill policies applied.
#[derive(Debug, Clone)]
pub struct FusedFrame {
    pub frame: DataFrame,
}

impl FusedFrame {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl MonthlyFrame for FusedFrame {
    fn data(&self) -> &DataFrame {
        &self.frame
    }
}

/// A fused frame with calendar, lag and rolling features appended.
///
/// `feature_columns` lists the derived columns that were actually produced, which can be
/// fewer than requested when a source column was missing or empty.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub frame: DataFrame,
    pub feature_columns: Vec<String>,
}

impl FeatureFrame {
    pub fn new(frame: DataFrame, feature_columns: Vec<String>) -> Self {
        Self {
            frame,
            feature_columns,
        }
    }
}

impl MonthlyFrame for FeatureFrame {
    fn data(&self) -> &DataFrame {
        &self.frame
    }
}
