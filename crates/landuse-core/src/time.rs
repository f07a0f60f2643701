//! Model calendar
//!
//! Maps between model periods (small contiguous integers) and calendar years.
//! Every per-period operation receives a [`ModelTime`] through the
//! [`ModelContext`](crate::context::ModelContext) instead of reaching into a
//! process-wide singleton, so the same allocation code can be driven on
//! different calendars side by side.

use crate::errors::{LandUseError, LandUseResult};
use serde::{Deserialize, Serialize};

/// The model calendar: evenly spaced periods plus the terminal accounting
/// year of the carbon model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTime {
    /// Calendar year of period 0
    start_year: i32,
    /// Years between consecutive periods
    year_step: i32,
    /// Number of simulated periods
    max_periods: usize,
    /// Final year of land-use-change carbon accounting.
    ///
    /// Lookahead emission calculations may run past the last simulated
    /// period up to this year.
    carbon_end_year: i32,
}

impl ModelTime {
    pub fn new(
        start_year: i32,
        year_step: i32,
        max_periods: usize,
        carbon_end_year: i32,
    ) -> LandUseResult<Self> {
        if year_step <= 0 {
            return Err(LandUseError::InvalidCalendar(format!(
                "year step must be positive, got {year_step}"
            )));
        }
        if max_periods == 0 {
            return Err(LandUseError::InvalidCalendar(
                "at least one period is required".to_string(),
            ));
        }
        let last_year = start_year + (max_periods as i32 - 1) * year_step;
        if carbon_end_year < last_year {
            return Err(LandUseError::InvalidCalendar(format!(
                "carbon end year {carbon_end_year} precedes the last model year {last_year}"
            )));
        }
        Ok(Self {
            start_year,
            year_step,
            max_periods,
            carbon_end_year,
        })
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn year_step(&self) -> i32 {
        self.year_step
    }

    pub fn max_periods(&self) -> usize {
        self.max_periods
    }

    pub fn final_period(&self) -> usize {
        self.max_periods - 1
    }

    pub fn is_final_period(&self, period: usize) -> bool {
        period == self.final_period()
    }

    pub fn carbon_end_year(&self) -> i32 {
        self.carbon_end_year
    }

    /// The calendar year of a model period.
    ///
    /// # Panics
    ///
    /// Panics if `period` is out of range.
    pub fn period_to_year(&self, period: usize) -> i32 {
        assert!(period < self.max_periods, "period {period} out of range");
        self.start_year + period as i32 * self.year_step
    }

    /// The period containing a calendar year.
    ///
    /// Years before the first model year map to period 0 and years past the
    /// last model year map to the final period; within the modeled range a
    /// year maps to the period whose year is closest below or equal to it.
    pub fn year_to_period(&self, year: i32) -> usize {
        if year <= self.start_year {
            return 0;
        }
        let period = ((year - self.start_year) / self.year_step) as usize;
        period.min(self.final_period())
    }

    pub fn periods(&self) -> impl Iterator<Item = usize> {
        0..self.max_periods
    }
}

impl Default for ModelTime {
    /// 1975 base year, 15-year steps through 2050, carbon accounting to 2100.
    fn default() -> Self {
        Self {
            start_year: 1975,
            year_step: 15,
            max_periods: 6,
            carbon_end_year: 2100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_year_mapping() {
        let time = ModelTime::default();
        assert_eq!(time.period_to_year(0), 1975);
        assert_eq!(time.period_to_year(3), 2020);
        assert_eq!(time.year_to_period(2020), 3);
        assert_eq!(time.year_to_period(2021), 3);
        assert_eq!(time.year_to_period(2034), 3);
        assert_eq!(time.year_to_period(2035), 4);
    }

    #[test]
    fn year_to_period_clamps() {
        let time = ModelTime::default();
        assert_eq!(time.year_to_period(1800), 0);
        assert_eq!(time.year_to_period(2150), time.final_period());
    }

    #[test]
    fn final_period() {
        let time = ModelTime::default();
        assert_eq!(time.final_period(), 5);
        assert!(time.is_final_period(5));
        assert!(!time.is_final_period(4));
    }

    #[test]
    fn rejects_bad_calendars() {
        assert!(ModelTime::new(1975, 0, 6, 2100).is_err());
        assert!(ModelTime::new(1975, 15, 0, 2100).is_err());
        // Carbon accounting cannot end before the last simulated year.
        assert!(ModelTime::new(1975, 15, 6, 2040).is_err());
    }
}
