//! Carbon accounting contract
//!
//! A land leaf owns exactly one carbon calculator, which tracks carbon
//! densities and land-use-change emissions for that leaf's land. The leaf
//! only drives the calculator through the [`CarbonCalc`] trait; the
//! stock-and-flow internals live with the implementations.
//!
//! [`LandUseHistory`] carries the observed land areas before the first model
//! period. Every leaf must have one; the calculator uses it to seed the land
//! area series from which emissions are differenced.

use crate::errors::{LandUseError, LandUseResult};
use crate::time::ModelTime;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Historical land-use observations for one leaf, in calendar years.
///
/// Areas between observations are linearly interpolated; outside the observed
/// range the nearest observation is carried (no extrapolation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseHistory {
    /// (year, area) observations, sorted by year.
    points: Vec<(i32, f64)>,
}

impl LandUseHistory {
    pub fn from_points(mut points: Vec<(i32, f64)>) -> LandUseResult<Self> {
        if points.is_empty() {
            return Err(LandUseError::Config(
                "a land use history needs at least one observation".to_string(),
            ));
        }
        points.sort_by_key(|(year, _)| *year);
        for &(year, area) in &points {
            if area < 0.0 {
                return Err(LandUseError::Config(format!(
                    "negative land area {area} in land use history at year {year}"
                )));
            }
        }
        if points.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(LandUseError::Config(
                "duplicate year in land use history".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn first_year(&self) -> i32 {
        self.points[0].0
    }

    pub fn last_year(&self) -> i32 {
        self.points[self.points.len() - 1].0
    }

    /// The land area at a calendar year.
    pub fn allocation(&self, year: i32) -> f64 {
        let points = &self.points;
        if year <= points[0].0 {
            return points[0].1;
        }
        if year >= points[points.len() - 1].0 {
            return points[points.len() - 1].1;
        }
        // `year` is strictly inside the observed range; find the bracketing pair.
        let upper = points.partition_point(|(y, _)| *y <= year);
        let (y0, a0) = points[upper - 1];
        let (y1, a1) = points[upper];
        if y0 == year {
            return a0;
        }
        a0 + (a1 - a0) * f64::from(year - y0) / f64::from(y1 - y0)
    }
}

/// Carbon density and land-use-change emission accounting for one leaf.
pub trait CarbonCalc: Debug {
    /// Fix the discount rate and derived subsidy discount factors. Called
    /// once when the owning leaf completes initialization.
    fn complete_init(&mut self, discount_rate: f64);

    /// Install the leaf's land-use history. Must happen before any
    /// [`calc`](Self::calc) call.
    fn init_land_use_history(&mut self, history: LandUseHistory);

    fn has_land_use_history(&self) -> bool;

    /// Record the land area allocated to the leaf in a model period.
    fn set_total_land_use(&mut self, area: f64, period: usize);

    /// Update the stock-and-flow accounting for the interval ending at
    /// `end_year`. May be called repeatedly for the same period with
    /// different lookahead years; results for a year reflect the latest call
    /// covering it.
    fn calc(&mut self, period: usize, end_year: i32, time: &ModelTime);

    /// Above-ground carbon density of the land in a year (mass per area).
    fn actual_above_ground_carbon_density(&self, year: i32) -> f64;

    /// Below-ground (soil) carbon density of the land in a year.
    fn actual_below_ground_carbon_density(&self, year: i32) -> f64;

    /// Discount factor applied to above-ground carbon in the subsidy,
    /// reflecting how quickly vegetation reaches its full density.
    fn above_ground_carbon_subsidy_discount_factor(&self) -> f64;

    /// Discount factor applied to below-ground carbon in the subsidy.
    fn below_ground_carbon_subsidy_discount_factor(&self) -> f64;

    /// Net land-use-change emission attributed to a year, as of the latest
    /// [`calc`](Self::calc) covering that year. Positive values are
    /// emissions to the atmosphere, negative values are uptake.
    fn net_land_use_change_emission(&self, year: i32) -> f64;

    /// Set the timescale over which soil carbon is emitted or taken up.
    fn set_soil_time_scale(&mut self, years: u32);
}
