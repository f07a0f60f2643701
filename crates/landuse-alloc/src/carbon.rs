//! Carbon densities calculator
//!
//! The reference implementation of [`CarbonCalc`]: constant read-in carbon
//! densities, subsidy discount factors derived from how quickly carbon
//! accrues, and a differencing stock-and-flow update for land-use-change
//! emissions.
//!
//! # What This Calculator Does
//!
//! 1. Tracks the leaf's land area by calendar year: the land-use history
//!    before the first model year, the model's own allocations (stepwise)
//!    afterwards.
//!
//! 2. Differences that series year over year. Lost land releases carbon,
//!    gained land takes it up:
//!    - above-ground carbon moves in the year of the change
//!    - below-ground carbon is released over the soil time scale with
//!      exponential weights
//!
//! 3. Derives the subsidy discount factors from the discount rate $r$ and an
//!    accrual timescale $A$ (the mature age above ground, the soil time
//!    scale below ground):
//!    $$ f = \frac{1 - e^{-rA}}{rA} $$
//!    which is 1 for carbon that accrues immediately ($A \to 0$) and falls
//!    toward 0 the longer full density takes to build up.

use landuse_core::carbon::{CarbonCalc, LandUseHistory};
use landuse_core::time::ModelTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default timescale for soil carbon emissions and uptake.
const DEFAULT_SOIL_TIME_SCALE: u32 = 40;

/// Discount factor for carbon that takes `years` to reach full density.
fn accrual_discount_factor(rate: f64, years: u32) -> f64 {
    if years == 0 || rate <= 0.0 {
        return 1.0;
    }
    let ra = rate * f64::from(years);
    (1.0 - (-ra).exp()) / ra
}

/// Carbon density and LUC emission accounting with constant densities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandCarbonDensities {
    /// Above-ground carbon density (kgC/m2)
    above_ground_density: f64,
    /// Below-ground carbon density (kgC/m2)
    below_ground_density: f64,
    /// Years for vegetation to reach full above-ground density
    mature_age: u32,
    /// Years over which soil carbon is emitted or taken up
    soil_time_scale: u32,
    discount_rate: f64,
    above_discount_factor: f64,
    below_discount_factor: f64,
    history: Option<LandUseHistory>,
    /// Land area per model period, as reported by the owning leaf.
    land_use: Vec<Option<f64>>,
    /// Net emission per calendar year from the latest `calc` call.
    emissions: BTreeMap<i32, f64>,
}

impl LandCarbonDensities {
    pub fn new(above_ground_density: f64, below_ground_density: f64, mature_age: u32) -> Self {
        Self {
            above_ground_density,
            below_ground_density,
            mature_age,
            soil_time_scale: DEFAULT_SOIL_TIME_SCALE,
            discount_rate: 0.0,
            above_discount_factor: 1.0,
            below_discount_factor: 1.0,
            history: None,
            land_use: Vec::new(),
            emissions: BTreeMap::new(),
        }
    }

    pub fn with_soil_time_scale(mut self, years: u32) -> Self {
        self.soil_time_scale = years;
        self
    }

    /// The land area in a calendar year.
    ///
    /// Before the first model year this is the history; from the first model
    /// year on it is the latest allocation reported at or before the year's
    /// period, falling back to the last historical observation while no
    /// allocation has been reported yet.
    fn area_by_year(&self, year: i32, time: &ModelTime) -> f64 {
        if year < time.start_year() {
            return self
                .history
                .as_ref()
                .map(|history| history.allocation(year))
                .unwrap_or(0.0);
        }
        let period = time.year_to_period(year);
        for p in (0..=period).rev() {
            if let Some(area) = self.land_use.get(p).copied().flatten() {
                return area;
            }
        }
        self.history
            .as_ref()
            .map(|history| history.allocation(year))
            .unwrap_or(0.0)
    }
}

impl Default for LandCarbonDensities {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0)
    }
}

impl CarbonCalc for LandCarbonDensities {
    fn complete_init(&mut self, discount_rate: f64) {
        self.discount_rate = discount_rate;
        self.above_discount_factor = accrual_discount_factor(discount_rate, self.mature_age);
        self.below_discount_factor = accrual_discount_factor(discount_rate, self.soil_time_scale);
    }

    fn init_land_use_history(&mut self, history: LandUseHistory) {
        self.history = Some(history);
    }

    fn has_land_use_history(&self) -> bool {
        self.history.is_some()
    }

    fn set_total_land_use(&mut self, area: f64, period: usize) {
        if self.land_use.len() <= period {
            self.land_use.resize(period + 1, None);
        }
        self.land_use[period] = Some(area);
    }

    /// Rebuild the emission series from the start of the history through
    /// `end_year`.
    ///
    /// The series is recomputed from scratch on every call, which makes the
    /// update idempotent: a solver may revisit the same period repeatedly
    /// and the stored emissions always reflect the latest land areas.
    fn calc(&mut self, _period: usize, end_year: i32, time: &ModelTime) {
        let Some(first_year) = self.history.as_ref().map(LandUseHistory::first_year) else {
            return;
        };
        let horizon = end_year.min(time.carbon_end_year());
        let mut emissions: BTreeMap<i32, f64> = BTreeMap::new();
        for year in (first_year + 1)..=horizon {
            // Positive delta: land lost, carbon released.
            let delta = self.area_by_year(year - 1, time) - self.area_by_year(year, time);
            if delta == 0.0 {
                continue;
            }
            *emissions.entry(year).or_default() += delta * self.above_ground_density;

            let total_below = delta * self.below_ground_density;
            if total_below == 0.0 {
                continue;
            }
            if self.soil_time_scale <= 1 {
                *emissions.entry(year).or_default() += total_below;
                continue;
            }
            // Exponential release at rate 1/soil_time_scale, truncated to the
            // soil window and renormalized so the full stock is accounted for.
            let ts = f64::from(self.soil_time_scale);
            let window_total = 1.0 - (-ts / ts).exp();
            for offset in 0..self.soil_time_scale {
                let release_year = year + offset as i32;
                if release_year > horizon {
                    break;
                }
                let f0 = (-f64::from(offset) / ts).exp();
                let f1 = (-f64::from(offset + 1) / ts).exp();
                *emissions.entry(release_year).or_default() +=
                    total_below * (f0 - f1) / window_total;
            }
        }
        self.emissions = emissions;
    }

    fn actual_above_ground_carbon_density(&self, _year: i32) -> f64 {
        self.above_ground_density
    }

    fn actual_below_ground_carbon_density(&self, _year: i32) -> f64 {
        self.below_ground_density
    }

    fn above_ground_carbon_subsidy_discount_factor(&self) -> f64 {
        self.above_discount_factor
    }

    fn below_ground_carbon_subsidy_discount_factor(&self) -> f64 {
        self.below_discount_factor
    }

    fn net_land_use_change_emission(&self, year: i32) -> f64 {
        self.emissions.get(&year).copied().unwrap_or(0.0)
    }

    fn set_soil_time_scale(&mut self, years: u32) {
        self.soil_time_scale = years;
    }
}
