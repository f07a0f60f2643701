//! Land leaf
//!
//! A leaf is a terminal node in the land-allocation tree representing one
//! land use. Each simulated period the parent node drives it through a fixed
//! protocol: set the profit rate, replay or compute shares, calibrate the
//! profit scaler, and finally convert the normalized share the parent
//! assigned into an absolute land area with its carbon consequences.
//!
//! Period-indexed state is mutated strictly left to right: period `p` may
//! read period `p - 1` but never a later period. Entries that have not been
//! seeded yet are `None` and are carried forward from the previous period
//! exactly once, in [`LandLeaf::init_calc`].

use crate::report::{CarbonReport, LeafReport};
use landuse_core::carbon::{CarbonCalc, LandUseHistory};
use landuse_core::choice::DiscreteChoice;
use landuse_core::context::ModelContext;
use landuse_core::errors::{LandUseError, LandUseResult};
use landuse_core::market::CO2_LUC_MARKET;
use tracing::warn;

/// Conversion between the currency year of the carbon market and the
/// currency year of land profit rates.
const DOLLAR_CONVERSION_75_90: f64 = 2.212;

/// Unit conversion for the carbon subsidy: carbon densities are in kgC/m2,
/// profit rates per thousand km2 of land; x1e9 from m2 to thousand km2 and
/// /1e3 from kgC to tC.
const CARBON_SUBSIDY_UNIT_CONVERSION: f64 = 1.0e6;

/// Which allocations a calibration query is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandAllocationType {
    Any,
    Managed,
    Unmanaged,
}

/// A terminal node of the land-allocation tree.
#[derive(Debug)]
pub struct LandLeaf {
    name: String,
    /// Leaf enters the choice set only from `new_tech_start_year`.
    is_new_tech: bool,
    new_tech_start_year: i32,
    /// Placeholder share used to calibrate a not-yet-observed technology.
    ghost_share_numerator: f64,
    /// Carbon densities below these thresholds are not subsidized (kgC/m2).
    min_above_ground_c_density: f64,
    min_below_ground_c_density: f64,
    /// Market the land area is constrained against, when configured.
    land_expansion_cost_name: Option<String>,
    social_discount_rate: f64,
    /// Reference allocations from input data; never mutated after init.
    read_in_land_allocation: Vec<f64>,
    land_allocation: Vec<f64>,
    share: Vec<Option<f64>>,
    profit_rate: Vec<f64>,
    profit_scaler: Vec<Option<f64>>,
    calibration_profit_rate: Vec<f64>,
    carbon_price_increase_rate: Vec<f64>,
    avg_profit_rate_above: Vec<f64>,
    /// Demand registered against the carbon market by the previous
    /// emission calculation; the market is handed the delta.
    last_calc_co2_value: f64,
    /// Demand registered against the expansion-cost market by the previous
    /// allocation calculation.
    last_calc_expansion_value: f64,
    carbon_calc: Box<dyn CarbonCalc>,
    /// Parsed history, moved into the carbon calculator at `complete_init`.
    pending_history: Option<LandUseHistory>,
    initialized: bool,
}

impl LandLeaf {
    pub fn new(name: impl Into<String>, read_in_land_allocation: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            is_new_tech: false,
            new_tech_start_year: 2020,
            ghost_share_numerator: 0.25,
            min_above_ground_c_density: 0.0,
            min_below_ground_c_density: 0.0,
            land_expansion_cost_name: None,
            social_discount_rate: 0.0,
            read_in_land_allocation,
            land_allocation: Vec::new(),
            share: Vec::new(),
            profit_rate: Vec::new(),
            profit_scaler: Vec::new(),
            calibration_profit_rate: Vec::new(),
            carbon_price_increase_rate: Vec::new(),
            avg_profit_rate_above: Vec::new(),
            last_calc_co2_value: 0.0,
            last_calc_expansion_value: 0.0,
            carbon_calc: Box::new(crate::carbon::LandCarbonDensities::default()),
            pending_history: None,
            initialized: false,
        }
    }

    pub fn with_carbon_calc(mut self, carbon_calc: Box<dyn CarbonCalc>) -> Self {
        self.carbon_calc = carbon_calc;
        self
    }

    pub fn with_land_use_history(mut self, history: LandUseHistory) -> Self {
        self.pending_history = Some(history);
        self
    }

    pub fn with_min_carbon_densities(mut self, above: f64, below: f64) -> Self {
        self.min_above_ground_c_density = above;
        self.min_below_ground_c_density = below;
        self
    }

    pub fn with_expansion_cost_market(mut self, market_name: impl Into<String>) -> Self {
        self.land_expansion_cost_name = Some(market_name.into());
        self
    }

    pub fn as_new_technology(mut self, start_year: i32) -> Self {
        self.is_new_tech = true;
        self.new_tech_start_year = start_year;
        self
    }

    pub fn with_ghost_share_numerator(mut self, numerator: f64) -> Self {
        self.ghost_share_numerator = numerator;
        self
    }

    /// Finish construction: size the per-period state, validate the read-in
    /// allocations, fix the discount rates and wire up the carbon calculator.
    ///
    /// Fails on a negative read-in allocation or a missing land-use history;
    /// the model cannot proceed from either.
    pub fn complete_init(
        &mut self,
        ctx: &ModelContext,
        social_discount_rate: f64,
        private_discount_rate_land: f64,
    ) -> LandUseResult<()> {
        let max_periods = ctx.time.max_periods();
        self.social_discount_rate = social_discount_rate;

        self.read_in_land_allocation.resize(max_periods, 0.0);
        for (period, &allocation) in self.read_in_land_allocation.iter().enumerate() {
            if allocation < 0.0 {
                return Err(LandUseError::NegativeLandAllocation {
                    leaf: self.name.clone(),
                    region: ctx.region.to_string(),
                    period,
                    value: allocation,
                });
            }
        }
        self.land_allocation = vec![0.0; max_periods];
        self.share = vec![None; max_periods];
        self.profit_rate = vec![0.0; max_periods];
        self.profit_scaler = vec![None; max_periods];
        self.calibration_profit_rate = vec![0.0; max_periods];
        self.carbon_price_increase_rate = vec![0.0; max_periods];
        self.avg_profit_rate_above = vec![0.0; max_periods];

        if !self.carbon_calc.has_land_use_history() {
            match self.pending_history.take() {
                Some(history) => self.carbon_calc.init_land_use_history(history),
                None => {
                    return Err(LandUseError::MissingLandUseHistory {
                        leaf: self.name.clone(),
                        region: ctx.region.to_string(),
                    })
                }
            }
        }
        self.carbon_calc.complete_init(private_discount_rate_land);
        self.initialized = true;
        Ok(())
    }

    /// Carry forward state that has not been seeded for this period.
    ///
    /// For periods after the first, an unset profit scaler or share takes
    /// the previous period's value. A scaler that is still unset afterwards
    /// is a fatal calibration gap: the first active periods must be seeded
    /// by calibration before projection can start.
    pub fn init_calc(&mut self, ctx: &ModelContext, period: usize) -> LandUseResult<()> {
        if period > 1 {
            if self.profit_scaler[period].is_none() {
                self.profit_scaler[period] = self.profit_scaler[period - 1];
            }
            // For most leaves the share is overwritten by calc_land_shares;
            // the carried value survives when a leaf is alone in its node.
            if self.share[period].is_none() {
                self.share[period] = self.share[period - 1];
            }
        }
        if self.profit_scaler[period].is_none() {
            return Err(LandUseError::UninitializedProfitScaler {
                leaf: self.name.clone(),
                region: ctx.region.to_string(),
                period,
            });
        }
        Ok(())
    }

    /// Set the share of the parent's land this leaf held historically.
    ///
    /// Used only during calibration replay, before any share weights exist.
    /// Returns the profit-weighted contribution `share * profit_rate` the
    /// parent aggregates into its own average profit rate.
    pub fn set_init_shares(&mut self, parent_land_allocation: f64, period: usize) -> f64 {
        let share = if parent_land_allocation > 0.0 {
            self.read_in_land_allocation[period] / parent_land_allocation
        } else {
            0.0
        };
        self.share[period] = Some(share);
        share * self.profit_rate[period]
    }

    /// Store the profit rate handed down from the production technology,
    /// net of expansion costs and gross of the carbon subsidy.
    ///
    /// Always succeeds; a negative adjusted profit clamps to zero.
    pub fn set_profit_rate(
        &mut self,
        ctx: &ModelContext,
        product_name: &str,
        gross_profit_rate: f64,
        period: usize,
    ) {
        debug_assert!(product_name == self.name || product_name.is_empty());

        let mut adjusted_profit_rate = gross_profit_rate;
        if let Some(expansion_market) = &self.land_expansion_cost_name {
            match ctx.market.price(expansion_market, ctx.region, period) {
                Some(expansion_cost) => adjusted_profit_rate -= expansion_cost,
                None => warn!(
                    region = ctx.region,
                    market = expansion_market.as_str(),
                    "no expansion cost market; treating expansion cost as zero"
                ),
            }
        }

        self.profit_rate[period] =
            (adjusted_profit_rate + self.carbon_subsidy(ctx, period)).max(0.0);
    }

    /// The per-area subsidy representing the market value of carbon stored
    /// in this leaf's land.
    ///
    /// Zero when no carbon market exists or its price is non-positive.
    /// Otherwise the incremental carbon densities above the configured
    /// minimums, each discounted by how quickly that carbon accrues, are
    /// valued at the carbon price annualized with the social discount rate
    /// net of the expected carbon price growth.
    pub fn carbon_subsidy(&self, ctx: &ModelContext, period: usize) -> f64 {
        let Some(mut carbon_price) = ctx.market.price(CO2_LUC_MARKET, ctx.region, period) else {
            return 0.0;
        };
        if carbon_price <= 0.0 {
            return 0.0;
        }
        // The carbon market trades in 1990$, land profits in 1975$.
        carbon_price /= DOLLAR_CONVERSION_75_90;

        // Only carbon above the read-in minimum is subsidized.
        let year = ctx.time.period_to_year(period);
        let incremental_above = self.carbon_calc.actual_above_ground_carbon_density(year)
            - self.min_above_ground_c_density;
        let incremental_below = self.carbon_calc.actual_below_ground_carbon_density(year)
            - self.min_below_ground_c_density;

        let subsidy = (incremental_above
            * self.carbon_calc.above_ground_carbon_subsidy_discount_factor()
            + incremental_below
                * self.carbon_calc.below_ground_carbon_subsidy_discount_factor())
            * carbon_price
            * (self.social_discount_rate - self.carbon_price_increase_rate[period])
            * CARBON_SUBSIDY_UNIT_CONVERSION;

        // A negative subsidy means the densities or rates upstream are bad data.
        debug_assert!(
            subsidy >= 0.0,
            "negative carbon subsidy for leaf {} in period {period}",
            self.name
        );
        subsidy
    }

    /// Derive the calibration profit rate implied by this leaf's share and
    /// the average profit rate of the node above it.
    ///
    /// New-technology leaves skip this; their calibration profit comes from
    /// the parent in [`calculate_profit_scalers`](Self::calculate_profit_scalers).
    pub fn calculate_calibration_profit_rate(
        &mut self,
        avg_profit_rate_above: f64,
        choice_fn_above: &dyn DiscreteChoice,
        period: usize,
    ) {
        self.avg_profit_rate_above[period] = avg_profit_rate_above;
        if !self.is_new_tech {
            let share = self.share[period].unwrap_or(0.0);
            self.calibration_profit_rate[period] =
                choice_fn_above.implied_cost(share, avg_profit_rate_above, period);
        }
    }

    /// Compute the profit scaler (share weight) for this period.
    ///
    /// Ordinary leaves invert the choice function at the observed share and
    /// profit rate; a zero calibration or realized profit short-circuits to
    /// a zero scaler before that division. New-technology leaves calibrate
    /// the ghost share against the parent's calibration profit instead, and
    /// the resulting scaler activates only in the configured start period.
    pub fn calculate_profit_scalers(
        &mut self,
        ctx: &ModelContext,
        new_tech_calibration_profit: f64,
        choice_fn_above: &dyn DiscreteChoice,
        period: usize,
    ) {
        if self.is_new_tech {
            self.calibration_profit_rate[period] = new_tech_calibration_profit;
            let new_tech_scaler = choice_fn_above.share_weight(
                self.ghost_share_numerator,
                new_tech_calibration_profit,
                period,
            );
            let start_period = ctx.time.year_to_period(self.new_tech_start_year);
            self.profit_scaler[period] = Some(0.0);
            self.profit_scaler[start_period] = Some(new_tech_scaler);
        } else if self.calibration_profit_rate[period] == 0.0 || self.profit_rate[period] == 0.0 {
            self.profit_scaler[period] = Some(0.0);
        } else {
            let share = self.share[period].unwrap_or(0.0);
            self.profit_scaler[period] =
                Some(choice_fn_above.share_weight(share, self.profit_rate[period], period));
        }

        // A negative scaler means the calibration price is too low to
        // support the observed share.
        if self.profit_scaler[period].is_some_and(|scaler| scaler < 0.0) {
            warn!(
                region = ctx.region,
                leaf = self.name.as_str(),
                period,
                "calibration price too low, clamping negative profit scaler to zero"
            );
            self.profit_scaler[period] = Some(0.0);
        }
    }

    /// The unnormalized share this leaf contributes to its parent's
    /// normalization step. A non-positive profit rate forces a zero
    /// contribution regardless of the calibrated scaler.
    pub fn calc_land_shares(&self, choice_fn_above: &dyn DiscreteChoice, period: usize) -> f64 {
        debug_assert!(
            self.profit_scaler[period].is_some(),
            "profit scaler unset in period {period}; init_calc must run first"
        );
        let scaler = if self.profit_rate[period] <= 0.0 {
            0.0
        } else {
            self.profit_scaler[period].unwrap_or(0.0)
        };
        choice_fn_above.unnormalized_share(scaler, self.profit_rate[period], period)
    }

    /// Assign the final normalized share for a period. Called by the parent
    /// after it has normalized the unnormalized shares of all children.
    pub fn set_share(&mut self, share: f64, period: usize) {
        self.share[period] = Some(share);
    }

    /// Convert the normalized share into an absolute land area and push it
    /// into the carbon calculator and, when configured, the expansion-cost
    /// market.
    ///
    /// # Panics
    ///
    /// Panics unless `share[period]` has been set and lies in `[0, 1]`.
    pub fn calc_land_allocation(
        &mut self,
        ctx: &mut ModelContext,
        parent_land_allocation: f64,
        period: usize,
    ) {
        let share = self.share[period];
        assert!(
            share.is_some_and(|s| (0.0..=1.0).contains(&s)),
            "share {share:?} of leaf {} not in [0, 1] in period {period}",
            self.name
        );
        let share = share.unwrap_or(0.0);

        self.land_allocation[period] = if parent_land_allocation > 0.0 {
            parent_land_allocation * share
        } else {
            0.0
        };

        self.carbon_calc
            .set_total_land_use(self.land_allocation[period], period);

        if let Some(expansion_market) = &self.land_expansion_cost_name {
            self.last_calc_expansion_value = ctx.market.add_to_demand(
                expansion_market,
                ctx.region,
                self.land_allocation[period],
                self.last_calc_expansion_value,
                period,
                true,
            );
        }
    }

    /// Run the carbon stock-and-flow update to `end_year` and, when this is
    /// a terminal accounting pass, register the period's net LUC emissions
    /// against the carbon market.
    ///
    /// Intermediate lookahead years are not reported, so emissions are never
    /// double-counted across lookahead calls.
    pub fn calc_luc_emissions(&mut self, ctx: &mut ModelContext, period: usize, end_year: i32) {
        self.carbon_calc.calc(period, end_year, ctx.time);

        if end_year == ctx.time.carbon_end_year() || ctx.time.is_final_period(period) {
            let luc_emissions = self
                .carbon_calc
                .net_land_use_change_emission(ctx.time.period_to_year(period));
            self.last_calc_co2_value = ctx.market.add_to_demand(
                CO2_LUC_MARKET,
                ctx.region,
                luc_emissions,
                self.last_calc_co2_value,
                period,
                false,
            );
        }
    }

    pub fn set_carbon_price_increase_rate(&mut self, rate: f64, period: usize) {
        self.carbon_price_increase_rate[period] = rate;
    }

    pub fn set_soil_time_scale(&mut self, years: u32) {
        self.carbon_calc.set_soil_time_scale(years);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_new_tech(&self) -> bool {
        self.is_new_tech
    }

    pub fn is_unmanaged_leaf(&self) -> bool {
        false
    }

    pub fn land_allocation(&self, product_name: &str, period: usize) -> f64 {
        // Residue output queries carry no product name.
        debug_assert!(product_name == self.name || product_name.is_empty());
        self.land_allocation[period]
    }

    /// Read-in allocation for calibration queries; only managed land is
    /// reported from this leaf type.
    pub fn cal_land_allocation(&self, allocation_type: LandAllocationType, period: usize) -> f64 {
        match allocation_type {
            LandAllocationType::Any | LandAllocationType::Managed => {
                self.read_in_land_allocation[period]
            }
            LandAllocationType::Unmanaged => 0.0,
        }
    }

    pub fn share(&self, period: usize) -> Option<f64> {
        self.share[period]
    }

    pub fn profit_rate(&self, period: usize) -> f64 {
        self.profit_rate[period]
    }

    pub fn profit_scaler(&self, period: usize) -> Option<f64> {
        self.profit_scaler[period]
    }

    pub fn calibration_profit_rate(&self, period: usize) -> f64 {
        self.calibration_profit_rate[period]
    }

    /// Leaves report their own profit rate; the node above picks the child
    /// with the highest share.
    pub fn profit_for_child_with_highest_share(&self, period: usize) -> f64 {
        self.profit_rate[period]
    }

    /// Structured per-period dump for reproducibility verification.
    pub fn report(&self, ctx: &ModelContext, period: usize) -> LeafReport {
        let year = ctx.time.period_to_year(period);
        LeafReport {
            name: self.name.clone(),
            period,
            calibration_profit_rate: self.calibration_profit_rate[period],
            land_allocation: self.land_allocation[period],
            min_above_ground_c_density: self.min_above_ground_c_density,
            min_below_ground_c_density: self.min_below_ground_c_density,
            social_discount_rate: self.social_discount_rate,
            carbon_price_increase_rate: self.carbon_price_increase_rate[period],
            land_expansion_cost_name: self.land_expansion_cost_name.clone(),
            avg_profit_rate_above: self.avg_profit_rate_above[period],
            is_new_tech: self.is_new_tech,
            carbon: CarbonReport {
                above_ground_carbon_density: self
                    .carbon_calc
                    .actual_above_ground_carbon_density(year),
                below_ground_carbon_density: self
                    .carbon_calc
                    .actual_below_ground_carbon_density(year),
                above_ground_subsidy_discount_factor: self
                    .carbon_calc
                    .above_ground_carbon_subsidy_discount_factor(),
                below_ground_subsidy_discount_factor: self
                    .carbon_calc
                    .below_ground_carbon_subsidy_discount_factor(),
                net_land_use_change_emission: self.carbon_calc.net_land_use_change_emission(year),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::LandCarbonDensities;
    use approx::assert_relative_eq;
    use landuse_core::choice::RelativeCostLogit;
    use landuse_core::market::LinkedMarketplace;
    use landuse_core::time::ModelTime;

    const REGION: &str = "R1";

    fn two_period_time() -> ModelTime {
        ModelTime::new(1975, 15, 2, 2100).unwrap()
    }

    fn history() -> LandUseHistory {
        LandUseHistory::from_points(vec![(1960, 100.0), (1974, 100.0)]).unwrap()
    }

    fn init_leaf(leaf: &mut LandLeaf, market: &mut LinkedMarketplace, time: &ModelTime) {
        let ctx = ModelContext::new(REGION, market, time);
        leaf.complete_init(&ctx, 0.05, 0.05).unwrap();
    }

    fn corn_leaf() -> (LandLeaf, LinkedMarketplace, ModelTime) {
        let time = two_period_time();
        let mut market = LinkedMarketplace::new();
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0]).with_land_use_history(history());
        init_leaf(&mut leaf, &mut market, &time);
        (leaf, market, time)
    }

    #[test]
    fn negative_read_in_allocation_is_fatal() {
        let time = two_period_time();
        let mut market = LinkedMarketplace::new();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        let mut leaf = LandLeaf::new("Corn", vec![100.0, -1.0]).with_land_use_history(history());
        let err = leaf.complete_init(&ctx, 0.05, 0.05).unwrap_err();
        assert!(matches!(
            err,
            LandUseError::NegativeLandAllocation { period: 1, .. }
        ));
    }

    #[test]
    fn missing_land_use_history_is_fatal() {
        let time = two_period_time();
        let mut market = LinkedMarketplace::new();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0]);
        let err = leaf.complete_init(&ctx, 0.05, 0.05).unwrap_err();
        assert!(matches!(err, LandUseError::MissingLandUseHistory { .. }));
    }

    #[test]
    fn init_shares_are_read_in_over_parent() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        let weighted_profit = leaf.set_init_shares(200.0, 0);
        assert_relative_eq!(leaf.share(0).unwrap(), 0.5);
        assert_relative_eq!(weighted_profit, 5.0);
    }

    #[test]
    fn init_shares_zero_parent_allocation() {
        let (mut leaf, _market, _time) = corn_leaf();
        assert_eq!(leaf.set_init_shares(0.0, 0), 0.0);
        assert_eq!(leaf.share(0), Some(0.0));
    }

    #[test]
    fn init_shares_is_idempotent() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        let first = leaf.set_init_shares(200.0, 0);
        let first_share = leaf.share(0);
        let second = leaf.set_init_shares(200.0, 0);
        assert_eq!(first, second);
        assert_eq!(leaf.share(0), first_share);
    }

    #[test]
    fn profit_rate_without_carbon_price_is_gross() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        assert_relative_eq!(leaf.profit_rate(0), 10.0);
    }

    #[test]
    fn profit_rate_clamps_to_zero() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", -4.0, 0);
        assert_eq!(leaf.profit_rate(0), 0.0);
    }

    #[test]
    fn expansion_cost_is_subtracted() {
        let time = two_period_time();
        let mut market =
            LinkedMarketplace::new().with_price_path("corn-constraint", REGION, vec![3.0, 3.0]);
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0])
            .with_land_use_history(history())
            .with_expansion_cost_market("corn-constraint");
        init_leaf(&mut leaf, &mut market, &time);
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        assert_relative_eq!(leaf.profit_rate(0), 7.0);
    }

    #[test]
    fn carbon_subsidy_zero_without_market_or_price() {
        let (leaf, mut market, time) = corn_leaf();
        {
            let ctx = ModelContext::new(REGION, &mut market, &time);
            assert_eq!(leaf.carbon_subsidy(&ctx, 0), 0.0);
        }
        market.set_price_path(CO2_LUC_MARKET, REGION, vec![0.0, -5.0]);
        let ctx = ModelContext::new(REGION, &mut market, &time);
        assert_eq!(leaf.carbon_subsidy(&ctx, 0), 0.0);
        assert_eq!(leaf.carbon_subsidy(&ctx, 1), 0.0);
    }

    #[test]
    fn carbon_subsidy_matches_fixed_formula() {
        let time = two_period_time();
        let mut market =
            LinkedMarketplace::new().with_price_path(CO2_LUC_MARKET, REGION, vec![50.0, 50.0]);
        // Mature age zero gives a discount factor of exactly 1.
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0])
            .with_land_use_history(history())
            .with_carbon_calc(Box::new(LandCarbonDensities::new(8.0, 0.0, 0)))
            .with_min_carbon_densities(5.0, 0.0);
        init_leaf(&mut leaf, &mut market, &time);
        let ctx = ModelContext::new(REGION, &mut market, &time);

        let expected = (8.0 - 5.0) * (50.0 / 2.212) * 0.05 * 1.0e6;
        assert_relative_eq!(leaf.carbon_subsidy(&ctx, 0), expected, max_relative = 1e-12);
        assert!(leaf.carbon_subsidy(&ctx, 0) > 0.0);
    }

    #[test]
    fn carbon_subsidy_monotone_in_price() {
        let time = two_period_time();
        let mut market =
            LinkedMarketplace::new().with_price_path(CO2_LUC_MARKET, REGION, vec![20.0, 80.0]);
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0])
            .with_land_use_history(history())
            .with_carbon_calc(Box::new(LandCarbonDensities::new(8.0, 2.0, 0)));
        init_leaf(&mut leaf, &mut market, &time);
        let ctx = ModelContext::new(REGION, &mut market, &time);
        assert!(leaf.carbon_subsidy(&ctx, 1) > leaf.carbon_subsidy(&ctx, 0));
    }

    #[test]
    fn scaler_zero_when_calibration_signal_missing() {
        let (mut leaf, mut market, time) = corn_leaf();
        let choice = RelativeCostLogit::default();
        let ctx = ModelContext::new(REGION, &mut market, &time);

        // Zero realized profit.
        leaf.set_init_shares(200.0, 0);
        leaf.calculate_calibration_profit_rate(8.0, &choice, 0);
        leaf.calculate_profit_scalers(&ctx, 0.0, &choice, 0);
        assert_eq!(leaf.profit_scaler(0), Some(0.0));

        // Zero calibration profit.
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 1);
        leaf.set_init_shares(200.0, 1);
        leaf.calculate_calibration_profit_rate(0.0, &choice, 1);
        leaf.calculate_profit_scalers(&ctx, 0.0, &choice, 1);
        assert_eq!(leaf.profit_scaler(1), Some(0.0));
    }

    #[test]
    fn scaler_reproduces_observed_share() {
        let (mut leaf, mut market, time) = corn_leaf();
        let choice = RelativeCostLogit::new(1.5);
        let ctx = ModelContext::new(REGION, &mut market, &time);

        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        leaf.set_init_shares(200.0, 0);
        leaf.calculate_calibration_profit_rate(8.0, &choice, 0);
        leaf.calculate_profit_scalers(&ctx, 0.0, &choice, 0);

        // The calibrated scaler reproduces the observed share through the
        // choice function.
        let unnormalized = leaf.calc_land_shares(&choice, 0);
        assert_relative_eq!(unnormalized, 0.5, max_relative = 1e-12);
    }

    #[test]
    fn new_tech_scaler_lands_in_start_period() {
        let time = two_period_time();
        let mut market = LinkedMarketplace::new();
        let mut leaf = LandLeaf::new("Cellulosic", vec![0.0, 0.0])
            .with_land_use_history(LandUseHistory::from_points(vec![(1974, 0.0)]).unwrap())
            .as_new_technology(1990);
        init_leaf(&mut leaf, &mut market, &time);
        let choice = RelativeCostLogit::default();
        let ctx = ModelContext::new(REGION, &mut market, &time);

        leaf.calculate_profit_scalers(&ctx, 6.0, &choice, 0);

        // Ghost share calibrated against the parent's calibration profit,
        // written into the start-year period; the current slot stays off.
        assert_eq!(leaf.profit_scaler(0), Some(0.0));
        assert_relative_eq!(
            leaf.profit_scaler(1).unwrap(),
            choice.share_weight(0.25, 6.0, 0)
        );
        assert_relative_eq!(leaf.calibration_profit_rate(0), 6.0);
    }

    #[test]
    fn negative_scaler_clamps_to_zero() {
        let (mut leaf, mut market, time) = corn_leaf();
        let choice = RelativeCostLogit::default();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        // An inconsistent (negative) observed share drives the computed
        // scaler negative, which is the calibration-price-too-low condition.
        leaf.set_share(-0.2, 0);
        leaf.calculate_calibration_profit_rate(8.0, &choice, 0);
        leaf.calculate_profit_scalers(&ctx, 0.0, &choice, 0);
        assert_eq!(leaf.profit_scaler(0), Some(0.0));
    }

    #[test]
    fn init_calc_accepts_seeded_calibration() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        // Hand-seed period 0 and 1 as calibration would.
        leaf.set_share(0.5, 0);
        leaf.set_share(0.5, 1);
        leaf.profit_scaler[0] = Some(2.0);
        leaf.profit_scaler[1] = Some(2.0);
        leaf.init_calc(&ctx, 1).unwrap();
        assert_eq!(leaf.profit_scaler(1), Some(2.0));
    }

    #[test]
    fn init_calc_carry_forward_after_calibration() {
        let time = ModelTime::new(1975, 15, 3, 2100).unwrap();
        let mut market = LinkedMarketplace::new();
        let mut leaf = LandLeaf::new("Corn", vec![100.0; 3]).with_land_use_history(history());
        init_leaf(&mut leaf, &mut market, &time);
        let ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.profit_scaler[1] = Some(1.5);
        leaf.set_share(0.4, 1);
        leaf.init_calc(&ctx, 2).unwrap();
        assert_eq!(leaf.profit_scaler(2), Some(1.5));
        assert_eq!(leaf.share(2), Some(0.4));
    }

    #[test]
    fn init_calc_unseeded_first_period_is_fatal() {
        let (mut leaf, mut market, time) = corn_leaf();
        let ctx = ModelContext::new(REGION, &mut market, &time);
        let err = leaf.init_calc(&ctx, 1).unwrap_err();
        assert!(matches!(
            err,
            LandUseError::UninitializedProfitScaler { period: 1, .. }
        ));
    }

    #[test]
    fn land_shares_zero_for_nonpositive_profit() {
        let (mut leaf, _market, _time) = corn_leaf();
        let choice = RelativeCostLogit::default();
        leaf.profit_scaler[0] = Some(3.0);
        // Profit rate is still zero, so the calibrated scaler is ignored.
        assert_eq!(leaf.calc_land_shares(&choice, 0), 0.0);
    }

    #[test]
    fn land_allocation_is_parent_times_share() {
        let (mut leaf, mut market, time) = corn_leaf();
        let mut ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_share(0.5, 0);
        leaf.calc_land_allocation(&mut ctx, 200.0, 0);
        assert_relative_eq!(leaf.land_allocation("Corn", 0), 100.0);

        leaf.set_share(0.5, 1);
        leaf.calc_land_allocation(&mut ctx, 0.0, 1);
        assert_eq!(leaf.land_allocation("Corn", 1), 0.0);
    }

    #[test]
    #[should_panic(expected = "not in [0, 1]")]
    fn land_allocation_rejects_out_of_range_share() {
        let (mut leaf, mut market, time) = corn_leaf();
        let mut ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_share(1.2, 0);
        leaf.calc_land_allocation(&mut ctx, 200.0, 0);
    }

    #[test]
    #[should_panic(expected = "not in [0, 1]")]
    fn land_allocation_rejects_unset_share() {
        let (mut leaf, mut market, time) = corn_leaf();
        let mut ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.calc_land_allocation(&mut ctx, 200.0, 0);
    }

    #[test]
    fn expansion_demand_uses_delta_protocol() {
        let time = two_period_time();
        let mut market =
            LinkedMarketplace::new().with_price_path("corn-constraint", REGION, vec![0.0, 0.0]);
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0])
            .with_land_use_history(history())
            .with_expansion_cost_market("corn-constraint");
        init_leaf(&mut leaf, &mut market, &time);

        {
            let mut ctx = ModelContext::new(REGION, &mut market, &time);
            leaf.set_share(0.5, 0);
            leaf.calc_land_allocation(&mut ctx, 200.0, 0);
            // Recomputing the same period replaces the registration.
            leaf.set_share(0.4, 0);
            leaf.calc_land_allocation(&mut ctx, 200.0, 0);
        }
        assert_relative_eq!(market.demand("corn-constraint", REGION, 0), 80.0);
    }

    #[test]
    fn luc_demand_gated_on_terminal_year_or_final_period() {
        let time = two_period_time();
        let mut market = LinkedMarketplace::new();
        let mut leaf = LandLeaf::new("Corn", vec![100.0, 100.0])
            .with_land_use_history(history())
            .with_carbon_calc(Box::new(LandCarbonDensities::new(2.0, 0.0, 0)));
        init_leaf(&mut leaf, &mut market, &time);

        {
            let mut ctx = ModelContext::new(REGION, &mut market, &time);
            leaf.set_share(0.5, 0);
            leaf.calc_land_allocation(&mut ctx, 120.0, 0);
            // Intermediate lookahead year in a non-final period: no report.
            leaf.calc_luc_emissions(&mut ctx, 0, 1990);
        }
        assert_eq!(market.demand(CO2_LUC_MARKET, REGION, 0), 0.0);

        {
            let mut ctx = ModelContext::new(REGION, &mut market, &time);
            // Terminal accounting year: the period's emissions are reported.
            leaf.calc_luc_emissions(&mut ctx, 0, time.carbon_end_year());
        }
        // 100 units of history shrink to 60 in period 0.
        assert_relative_eq!(market.demand(CO2_LUC_MARKET, REGION, 0), 40.0 * 2.0);

        {
            let mut ctx = ModelContext::new(REGION, &mut market, &time);
            leaf.set_share(0.5, 1);
            leaf.calc_land_allocation(&mut ctx, 120.0, 1);
            // Final simulated period reports regardless of the end year.
            leaf.calc_luc_emissions(&mut ctx, 1, 1990);
        }
        assert_eq!(market.demand(CO2_LUC_MARKET, REGION, 1), 0.0);
    }

    #[test]
    fn cal_land_allocation_by_type() {
        let (leaf, _market, _time) = corn_leaf();
        assert_eq!(leaf.cal_land_allocation(LandAllocationType::Any, 0), 100.0);
        assert_eq!(
            leaf.cal_land_allocation(LandAllocationType::Managed, 0),
            100.0
        );
        assert_eq!(
            leaf.cal_land_allocation(LandAllocationType::Unmanaged, 0),
            0.0
        );
    }

    #[test]
    fn report_round_trips_through_json() {
        let (mut leaf, mut market, time) = corn_leaf();
        {
            let ctx = ModelContext::new(REGION, &mut market, &time);
            leaf.set_profit_rate(&ctx, "Corn", 10.0, 0);
        }
        let mut ctx = ModelContext::new(REGION, &mut market, &time);
        leaf.set_share(0.5, 0);
        leaf.calc_land_allocation(&mut ctx, 200.0, 0);
        let report = leaf.report(&ctx, 0);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"land_allocation\":100.0"));
    }
}
