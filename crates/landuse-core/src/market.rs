//! Marketplace abstraction
//!
//! Land leaves interact with the wider model economy through two calls: a
//! price lookup and an incremental demand registration. The incremental
//! protocol lets a caller revise a previously registered demand without the
//! market having to know who asked: every call supplies the new value and the
//! value registered last time, and the market applies the net delta.
//!
//! [`LinkedMarketplace`] is an in-memory implementation with fixed price
//! paths, used by tests and scenario drivers. A price-solving engine would
//! implement [`Marketplace`] over its own market state instead.

use crate::errors::{LandUseError, LandUseResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Market identifier for land-use-change CO2 emissions.
pub const CO2_LUC_MARKET: &str = "CO2_LUC";

/// Price and demand access for a single region/period.
pub trait Marketplace {
    /// The current price of a good, or `None` when no such market exists.
    fn price(&self, good: &str, region: &str, period: usize) -> Option<f64>;

    /// The current price of a good, failing when the market is missing.
    fn price_or_err(&self, good: &str, region: &str, period: usize) -> LandUseResult<f64> {
        self.price(good, region, period)
            .ok_or_else(|| LandUseError::MissingMarket {
                good: good.to_string(),
                region: region.to_string(),
            })
    }

    /// Register demand for a good, replacing a previously registered value.
    ///
    /// The market applies the net delta `new_demand - previous_demand` so
    /// that repeated registrations from the same caller do not accumulate.
    /// Returns the value the caller must hand back on its next registration.
    ///
    /// `is_flow` distinguishes per-period flow demands (land areas) from
    /// stock demands (cumulative emissions); it is bookkeeping for a
    /// downstream solver and does not change the delta arithmetic.
    fn add_to_demand(
        &mut self,
        good: &str,
        region: &str,
        new_demand: f64,
        previous_demand: f64,
        period: usize,
        is_flow: bool,
    ) -> f64;
}

/// State of one market in a [`LinkedMarketplace`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MarketRecord {
    /// Fixed price path; `None` entries read as "no price this period".
    prices: Vec<Option<f64>>,
    /// Accumulated demand per period.
    demand: Vec<f64>,
    is_flow: bool,
}

impl MarketRecord {
    fn ensure_period(&mut self, period: usize) {
        if self.demand.len() <= period {
            self.demand.resize(period + 1, 0.0);
        }
    }
}

/// In-memory marketplace with exogenous price paths.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LinkedMarketplace {
    markets: HashMap<(String, String), MarketRecord>,
}

impl LinkedMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a market for `good` in `region` with a fixed price path.
    pub fn with_price_path(mut self, good: &str, region: &str, prices: Vec<f64>) -> Self {
        self.set_price_path(good, region, prices);
        self
    }

    pub fn set_price_path(&mut self, good: &str, region: &str, prices: Vec<f64>) {
        let record = self
            .markets
            .entry((good.to_string(), region.to_string()))
            .or_default();
        record.prices = prices.into_iter().map(Some).collect();
    }

    /// Total demand registered for a good in a period.
    pub fn demand(&self, good: &str, region: &str, period: usize) -> f64 {
        self.markets
            .get(&(good.to_string(), region.to_string()))
            .and_then(|record| record.demand.get(period))
            .copied()
            .unwrap_or(0.0)
    }
}

impl Marketplace for LinkedMarketplace {
    fn price(&self, good: &str, region: &str, period: usize) -> Option<f64> {
        self.markets
            .get(&(good.to_string(), region.to_string()))
            .and_then(|record| record.prices.get(period).copied().flatten())
    }

    fn add_to_demand(
        &mut self,
        good: &str,
        region: &str,
        new_demand: f64,
        previous_demand: f64,
        period: usize,
        is_flow: bool,
    ) -> f64 {
        let record = self
            .markets
            .entry((good.to_string(), region.to_string()))
            .or_default();
        record.ensure_period(period);
        record.is_flow = is_flow;
        record.demand[period] += new_demand - previous_demand;
        new_demand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn price_path_lookup() {
        let market = LinkedMarketplace::new().with_price_path(CO2_LUC_MARKET, "R1", vec![0.0, 50.0]);
        assert_eq!(market.price(CO2_LUC_MARKET, "R1", 0), Some(0.0));
        assert_eq!(market.price(CO2_LUC_MARKET, "R1", 1), Some(50.0));
        // Past the end of the path there is no price.
        assert_eq!(market.price(CO2_LUC_MARKET, "R1", 2), None);
        assert_eq!(market.price(CO2_LUC_MARKET, "R2", 0), None);
    }

    #[test]
    fn missing_market_errors() {
        let market = LinkedMarketplace::new();
        assert!(market.price_or_err("land-constraint", "R1", 0).is_err());
    }

    #[test]
    fn demand_applies_net_delta() {
        let mut market = LinkedMarketplace::new();
        let previous = market.add_to_demand("land-constraint", "R1", 100.0, 0.0, 1, true);
        assert!(is_close!(previous, 100.0));
        assert!(is_close!(market.demand("land-constraint", "R1", 1), 100.0));

        // A revised registration replaces the old value rather than adding to it.
        let previous = market.add_to_demand("land-constraint", "R1", 80.0, previous, 1, true);
        assert!(is_close!(previous, 80.0));
        assert!(is_close!(market.demand("land-constraint", "R1", 1), 80.0));
    }

    #[test]
    fn demand_from_two_callers_accumulates() {
        let mut market = LinkedMarketplace::new();
        market.add_to_demand(CO2_LUC_MARKET, "R1", 5.0, 0.0, 0, false);
        market.add_to_demand(CO2_LUC_MARKET, "R1", 3.0, 0.0, 0, false);
        assert!(is_close!(market.demand(CO2_LUC_MARKET, "R1", 0), 8.0));
    }
}
