//! Discrete choice functions
//!
//! The share a competing land use captures is decided by a nested
//! discrete-choice (logit) model. The leaf does not know the formulas; it is
//! handed a [`DiscreteChoice`] strategy by its parent for every call. The
//! trait is deliberately stateless so the calibration math stays testable in
//! isolation from the allocation tree.
//!
//! Implementations are `typetag`-registered so a configuration document can
//! select a choice function by name.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A stateless discrete-choice (logit family) strategy.
///
/// The three operations are mutually inverse on consistent data: for a share
/// `s` observed at profit rate `p`,
/// `unnormalized_share(share_weight(s, p), p) == s`.
#[typetag::serde(tag = "type")]
pub trait DiscreteChoice: Debug + Send + Sync {
    /// The unnormalized share contribution of an alternative with the given
    /// calibrated scaler and profit rate. The parent sums these over all
    /// children and normalizes.
    fn unnormalized_share(&self, scaler: f64, profit_rate: f64, period: usize) -> f64;

    /// The share weight (profit scaler) that reproduces an observed share at
    /// an observed profit rate.
    ///
    /// Callers must short-circuit a zero or near-zero profit rate before
    /// calling this; the formula divides by a power of the profit rate.
    fn share_weight(&self, share: f64, profit_rate: f64, period: usize) -> f64;

    /// The profit rate implied by an observed share and the average profit
    /// rate of the containing node, assuming a unit share weight.
    fn implied_cost(&self, share: f64, avg_profit_rate_above: f64, period: usize) -> f64;
}

/// Relative-cost logit.
///
/// The unnormalized share of an alternative is $w \cdot p^\beta$ where $w$
/// is the calibrated share weight, $p$ the profit rate and $\beta$ the
/// distribution exponent of the containing node. The calibration operations
/// invert that formula:
///
/// - share weight: $w = s / p^\beta$
/// - implied cost: $p = \bar{p} \cdot s^{1/\beta}$
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeCostLogit {
    /// Distribution exponent ($\beta$). Larger values concentrate land in
    /// the most profitable alternatives.
    pub exponent: f64,
}

impl RelativeCostLogit {
    pub fn new(exponent: f64) -> Self {
        Self { exponent }
    }
}

impl Default for RelativeCostLogit {
    fn default() -> Self {
        Self { exponent: 1.0 }
    }
}

#[typetag::serde]
impl DiscreteChoice for RelativeCostLogit {
    fn unnormalized_share(&self, scaler: f64, profit_rate: f64, _period: usize) -> f64 {
        if profit_rate <= 0.0 {
            return 0.0;
        }
        scaler * profit_rate.powf(self.exponent)
    }

    fn share_weight(&self, share: f64, profit_rate: f64, _period: usize) -> f64 {
        share / profit_rate.powf(self.exponent)
    }

    fn implied_cost(&self, share: f64, avg_profit_rate_above: f64, _period: usize) -> f64 {
        avg_profit_rate_above * share.powf(1.0 / self.exponent)
    }
}
