//! Interior tree nodes
//!
//! A [`LandNode`] owns a set of children (leaves or further nodes) and the
//! discrete-choice function that governs competition between them. The node
//! drives its children through the per-period protocol: profit rates for all
//! children are set before any child's share is computed, and shares are
//! normalized before any child computes its area.
//!
//! The aggregation here is deliberately minimal; the interesting contract
//! lives in [`LandLeaf`]. A nested child node competes with the sum of its
//! own children's unnormalized shares.

use crate::leaf::{LandAllocationType, LandLeaf};
use crate::report::{ItemReport, NodeReport};
use landuse_core::choice::DiscreteChoice;
use landuse_core::context::ModelContext;
use landuse_core::errors::LandUseResult;

/// A child of an interior node: the closed variant set of the tree.
#[derive(Debug)]
pub enum LandItem {
    Leaf(LandLeaf),
    Node(LandNode),
}

impl LandItem {
    pub fn name(&self) -> &str {
        match self {
            LandItem::Leaf(leaf) => leaf.name(),
            LandItem::Node(node) => node.name(),
        }
    }

    fn complete_init(
        &mut self,
        ctx: &ModelContext,
        social_discount_rate: f64,
        private_discount_rate_land: f64,
    ) -> LandUseResult<()> {
        match self {
            LandItem::Leaf(leaf) => {
                leaf.complete_init(ctx, social_discount_rate, private_discount_rate_land)
            }
            LandItem::Node(node) => {
                node.complete_init(ctx, social_discount_rate, private_discount_rate_land)
            }
        }
    }

    fn init_calc(&mut self, ctx: &ModelContext, period: usize) -> LandUseResult<()> {
        match self {
            LandItem::Leaf(leaf) => leaf.init_calc(ctx, period),
            LandItem::Node(node) => node.init_calc(ctx, period),
        }
    }

    fn set_init_shares(&mut self, parent_land_allocation: f64, period: usize) -> f64 {
        match self {
            LandItem::Leaf(leaf) => leaf.set_init_shares(parent_land_allocation, period),
            LandItem::Node(node) => node.set_init_shares(parent_land_allocation, period),
        }
    }

    fn calc_land_shares(&self, choice_fn_above: &dyn DiscreteChoice, period: usize) -> f64 {
        match self {
            LandItem::Leaf(leaf) => leaf.calc_land_shares(choice_fn_above, period),
            LandItem::Node(node) => node.sum_unnormalized_shares(period),
        }
    }

    fn set_share(&mut self, share: f64, period: usize) {
        match self {
            LandItem::Leaf(leaf) => leaf.set_share(share, period),
            LandItem::Node(node) => node.set_share(share, period),
        }
    }

    fn calc_land_allocation(
        &mut self,
        ctx: &mut ModelContext,
        parent_land_allocation: f64,
        period: usize,
    ) {
        match self {
            LandItem::Leaf(leaf) => leaf.calc_land_allocation(ctx, parent_land_allocation, period),
            LandItem::Node(node) => node.calc_land_allocation(ctx, parent_land_allocation, period),
        }
    }

    fn calc_luc_emissions(&mut self, ctx: &mut ModelContext, period: usize, end_year: i32) {
        match self {
            LandItem::Leaf(leaf) => leaf.calc_luc_emissions(ctx, period, end_year),
            LandItem::Node(node) => node.calc_luc_emissions(ctx, period, end_year),
        }
    }

    fn read_in_land_allocation(&self, period: usize) -> f64 {
        match self {
            LandItem::Leaf(leaf) => leaf.cal_land_allocation(LandAllocationType::Any, period),
            LandItem::Node(node) => node.read_in_land_allocation(period),
        }
    }

    fn report(&self, ctx: &ModelContext, period: usize) -> ItemReport {
        match self {
            LandItem::Leaf(leaf) => ItemReport::Leaf(leaf.report(ctx, period)),
            LandItem::Node(node) => ItemReport::Node(node.report(ctx, period)),
        }
    }
}

/// An interior node of the land-allocation tree.
#[derive(Debug)]
pub struct LandNode {
    name: String,
    choice_fn: Box<dyn DiscreteChoice>,
    children: Vec<LandItem>,
    land_allocation: Vec<f64>,
    share: Vec<Option<f64>>,
    /// Calibration profit rate of this node; children of a new-technology
    /// kind calibrate their ghost share against it.
    calibration_profit_rate: Vec<f64>,
    /// Observed share-weighted average profit of the children, accumulated
    /// during calibration replay.
    avg_profit_rate: Vec<f64>,
}

impl LandNode {
    pub fn new(name: impl Into<String>, choice_fn: Box<dyn DiscreteChoice>) -> Self {
        Self {
            name: name.into(),
            choice_fn,
            children: Vec::new(),
            land_allocation: Vec::new(),
            share: Vec::new(),
            calibration_profit_rate: Vec::new(),
            avg_profit_rate: Vec::new(),
        }
    }

    pub fn with_leaf(mut self, leaf: LandLeaf) -> Self {
        self.children.push(LandItem::Leaf(leaf));
        self
    }

    pub fn with_node(mut self, node: LandNode) -> Self {
        self.children.push(LandItem::Node(node));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[LandItem] {
        &self.children
    }

    pub fn leaves_mut(&mut self) -> impl Iterator<Item = &mut LandLeaf> {
        self.children.iter_mut().filter_map(|child| match child {
            LandItem::Leaf(leaf) => Some(leaf),
            LandItem::Node(_) => None,
        })
    }

    pub fn complete_init(
        &mut self,
        ctx: &ModelContext,
        social_discount_rate: f64,
        private_discount_rate_land: f64,
    ) -> LandUseResult<()> {
        let max_periods = ctx.time.max_periods();
        self.land_allocation = vec![0.0; max_periods];
        self.share = vec![None; max_periods];
        self.calibration_profit_rate = vec![0.0; max_periods];
        self.avg_profit_rate = vec![0.0; max_periods];
        for child in &mut self.children {
            child.complete_init(ctx, social_discount_rate, private_discount_rate_land)?;
        }
        Ok(())
    }

    pub fn init_calc(&mut self, ctx: &ModelContext, period: usize) -> LandUseResult<()> {
        if period > 1 && self.share[period].is_none() {
            self.share[period] = self.share[period - 1];
        }
        for child in &mut self.children {
            child.init_calc(ctx, period)?;
        }
        Ok(())
    }

    /// Sum of the children's read-in allocations.
    pub fn read_in_land_allocation(&self, period: usize) -> f64 {
        self.children
            .iter()
            .map(|child| child.read_in_land_allocation(period))
            .sum()
    }

    /// Calibration replay: fix this node's and every child's share from the
    /// read-in allocations, and accumulate the children's profit-weighted
    /// contributions into this node's observed average profit rate.
    ///
    /// Returns this node's own profit-weighted contribution to its parent.
    pub fn set_init_shares(&mut self, parent_land_allocation: f64, period: usize) -> f64 {
        let own_allocation = self.read_in_land_allocation(period);
        let share = if parent_land_allocation > 0.0 {
            own_allocation / parent_land_allocation
        } else {
            0.0
        };
        self.share[period] = Some(share);

        let avg_profit: f64 = self
            .children
            .iter_mut()
            .map(|child| child.set_init_shares(own_allocation, period))
            .sum();
        self.avg_profit_rate[period] = avg_profit;

        share * avg_profit
    }

    /// The observed average profit rate accumulated by
    /// [`set_init_shares`](Self::set_init_shares).
    pub fn avg_profit_rate(&self, period: usize) -> f64 {
        self.avg_profit_rate[period]
    }

    /// Derive this node's calibration profit rate from its share within the
    /// level above, then push calibration profits down to the children.
    pub fn calculate_calibration_profit_rate(
        &mut self,
        avg_profit_rate_above: f64,
        choice_fn_above: &dyn DiscreteChoice,
        period: usize,
    ) {
        let share = self.share[period].unwrap_or(0.0);
        self.calibration_profit_rate[period] =
            choice_fn_above.implied_cost(share, avg_profit_rate_above, period);
        self.push_down_calibration_profit(period);
    }

    /// Calibration entry point for a tree root: the root's calibration
    /// profit is its own observed average profit.
    pub fn calibrate(&mut self, ctx: &ModelContext, period: usize) {
        self.calibration_profit_rate[period] = self.avg_profit_rate[period];
        self.push_down_calibration_profit(period);
        self.calculate_profit_scalers(ctx, period);
    }

    fn push_down_calibration_profit(&mut self, period: usize) {
        let avg = self.calibration_profit_rate[period];
        let choice_fn = self.choice_fn.as_ref();
        for child in &mut self.children {
            match child {
                LandItem::Leaf(leaf) => {
                    leaf.calculate_calibration_profit_rate(avg, choice_fn, period)
                }
                LandItem::Node(node) => {
                    node.calculate_calibration_profit_rate(avg, choice_fn, period)
                }
            }
        }
    }

    /// Calibrate every child's profit scaler against this node's choice
    /// function. New-technology leaves receive this node's calibration
    /// profit rate in place of an observed one.
    pub fn calculate_profit_scalers(&mut self, ctx: &ModelContext, period: usize) {
        let new_tech_profit = self.calibration_profit_rate[period];
        let choice_fn = self.choice_fn.as_ref();
        for child in &mut self.children {
            match child {
                LandItem::Leaf(leaf) => {
                    leaf.calculate_profit_scalers(ctx, new_tech_profit, choice_fn, period)
                }
                LandItem::Node(node) => node.calculate_profit_scalers(ctx, period),
            }
        }
    }

    fn sum_unnormalized_shares(&self, period: usize) -> f64 {
        let choice_fn = self.choice_fn.as_ref();
        self.children
            .iter()
            .map(|child| child.calc_land_shares(choice_fn, period))
            .sum()
    }

    /// Collect the children's unnormalized shares, normalize them and assign
    /// each child its final share for the period.
    ///
    /// Returns this node's own unnormalized weight toward its parent.
    pub fn calc_land_shares(&mut self, period: usize) -> f64 {
        let choice_fn = self.choice_fn.as_ref();
        let unnormalized: Vec<f64> = self
            .children
            .iter()
            .map(|child| child.calc_land_shares(choice_fn, period))
            .collect();
        let total: f64 = unnormalized.iter().sum();
        for (child, weight) in self.children.iter_mut().zip(&unnormalized) {
            let share = if total > 0.0 { weight / total } else { 0.0 };
            child.set_share(share, period);
            // A nested node must also settle its own children's shares.
            if let LandItem::Node(node) = child {
                node.calc_land_shares(period);
            }
        }
        total
    }

    pub fn set_share(&mut self, share: f64, period: usize) {
        self.share[period] = Some(share);
    }

    pub fn share(&self, period: usize) -> Option<f64> {
        self.share[period]
    }

    /// The calibration profit rate handed to new-technology children.
    pub fn calibration_profit_for_new_tech(&self, period: usize) -> f64 {
        self.calibration_profit_rate[period]
    }

    /// Convert this node's share into an area and pass it down.
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
            "share {share:?} of node {} not in [0, 1] in period {period}",
            self.name
        );
        let share = share.unwrap_or(0.0);

        self.land_allocation[period] = if parent_land_allocation > 0.0 {
            parent_land_allocation * share
        } else {
            0.0
        };
        for child in &mut self.children {
            child.calc_land_allocation(ctx, self.land_allocation[period], period);
        }
    }

    pub fn land_allocation(&self, period: usize) -> f64 {
        self.land_allocation[period]
    }

    pub fn calc_luc_emissions(&mut self, ctx: &mut ModelContext, period: usize, end_year: i32) {
        for child in &mut self.children {
            child.calc_luc_emissions(ctx, period, end_year);
        }
    }

    /// The profit rate of the child holding the highest share.
    pub fn profit_for_child_with_highest_share(&self, period: usize) -> f64 {
        let mut best_share = f64::NEG_INFINITY;
        let mut best_profit = 0.0;
        for child in &self.children {
            let (share, profit) = match child {
                LandItem::Leaf(leaf) => (
                    leaf.share(period).unwrap_or(0.0),
                    leaf.profit_for_child_with_highest_share(period),
                ),
                LandItem::Node(node) => (
                    node.share(period).unwrap_or(0.0),
                    node.profit_for_child_with_highest_share(period),
                ),
            };
            if share > best_share {
                best_share = share;
                best_profit = profit;
            }
        }
        best_profit
    }

    pub fn report(&self, ctx: &ModelContext, period: usize) -> NodeReport {
        NodeReport {
            name: self.name.clone(),
            period,
            land_allocation: self.land_allocation[period],
            calibration_profit_rate: self.calibration_profit_rate[period],
            children: self
                .children
                .iter()
                .map(|child| child.report(ctx, period))
                .collect(),
        }
    }
}
