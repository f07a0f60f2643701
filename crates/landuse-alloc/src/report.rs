//! Per-period debug reports
//!
//! Structured dumps of a tree's calibration and allocation state, used to
//! verify reproducibility between runs. Reports are plain serde structs so a
//! driver can write them as JSON or TOML; they are not meant to be parsed
//! back into model state.

use serde::{Deserialize, Serialize};

/// Carbon-side state of one leaf in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonReport {
    pub above_ground_carbon_density: f64,
    pub below_ground_carbon_density: f64,
    pub above_ground_subsidy_discount_factor: f64,
    pub below_ground_subsidy_discount_factor: f64,
    pub net_land_use_change_emission: f64,
}

/// One leaf's state in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafReport {
    pub name: String,
    pub period: usize,
    pub calibration_profit_rate: f64,
    pub land_allocation: f64,
    pub min_above_ground_c_density: f64,
    pub min_below_ground_c_density: f64,
    pub social_discount_rate: f64,
    pub carbon_price_increase_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_expansion_cost_name: Option<String>,
    pub avg_profit_rate_above: f64,
    pub is_new_tech: bool,
    pub carbon: CarbonReport,
}

/// An interior node's state in one period, with its children nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub period: usize,
    pub land_allocation: f64,
    pub calibration_profit_rate: f64,
    pub children: Vec<ItemReport>,
}

/// Report of either kind of tree item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemReport {
    Leaf(LeafReport),
    Node(NodeReport),
}
