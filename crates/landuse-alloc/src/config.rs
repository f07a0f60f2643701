//! Configuration schema
//!
//! The allocation tree is described by a structured TOML document: nodes
//! carry a choice function and their children, leaves carry their read-in
//! allocations, carbon densities and optional history/new-technology blocks.
//!
//! Unrecognized fields are collected and logged as warnings, never fatal;
//! structurally invalid values (a negative historical area, a missing
//! history) fail the build.

use crate::carbon::LandCarbonDensities;
use crate::leaf::LandLeaf;
use crate::node::LandNode;
use landuse_core::carbon::LandUseHistory;
use landuse_core::choice::DiscreteChoice;
use landuse_core::errors::{LandUseError, LandUseResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

fn default_new_tech_start_year() -> i32 {
    2020
}

fn default_ghost_share() -> f64 {
    0.25
}

/// One observation in a leaf's land-use history block.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPointConfig {
    pub year: i32,
    pub area: f64,
}

/// The nested carbon-density model block of a leaf.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CarbonDensitiesConfig {
    /// kgC/m2
    #[serde(default)]
    pub above_ground_carbon_density: f64,
    /// kgC/m2
    #[serde(default)]
    pub below_ground_carbon_density: f64,
    /// Years for vegetation to reach full density
    #[serde(default)]
    pub mature_age: u32,
    /// Years over which soil carbon is emitted or taken up
    #[serde(default)]
    pub soil_time_scale: Option<u32>,
}

impl CarbonDensitiesConfig {
    fn build(&self) -> LandCarbonDensities {
        let calc = LandCarbonDensities::new(
            self.above_ground_carbon_density,
            self.below_ground_carbon_density,
            self.mature_age,
        );
        match self.soil_time_scale {
            Some(years) => calc.with_soil_time_scale(years),
            None => calc,
        }
    }
}

/// Configuration of one land leaf.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LeafConfig {
    pub name: String,
    /// Read-in land allocation per model period.
    pub land_allocation: Vec<f64>,
    #[serde(default)]
    pub min_above_ground_c_density: f64,
    #[serde(default)]
    pub min_below_ground_c_density: f64,
    #[serde(default)]
    pub is_new_technology: bool,
    #[serde(default = "default_new_tech_start_year")]
    pub new_tech_start_year: i32,
    #[serde(default = "default_ghost_share")]
    pub ghost_share_leaf: f64,
    /// Name of the land expansion constraint market, when constrained.
    #[serde(default)]
    pub land_constraint_curve: Option<String>,
    pub land_use_history: Vec<HistoryPointConfig>,
    #[serde(default)]
    pub carbon_densities: Option<CarbonDensitiesConfig>,
    /// Anything this version does not understand; warned about, kept for
    /// forward compatibility.
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, toml::Value>,
}

impl LeafConfig {
    pub fn build(&self) -> LandUseResult<LandLeaf> {
        warn_unrecognized("leaf", &self.name, &self.unrecognized);

        let history = LandUseHistory::from_points(
            self.land_use_history
                .iter()
                .map(|point| (point.year, point.area))
                .collect(),
        )?;

        let mut leaf = LandLeaf::new(&self.name, self.land_allocation.clone())
            .with_land_use_history(history)
            .with_min_carbon_densities(
                self.min_above_ground_c_density,
                self.min_below_ground_c_density,
            )
            .with_ghost_share_numerator(self.ghost_share_leaf);
        if let Some(densities) = &self.carbon_densities {
            leaf = leaf.with_carbon_calc(Box::new(densities.build()));
        }
        if let Some(market_name) = &self.land_constraint_curve {
            leaf = leaf.with_expansion_cost_market(market_name);
        }
        if self.is_new_technology {
            leaf = leaf.as_new_technology(self.new_tech_start_year);
        }
        Ok(leaf)
    }
}

/// Configuration of an interior node and its subtree.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    pub name: String,
    pub choice_function: Box<dyn DiscreteChoice>,
    #[serde(default)]
    pub leaves: Vec<LeafConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, toml::Value>,
}

impl NodeConfig {
    pub fn build(self) -> LandUseResult<LandNode> {
        warn_unrecognized("node", &self.name, &self.unrecognized);

        let mut node = LandNode::new(&self.name, self.choice_function);
        for leaf in &self.leaves {
            node = node.with_leaf(leaf.build()?);
        }
        for child in self.nodes {
            node = node.with_node(child.build()?);
        }
        Ok(node)
    }
}

/// Parse a node subtree from a TOML document.
pub fn node_from_toml_str(document: &str) -> LandUseResult<LandNode> {
    let config: NodeConfig =
        toml::from_str(document).map_err(|err| LandUseError::Config(err.to_string()))?;
    config.build()
}

fn warn_unrecognized(kind: &str, name: &str, unrecognized: &BTreeMap<String, toml::Value>) {
    for field in unrecognized.keys() {
        warn!(
            kind,
            name,
            field = field.as_str(),
            "unrecognized configuration field, ignoring"
        );
    }
}
