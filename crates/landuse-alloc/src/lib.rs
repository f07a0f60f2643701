//! Land allocation engine
//!
//! This crate provides the leaf-level contract of a nested land-allocation
//! tree: competing land uses whose shares of available land are determined
//! period by period through a discrete-choice model, coupled to a carbon
//! price feedback and calibrated against historical observations.
//!
//! # Module Organisation
//!
//! - [`leaf`]: the terminal tree node with its profit rates, carbon subsidy,
//!   share-weight calibration, land allocation and LUC emissions
//! - [`node`]: interior tree nodes aggregating and normalizing child shares
//! - [`carbon`]: the reference carbon densities calculator
//! - [`config`]: TOML configuration schema and builders
//! - [`report`]: per-period debug dumps for reproducibility checks

pub mod carbon;
pub mod config;
pub mod leaf;
pub mod node;
pub mod report;

pub use leaf::LandLeaf;
pub use node::{LandItem, LandNode};
