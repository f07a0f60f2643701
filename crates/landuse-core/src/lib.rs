pub mod carbon;
pub mod choice;
pub mod context;
pub mod errors;
pub mod market;
pub mod time;

pub use context::ModelContext;
pub use errors::{LandUseError, LandUseResult};
