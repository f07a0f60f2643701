//! Per-call model context
//!
//! The original formulation of this model reached into a process-wide
//! "current scenario" for the marketplace and the calendar. Here every
//! per-period operation receives a [`ModelContext`] instead, which keeps the
//! allocation math free of hidden global state and makes the call semantics
//! explicit at the seam.

use crate::market::Marketplace;
use crate::time::ModelTime;

/// Everything a per-period operation needs from the surrounding model.
pub struct ModelContext<'a> {
    /// Region the current call applies to.
    pub region: &'a str,
    /// Marketplace for price lookups and demand registration.
    pub market: &'a mut dyn Marketplace,
    /// The model calendar.
    pub time: &'a ModelTime,
}

impl<'a> ModelContext<'a> {
    pub fn new(region: &'a str, market: &'a mut dyn Marketplace, time: &'a ModelTime) -> Self {
        Self {
            region,
            market,
            time,
        }
    }
}
