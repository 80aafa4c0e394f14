//! GNSS collectors.
//!
//! - [`GnssCollector`]: navigation status via ubxtool in the timing daemon pod

mod collector;

pub use collector::{GNSS_NAV_KEY, GnssCollector, GnssFactory};
