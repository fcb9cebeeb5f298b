/// Background workers: the expiry-driven renewal scheduler.
pub mod renewal;

pub use renewal::{RenewalScheduler, RenewalSummary};
