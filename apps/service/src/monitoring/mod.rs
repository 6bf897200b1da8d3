/// Monitoring engine module
///
/// This module is responsible for:
/// - Executing HTTP(S) reachability probes
/// - Grouping targets into per-interval, per-owner batches
/// - Running the recurring per-jobKey timers
pub mod grouping;
pub mod probe;
pub mod scheduler;
pub mod types;

pub use probe::{HttpProbe, Probe};
pub use scheduler::IntervalScheduler;
pub use types::{IntervalClass, MonitoredTarget, ProbeResult};
