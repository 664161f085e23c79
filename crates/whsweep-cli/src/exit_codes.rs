//! Process exit codes. Part of the public contract for schedulers wrapping
//! `whsweep run`.

use whsweep_core::SweepReport;

pub const SUCCESS: i32 = 0;
pub const EXPERIMENT_FAILED: i32 = 1; // At least one configuration failed
pub const CONFIG_ERROR: i32 = 2; // Nothing was provisioned
pub const NEEDS_ATTENTION: i32 = 3; // A resource survived cleanup
pub const CANCELLED: i32 = 130;

/// Leaked resources outrank cancellation, which outranks plain failures.
pub fn for_report(report: &SweepReport) -> i32 {
    if !report.needs_attention().is_empty() {
        NEEDS_ATTENTION
    } else if report.cancelled() > 0 {
        CANCELLED
    } else if report.failed() > 0 {
        EXPERIMENT_FAILED
    } else {
        SUCCESS
    }
}
