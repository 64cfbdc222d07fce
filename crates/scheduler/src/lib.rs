//! The recurring-transaction scheduler.
//!
//! Materializes due templates into realized ledger entries, advances their
//! due dates, and handles user-initiated stops. Safe to re-execute:
//! re-running a sweep within the same window materializes nothing new, and
//! an interruption between materialize and advance degrades to
//! at-least-once rather than a skipped occurrence.

pub mod clock;
pub mod lifecycle;
pub mod materialize;
pub mod runner;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lifecycle::LifecycleController;
pub use runner::{run_sweep_loop, RunNow, SweepSchedule};
pub use sweep::{SweepDriver, SweepItem, SweepOutcome, SweepReport};
