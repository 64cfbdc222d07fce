pub mod config;
pub mod error;
pub mod record;
pub mod recurrence;

pub use config::Config;
pub use error::*;
pub use record::*;
pub use recurrence::{next_occurrence, Interval};
