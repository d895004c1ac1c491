//! Display model implementations for table and JSON output
//!
//! Display models turn library policy types into CLI-friendly rows with
//! column names and serialization.

mod classification;
mod event;
mod rule;

pub use classification::ClassificationReport;
pub use event::EventDisplay;
pub use rule::{OverrideDisplay, RuleDisplay};
