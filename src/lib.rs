//! Root-cause-analysis triage for CRM support tickets.
//!
//! [`Orchestrator::run_rca`] is the one entry point: it fetches the case and its
//! comments, builds a prompt, asks the model for a structured report and validates it.

pub mod analysis;
pub mod case_data;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod log_signals;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod similarity;

pub use analysis::{Confidence, RcaReport};
pub use error::{RcaError, RcaErrorKind};
pub use orchestrator::Orchestrator;
