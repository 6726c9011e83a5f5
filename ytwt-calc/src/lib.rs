//! ytwt-calc library interface
//!
//! Computes total YouTube watch time from a Google Takeout watch-history
//! export. The binary is a thin front end over [`workflow::PipelineDriver`].

pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{CalcError, CalcResult};
pub use crate::workflow::{PipelineDriver, RunOutcome, RunReport};
