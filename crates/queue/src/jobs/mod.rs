//! Job definitions.

#![allow(missing_docs)]

mod export;
mod outcome;

pub use export::{DecodeError, JobAction, JobMessage};
pub use outcome::{JobOutcome, OutcomeStatus};
