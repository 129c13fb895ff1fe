//! Seam to the external optimization and prediction engine.
//!
//! The engine is an opaque black box: [`Predictor`] returns a daily weather
//! series for a date range, [`Optimizer`] returns a re-optimized
//! [`Proposal`](crate::proposal::Proposal) for a set of moves. [`AgrrCli`]
//! implements both by shelling out to the `agrr` executable.

pub mod agrr_cli;
pub mod trait_def;
pub mod types;

pub use agrr_cli::AgrrCli;
pub use trait_def::{Optimizer, Predictor};
pub use types::{AdjustRequest, CropSpec, FieldSpec, Objective, PredictionRequest, PredictionSeries};
