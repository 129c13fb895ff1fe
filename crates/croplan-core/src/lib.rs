//! Plan reconciliation and weather-prediction cache engine.
//!
//! - [`reconcile`] merges an externally computed allocation proposal into a
//!   plan's persisted allocations, detaching schedules from removed rows.
//! - [`aggregate`] derives plan totals and final status from allocations.
//! - [`weather`] decides whether a plan's cached prediction series covers a
//!   requested horizon, regenerating it under a per-plan lock when it does not.
//! - [`adjust`] turns move instructions into a re-optimized, reconciled plan.
//! - [`engine`] is the seam to the external optimizer and predictor.

pub mod adjust;
pub mod aggregate;
pub mod engine;
pub mod proposal;
pub mod reconcile;
pub mod snapshot;
pub mod weather;
