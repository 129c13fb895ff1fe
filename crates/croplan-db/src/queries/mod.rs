//! Query functions, one module per table family.
//!
//! Every function is generic over [`sqlx::PgExecutor`] so it can run against
//! the pool or inside a caller-owned transaction (`&mut *tx`).

pub mod allocations;
pub mod crops;
pub mod fields;
pub mod locks;
pub mod plans;
pub mod schedules;
