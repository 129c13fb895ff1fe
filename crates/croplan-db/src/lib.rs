//! Persistence layer for croplan: connection pool, embedded migrations,
//! row models, and query functions for plans, fields, crops, allocations,
//! and schedule entries.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
