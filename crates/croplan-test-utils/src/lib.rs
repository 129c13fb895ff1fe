//! Shared test utilities for croplan integration tests.
//!
//! One PostgreSQL server is shared by every test in a binary; each test gets
//! a fresh database inside it with migrations applied.
//!
//! - **`CROPLAN_TEST_PG_URL`** set: connect to that server (CI service
//!   container, local docker).
//! - otherwise: start a container via testcontainers on first use and keep it
//!   for the lifetime of the test binary.
//!
//! [`seed_plan`] builds the small plan most integration tests start from.

use std::time::Duration;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use croplan_db::models::{Allocation, Plan, PlanCrop, PlanField};
use croplan_db::pool;
use croplan_db::queries::allocations::{self, AllocationValues};
use croplan_db::queries::{crops, fields, plans};

/// Environment variable naming an already-running server to test against.
pub const TEST_PG_URL_ENV: &str = "CROPLAN_TEST_PG_URL";

struct SharedPg {
    base_url: String,
    /// Keeps the container alive. `None` for an external server.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var(TEST_PG_URL_ENV) {
        return SharedPg {
            base_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Server root URL of the shared PostgreSQL, without a database name.
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

async fn maintenance_pool() -> PgPool {
    let maint_url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a uniquely named database with migrations applied.
///
/// Returns `(pool, db_name)`; pass `db_name` to [`drop_test_db`] at the end
/// of the test.
pub async fn create_test_db() -> (PgPool, String) {
    let maint_pool = maintenance_pool().await;
    let db_name = format!("croplan_test_{}", Uuid::new_v4().simple());
    maint_pool
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_url = format!("{}/{db_name}", pg_url().await);
    let temp_pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Full connection URL for a database created by [`create_test_db`].
pub async fn test_db_url(db_name: &str) -> String {
    format!("{}/{db_name}", pg_url().await)
}

/// Terminate connections to and drop a temporary database. Safe to call
/// twice.
pub async fn drop_test_db(db_name: &str) {
    let maint_pool = maintenance_pool().await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;
    let _ = maint_pool
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint_pool.close().await;
}

/// Shorthand for a calendar date in test fixtures.
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date")
}

/// A plan with two fields and two crops, and no allocations.
#[derive(Debug, Clone)]
pub struct SeededPlan {
    pub plan: Plan,
    pub fields: Vec<PlanField>,
    pub crops: Vec<PlanCrop>,
}

impl SeededPlan {
    pub fn field(&self, idx: usize) -> Uuid {
        self.fields[idx].id
    }

    pub fn crop(&self, idx: usize) -> Uuid {
        self.crops[idx].id
    }
}

/// Insert a plan covering `[start, end]` with fields "north" (100 m2) and
/// "south" (50 m2) and crops "tomato" and "lettuce".
pub async fn seed_plan(pool: &PgPool, start: NaiveDate, end: NaiveDate) -> SeededPlan {
    let plan = plans::insert_plan(pool, "seeded plan", start, end)
        .await
        .expect("insert plan");
    let north = fields::insert_field(pool, plan.id, "north", 100.0, 10.0)
        .await
        .expect("insert field");
    let south = fields::insert_field(pool, plan.id, "south", 50.0, 5.0)
        .await
        .expect("insert field");
    let tomato = crops::insert_crop(pool, plan.id, "tomato", Some("momotaro"))
        .await
        .expect("insert crop");
    let lettuce = crops::insert_crop(pool, plan.id, "lettuce", None)
        .await
        .expect("insert crop");

    SeededPlan {
        plan,
        fields: vec![north, south],
        crops: vec![tomato, lettuce],
    }
}

/// Insert an allocation with the given placement and economics
/// `cost`/`revenue` (profit is their difference).
pub async fn seed_allocation(
    pool: &PgPool,
    plan_id: Uuid,
    field_id: Uuid,
    crop_id: Uuid,
    area: f64,
    (start, completion): (NaiveDate, NaiveDate),
    (cost, revenue): (f64, f64),
) -> Allocation {
    let values = AllocationValues {
        field_id,
        crop_id,
        area,
        start_date: start,
        completion_date: completion,
        cultivation_days: ((completion - start).num_days() + 1) as i32,
        cost,
        revenue,
        profit: revenue - cost,
        accumulated_gdd: 0.0,
    };
    allocations::insert_allocation(pool, plan_id, &values)
        .await
        .expect("insert allocation")
}
