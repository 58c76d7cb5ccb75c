// src/executor.rs

//! The External SQL executor (§2): opens a connection and runs DDL
//! transactionally. `DatabaseExecutor` is the seam; `PostgresExecutor` is
//! the concrete implementation, grounded on the connection pattern used by
//! `postgres_migrator` (a real Rust Postgres migration CLI): `postgres::Config`
//! with an explicit `connect_timeout`, then `Client::transaction()`.

use crate::error::{Error, Result};
use postgres::{Config, NoTls};
use std::time::Duration;

/// Bounded at 10s to open a connection, overall 30s to run the DDL batch
/// (§5).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens a connection and executes a DDL batch against it. Implemented as a
/// trait so the Orchestrator can be exercised against a test double without
/// a live Postgres instance.
pub trait DatabaseExecutor {
    /// Open a connection to `connection_string`, bounded by
    /// `CONNECT_TIMEOUT`.
    fn connect(&self, connection_string: &str) -> Result<()>;

    /// Execute `ddl` as a single statement batch, wrapped in one
    /// transaction so a mid-batch failure leaves the database at its prior
    /// schema (§9 "DDL execution is not transactional" — tightened here).
    fn execute(&self, connection_string: &str, ddl: &str) -> Result<()>;
}

/// The real Postgres executor.
pub struct PostgresExecutor;

impl PostgresExecutor {
    fn connect_client(&self, connection_string: &str) -> Result<postgres::Client> {
        let mut config: Config = connection_string
            .parse()
            .map_err(|e| Error::DatabaseConnect(format!("invalid connection string: {e}")))?;
        config.connect_timeout(CONNECT_TIMEOUT);
        config
            .connect(NoTls)
            .map_err(|e| Error::DatabaseConnect(e.to_string()))
    }
}

impl DatabaseExecutor for PostgresExecutor {
    fn connect(&self, connection_string: &str) -> Result<()> {
        self.connect_client(connection_string)?;
        Ok(())
    }

    fn execute(&self, connection_string: &str, ddl: &str) -> Result<()> {
        let mut client = self
            .connect_client(connection_string)
            .map_err(|e| Error::DatabaseConnect(e.to_string()))?;

        let mut tx = client
            .transaction()
            .map_err(|e| Error::DatabaseExec(e.to_string()))?;

        let statement_timeout_ms = EXEC_TIMEOUT.as_millis();
        tx.batch_execute(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))
            .map_err(|e| Error::DatabaseExec(e.to_string()))?;
        tx.batch_execute(ddl)
            .map_err(|e| Error::DatabaseExec(e.to_string()))?;

        tx.commit().map_err(|e| Error::DatabaseExec(e.to_string()))
    }
}
