//! Unit of Work over a SQLite connection.
//!
//! Scopes one transaction: `BEGIN IMMEDIATE` on entry, explicit `commit`
//! or `rollback` (drop rolls back as a safety net), a stack of named
//! savepoints for nested sub-transactions, per-transaction metrics with a
//! slow-transaction warning, and a buffer of domain events that becomes
//! visible to the publisher only after a successful commit.
//!
//! One unit of work is single-owner; it borrows the connection mutably at
//! the type level by convention (a second `begin` on the same connection
//! fails because SQLite is already in a transaction).

use rusqlite::Connection;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::domain::errors::{DomainResult, SchedulingError};
use crate::domain::events::DomainEvent;

/// Lifecycle of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    Failed,
}

/// Timing and volume counters for one transaction.
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    pub state: TransactionState,
    pub duration: Duration,
    pub statements: u32,
    pub savepoints: u32,
}

/// Default threshold above which a committed transaction logs at WARN.
pub const DEFAULT_SLOW_TRANSACTION: Duration = Duration::from_millis(1_000);

/// One transaction over repositories sharing a connection.
#[derive(Debug)]
pub struct UnitOfWork<'c> {
    conn: &'c Connection,
    state: TransactionState,
    savepoints: Vec<String>,
    savepoint_seq: u32,
    statements: u32,
    events: Vec<DomainEvent>,
    started: Instant,
    slow_threshold: Duration,
}

impl<'c> UnitOfWork<'c> {
    /// Opens a transaction (`BEGIN IMMEDIATE`).
    ///
    /// # Errors
    ///
    /// Fails when the connection is already inside a transaction (nested
    /// units of work are not allowed) or the database is busy.
    pub fn begin(conn: &'c Connection) -> DomainResult<Self> {
        if !conn.is_autocommit() {
            return Err(SchedulingError::database(
                "unit of work is already active on this connection",
                false,
            ));
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("transaction started");
        Ok(Self {
            conn,
            state: TransactionState::Active,
            savepoints: Vec::new(),
            savepoint_seq: 0,
            statements: 0,
            events: Vec::new(),
            started: Instant::now(),
            slow_threshold: DEFAULT_SLOW_TRANSACTION,
        })
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// The connection, for repositories participating in this transaction.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(SchedulingError::database(
                format!("no active transaction (state {:?})", self.state),
                false,
            ));
        }
        Ok(())
    }

    /// Executes one SQL statement inside the transaction.
    pub fn execute(
        &mut self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<usize> {
        self.ensure_active()?;
        let affected = self.conn.execute(sql, params)?;
        self.statements += 1;
        Ok(affected)
    }

    /// Creates a named savepoint; a generated `sp_<n>` name is used when
    /// none is given. Returns the savepoint name.
    pub fn create_savepoint(&mut self, name: Option<&str>) -> DomainResult<String> {
        self.ensure_active()?;
        let name = match name {
            Some(given) => {
                validate_savepoint_name(given)?;
                given.to_string()
            }
            None => {
                self.savepoint_seq += 1;
                format!("sp_{}", self.savepoint_seq)
            }
        };
        if self.savepoints.contains(&name) {
            return Err(SchedulingError::database(
                format!("savepoint '{name}' already exists"),
                false,
            ));
        }
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        self.savepoints.push(name.clone());
        debug!(savepoint = %name, "savepoint created");
        Ok(name)
    }

    /// Rolls back to a savepoint, popping it and every savepoint created
    /// after it (stack discipline).
    pub fn rollback_to_savepoint(&mut self, name: &str) -> DomainResult<()> {
        self.ensure_active()?;
        let index = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| {
                SchedulingError::database(format!("savepoint '{name}' not found"), false)
            })?;
        // ROLLBACK TO undoes the work but keeps the savepoint open;
        // RELEASE then removes it and everything above it.
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        let removed = self.savepoints.len() - index;
        self.savepoints.truncate(index);
        debug!(savepoint = %name, removed, "rolled back to savepoint");
        Ok(())
    }

    /// Releases (commits) a savepoint and those nested above it.
    pub fn release_savepoint(&mut self, name: &str) -> DomainResult<()> {
        self.ensure_active()?;
        let index = self
            .savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| {
                SchedulingError::database(format!("savepoint '{name}' not found"), false)
            })?;
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        self.savepoints.truncate(index);
        Ok(())
    }

    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Buffers aggregate events for publication after commit.
    pub fn collect_events(&mut self, events: Vec<DomainEvent>) {
        self.events.extend(events);
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            state: self.state,
            duration: self.started.elapsed(),
            statements: self.statements,
            savepoints: self.savepoint_seq.max(self.savepoints.len() as u32),
        }
    }

    /// Commits and hands back the buffered events — the only way events
    /// leave a unit of work.
    pub fn commit(mut self) -> DomainResult<Vec<DomainEvent>> {
        self.ensure_active()?;
        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.state = TransactionState::Committed;
                let elapsed = self.started.elapsed();
                if elapsed > self.slow_threshold {
                    warn!(
                        duration_ms = elapsed.as_millis() as u64,
                        statements = self.statements,
                        savepoints = self.savepoint_seq,
                        "slow transaction committed"
                    );
                } else {
                    debug!(
                        duration_ms = elapsed.as_millis() as u64,
                        statements = self.statements,
                        "transaction committed"
                    );
                }
                Ok(std::mem::take(&mut self.events))
            }
            Err(err) => {
                self.state = TransactionState::Failed;
                error!(error = %err, "commit failed, rolling back");
                let _ = self.conn.execute_batch("ROLLBACK");
                self.events.clear();
                Err(err.into())
            }
        }
    }

    /// Rolls back and drops the buffered events.
    pub fn rollback(mut self) -> DomainResult<()> {
        self.ensure_active()?;
        self.events.clear();
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                debug!("transaction rolled back");
                Ok(())
            }
            Err(err) => {
                self.state = TransactionState::Failed;
                error!(error = %err, "rollback failed");
                Err(err.into())
            }
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            warn!("unit of work dropped while active, rolling back");
            let _ = self.conn.execute_batch("ROLLBACK");
            self.state = TransactionState::RolledBack;
        }
    }
}

fn validate_savepoint_name(name: &str) -> DomainResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap_or('0').is_ascii_digit();
    if !valid {
        return Err(SchedulingError::validation(
            "savepoint",
            format!("invalid savepoint name '{name}'"),
        ));
    }
    Ok(())
}

/// Retry configuration for [`transactional`].
#[derive(Debug, Clone)]
pub struct TxRetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied as the connection's busy timeout for the scope of the call.
    pub busy_timeout: Option<Duration>,
}

impl Default for TxRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            busy_timeout: None,
        }
    }
}

/// Runs `operation` inside a unit of work, retrying transient database
/// failures with exponential backoff. Domain errors abort immediately.
///
/// Returns the closure result together with the committed events; the
/// caller is responsible for publishing them.
pub fn transactional<T>(
    conn: &Connection,
    config: &TxRetryConfig,
    mut operation: impl FnMut(&mut UnitOfWork<'_>) -> DomainResult<T>,
) -> DomainResult<(T, Vec<DomainEvent>)> {
    if let Some(busy) = config.busy_timeout {
        let _ = conn.busy_timeout(busy);
    }
    let attempts = config.max_attempts.max(1);
    let mut last_error = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = config
                .base_delay
                .saturating_mul(1 << (attempt - 1).min(16))
                .min(config.max_delay);
            warn!(
                attempt = attempt + 1,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying transaction after transient failure"
            );
            std::thread::sleep(delay);
        }
        let mut uow = match UnitOfWork::begin(conn) {
            Ok(uow) => uow,
            Err(err) if err.is_transient() && attempt + 1 < attempts => {
                last_error = Some(err);
                continue;
            }
            Err(err) => return Err(err),
        };
        match operation(&mut uow) {
            Ok(value) => match uow.commit() {
                Ok(events) => return Ok((value, events)),
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            },
            Err(err) => {
                let _ = uow.rollback();
                if err.is_transient() && attempt + 1 < attempts {
                    last_error = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }
    Err(SchedulingError::RetryExhausted {
        attempts,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "transaction retries exhausted".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{DomainEvent, EventPayload};
    use crate::domain::value_objects::JobId;
    use crate::infrastructure::persistence::schema;

    fn setup() -> Connection {
        let conn = schema::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .unwrap()
    }

    fn sample_event() -> DomainEvent {
        DomainEvent::new(
            chrono::NaiveDate::from_ymd_opt(2026, 8, 3)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            EventPayload::JobCreated {
                job_id: JobId::new(),
                job_number: "JOB001".into(),
            },
        )
    }

    #[test]
    fn test_commit_persists_and_returns_events() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        uow.execute("INSERT INTO items (label) VALUES (?1)", ["a"])
            .unwrap();
        uow.collect_events(vec![sample_event()]);
        let events = uow.commit().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_rollback_discards_rows_and_events() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        uow.execute("INSERT INTO items (label) VALUES (?1)", ["a"])
            .unwrap();
        uow.collect_events(vec![sample_event()]);
        uow.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let conn = setup();
        {
            let mut uow = UnitOfWork::begin(&conn).unwrap();
            uow.execute("INSERT INTO items (label) VALUES (?1)", ["a"])
                .unwrap();
            // dropped without commit
        }
        assert_eq!(count(&conn), 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_nested_begin_rejected() {
        let conn = setup();
        let _uow = UnitOfWork::begin(&conn).unwrap();
        let err = UnitOfWork::begin(&conn).unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_savepoint_stack_discipline() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        uow.execute("INSERT INTO items (label) VALUES ('base')", [])
            .unwrap();

        let outer = uow.create_savepoint(Some("outer")).unwrap();
        uow.execute("INSERT INTO items (label) VALUES ('outer')", [])
            .unwrap();
        let _inner = uow.create_savepoint(None).unwrap();
        uow.execute("INSERT INTO items (label) VALUES ('inner')", [])
            .unwrap();
        assert_eq!(uow.savepoints().len(), 2);

        // Rolling back to the outer savepoint pops both.
        uow.rollback_to_savepoint(&outer).unwrap();
        assert!(uow.savepoints().is_empty());

        let events = uow.commit().unwrap();
        assert!(events.is_empty());
        assert_eq!(count(&conn), 1); // only 'base' survived
    }

    #[test]
    fn test_rollback_to_unknown_savepoint() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        assert!(uow.rollback_to_savepoint("nope").is_err());
        uow.rollback().unwrap();
    }

    #[test]
    fn test_savepoint_name_validation() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        assert!(uow.create_savepoint(Some("ok_name_1")).is_ok());
        assert!(uow.create_savepoint(Some("1bad")).is_err());
        assert!(uow.create_savepoint(Some("bad; DROP TABLE items")).is_err());
        uow.rollback().unwrap();
    }

    #[test]
    fn test_metrics_counts() {
        let conn = setup();
        let mut uow = UnitOfWork::begin(&conn).unwrap();
        uow.execute("INSERT INTO items (label) VALUES ('a')", [])
            .unwrap();
        uow.execute("INSERT INTO items (label) VALUES ('b')", [])
            .unwrap();
        uow.create_savepoint(None).unwrap();
        let metrics = uow.metrics();
        assert_eq!(metrics.statements, 2);
        assert_eq!(metrics.savepoints, 1);
        assert_eq!(metrics.state, TransactionState::Active);
        uow.rollback().unwrap();
    }

    #[test]
    fn test_transactional_success() {
        let conn = setup();
        let (value, events) = transactional(&conn, &TxRetryConfig::default(), |uow| {
            uow.execute("INSERT INTO items (label) VALUES ('x')", [])?;
            uow.collect_events(vec![sample_event()]);
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(events.len(), 1);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_transactional_aborts_on_domain_error() {
        let conn = setup();
        let mut calls = 0;
        let result: DomainResult<((), Vec<DomainEvent>)> =
            transactional(&conn, &TxRetryConfig::default(), |uow| {
                calls += 1;
                uow.execute("INSERT INTO items (label) VALUES ('x')", [])?;
                Err(SchedulingError::business_rule("rule", "boom"))
            });
        assert_eq!(
            result.unwrap_err().error_code(),
            "BUSINESS_RULE_VIOLATION"
        );
        assert_eq!(calls, 1); // never retried
        assert_eq!(count(&conn), 0); // atomicity: nothing persisted
    }

    #[test]
    fn test_transactional_retries_transient() {
        let conn = setup();
        let mut calls = 0;
        let config = TxRetryConfig {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let (value, _) = transactional(&conn, &config, |uow| {
            calls += 1;
            uow.execute("INSERT INTO items (label) VALUES ('x')", [])?;
            if calls < 3 {
                Err(SchedulingError::database("database is locked", true))
            } else {
                Ok("done")
            }
        })
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls, 3);
        // Only the successful attempt's row persisted.
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_transactional_exhaustion() {
        let conn = setup();
        let config = TxRetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let result: DomainResult<((), Vec<DomainEvent>)> =
            transactional(&conn, &config, |_uow| {
                Err(SchedulingError::database("still locked", true))
            });
        assert_eq!(result.unwrap_err().error_code(), "RETRY_EXHAUSTED");
    }
}
