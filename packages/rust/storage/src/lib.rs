//! libSQL storage layer for glossgen.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the upstream
//! resource cache and the workflow run/step status tables.
//!
//! **Access rules:**
//! - CLI pipeline: read-write (sole writer) via [`Storage::open`]
//! - Inspection tooling: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use glossgen_shared::{
    GlossgenError, ResourceKind, ResourceRecord, Result, RunRecord, StepRecord, StepStatus,
    resource_key_hash,
};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GlossgenError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    GlossgenError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(GlossgenError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Resource cache operations
    // -----------------------------------------------------------------------

    /// Upsert a cached resource (insert or update on conflict by key hash).
    ///
    /// Every resolve that reaches the network lands here exactly once;
    /// concurrent writers on the same key are last-writer-wins.
    pub async fn upsert_resource(&self, record: &ResourceRecord) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO resources (id, kind, key, key_hash, payload, success, error, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(key_hash) DO UPDATE SET
                   payload = excluded.payload,
                   success = excluded.success,
                   error = excluded.error,
                   fetched_at = excluded.fetched_at",
                params![
                    record.id.as_str(),
                    record.kind.as_str(),
                    record.key.as_str(),
                    record.key_hash(),
                    record.payload.as_deref(),
                    record.success as i64,
                    record.error.as_deref(),
                    record.fetched_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Look up a cached resource by kind and key.
    pub async fn find_resource(
        &self,
        kind: ResourceKind,
        key: &str,
    ) -> Result<Option<ResourceRecord>> {
        let hash = resource_key_hash(kind, key);
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, key, payload, success, error, fetched_at
                 FROM resources WHERE key_hash = ?1",
                params![hash],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_resource(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(GlossgenError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new workflow run record.
    pub async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, term, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run.id.to_string(),
                    run.term.as_str(),
                    run.status.as_str(),
                    run.created_at.to_rfc3339(),
                    run.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, term, status, created_at, updated_at FROM runs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(GlossgenError::Storage(e.to_string())),
        }
    }

    /// List all runs, newest first (UUID v7 ids sort by time).
    pub async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, term, status, created_at, updated_at FROM runs ORDER BY id DESC",
                params![],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    /// Update a run's status and touch its `updated_at`.
    pub async fn update_run_status(&self, id: &str, status: StepStatus) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), id],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step operations
    // -----------------------------------------------------------------------

    /// Upsert a step record (insert or update on conflict by run + name).
    pub async fn upsert_step(
        &self,
        run_id: &str,
        name: &str,
        status: StepStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO steps (run_id, name, status, output, error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(run_id, name) DO UPDATE SET
                   status = excluded.status,
                   output = excluded.output,
                   error = excluded.error,
                   updated_at = excluded.updated_at",
                params![run_id, name, status.as_str(), output, error, now.as_str()],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a step by run ID and name.
    pub async fn get_step(&self, run_id: &str, name: &str) -> Result<Option<StepRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, name, status, output, error, updated_at
                 FROM steps WHERE run_id = ?1 AND name = ?2",
                params![run_id, name],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_step(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(GlossgenError::Storage(e.to_string())),
        }
    }

    /// List all steps for a run, in insertion order.
    pub async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, name, status, output, error, updated_at
                 FROM steps WHERE run_id = ?1 ORDER BY id",
                params![run_id],
            )
            .await
            .map_err(|e| GlossgenError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_step(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row converters
// ---------------------------------------------------------------------------

fn get_text(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| GlossgenError::Storage(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GlossgenError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`ResourceRecord`].
fn row_to_resource(row: &libsql::Row) -> Result<ResourceRecord> {
    Ok(ResourceRecord {
        id: get_text(row, 0)?,
        kind: ResourceKind::from_str(&get_text(row, 1)?)?,
        key: get_text(row, 2)?,
        payload: row.get::<String>(3).ok(),
        success: row
            .get::<i64>(4)
            .map_err(|e| GlossgenError::Storage(e.to_string()))?
            != 0,
        error: row.get::<String>(5).ok(),
        fetched_at: parse_timestamp(&get_text(row, 6)?)?,
    })
}

/// Convert a database row to a [`RunRecord`].
fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    Ok(RunRecord {
        id: get_text(row, 0)?
            .parse()
            .map_err(|e| GlossgenError::Storage(format!("invalid run id: {e}")))?,
        term: get_text(row, 1)?,
        status: StepStatus::from_str(&get_text(row, 2)?)?,
        created_at: parse_timestamp(&get_text(row, 3)?)?,
        updated_at: parse_timestamp(&get_text(row, 4)?)?,
    })
}

/// Convert a database row to a [`StepRecord`].
fn row_to_step(row: &libsql::Row) -> Result<StepRecord> {
    Ok(StepRecord {
        run_id: get_text(row, 0)?,
        name: get_text(row, 1)?,
        status: StepStatus::from_str(&get_text(row, 2)?)?,
        output: row.get::<String>(3).ok(),
        error: row.get::<String>(4).ok(),
        updated_at: parse_timestamp(&get_text(row, 5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("glossgen_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("glossgen_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn resource_upsert_and_find() {
        let storage = test_storage().await;

        let record =
            ResourceRecord::success(ResourceKind::Search, "raft consensus", r#"{"organic":[]}"#);
        storage.upsert_resource(&record).await.expect("upsert");

        let found = storage
            .find_resource(ResourceKind::Search, "raft consensus")
            .await
            .expect("find")
            .expect("record present");
        assert!(found.success);
        assert_eq!(found.payload.as_deref(), Some(r#"{"organic":[]}"#));
        assert!(found.error.is_none());

        // Same key under a different kind is a different row.
        let other = storage
            .find_resource(ResourceKind::Scrape, "raft consensus")
            .await
            .expect("find other kind");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn resource_upsert_overwrites_in_place() {
        let storage = test_storage().await;

        let failed = ResourceRecord::failure(ResourceKind::Scrape, "https://a.dev", "HTTP 500");
        storage.upsert_resource(&failed).await.unwrap();

        // A later success on the same key replaces the failure row.
        let ok = ResourceRecord::success(ResourceKind::Scrape, "https://a.dev", "# Title");
        storage.upsert_resource(&ok).await.unwrap();

        let found = storage
            .find_resource(ResourceKind::Scrape, "https://a.dev")
            .await
            .unwrap()
            .unwrap();
        assert!(found.success);
        assert_eq!(found.payload.as_deref(), Some("# Title"));
        assert!(found.error.is_none());
    }

    #[tokio::test]
    async fn failure_record_roundtrip() {
        let storage = test_storage().await;

        let failed =
            ResourceRecord::failure(ResourceKind::Completion, "outline prompt", "HTTP 429");
        storage.upsert_resource(&failed).await.unwrap();

        let found = storage
            .find_resource(ResourceKind::Completion, "outline prompt")
            .await
            .unwrap()
            .unwrap();
        assert!(!found.success);
        assert!(found.payload.is_none());
        assert_eq!(found.error.as_deref(), Some("HTTP 429"));
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run = RunRecord::new("bloom filter");

        storage.insert_run(&run).await.expect("insert run");

        let found = storage
            .get_run(&run.id.to_string())
            .await
            .expect("get run")
            .expect("run present");
        assert_eq!(found.term, "bloom filter");
        assert_eq!(found.status, StepStatus::Pending);

        storage
            .update_run_status(&run.id.to_string(), StepStatus::Succeeded)
            .await
            .expect("update status");
        let found = storage.get_run(&run.id.to_string()).await.unwrap().unwrap();
        assert_eq!(found.status, StepStatus::Succeeded);

        let runs = storage.list_runs().await.expect("list runs");
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn step_upsert_and_list() {
        let storage = test_storage().await;
        let run = RunRecord::new("write-ahead log");
        storage.insert_run(&run).await.unwrap();
        let run_id = run.id.to_string();

        storage
            .upsert_step(&run_id, "outline", StepStatus::Running, None, None)
            .await
            .expect("upsert running");

        // Completing the step overwrites the same (run_id, name) row.
        storage
            .upsert_step(
                &run_id,
                "outline",
                StepStatus::Succeeded,
                Some("1. Intro\n2. Details"),
                None,
            )
            .await
            .expect("upsert succeeded");

        let step = storage
            .get_step(&run_id, "outline")
            .await
            .expect("get step")
            .expect("step present");
        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.output.as_deref(), Some("1. Intro\n2. Details"));

        storage
            .upsert_step(&run_id, "draft", StepStatus::Failed, None, Some("HTTP 429"))
            .await
            .unwrap();

        let steps = storage.list_steps(&run_id).await.expect("list steps");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "outline");
        assert_eq!(steps[1].name, "draft");
        assert_eq!(steps[1].error.as_deref(), Some("HTTP 429"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("glossgen_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        let record = ResourceRecord::success(ResourceKind::Search, "quorum", "{}");
        rw.upsert_resource(&record).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let found = ro
            .find_resource(ResourceKind::Search, "quorum")
            .await
            .unwrap();
        assert!(found.is_some());

        let result = ro.upsert_resource(&record).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
