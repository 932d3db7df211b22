//! Database connection management
//!
//! Opens the SQLite collection database, creates or migrates the schema and
//! hands out the guarded connection to the DAO modules.

use rusqlite::{params, Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::models::DatabaseSettings;
use crate::paths::PathProvider;
use crate::utils::error::{AppError, AppResult, InitializationAdvice};
use crate::watch::{AttributesWatch, SharedAttributesWatch};

use super::schema::{
    Migration, DEFAULT_AUDIO_FORMATS, DEFAULT_IMAGE_FORMATS, DEFAULT_VIDEO_FORMATS, INIT_SCHEMA,
    MIGRATIONS, SCHEMA_VERSION, TRIGGER_SCHEMA,
};

/// Receives progress while the schema is created or updated.
pub trait InitObserver: Send + Sync {
    /// Number of steps that will be reported.
    fn more_schema_updates_needed(&self, _steps: usize) {}
    /// One step finished.
    fn schema_update_progress(&self, _message: &str, _step: usize) {}
    /// A step failed.
    fn error(&self, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoOpInitObserver;

impl InitObserver for NoOpInitObserver {}

/// Collection database connection manager
#[derive(Clone)]
pub struct Database {
    /// Connection (Arc<Mutex> for thread safety)
    conn: Arc<Mutex<Connection>>,
    /// Database file path
    path: PathBuf,
    /// Change notifications for mutating operations
    watch: SharedAttributesWatch,
}

impl Database {
    /// Open or create the database with default settings
    pub fn open(path: PathBuf) -> AppResult<Self> {
        Self::open_with_settings(path, &DatabaseSettings::default())
    }

    /// Open or create the database
    pub fn open_with_settings(path: PathBuf, settings: &DatabaseSettings) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            watch: Arc::new(AttributesWatch::new()),
        };

        db.configure(settings)?;

        Ok(db)
    }

    /// Open the database at the location given by a PathProvider
    pub fn open_with_provider(provider: &dyn PathProvider) -> AppResult<Self> {
        Self::open(provider.database_path())
    }

    /// Open an in-memory database (for tests)
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
            watch: Arc::new(AttributesWatch::new()),
        };

        db.configure(&DatabaseSettings {
            enable_wal: false,
            ..DatabaseSettings::default()
        })?;

        Ok(db)
    }

    /// Share an existing watch hub instead of the private one.
    pub fn with_watch(mut self, watch: SharedAttributesWatch) -> Self {
        self.watch = watch;
        self
    }

    /// Change notification hub
    pub fn watch(&self) -> &SharedAttributesWatch {
        &self.watch
    }

    fn configure(&self, settings: &DatabaseSettings) -> AppResult<()> {
        let conn = self.connection()?;

        // WAL: one writer (the scan worker), concurrent readers
        if settings.enable_wal {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms as u64))?;

        Ok(())
    }

    /// Create or migrate the schema
    pub fn init(&self) -> AppResult<()> {
        match self.initialize(&NoOpInitObserver) {
            InitializationAdvice::Success => Ok(()),
            advice => Err(AppError::Schema(format!(
                "database initialization failed ({:?})",
                advice
            ))),
        }
    }

    /// Create or migrate the schema, reporting each step.
    ///
    /// A schema that cannot be created leaves nothing behind, so the caller
    /// may continue without a database. A failed migration or a schema newer
    /// than this program leaves the file in a state we must not touch.
    pub fn initialize(&self, observer: &dyn InitObserver) -> InitializationAdvice {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(e) => {
                observer.error(&e.to_string());
                return InitializationAdvice::ContinueWithoutDatabase;
            }
        };

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !table_exists {
            observer.more_schema_updates_needed(1);
            tracing::info!("creating collection database schema...");

            if let Err(e) = Self::create_schema(&conn) {
                tracing::error!("schema creation failed: {}", e);
                observer.error(&e.to_string());
                return InitializationAdvice::ContinueWithoutDatabase;
            }

            observer.schema_update_progress("Created database schema", 1);
            tracing::info!("collection database schema created, version {}", SCHEMA_VERSION);
            return InitializationAdvice::Success;
        }

        let current_version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get::<_, Option<i32>>(0)
            })
            .ok()
            .flatten()
            .unwrap_or(0);

        tracing::info!("current database version: {}", current_version);

        if current_version > SCHEMA_VERSION {
            let message = format!(
                "database version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            );
            tracing::error!("{}", message);
            observer.error(&message);
            return InitializationAdvice::AbortImmediately;
        }

        let pending: Vec<&Migration> = MIGRATIONS
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return InitializationAdvice::Success;
        }

        observer.more_schema_updates_needed(pending.len());

        for (step, migration) in pending.iter().enumerate() {
            tracing::info!("running migration v{}: {}", migration.version, migration.description);

            if let Err(e) = Self::apply_migration(&conn, migration) {
                let message = format!("migration v{} failed: {}", migration.version, e);
                tracing::error!("{}", message);
                observer.error(&message);
                return InitializationAdvice::AbortImmediately;
            }

            observer.schema_update_progress(migration.description, step + 1);
            tracing::info!("migration v{} done", migration.version);
        }

        InitializationAdvice::Success
    }

    fn create_schema(conn: &Connection) -> AppResult<()> {
        conn.execute_batch("BEGIN")?;
        let result = (|| -> AppResult<()> {
            conn.execute_batch(INIT_SCHEMA)?;
            conn.execute_batch(TRIGGER_SCHEMA)?;

            let now = crate::models::now_db_datetime();
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, now],
            )?;

            for (keyword, value) in [
                ("databaseImageFormats", DEFAULT_IMAGE_FORMATS),
                ("databaseVideoFormats", DEFAULT_VIDEO_FORMATS),
                ("databaseAudioFormats", DEFAULT_AUDIO_FORMATS),
            ] {
                conn.execute(
                    "INSERT OR REPLACE INTO Settings (keyword, value) VALUES (?1, ?2)",
                    params![keyword, value],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn apply_migration(conn: &Connection, migration: &Migration) -> AppResult<()> {
        conn.execute_batch("BEGIN")?;
        let result = conn.execute_batch(migration.sql).and_then(|_| {
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![migration.version, crate::models::now_db_datetime()],
            )
        });

        match result {
            Ok(_) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(AppError::Database(e))
            }
        }
    }

    /// Lock the connection
    pub fn connection(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            AppError::Database(rusqlite::Error::InvalidParameterName(e.to_string()))
        })
    }

    /// Run `f` inside a transaction; all-or-nothing.
    pub fn transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Database file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Row counts of the main tables
    pub fn stats(&self) -> AppResult<DatabaseStats> {
        let conn = self.connection()?;

        let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0) };

        let album_root_count = count("SELECT COUNT(*) FROM AlbumRoots");
        let album_count = count("SELECT COUNT(*) FROM Albums");
        let image_count = count("SELECT COUNT(*) FROM Images WHERE status = 1");
        let tag_count = count("SELECT COUNT(*) FROM Tags");

        let db_size = std::fs::metadata(&self.path)
            .map(|m| m.len() as i64)
            .unwrap_or(0);

        Ok(DatabaseStats {
            album_root_count,
            album_count,
            image_count,
            tag_count,
            db_size,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub album_root_count: i64,
    pub album_count: i64,
    pub image_count: i64,
    pub tag_count: i64,
    pub db_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        db.init().expect("Failed to initialize database");

        let stats = db.stats().expect("Failed to get stats");
        assert_eq!(stats.album_count, 0);
        assert_eq!(stats.image_count, 0);
        assert_eq!(stats.tag_count, 0);
    }

    #[test]
    fn test_schema_creation() {
        let db = Database::open_in_memory().expect("Failed to open database");
        db.init().expect("Failed to initialize");

        let conn = db.connection().expect("Failed to get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "AlbumRoots",
            "Albums",
            "Images",
            "ImageInformation",
            "ImageTags",
            "ImageProperties",
            "Tags",
            "TagsTree",
            "Searches",
            "Settings",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_init_twice_is_noop() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.initialize(&NoOpInitObserver), InitializationAdvice::Success);
        assert_eq!(db.initialize(&NoOpInitObserver), InitializationAdvice::Success);
    }

    #[derive(Default)]
    struct CountingObserver {
        steps: AtomicUsize,
        progress: AtomicUsize,
    }

    impl InitObserver for CountingObserver {
        fn more_schema_updates_needed(&self, steps: usize) {
            self.steps.store(steps, Ordering::SeqCst);
        }
        fn schema_update_progress(&self, _message: &str, _step: usize) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_migrations_reported_per_step() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        // Pretend the database was created by version 2
        {
            let conn = db.connection().unwrap();
            conn.execute("DELETE FROM schema_version", []).unwrap();
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (2, 'x')",
                [],
            )
            .unwrap();
            conn.execute_batch(
                "CREATE TABLE ImagePositions_old AS SELECT imageid, latitudeNumber, longitudeNumber, altitude, orientation, tilt, roll FROM ImagePositions;
                 DROP TABLE ImagePositions;
                 ALTER TABLE ImagePositions_old RENAME TO ImagePositions;",
            )
            .unwrap();
        }

        let observer = CountingObserver::default();
        assert_eq!(db.initialize(&observer), InitializationAdvice::Success);
        assert_eq!(observer.steps.load(Ordering::SeqCst), 2);
        assert_eq!(observer.progress.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_newer_schema_aborts() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        {
            let conn = db.connection().unwrap();
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, 'x')",
                params![SCHEMA_VERSION + 10],
            )
            .unwrap();
        }
        assert_eq!(
            db.initialize(&NoOpInitObserver),
            InitializationAdvice::AbortImmediately
        );
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().expect("Failed to open database");
        db.init().expect("Failed to initialize");

        let result: AppResult<()> = db.transaction(|conn| {
            conn.execute("INSERT INTO Tags (pid, name) VALUES (0, 'test')", [])?;
            Err(AppError::General("boom".to_string()))
        });
        assert!(result.is_err());

        let conn = db.connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
