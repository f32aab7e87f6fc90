use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tokio::time::{Duration, timeout};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn get_database_path() -> PathBuf {
    std::env::var("DATABASE_PATH")
        .unwrap_or_else(|_| "broadcastbot.db".to_string())
        .into()
}

/// Creates the schema. The `users` table is the recipient source for
/// "send to everyone" broadcasts; `broadcast_jobs` holds job records and
/// their progress counters.
pub fn init_database(path: &Path) -> Result<()> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {:?}", path))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
             telegram_id INTEGER PRIMARY KEY,
             first_seen  TEXT NOT NULL DEFAULT (datetime('now'))
         );
         CREATE TABLE IF NOT EXISTS broadcast_jobs (
             id           TEXT PRIMARY KEY,
             content_kind TEXT NOT NULL,
             text         TEXT,
             media        TEXT,
             buttons      TEXT NOT NULL DEFAULT '[]',
             status       TEXT NOT NULL,
             total        INTEGER NOT NULL DEFAULT 0,
             sent         INTEGER NOT NULL DEFAULT 0,
             failed       INTEGER NOT NULL DEFAULT 0,
             created_at   TEXT NOT NULL
         );",
    )?;
    Ok(())
}

/// Small fixed pool of SQLite connections. Queries run on the blocking
/// thread pool with a hard timeout; the semaphore caps how many run at
/// once.
pub struct DatabasePool {
    connections: Vec<Arc<std::sync::Mutex<Connection>>>,
    next: AtomicUsize,
    permits: Semaphore,
}

impl DatabasePool {
    pub fn new(path: &Path, max_connections: usize) -> Result<Self> {
        let count = max_connections.max(1);
        let mut connections = Vec::with_capacity(count);
        for _ in 0..count {
            let conn = Connection::open(path)
                .with_context(|| format!("failed to open database at {:?}", path))?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            connections.push(Arc::new(std::sync::Mutex::new(conn)));
        }
        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            permits: Semaphore::new(count),
        })
    }

    pub async fn execute_with_timeout<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| anyhow!("database pool closed"))?;
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let conn = Arc::clone(&self.connections[idx]);

        let task = tokio::task::spawn_blocking(move || -> Result<T> {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("database connection poisoned"))?;
            f(&guard).map_err(anyhow::Error::from)
        });

        timeout(QUERY_TIMEOUT, task)
            .await
            .map_err(|_| anyhow!("database query timed out"))?
            .context("database task panicked")?
    }
}
