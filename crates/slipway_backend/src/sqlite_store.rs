use anyhow::{Context as _, anyhow};
use rusqlite::{Connection, params};
use slipway_domain::{PersistedAppState, PersistedSetupScript, PersistedThreadName};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/migrations/0001_init.sql"
    )),
)];

/// Handle to the sqlite worker thread. All database access is serialized
/// through a single connection owned by that thread.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbCommand>,
}

enum DbCommand {
    LoadAppState {
        reply: mpsc::Sender<anyhow::Result<PersistedAppState>>,
    },
    SetThreadName {
        thread_id: String,
        name: Option<String>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    SetWorktreeSetupScript {
        workspace_id: String,
        script: Option<String>,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
    RecordThreadActivity {
        workspace_id: String,
        thread_id: String,
        timestamp_unix_ms: u64,
        reply: mpsc::Sender<anyhow::Result<()>>,
    },
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<DbCommand>();

        std::thread::Builder::new()
            .name("slipway-sqlite".to_owned())
            .spawn(move || {
                let mut db = SqliteDatabase::open(&db_path);
                while let Ok(cmd) = rx.recv() {
                    match (&mut db, cmd) {
                        (Ok(db), DbCommand::LoadAppState { reply }) => {
                            let _ = reply.send(db.load_app_state());
                        }
                        (
                            Ok(db),
                            DbCommand::SetThreadName {
                                thread_id,
                                name,
                                reply,
                            },
                        ) => {
                            let _ = reply.send(db.set_thread_name(&thread_id, name.as_deref()));
                        }
                        (
                            Ok(db),
                            DbCommand::SetWorktreeSetupScript {
                                workspace_id,
                                script,
                                reply,
                            },
                        ) => {
                            let _ = reply
                                .send(db.set_worktree_setup_script(&workspace_id, script.as_deref()));
                        }
                        (
                            Ok(db),
                            DbCommand::RecordThreadActivity {
                                workspace_id,
                                thread_id,
                                timestamp_unix_ms,
                                reply,
                            },
                        ) => {
                            let _ = reply.send(db.record_thread_activity(
                                &workspace_id,
                                &thread_id,
                                timestamp_unix_ms,
                            ));
                        }
                        (Err(err), cmd) => {
                            respond_db_open_error(err, cmd);
                        }
                    }
                }
            })
            .context("failed to spawn sqlite worker thread")?;

        Ok(Self { tx })
    }

    pub fn load_app_state(&self) -> anyhow::Result<PersistedAppState> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::LoadAppState { reply: reply_tx })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn set_thread_name(&self, thread_id: String, name: Option<String>) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetThreadName {
                thread_id,
                name,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn set_worktree_setup_script(
        &self,
        workspace_id: String,
        script: Option<String>,
    ) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::SetWorktreeSetupScript {
                workspace_id,
                script,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }

    pub fn record_thread_activity(
        &self,
        workspace_id: String,
        thread_id: String,
        timestamp_unix_ms: u64,
    ) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(DbCommand::RecordThreadActivity {
                workspace_id,
                thread_id,
                timestamp_unix_ms,
                reply: reply_tx,
            })
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }
}

fn respond_db_open_error(err: &anyhow::Error, cmd: DbCommand) {
    let message = format!("{err:#}");
    match cmd {
        DbCommand::LoadAppState { reply } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::SetThreadName { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::SetWorktreeSetupScript { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::RecordThreadActivity { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
    }
}

struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db {}", db_path.display()))?;

        configure_connection(&mut conn).context("failed to configure sqlite connection")?;
        apply_migrations(&mut conn).context("failed to apply sqlite migrations")?;

        Ok(Self { conn })
    }

    fn load_app_state(&mut self) -> anyhow::Result<PersistedAppState> {
        let mut thread_names = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT thread_id, name FROM thread_names ORDER BY thread_id ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (thread_id, name) = row?;
                thread_names.push(PersistedThreadName { thread_id, name });
            }
        }

        let mut setup_scripts = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT workspace_id, script FROM worktree_setup_scripts ORDER BY workspace_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (workspace_id, script) = row?;
            setup_scripts.push(PersistedSetupScript {
                workspace_id,
                script,
            });
        }

        Ok(PersistedAppState {
            thread_names,
            setup_scripts,
        })
    }

    fn set_thread_name(&mut self, thread_id: &str, name: Option<&str>) -> anyhow::Result<()> {
        let now = now_unix_seconds();
        if let Some(name) = name {
            self.conn.execute(
                "INSERT INTO thread_names (thread_id, name, created_at, updated_at)
                 VALUES (?1, ?2, COALESCE((SELECT created_at FROM thread_names WHERE thread_id = ?1), ?3), ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET
                   name = excluded.name,
                   updated_at = excluded.updated_at",
                params![thread_id, name, now],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM thread_names WHERE thread_id = ?1",
                params![thread_id],
            )?;
        }
        Ok(())
    }

    fn set_worktree_setup_script(
        &mut self,
        workspace_id: &str,
        script: Option<&str>,
    ) -> anyhow::Result<()> {
        let now = now_unix_seconds();
        if let Some(script) = script {
            self.conn.execute(
                "INSERT INTO worktree_setup_scripts (workspace_id, script, created_at, updated_at)
                 VALUES (?1, ?2, COALESCE((SELECT created_at FROM worktree_setup_scripts WHERE workspace_id = ?1), ?3), ?3)
                 ON CONFLICT(workspace_id) DO UPDATE SET
                   script = excluded.script,
                   updated_at = excluded.updated_at",
                params![workspace_id, script, now],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM worktree_setup_scripts WHERE workspace_id = ?1",
                params![workspace_id],
            )?;
        }
        Ok(())
    }

    /// Later events can arrive with earlier payload timestamps, so the stored
    /// value only ever moves forward.
    fn record_thread_activity(
        &mut self,
        workspace_id: &str,
        thread_id: &str,
        timestamp_unix_ms: u64,
    ) -> anyhow::Result<()> {
        let now = now_unix_seconds();
        self.conn.execute(
            "INSERT INTO thread_activity (thread_id, workspace_id, last_activity_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, COALESCE((SELECT created_at FROM thread_activity WHERE thread_id = ?1), ?4), ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
               workspace_id = excluded.workspace_id,
               last_activity_at = MAX(last_activity_at, excluded.last_activity_at),
               updated_at = excluded.updated_at",
            params![thread_id, workspace_id, timestamp_unix_ms as i64, now],
        )?;
        Ok(())
    }
}

fn configure_connection(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let mut current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .context("failed to read user_version")? as u32;

    if current > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "sqlite schema version is newer than this build: db={}, app={}",
            current,
            LATEST_SCHEMA_VERSION
        ));
    }

    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch("BEGIN IMMEDIATE;")
        .context("failed to begin migration transaction")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration v{version:04}"))?;
        conn.pragma_update(None, "user_version", *version as i64)
            .context("failed to update user_version")?;
        current = *version;
    }

    conn.execute_batch("COMMIT;")
        .context("failed to commit migration transaction")?;
    Ok(())
}

fn now_unix_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
