use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Params, Transaction, TransactionBehavior, params};
use tracing::{debug, info, warn};

use super::merge::{self, MergePolicy};
use super::models::*;
use super::positions::{self, ColumnOrder, MovedItem, is_contiguous};
use super::promote;
use super::sync::sync_request_status;
use super::view;
use crate::errors::{BoardError, BoardResult};

/// Busy timeout applied to file-backed connections unless configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded exponential backoff for transactions that hit lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base…
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`. The mutex serializes callers
/// inside this process; SQLite's writer lock covers other processes.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
    retry: RetryPolicy,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self::with_retry(db, RetryPolicy::default())
    }

    pub fn with_retry(db: BoardDb, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
            retry,
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> BoardResult<R>
    where
        F: FnOnce(&BoardDb) -> BoardResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| BoardError::Other(anyhow::anyhow!("DB task panicked: {}", e)))?
    }

    /// Like [`call`](Self::call), but re-runs `f` with backoff while it fails
    /// with a transient error. Each attempt is a fresh transaction, so a
    /// retry never observes a half-applied previous attempt.
    pub async fn call_with_retry<F, R>(&self, op: &'static str, f: F) -> BoardResult<R>
    where
        F: Fn(&BoardDb) -> BoardResult<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        let mut attempt = 0;
        loop {
            let f = Arc::clone(&f);
            match self.call(move |db| f(db)).await {
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(op, attempt, ?delay, error = %e, "database busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

pub struct BoardDb {
    conn: Connection,
    merge_policy: MergePolicy,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> BoardResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> BoardResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let _journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let db = Self {
            conn,
            merge_policy: MergePolicy::default(),
        };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> BoardResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            merge_policy: MergePolicy::default(),
        };
        db.init()?;
        Ok(db)
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    fn init(&self) -> BoardResult<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.run_migrations()
    }

    fn run_migrations(&self) -> BoardResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT,
                priority TEXT,
                team TEXT,
                region TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                merged_into_id INTEGER REFERENCES requests(id),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS votes (
                request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                vote_type TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (request_id, user_id, vote_type)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS roadmap_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                request_id INTEGER REFERENCES requests(id),
                column_name TEXT NOT NULL DEFAULT 'backlog',
                position INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT,
                priority TEXT,
                team TEXT,
                region TEXT,
                is_discovery INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_requests_project ON requests(project_id, status);
            CREATE INDEX IF NOT EXISTS idx_comments_request ON comments(request_id);
            CREATE INDEX IF NOT EXISTS idx_activity_request ON activity_log(request_id);
            CREATE INDEX IF NOT EXISTS idx_items_column ON roadmap_items(project_id, column_name, position);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_items_request
                ON roadmap_items(request_id) WHERE request_id IS NOT NULL;
            ",
        )?;
        Ok(())
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction. The writer lock is
    /// taken up front, so the read-then-shift steps of an operation cannot
    /// interleave with another writer. Dropping the transaction on error
    /// rolls everything back.
    fn write_tx<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Connection) -> BoardResult<R>,
    ) -> BoardResult<R> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!(op, error = %e, "rolling back");
                Err(e)
            }
        }
    }

    /// Run `f` against one consistent snapshot.
    fn read_tx<R>(&self, f: impl FnOnce(&Connection) -> BoardResult<R>) -> BoardResult<R> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, name: &str) -> BoardResult<Project> {
        if name.trim().is_empty() {
            return Err(BoardError::validation("Project name must not be empty"));
        }
        self.write_tx("create_project", |conn| {
            conn.execute(
                "INSERT INTO projects (name, created_at) VALUES (?1, ?2)",
                params![name, now_timestamp()],
            )?;
            let id = conn.last_insert_rowid();
            fetch_project(conn, id)?.ok_or_else(|| BoardError::not_found("Project", id))
        })
    }

    pub fn get_project(&self, id: i64) -> BoardResult<Option<Project>> {
        fetch_project(&self.conn, id)
    }

    pub fn list_projects(&self) -> BoardResult<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM projects ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    // ── Requests, votes, comments ─────────────────────────────────────

    pub fn create_request(
        &self,
        project_id: i64,
        fields: &ItemFields,
        status: Option<RequestStatus>,
    ) -> BoardResult<Request> {
        if fields.title.trim().is_empty() {
            return Err(BoardError::validation("Request title must not be empty"));
        }
        let status = status.unwrap_or(RequestStatus::Pending);
        if status == RequestStatus::Duplicate {
            return Err(BoardError::validation(
                "Requests become duplicates only through a merge",
            ));
        }
        self.write_tx("create_request", |conn| {
            if fetch_project(conn, project_id)?.is_none() {
                return Err(BoardError::not_found("Project", project_id));
            }
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO requests
                    (project_id, title, description, category, priority, team, region,
                     status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    project_id,
                    fields.title,
                    fields.description,
                    fields.category,
                    fields.priority,
                    fields.team,
                    fields.region,
                    status.as_str(),
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            fetch_request(conn, id)?.ok_or_else(|| BoardError::not_found("Request", id))
        })
    }

    pub fn get_request(&self, id: i64) -> BoardResult<Option<Request>> {
        fetch_request(&self.conn, id)
    }

    /// Delete a request. Its board item, if any, is removed through the
    /// gap-closing path in the same transaction.
    pub fn delete_request(&self, id: i64, actor: &Actor) -> BoardResult<()> {
        actor.require_admin("delete requests")?;
        self.write_tx("delete_request", |conn| {
            if fetch_request(conn, id)?.is_none() {
                return Err(BoardError::not_found("Request", id));
            }
            let merged_here: i64 = conn.query_row(
                "SELECT COUNT(*) FROM requests WHERE merged_into_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if merged_here > 0 {
                return Err(BoardError::Conflict(format!(
                    "Request {} is the merge target of {} other request(s)",
                    id, merged_here
                )));
            }
            let item_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM roadmap_items WHERE request_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(item_id) = item_id {
                positions::remove_item(conn, item_id)?;
            }
            conn.execute("DELETE FROM requests WHERE id = ?1", params![id])?;
            Ok(())
        })?;
        info!(request_id = id, "request deleted");
        Ok(())
    }

    /// Record a vote. Casting the same `(user, type)` twice is a no-op.
    pub fn cast_vote(&self, request_id: i64, user_id: i64, vote_type: VoteType) -> BoardResult<Vote> {
        self.write_tx("cast_vote", |conn| {
            if fetch_request(conn, request_id)?.is_none() {
                return Err(BoardError::not_found("Request", request_id));
            }
            conn.execute(
                "INSERT OR IGNORE INTO votes (request_id, user_id, vote_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![request_id, user_id, vote_type.as_str(), now_timestamp()],
            )?;
            query_votes(conn, request_id)?
                .into_iter()
                .find(|v| v.user_id == user_id && v.vote_type == vote_type)
                .ok_or_else(|| BoardError::not_found("Vote", request_id))
        })
    }

    pub fn list_votes(&self, request_id: i64) -> BoardResult<Vec<Vote>> {
        query_votes(&self.conn, request_id)
    }

    pub fn add_comment(&self, request_id: i64, user_id: i64, body: &str) -> BoardResult<Comment> {
        if body.trim().is_empty() {
            return Err(BoardError::validation("Comment body must not be empty"));
        }
        self.write_tx("add_comment", |conn| {
            if fetch_request(conn, request_id)?.is_none() {
                return Err(BoardError::not_found("Request", request_id));
            }
            conn.execute(
                "INSERT INTO comments (request_id, user_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![request_id, user_id, body, now_timestamp()],
            )?;
            let id = conn.last_insert_rowid();
            let comment = conn.query_row(
                "SELECT id, request_id, user_id, body, created_at FROM comments WHERE id = ?1",
                params![id],
                comment_from_row,
            )?;
            Ok(comment)
        })
    }

    pub fn list_comments(&self, request_id: i64) -> BoardResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, request_id, user_id, body, created_at FROM comments
             WHERE request_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![request_id], comment_from_row)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    pub fn list_activity(&self, request_id: i64) -> BoardResult<Vec<ActivityLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, request_id, user_id, action, old_value, new_value, created_at
             FROM activity_log WHERE request_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![request_id], ActivityRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    // ── Roadmap items ─────────────────────────────────────────────────

    pub fn get_item(&self, id: i64) -> BoardResult<Option<RoadmapItem>> {
        fetch_item(&self.conn, id)
    }

    pub fn list_items(&self, project_id: i64) -> BoardResult<Vec<RoadmapItem>> {
        query_items(
            &self.conn,
            "WHERE ri.project_id = ?1 ORDER BY ri.column_name, ri.position, ri.id",
            params![project_id],
        )
    }

    /// Create a standalone (unlinked) item. Requests reach the board
    /// through [`promote_request`](Self::promote_request).
    pub fn create_item(&self, project_id: i64, new: &NewItem, actor: &Actor) -> BoardResult<RoadmapItem> {
        actor.require_admin("create roadmap items")?;
        let item = self.write_tx("create_item", |conn| {
            if fetch_project(conn, project_id)?.is_none() {
                return Err(BoardError::not_found("Project", project_id));
            }
            positions::insert_item(conn, project_id, new, None)
        })?;
        info!(
            item_id = item.id,
            project_id,
            column = %item.column,
            position = item.position,
            "roadmap item created"
        );
        Ok(item)
    }

    /// Move an item. A column change on a linked item also moves the
    /// request's status; a same-column reorder never does.
    pub fn move_item(
        &self,
        item_id: i64,
        column: BoardColumn,
        position: i32,
        actor: &Actor,
    ) -> BoardResult<MovedItem> {
        actor.require_admin("move roadmap items")?;
        let moved = self.write_tx("move_item", |conn| {
            let moved = positions::move_item(conn, item_id, column, position)?;
            if moved.changed_column()
                && let Some(request_id) = moved.item.request_id
            {
                sync_request_status(conn, request_id, column, actor.user_id)?;
            }
            Ok(moved)
        })?;
        info!(
            item_id,
            from_column = %moved.from_column,
            from_position = moved.from_position,
            to_column = %moved.item.column,
            to_position = moved.item.position,
            "roadmap item moved"
        );
        Ok(moved)
    }

    pub fn delete_item(&self, item_id: i64, actor: &Actor) -> BoardResult<RoadmapItem> {
        actor.require_admin("delete roadmap items")?;
        let item = self.write_tx("delete_item", |conn| positions::remove_item(conn, item_id))?;
        info!(item_id, column = %item.column, position = item.position, "roadmap item deleted");
        Ok(item)
    }

    pub fn promote_request(
        &self,
        request_id: i64,
        column: BoardColumn,
        position: i32,
        actor: &Actor,
    ) -> BoardResult<RoadmapItem> {
        actor.require_admin("promote requests")?;
        self.write_tx("promote_request", |conn| {
            promote::promote_request(conn, request_id, column, position, actor.user_id)
        })
    }

    pub fn merge_requests(
        &self,
        source_id: i64,
        target_id: i64,
        opts: MergeOptions,
        actor: &Actor,
    ) -> BoardResult<MergeResult> {
        actor.require_admin("merge requests")?;
        let policy = self.merge_policy;
        self.write_tx("merge_requests", |conn| {
            merge::merge_requests(conn, source_id, target_id, opts, policy, actor.user_id)
        })
    }

    // ── Board view ────────────────────────────────────────────────────

    pub fn get_board(&self, project_id: i64) -> BoardResult<BoardView> {
        self.read_tx(|conn| view::load_board(conn, project_id))
    }

    // ── Maintenance ───────────────────────────────────────────────────

    /// Columns whose stored positions are not exactly `0..n`.
    pub fn check_columns(&self) -> BoardResult<Vec<ColumnDefect>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, column_name, position FROM roadmap_items
             ORDER BY project_id, column_name, position",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut defects = Vec::new();
        let mut current: Option<ColumnDefect> = None;
        for (project_id, column_name, position) in rows {
            let column = parse_column(&column_name)?;
            match current.as_mut() {
                Some(group) if group.project_id == project_id && group.column == column => {
                    group.positions.push(position);
                }
                _ => {
                    if let Some(done) = current.take()
                        && !is_contiguous(&done.positions)
                    {
                        defects.push(done);
                    }
                    current = Some(ColumnDefect {
                        project_id,
                        column,
                        positions: vec![position],
                    });
                }
            }
        }
        if let Some(done) = current
            && !is_contiguous(&done.positions)
        {
            defects.push(done);
        }
        Ok(defects)
    }

    /// Renumber every defective column to `0..n`, keeping its order.
    pub fn repair_columns(&self) -> BoardResult<usize> {
        let defects = self.check_columns()?;
        self.write_tx("repair_columns", |conn| {
            for defect in &defects {
                let order = ColumnOrder::load(conn, defect.project_id, defect.column)?;
                let written = order.persist(conn)?;
                warn!(
                    project_id = defect.project_id,
                    column = %defect.column,
                    rows = written,
                    "column positions repaired"
                );
            }
            Ok(defects.len())
        })
    }
}

// ── Shared query helpers ──────────────────────────────────────────────
//
// Free functions over `&Connection` so the board operations can call them
// from inside an open transaction.

/// Timestamp format used for every row this crate writes.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn fetch_project(conn: &Connection, id: i64) -> BoardResult<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT id, name, created_at FROM projects WHERE id = ?1",
            params![id],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(project)
}

const REQUEST_SELECT: &str = "SELECT r.id, r.project_id, r.title, r.description, r.category,
        r.priority, r.team, r.region, r.status, r.merged_into_id,
        (SELECT COUNT(*) FROM votes v WHERE v.request_id = r.id),
        (SELECT COUNT(*) FROM comments c WHERE c.request_id = r.id),
        r.created_at, r.updated_at
     FROM requests r";

/// Query requests with a `WHERE … ORDER BY …` tail over alias `r`.
pub fn query_requests<P: Params>(conn: &Connection, tail: &str, params: P) -> BoardResult<Vec<Request>> {
    let sql = format!("{REQUEST_SELECT} {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, RequestRow::from_row)?;
    let mut requests = Vec::new();
    for row in rows {
        requests.push(row?.into_request()?);
    }
    Ok(requests)
}

pub fn fetch_request(conn: &Connection, id: i64) -> BoardResult<Option<Request>> {
    Ok(query_requests(conn, "WHERE r.id = ?1", params![id])?
        .into_iter()
        .next())
}

const ITEM_SELECT: &str = "SELECT ri.id, ri.project_id, ri.request_id, ri.column_name, ri.position,
        ri.title, ri.description, ri.category, ri.priority, ri.team, ri.region,
        ri.is_discovery, ri.created_at, ri.updated_at
     FROM roadmap_items ri";

/// Query items with a `WHERE … ORDER BY …` tail over alias `ri`.
pub fn query_items<P: Params>(conn: &Connection, tail: &str, params: P) -> BoardResult<Vec<RoadmapItem>> {
    let sql = format!("{ITEM_SELECT} {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, ItemRow::from_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?.into_item()?);
    }
    Ok(items)
}

pub fn fetch_item(conn: &Connection, id: i64) -> BoardResult<Option<RoadmapItem>> {
    Ok(query_items(conn, "WHERE ri.id = ?1", params![id])?
        .into_iter()
        .next())
}

pub fn query_votes(conn: &Connection, request_id: i64) -> BoardResult<Vec<Vote>> {
    let mut stmt = conn.prepare(
        "SELECT request_id, user_id, vote_type, created_at FROM votes
         WHERE request_id = ?1 ORDER BY user_id, vote_type",
    )?;
    let rows = stmt.query_map(params![request_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut votes = Vec::new();
    for row in rows {
        let (request_id, user_id, vote_type, created_at) = row?;
        let vote_type = VoteType::from_str(&vote_type)
            .map_err(|e| BoardError::Other(anyhow::anyhow!(e)))?;
        votes.push(Vote {
            request_id,
            user_id,
            vote_type,
            created_at,
        });
    }
    Ok(votes)
}

/// Append one audit entry. Entries are never updated or deleted here.
pub fn append_activity(
    conn: &Connection,
    request_id: i64,
    user_id: i64,
    action: ActivityAction,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> BoardResult<ActivityLogEntry> {
    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO activity_log (request_id, user_id, action, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![request_id, user_id, action.as_str(), old_value, new_value, created_at],
    )?;
    Ok(ActivityLogEntry {
        id: conn.last_insert_rowid(),
        request_id,
        user_id,
        action,
        old_value: old_value.map(str::to_string),
        new_value: new_value.map(str::to_string),
        created_at,
    })
}

fn parse_column(s: &str) -> BoardResult<BoardColumn> {
    BoardColumn::from_str(s).map_err(|e| BoardError::Other(anyhow::anyhow!(e)))
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        request_id: row.get(1)?,
        user_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading requests from SQLite before
/// converting the status string into its typed value.
struct RequestRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    category: Option<String>,
    priority: Option<String>,
    team: Option<String>,
    region: Option<String>,
    status: String,
    merged_into_id: Option<i64>,
    vote_count: i64,
    comment_count: i64,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            priority: row.get(5)?,
            team: row.get(6)?,
            region: row.get(7)?,
            status: row.get(8)?,
            merged_into_id: row.get(9)?,
            vote_count: row.get(10)?,
            comment_count: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_request(self) -> BoardResult<Request> {
        let status = RequestStatus::from_str(&self.status)
            .map_err(|e| BoardError::Other(anyhow::anyhow!(e)))?;
        Ok(Request {
            id: self.id,
            project_id: self.project_id,
            fields: ItemFields {
                title: self.title,
                description: self.description,
                category: self.category,
                priority: self.priority,
                team: self.team,
                region: self.region,
            },
            status,
            merged_into_id: self.merged_into_id,
            vote_count: self.vote_count,
            comment_count: self.comment_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for roadmap_items.
struct ItemRow {
    id: i64,
    project_id: i64,
    request_id: Option<i64>,
    column_name: String,
    position: i32,
    title: String,
    description: String,
    category: Option<String>,
    priority: Option<String>,
    team: Option<String>,
    region: Option<String>,
    is_discovery: bool,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            request_id: row.get(2)?,
            column_name: row.get(3)?,
            position: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            category: row.get(7)?,
            priority: row.get(8)?,
            team: row.get(9)?,
            region: row.get(10)?,
            is_discovery: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_item(self) -> BoardResult<RoadmapItem> {
        Ok(RoadmapItem {
            id: self.id,
            project_id: self.project_id,
            request_id: self.request_id,
            column: parse_column(&self.column_name)?,
            position: self.position,
            fields: ItemFields {
                title: self.title,
                description: self.description,
                category: self.category,
                priority: self.priority,
                team: self.team,
                region: self.region,
            },
            is_discovery: self.is_discovery,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for activity_log.
struct ActivityRow {
    id: i64,
    request_id: i64,
    user_id: i64,
    action: String,
    old_value: Option<String>,
    new_value: Option<String>,
    created_at: String,
}

impl ActivityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_id: row.get(1)?,
            user_id: row.get(2)?,
            action: row.get(3)?,
            old_value: row.get(4)?,
            new_value: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_entry(self) -> BoardResult<ActivityLogEntry> {
        let action = ActivityAction::from_str(&self.action)
            .map_err(|e| BoardError::Other(anyhow::anyhow!(e)))?;
        Ok(ActivityLogEntry {
            id: self.id,
            request_id: self.request_id,
            user_id: self.user_id,
            action,
            old_value: self.old_value,
            new_value: self.new_value,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
