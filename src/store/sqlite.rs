//! SQLite-backed store for members, tasks and settings.
//!
//! Every operation opens its own connection and commits before returning, so
//! each call is atomic on its own. Nothing holds a transaction open across
//! calls.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::models::{Member, MemberFilter, MemberStats, MemberUpdate, Task, UserRef};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    paid INTEGER NOT NULL,
    comment TEXT
);
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    assignee TEXT NOT NULL,
    created_by INTEGER,
    created_at TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    CHECK ((completed = 0) = (completed_at IS NULL))
);
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_active ON tasks(completed, created_at, id);
"#;

/// Handle to the database file. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        paid: row.get::<_, i64>(2)? != 0,
        comment: row.get(3)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let assignee: String = row.get(2)?;
    let assignee = assignee.parse::<UserRef>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(Error::Store(e)),
        )
    })?;
    let created_at: String = row.get(4)?;
    let completed_at: Option<String> = row.get(6)?;
    Ok(Task {
        id: row.get(0)?,
        description: row.get(1)?,
        assignee,
        creator: row.get(3)?,
        created_at: parse_timestamp(&created_at)?,
        completed: row.get::<_, i64>(5)? != 0,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn collect_members(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Member>> {
    let mut stmt = conn.prepare(sql)?;
    let members = stmt
        .query_map(params, member_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>();
    members
}

/// Escape LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

const TASK_COLUMNS: &str =
    "id, description, assignee, created_by, created_at, completed, completed_at";

impl Store {
    /// Open the store at `path`, creating the parent directory and tables
    /// if they do not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        store
            .connect()?
            .execute_batch(SCHEMA)
            .map_err(|e| Error::Store(format!("sqlite init: {}", e)))?;
        tracing::debug!("Opened store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).map_err(|e| Error::Store(format!("sqlite open: {}", e)))?;
        // SQLite's lower() and LIKE only fold ASCII.
        conn.create_scalar_function(
            "fold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| v.to_lowercase()))
            },
        )
        .map_err(|e| Error::Store(format!("sqlite register fold: {}", e)))?;
        Ok(conn)
    }

    // Members

    /// Insert a member, failing with `Duplicate` when the name is already
    /// taken ignoring case. Lookup and insert share one connection and one
    /// immediate transaction.
    pub fn create_member(&self, name: &str, paid: bool, comment: Option<&str>) -> Result<i64> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| Error::Store(format!("sqlite begin: {}", e)))?;

        let existing = {
            let mut stmt = tx
                .prepare("SELECT id FROM members WHERE fold(name) = fold(?1) ORDER BY id")
                .map_err(|e| Error::Store(format!("sqlite prepare name lookup: {}", e)))?;
            let ids = stmt
                .query_map(params![name], |row| row.get(0))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<i64>>>())
                .map_err(|e| Error::Store(format!("sqlite name lookup: {}", e)))?;
            ids
        };
        if !existing.is_empty() {
            return Err(Error::Duplicate {
                name: name.to_string(),
                ids: existing,
            });
        }

        tx.execute(
            "INSERT INTO members (name, paid, comment) VALUES (?1, ?2, ?3)",
            params![name, paid as i64, comment],
        )
        .map_err(|e| Error::Store(format!("sqlite insert member: {}", e)))?;
        let id = tx.last_insert_rowid();
        tx.commit()
            .map_err(|e| Error::Store(format!("sqlite commit member: {}", e)))?;
        Ok(id)
    }

    /// Apply `update` to member `id`. Returns the number of rows changed (0 or 1).
    pub fn update_member(&self, id: i64, update: &MemberUpdate) -> Result<usize> {
        let conn = self.connect()?;
        let changed = match (update.paid, update.comment.as_deref()) {
            (Some(paid), Some(comment)) => conn.execute(
                "UPDATE members SET paid = ?1, comment = ?2 WHERE id = ?3",
                params![paid as i64, comment, id],
            ),
            (Some(paid), None) => conn.execute(
                "UPDATE members SET paid = ?1 WHERE id = ?2",
                params![paid as i64, id],
            ),
            (None, Some(comment)) => conn.execute(
                "UPDATE members SET comment = ?1 WHERE id = ?2",
                params![comment, id],
            ),
            (None, None) => conn.execute("UPDATE members SET id = id WHERE id = ?1", params![id]),
        }
        .map_err(|e| Error::Store(format!("sqlite update member: {}", e)))?;
        Ok(changed)
    }

    pub fn delete_member(&self, id: i64) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM members WHERE id = ?1", params![id])
            .map_err(|e| Error::Store(format!("sqlite delete member: {}", e)))
    }

    pub fn list_members(&self, filter: &MemberFilter) -> Result<Vec<Member>> {
        let conn = self.connect()?;
        let base = "SELECT id, name, paid, comment FROM members";
        let result = match filter {
            MemberFilter::All => collect_members(&conn, &format!("{} ORDER BY id", base), []),
            MemberFilter::Unpaid => collect_members(
                &conn,
                &format!("{} WHERE paid = 0 ORDER BY id", base),
                [],
            ),
            MemberFilter::Search(query) => collect_members(
                &conn,
                &format!(
                    "{} WHERE fold(name) LIKE ?1 ESCAPE '\\' OR fold(comment) LIKE ?1 ESCAPE '\\' ORDER BY id",
                    base
                ),
                params![like_pattern(&query.to_lowercase())],
            ),
        };
        result.map_err(|e| Error::Store(format!("sqlite list members: {}", e)))
    }

    pub fn count_members(&self) -> Result<MemberStats> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(paid != 0), 0) FROM members",
            [],
            |row| {
                Ok(MemberStats {
                    total: row.get(0)?,
                    paid: row.get(1)?,
                })
            },
        )
        .map_err(|e| Error::Store(format!("sqlite count members: {}", e)))
    }

    /// Mark every member unpaid. Returns the number of rows touched.
    pub fn unpay_all(&self) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute("UPDATE members SET paid = 0", [])
            .map_err(|e| Error::Store(format!("sqlite unpay all: {}", e)))
    }

    /// Delete every member. Irreversible.
    pub fn clear_all_members(&self) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM members", [])
            .map_err(|e| Error::Store(format!("sqlite clear members: {}", e)))
    }

    // Tasks

    pub fn create_task(&self, description: &str, assignee: &UserRef, creator: Option<i64>) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO tasks (description, assignee, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![description, assignee.to_string(), creator, timestamp(Utc::now())],
        )
        .map_err(|e| Error::Store(format!("sqlite insert task: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub(crate) fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.connect()?;
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id],
            task_from_row,
        )
        .optional()
        .map_err(|e| Error::Store(format!("sqlite get task: {}", e)))
    }

    /// Complete task `id` if it is currently open. Returns rows changed.
    pub fn complete_task(&self, id: i64) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE tasks SET completed = 1, completed_at = ?1 WHERE id = ?2 AND completed = 0",
            params![timestamp(Utc::now()), id],
        )
        .map_err(|e| Error::Store(format!("sqlite complete task: {}", e)))
    }

    /// Reopen task `id` if it is currently completed. Returns rows changed.
    pub fn reopen_task(&self, id: i64) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE tasks SET completed = 0, completed_at = NULL WHERE id = ?1 AND completed = 1",
            params![id],
        )
        .map_err(|e| Error::Store(format!("sqlite reopen task: {}", e)))
    }

    /// Open tasks, oldest first.
    pub fn list_active_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM tasks WHERE completed = 0 ORDER BY created_at, id",
                TASK_COLUMNS
            ))
            .map_err(|e| Error::Store(format!("sqlite prepare active tasks: {}", e)))?;
        let tasks = stmt
            .query_map([], task_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| Error::Store(format!("sqlite active tasks: {}", e)))?;
        Ok(tasks)
    }

    // Settings

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Store(format!("sqlite get setting: {}", e)))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| Error::Store(format!("sqlite set setting: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("nested").join("dues.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_missing_directory() {
        let (dir, store) = temp_store();
        assert!(dir.path().join("nested").is_dir());
        assert!(store.path().exists());
    }

    #[test]
    fn duplicate_names_ignore_case() {
        let (_dir, store) = temp_store();
        let first = store.create_member("Alice Smith", true, None).unwrap();

        match store.create_member("alice SMITH", false, None) {
            Err(Error::Duplicate { ids, .. }) => assert_eq!(ids, vec![first]),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(store.list_members(&MemberFilter::All).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_names_fold_non_ascii_case() {
        let (_dir, store) = temp_store();
        let first = store.create_member("Émile Zola", true, Some("ÉCRIVAIN")).unwrap();

        match store.create_member("émile zola", false, None) {
            Err(Error::Duplicate { ids, .. }) => assert_eq!(ids, vec![first]),
            other => panic!("expected duplicate, got {:?}", other),
        }

        let found = store.list_members(&MemberFilter::Search("émile".into())).unwrap();
        assert_eq!(found.len(), 1);
        let found = store.list_members(&MemberFilter::Search("écrivain".into())).unwrap();
        assert_eq!(found[0].id, first);
    }

    #[test]
    fn update_leaves_unset_fields_alone() {
        let (_dir, store) = temp_store();
        let id = store.create_member("Bob", true, Some("board")).unwrap();

        let changed = store
            .update_member(id, &MemberUpdate { paid: Some(false), comment: None })
            .unwrap();
        assert_eq!(changed, 1);

        let members = store.list_members(&MemberFilter::All).unwrap();
        assert!(!members[0].paid);
        assert_eq!(members[0].comment.as_deref(), Some("board"));

        assert_eq!(store.update_member(999, &MemberUpdate::default()).unwrap(), 0);
        assert_eq!(store.update_member(id, &MemberUpdate::default()).unwrap(), 1);
    }

    #[test]
    fn filters_and_counts() {
        let (_dir, store) = temp_store();
        store.create_member("Alice", true, Some("treasurer")).unwrap();
        store.create_member("Bob", false, None).unwrap();
        store.create_member("Carol", false, Some("new_member")).unwrap();

        let unpaid = store.list_members(&MemberFilter::Unpaid).unwrap();
        assert_eq!(unpaid.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), ["Bob", "Carol"]);

        let found = store.list_members(&MemberFilter::Search("TREAS".into())).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Alice");

        // Underscore is literal, not a single-char wildcard.
        let found = store.list_members(&MemberFilter::Search("w_m".into())).unwrap();
        assert_eq!(found.len(), 1);
        let found = store.list_members(&MemberFilter::Search("r_a".into())).unwrap();
        assert!(found.is_empty());

        assert_eq!(store.count_members().unwrap(), MemberStats { total: 3, paid: 1 });
        assert_eq!(store.unpay_all().unwrap(), 3);
        assert_eq!(store.count_members().unwrap(), MemberStats { total: 3, paid: 0 });
    }

    #[test]
    fn delete_and_clear() {
        let (_dir, store) = temp_store();
        let id = store.create_member("Alice", true, None).unwrap();
        store.create_member("Bob", true, None).unwrap();

        assert_eq!(store.delete_member(id).unwrap(), 1);
        assert_eq!(store.delete_member(id).unwrap(), 0);
        assert_eq!(store.clear_all_members().unwrap(), 1);
        assert_eq!(store.count_members().unwrap().total, 0);
    }

    #[test]
    fn task_state_machine_is_guarded() {
        let (_dir, store) = temp_store();
        let id = store
            .create_task("Book the hall", &UserRef::Username("alice_b".into()), Some(7))
            .unwrap();

        let task = store.get_task(id).unwrap().unwrap();
        assert!(task.is_active());
        assert_eq!(task.completed_at, None);
        assert_eq!(task.creator, Some(7));

        assert_eq!(store.complete_task(id).unwrap(), 1);
        let done = store.get_task(id).unwrap().unwrap();
        assert!(done.completed);
        let stamp = done.completed_at.expect("completed_at set");

        assert_eq!(store.complete_task(id).unwrap(), 0);
        assert_eq!(store.get_task(id).unwrap().unwrap().completed_at, Some(stamp));

        assert_eq!(store.reopen_task(id).unwrap(), 1);
        let reopened = store.get_task(id).unwrap().unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.completed_at, None);
        assert_eq!(store.reopen_task(id).unwrap(), 0);

        assert_eq!(store.complete_task(404).unwrap(), 0);
    }

    #[test]
    fn active_tasks_are_fifo() {
        let (_dir, store) = temp_store();
        let a = store.create_task("first", &UserRef::Id(1), None).unwrap();
        let b = store.create_task("second", &UserRef::Id(2), None).unwrap();
        let c = store.create_task("third", &UserRef::Id(3), None).unwrap();
        store.complete_task(b).unwrap();

        let ids: Vec<i64> = store.list_active_tasks().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn settings_upsert() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_setting("task_channel_id").unwrap(), None);
        store.set_setting("task_channel_id", "-100").unwrap();
        store.set_setting("task_channel_id", "-200").unwrap();
        assert_eq!(store.get_setting("task_channel_id").unwrap().as_deref(), Some("-200"));
    }
}
