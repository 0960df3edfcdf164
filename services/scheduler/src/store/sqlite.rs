//! SQLite-backed state store.
//!
//! Task records, statuses and overrides are stored as JSON documents keyed by
//! task name so that a restarted scheduler can rebuild its plans.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use keel_cluster::{TaskInfo, TaskStatus};
use keel_id::FrameworkId;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{GoalOverrideStatus, StateStore, StateStoreError};

const FRAMEWORK_ID_KEY: &str = "framework_id";
const TARGET_CONFIG_KEY: &str = "target_config";

/// SQLite state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open or create a state store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateStoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StateStoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StateStoreError> {
        self.conn
            .lock()
            .map_err(|_| StateStoreError::Invalid("state store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StateStoreError> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                name TEXT PRIMARY KEY,
                info TEXT NOT NULL,
                status TEXT
            );

            CREATE TABLE IF NOT EXISTS goal_overrides (
                name TEXT PRIMARY KEY,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS properties (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        debug!("State store schema initialized");
        Ok(())
    }

    fn fetch_property(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        self.conn()?
            .query_row(
                "SELECT value FROM properties WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn store_property(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        self.conn()?.execute(
            r#"
            INSERT INTO properties (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<(), StateStoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for task in tasks {
            tx.execute(
                r#"
                INSERT INTO tasks (name, info) VALUES (?1, ?2)
                ON CONFLICT(name) DO UPDATE SET info = excluded.info
                "#,
                params![task.name, serde_json::to_string(task)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch_tasks(&self) -> Result<Vec<TaskInfo>, StateStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT info FROM tasks ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|raw| serde_json::from_str::<TaskInfo>(raw).map_err(Into::into))
            .collect()
    }

    fn fetch_task(&self, task_name: &str) -> Result<Option<TaskInfo>, StateStoreError> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT info FROM tasks WHERE name = ?1",
                params![task_name],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| serde_json::from_str::<TaskInfo>(&r).map_err(Into::into))
            .transpose()
    }

    fn store_status(&self, task_name: &str, status: &TaskStatus) -> Result<(), StateStoreError> {
        let updated = self.conn()?.execute(
            "UPDATE tasks SET status = ?1 WHERE name = ?2",
            params![serde_json::to_string(status)?, task_name],
        )?;
        if updated == 0 {
            return Err(StateStoreError::NotFound(format!("task {task_name}")));
        }
        Ok(())
    }

    fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>, StateStoreError> {
        let raw: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT status FROM tasks WHERE name = ?1",
                params![task_name],
                |row| row.get(0),
            )
            .optional()?;
        raw.flatten()
            .map(|r| serde_json::from_str::<TaskStatus>(&r).map_err(Into::into))
            .transpose()
    }

    fn fetch_goal_override_status(
        &self,
        task_name: &str,
    ) -> Result<GoalOverrideStatus, StateStoreError> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT status FROM goal_overrides WHERE name = ?1",
                params![task_name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(r) => Ok(serde_json::from_str(&r)?),
            None => Ok(GoalOverrideStatus::INACTIVE),
        }
    }

    fn store_goal_override_status(
        &self,
        task_name: &str,
        status: GoalOverrideStatus,
    ) -> Result<(), StateStoreError> {
        self.conn()?.execute(
            r#"
            INSERT INTO goal_overrides (name, status) VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET status = excluded.status
            "#,
            params![task_name, serde_json::to_string(&status)?],
        )?;
        Ok(())
    }

    fn clear_task(&self, task_name: &str) -> Result<(), StateStoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tasks WHERE name = ?1", params![task_name])?;
        tx.execute(
            "DELETE FROM goal_overrides WHERE name = ?1",
            params![task_name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StateStoreError> {
        self.fetch_property(FRAMEWORK_ID_KEY)?
            .map(|raw| {
                FrameworkId::parse(&raw)
                    .map_err(|e| StateStoreError::Invalid(format!("framework id: {e}")))
            })
            .transpose()
    }

    fn store_framework_id(&self, id: FrameworkId) -> Result<(), StateStoreError> {
        self.store_property(FRAMEWORK_ID_KEY, &id.to_string())
    }

    fn fetch_target_config(&self) -> Result<Option<String>, StateStoreError> {
        self.fetch_property(TARGET_CONFIG_KEY)
    }

    fn store_target_config(&self, config_id: &str) -> Result<(), StateStoreError> {
        self.store_property(TARGET_CONFIG_KEY, config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::task_info;
    use keel_cluster::TaskState;

    #[test]
    fn test_tasks_roundtrip_in_name_order() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let b = task_info("node", 1, "server");
        let a = task_info("node", 0, "server");
        store.store_tasks(&[b.clone(), a.clone()]).unwrap();

        let tasks = store.fetch_tasks().unwrap();
        assert_eq!(tasks, vec![a.clone(), b]);
        assert_eq!(store.fetch_task(&a.name).unwrap(), Some(a));
        assert!(store.fetch_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_status_and_clear() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let task = task_info("node", 0, "server");
        store.store_tasks(&[task.clone()]).unwrap();
        assert!(store.fetch_status(&task.name).unwrap().is_none());

        let status = TaskStatus::new(task.task_id.clone(), TaskState::Running);
        store.store_status(&task.name, &status).unwrap();
        assert_eq!(
            store.fetch_status(&task.name).unwrap().map(|s| s.state),
            Some(TaskState::Running)
        );

        store
            .store_goal_override_status(&task.name, GoalOverrideStatus::DECOMMISSION_PENDING)
            .unwrap();
        store.clear_task(&task.name).unwrap();
        assert!(store.fetch_task(&task.name).unwrap().is_none());
        assert_eq!(
            store.fetch_goal_override_status(&task.name).unwrap(),
            GoalOverrideStatus::INACTIVE
        );
        assert!(store.store_status(&task.name, &status).is_err());
    }

    #[test]
    fn test_properties() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        assert!(store.fetch_framework_id().unwrap().is_none());

        let id = FrameworkId::new();
        store.store_framework_id(id).unwrap();
        store.store_target_config("abc").unwrap();
        store.store_target_config("def").unwrap();
        assert_eq!(store.fetch_framework_id().unwrap(), Some(id));
        assert_eq!(store.fetch_target_config().unwrap().as_deref(), Some("def"));
    }
}
