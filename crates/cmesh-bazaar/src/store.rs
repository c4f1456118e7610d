use std::path::Path;

use cmesh_core::{MeshError, MeshResult, Task, TaskId, TaskStatus};

fn storage_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Storage(e.to_string())
}
fn ser_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Serialization(e.to_string())
}

/// Task persistence: one `tasks` sled tree keyed by `task_id`, snapshotted
/// on every mutation so a restart can rehydrate full bazaar state.
pub struct TaskStore {
    _db: sled::Db,
    tasks: sled::Tree,
}

impl TaskStore {
    pub fn open<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let tasks = db.open_tree("tasks").map_err(storage_err)?;
        Ok(Self { _db: db, tasks })
    }

    pub fn put(&self, task: &Task) -> MeshResult<()> {
        let bytes = bincode::serialize(task).map_err(ser_err)?;
        self.tasks.insert(task.task_id.as_str().as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get(&self, task_id: &TaskId) -> MeshResult<Option<Task>> {
        match self.tasks.get(task_id.as_str().as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn all(&self) -> MeshResult<Vec<Task>> {
        let mut out = Vec::new();
        for item in self.tasks.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(ser_err)?);
        }
        Ok(out)
    }

    pub fn with_status(&self, status: TaskStatus) -> MeshResult<Vec<Task>> {
        Ok(self.all()?.into_iter().filter(|t| t.status == status).collect())
    }
}
