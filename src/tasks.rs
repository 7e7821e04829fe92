//! Tasks - the owner's to-do list, live-synced across clients.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{ChangeEvent, SyncedCollection};
use crate::error::SyncError;
use crate::feed::ChangeFeed;
use crate::record::Row;
use crate::remote::{RemoteStore, TablesExt};
use crate::session::SessionContext;
use crate::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "tasks")]
pub struct Task {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Serialize)]
struct TaskPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
}

/// The current owner's tasks.
///
/// Each write is applied to the local cache as soon as the server answers;
/// the feed's echo of the same write is then a no-op.
pub struct TaskList<S> {
    collection: SyncedCollection<S, Task>,
}

impl<S: RemoteStore + ChangeFeed> TaskList<S> {
    pub fn open(ctx: &SessionContext<S>) -> Result<Self, SyncError> {
        Ok(Self {
            collection: SyncedCollection::open(ctx)?,
        })
    }

    pub fn collection(&self) -> &SyncedCollection<S, Task> {
        &self.collection
    }

    /// Tasks, newest first.
    pub fn tasks(&self) -> Result<Arc<Vec<Row<Task>>>, SyncError> {
        self.collection.snapshot()
    }

    /// Number of tasks not yet completed.
    pub fn remaining(&self) -> Result<usize, SyncError> {
        Ok(self.tasks()?.iter().filter(|t| !t.data.completed).count())
    }

    pub fn add(&self, title: &str, description: Option<&str>) -> Result<Row<Task>, SyncError> {
        let title = checked_title(title)?;
        let task = Task {
            title: title.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            completed: false,
        };
        let row = self
            .collection
            .store()
            .table::<Task>()
            .insert(self.collection.owner_id(), &task)?;
        self.collection.apply_local(ChangeEvent::Insert(row.clone()))?;
        Ok(row)
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> Result<Row<Task>, SyncError> {
        self.patch(
            id,
            &TaskPatch {
                title: None,
                completed: Some(completed),
            },
        )
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<Row<Task>, SyncError> {
        let title = checked_title(title)?;
        self.patch(
            id,
            &TaskPatch {
                title: Some(title),
                completed: None,
            },
        )
    }

    pub fn remove(&self, id: &str) -> Result<(), SyncError> {
        let tasks = self.collection.store().table::<Task>();
        tasks.require_owned(self.collection.owner_id(), id)?;
        tasks.delete(id)?;
        self.collection
            .apply_local(ChangeEvent::Delete(id.to_string()))?;
        Ok(())
    }

    /// Apply changes from other clients. See `SyncedCollection::pump`.
    pub fn pump(&self) -> Result<usize, SyncError> {
        self.collection.pump()
    }

    pub fn wait(&self, timeout: Duration) -> Result<usize, SyncError> {
        self.collection.wait(timeout)
    }

    pub fn close(&self) -> bool {
        self.collection.close()
    }

    fn patch(&self, id: &str, patch: &TaskPatch<'_>) -> Result<Row<Task>, SyncError> {
        let tasks = self.collection.store().table::<Task>();
        tasks.require_owned(self.collection.owner_id(), id)?;
        let row = tasks.update(id, patch)?;
        self.collection.apply_local(ChangeEvent::Update(row.clone()))?;
        Ok(row)
    }
}

fn checked_title(title: &str) -> Result<&str, SyncError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SyncError::validation("task title is required"));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::remote::InMemoryRemoteStore;
    use crate::session::Session;

    fn list() -> (SessionContext<InMemoryRemoteStore>, TaskList<InMemoryRemoteStore>) {
        let ctx = SessionContext::new(
            InMemoryRemoteStore::new(),
            Config::default(),
            Session::signed_in("alice"),
        );
        let tasks = TaskList::open(&ctx).unwrap();
        (ctx, tasks)
    }

    #[test]
    fn add_shows_up_immediately_and_once() {
        let (_ctx, tasks) = list();
        let row = tasks.add("  Buy milk ", Some("2 liters")).unwrap();
        assert_eq!(row.data.title, "Buy milk");

        assert_eq!(tasks.tasks().unwrap().len(), 1);
        assert_eq!(tasks.pump().unwrap(), 1);
        assert_eq!(tasks.tasks().unwrap().len(), 1);
    }

    #[test]
    fn complete_rename_remove() {
        let (_ctx, tasks) = list();
        let first = tasks.add("one", None).unwrap();
        tasks.add("two", None).unwrap();
        assert_eq!(tasks.remaining().unwrap(), 2);

        tasks.set_completed(&first.id, true).unwrap();
        assert_eq!(tasks.remaining().unwrap(), 1);

        tasks.rename(&first.id, "uno").unwrap();
        let snapshot = tasks.tasks().unwrap();
        assert_eq!(snapshot[1].data.title, "uno");
        assert!(snapshot[1].data.completed);

        tasks.remove(&first.id).unwrap();
        tasks.pump().unwrap();
        let titles: Vec<_> = tasks
            .tasks()
            .unwrap()
            .iter()
            .map(|t| t.data.title.clone())
            .collect();
        assert_eq!(titles, vec!["two"]);
    }

    #[test]
    fn blank_titles_are_rejected() {
        let (ctx, tasks) = list();
        assert!(matches!(tasks.add("   ", None), Err(SyncError::Validation(_))));
        assert!(ctx.store().is_empty("tasks"));
    }

    #[test]
    fn missing_task_is_not_found() {
        let (_ctx, tasks) = list();
        assert_eq!(
            tasks.set_completed("ghost", true).unwrap_err(),
            SyncError::not_found("tasks", "ghost")
        );
        assert_eq!(
            tasks.remove("ghost").unwrap_err(),
            SyncError::not_found("tasks", "ghost")
        );
    }

    #[test]
    fn other_owners_tasks_are_out_of_reach() {
        let (alice_ctx, alice) = list();
        let task = alice.add("pay rent", None).unwrap();

        let bob_ctx = SessionContext::new(
            alice_ctx.store().clone(),
            Config::default(),
            Session::signed_in("bob"),
        );
        let bob = TaskList::open(&bob_ctx).unwrap();
        let missing = SyncError::not_found("tasks", &task.id);

        assert_eq!(bob.set_completed(&task.id, true).unwrap_err(), missing);
        assert_eq!(bob.rename(&task.id, "mine now").unwrap_err(), missing);
        assert_eq!(bob.remove(&task.id).unwrap_err(), missing);

        alice.pump().unwrap();
        let kept = alice.tasks().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].data.title, "pay rent");
        assert!(!kept[0].data.completed);
    }
}
