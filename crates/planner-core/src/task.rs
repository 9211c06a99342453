//! Task model and the ordered task list.
//!
//! A [`Task`] serializes with the same keys the Drive file and the local
//! mirror use: `text`, `isChecked` and `id`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for time-derived task ids.
pub const TASK_ID_PREFIX: &str = "todo-";

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// The task text as typed by the user.
    pub text: String,
    /// Whether the task has been checked off.
    #[serde(rename = "isChecked")]
    pub is_checked: bool,
    /// Unique, time-derived identifier (`todo-<unix millis>`).
    pub id: String,
}

impl Task {
    /// Creates an unchecked task.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_checked: false,
            id: id.into(),
        }
    }

    /// Builder method to set the checked state.
    pub fn with_checked(mut self, is_checked: bool) -> Self {
        self.is_checked = is_checked;
        self
    }
}

/// Errors from editing a [`TaskList`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The text was empty or whitespace only.
    #[error("task text is empty")]
    EmptyText,

    /// No task carries the given id.
    #[error("no task with id {0}")]
    NotFound(String),
}

/// Ordered list of tasks.
///
/// Order is insertion order and is what gets persisted; there is no separate
/// rank field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing sequence of tasks, keeping its order.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Appends a new unchecked task and returns it.
    ///
    /// Whitespace-only input is rejected. The stored text is kept verbatim.
    pub fn add(&mut self, text: &str) -> Result<&Task, TaskError> {
        if text.trim().is_empty() {
            return Err(TaskError::EmptyText);
        }

        let id = self.next_id(Utc::now().timestamp_millis());
        let index = self.tasks.len();
        self.tasks.push(Task::new(id, text));
        Ok(&self.tasks[index])
    }

    /// Returns a fresh id derived from `millis`, bumped until unused.
    fn next_id(&self, mut millis: i64) -> String {
        loop {
            let id = format!("{TASK_ID_PREFIX}{millis}");
            if self.get(&id).is_none() {
                return id;
            }
            millis += 1;
        }
    }

    /// Returns the task with the given id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Sets the checked state of a task.
    pub fn set_checked(&mut self, id: &str, is_checked: bool) -> Result<&Task, TaskError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        task.is_checked = is_checked;
        Ok(task)
    }

    /// Flips the checked state of a task.
    pub fn toggle(&mut self, id: &str) -> Result<&Task, TaskError> {
        let current = self
            .get(id)
            .map(|t| t.is_checked)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        self.set_checked(id, !current)
    }

    /// Removes a task and returns it.
    pub fn remove(&mut self, id: &str) -> Result<Task, TaskError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        Ok(self.tasks.remove(index))
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the list has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of checked tasks.
    pub fn checked_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_checked).count()
    }

    /// Iterates tasks in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Borrows the tasks as a slice.
    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serializes_with_drive_keys() {
        let task = Task::new("todo-1", "Buy milk");
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(json, r#"{"text":"Buy milk","isChecked":false,"id":"todo-1"}"#);
    }

    #[test]
    fn task_list_snapshot() {
        let list = TaskList::from_tasks(vec![
            Task::new("todo-1", "Buy milk"),
            Task::new("todo-2", "Feed the cat").with_checked(true),
        ]);

        insta::assert_json_snapshot!(list.as_slice(), @r#"
        [
          {
            "text": "Buy milk",
            "isChecked": false,
            "id": "todo-1"
          },
          {
            "text": "Feed the cat",
            "isChecked": true,
            "id": "todo-2"
          }
        ]
        "#);
    }

    #[test]
    fn add_rejects_blank_text() {
        let mut list = TaskList::new();
        assert_eq!(list.add("   ").unwrap_err(), TaskError::EmptyText);
        assert_eq!(list.add("").unwrap_err(), TaskError::EmptyText);
        assert!(list.is_empty());
    }

    #[test]
    fn add_keeps_text_and_generates_unique_ids() {
        let mut list = TaskList::new();
        let first = list.add("Buy milk").unwrap().clone();
        let second = list.add("Buy milk").unwrap().clone();

        assert!(first.id.starts_with(TASK_ID_PREFIX));
        assert_ne!(first.id, second.id);
        assert_eq!(first.text, "Buy milk");
        assert!(!first.is_checked);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn next_id_skips_taken_ids() {
        let list = TaskList::from_tasks(vec![
            Task::new("todo-100", "a"),
            Task::new("todo-101", "b"),
        ]);
        assert_eq!(list.next_id(100), "todo-102");
        assert_eq!(list.next_id(50), "todo-50");
    }

    #[test]
    fn toggle_and_set_checked() {
        let mut list = TaskList::from_tasks(vec![Task::new("todo-1", "a")]);

        assert!(list.toggle("todo-1").unwrap().is_checked);
        assert!(!list.toggle("todo-1").unwrap().is_checked);
        assert!(list.set_checked("todo-1", true).unwrap().is_checked);
        assert_eq!(list.checked_count(), 1);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut list = TaskList::new();
        assert_eq!(
            list.toggle("todo-9").unwrap_err(),
            TaskError::NotFound("todo-9".to_string())
        );
        assert!(list.remove("todo-9").is_err());
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let mut list = TaskList::from_tasks(vec![
            Task::new("todo-1", "a"),
            Task::new("todo-2", "b"),
            Task::new("todo-3", "c"),
        ]);

        let removed = list.remove("todo-2").unwrap();
        assert_eq!(removed.text, "b");

        let ids: Vec<_> = list.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["todo-1", "todo-3"]);
    }
}
