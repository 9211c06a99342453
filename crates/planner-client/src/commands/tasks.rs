//! Local task commands.
//!
//! Each command loads the mirror, applies one edit and writes it back.

use planner_core::{KeyValueStore, Task, TaskList, TodoMirror};

use crate::error::ClientResult;

fn edit<S, F>(mirror: &TodoMirror<S>, apply: F) -> ClientResult<Task>
where
    S: KeyValueStore,
    F: FnOnce(&mut TaskList) -> ClientResult<Task>,
{
    let mut list = TaskList::from_tasks(mirror.load());
    let task = apply(&mut list)?;
    mirror.save(list.as_slice())?;
    Ok(task)
}

/// Appends a task made of the given words.
pub fn add<S: KeyValueStore>(mirror: &TodoMirror<S>, words: &[String]) -> ClientResult<Task> {
    let text = words.join(" ");
    let task = edit(mirror, |list| Ok(list.add(&text)?.clone()))?;
    println!("Added {}: {}", task.id, task.text);
    Ok(task)
}

/// Renders one task line.
pub fn format_task(task: &Task) -> String {
    let mark = if task.is_checked { "x" } else { " " };
    format!("[{}] {}  {}", mark, task.id, task.text)
}

/// Prints the tasks in stored order.
pub fn list<S: KeyValueStore>(mirror: &TodoMirror<S>, json: bool) -> ClientResult<()> {
    let tasks = TaskList::from_tasks(mirror.load());

    if json {
        let out = serde_json::to_string_pretty(tasks.as_slice())
            .map_err(|e| crate::error::ClientError::Store(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for task in &tasks {
        println!("{}", format_task(task));
    }
    println!();
    println!("{} of {} done", tasks.checked_count(), tasks.len());
    Ok(())
}

pub fn set_checked<S: KeyValueStore>(
    mirror: &TodoMirror<S>,
    id: &str,
    checked: bool,
) -> ClientResult<Task> {
    let task = edit(mirror, |list| Ok(list.set_checked(id, checked)?.clone()))?;
    println!("{}", format_task(&task));
    Ok(task)
}

pub fn toggle<S: KeyValueStore>(mirror: &TodoMirror<S>, id: &str) -> ClientResult<Task> {
    let task = edit(mirror, |list| Ok(list.toggle(id)?.clone()))?;
    println!("{}", format_task(&task));
    Ok(task)
}

pub fn delete<S: KeyValueStore>(mirror: &TodoMirror<S>, id: &str) -> ClientResult<Task> {
    let task = edit(mirror, |list| Ok(list.remove(id)?))?;
    println!("Deleted {}: {}", task.id, task.text);
    Ok(task)
}
