//! Core types: tasks, local store, session state, UI event bridge

pub mod bridge;
pub mod session;
pub mod store;
pub mod task;
pub mod tracing;

pub use bridge::{EventBridge, SaveStatus, Subscription, UiCommand, UiEvent};
pub use session::{AuthPhase, SessionState, SharedSession, TransitionError, new_shared_session};
pub use store::{
    FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult, TODOS_KEY, TodoMirror,
};
pub use task::{Task, TaskError, TaskList};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
