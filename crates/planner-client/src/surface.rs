//! Terminal display surface.
//!
//! Consumes [`UiEvent`]s from the bridge: prints notifications and save
//! results, and replaces the local mirror when remote tasks arrive.

use planner_core::{KeyValueStore, SaveStatus, Subscription, TodoMirror, UiEvent};
use tracing::{debug, warn};

const APP_NAME: &str = "Koci Planner";

pub const SAVE_OK_MESSAGE: &str = "Successfully saved to shared Google Drive file!";

/// What the surface saw while pumping events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SurfaceReport {
    pub authenticated: Option<bool>,
    pub save: Option<SaveStatus>,
    /// Number of tasks received from Drive, if any arrived.
    pub loaded: Option<usize>,
}

/// Prints backend events for a terminal user.
pub struct TerminalSurface<'a, S> {
    mirror: &'a TodoMirror<S>,
    desktop: bool,
}

impl<'a, S: KeyValueStore> TerminalSurface<'a, S> {
    pub fn new(mirror: &'a TodoMirror<S>, desktop: bool) -> Self {
        Self { mirror, desktop }
    }

    /// Handles every event delivered so far.
    pub fn pump(&self, subscription: &mut Subscription) -> SurfaceReport {
        let mut report = SurfaceReport::default();
        for event in subscription.drain() {
            if let Some(line) = self.handle(event, &mut report) {
                println!("{}", line);
                self.notify_desktop(&line);
            }
        }
        report
    }

    /// Applies one event; returns the line to show, if any.
    fn handle(&self, event: UiEvent, report: &mut SurfaceReport) -> Option<String> {
        match event {
            UiEvent::Notification(message) => Some(message),
            UiEvent::AuthenticationStatus(authenticated) => {
                debug!(authenticated, "authentication status changed");
                report.authenticated = Some(authenticated);
                None
            }
            UiEvent::SaveStatus(status) => {
                let line = if status.success {
                    SAVE_OK_MESSAGE.to_string()
                } else {
                    format!(
                        "Error saving to Drive: {}",
                        status.error.as_deref().unwrap_or("unknown error")
                    )
                };
                report.save = Some(status);
                Some(line)
            }
            UiEvent::LoadedTodos(tasks) => {
                report.loaded = Some(tasks.len());
                if let Err(e) = self.mirror.save(&tasks) {
                    warn!(error = %e, "failed to store loaded tasks locally");
                    return Some(format!("Could not store loaded tasks: {}", e));
                }
                None
            }
        }
    }

    fn notify_desktop(&self, message: &str) {
        if !self.desktop {
            return;
        }
        if let Err(e) = notify_rust::Notification::new()
            .summary(APP_NAME)
            .body(message)
            .show()
        {
            debug!(error = %e, "desktop notification failed");
        }
    }
}
