//! Remote execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::types::{LogLink, State};

/// Events emitted while a remote task runs
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Create is about to be sent
    Creating {
        task: String,
        task_type: String,
        asynchronous: bool,
    },
    /// Inputs were uploaded to the staging area
    InputsStaged { task: String, remote_path: String },
    /// Backend accepted the work
    Created { task: String, completed: bool },
    /// A status poll returned
    Polled {
        task: String,
        state: State,
        attempt: u32,
    },
    /// Terminal state reached
    Finished {
        task: String,
        state: State,
        message: String,
        log_links: Vec<LogLink>,
    },
    /// Outputs are being read from the staging area
    ReadingStagedOutputs { task: String, remote_path: String },
    /// Interrupt received, delete dispatched
    CleanupScheduled { task: String },
    /// Delete returned (or failed)
    CleanupFinished { task: String, confirmed: bool },
}

/// Trait for reporting remote execution progress
pub trait LifecycleReporter: Send + Sync {
    /// Handle a lifecycle event
    fn report(&self, event: &LifecycleEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl LifecycleReporter for TracingReporter {
    fn report(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Creating {
                task,
                task_type,
                asynchronous,
            } => {
                tracing::info!(task = %task, task_type = %task_type, asynchronous, "creating remote task");
            }
            LifecycleEvent::InputsStaged { task, remote_path } => {
                tracing::debug!(task = %task, remote = %remote_path, "inputs staged");
            }
            LifecycleEvent::Created { task, completed } => {
                tracing::info!(task = %task, completed, "remote task created");
            }
            LifecycleEvent::Polled {
                task,
                state,
                attempt,
            } => {
                tracing::debug!(task = %task, state = %state, attempt, "polled remote task");
            }
            LifecycleEvent::Finished {
                task,
                state,
                message,
                log_links,
            } => {
                if *state == State::Succeeded {
                    tracing::info!(task = %task, state = %state, message = %message, "remote task finished");
                } else {
                    tracing::error!(task = %task, state = %state, message = %message, "remote task finished");
                }
                for link in log_links {
                    tracing::info!(task = %task, "{}", link);
                }
            }
            LifecycleEvent::ReadingStagedOutputs { task, remote_path } => {
                tracing::info!(task = %task, remote = %remote_path, "no inline outputs, reading staged outputs");
            }
            LifecycleEvent::CleanupScheduled { task } => {
                tracing::warn!(task = %task, "interrupted, deleting remote task");
            }
            LifecycleEvent::CleanupFinished { task, confirmed } => {
                if *confirmed {
                    tracing::info!(task = %task, "remote task deleted");
                } else {
                    tracing::warn!(task = %task, "remote task delete not confirmed");
                }
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of `Polled` events seen
    pub fn poll_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, LifecycleEvent::Polled { .. }))
            .count()
    }
}

impl LifecycleReporter for CollectingReporter {
    fn report(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Terminal spinner shown while a remote task runs
///
/// The spinner is transient: it is cleared on the terminal state and
/// replaced by a summary line plus log links.
pub struct ProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
    target: fn() -> ProgressDrawTarget,
}

impl ProgressReporter {
    /// Draw to stderr
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            target: ProgressDrawTarget::stderr,
        }
    }

    /// Never draw (for tests and non-interactive runs)
    pub fn hidden() -> Self {
        Self {
            bar: Mutex::new(None),
            target: ProgressDrawTarget::hidden,
        }
    }

    /// Whether a spinner is currently active
    pub fn is_active(&self) -> bool {
        self.bar.lock().map(|b| b.is_some()).unwrap_or(false)
    }

    fn start(&self, task: &str) {
        let bar = ProgressBar::with_draw_target(None, (self.target)());
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.set_message(format!("Running Task {}...", task));
        bar.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn finish(&self, lines: Vec<String>) {
        let bar = self.bar.lock().ok().and_then(|mut slot| slot.take());
        match bar {
            Some(bar) => {
                for line in lines {
                    bar.println(line);
                }
                bar.finish_and_clear();
            }
            None => {
                for line in lines {
                    eprintln!("{}", line);
                }
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleReporter for ProgressReporter {
    fn report(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Created {
                task,
                completed: false,
            } => self.start(task),
            LifecycleEvent::Polled { task, state, .. } => {
                if let Ok(slot) = self.bar.lock() {
                    if let Some(bar) = slot.as_ref() {
                        bar.set_message(format!("Running Task {}... ({})", task, state));
                    }
                }
            }
            LifecycleEvent::Finished {
                state,
                message,
                log_links,
                ..
            } => {
                let mut lines = vec![format!("Task state: {}, State message: {}", state, message)];
                lines.extend(log_links.iter().map(LogLink::to_string));
                self.finish(lines);
            }
            LifecycleEvent::CleanupFinished { .. } => self.finish(Vec::new()),
            _ => {}
        }
    }
}

/// Registry of lifecycle reporters
pub struct ReporterRegistry {
    reporters: Vec<Arc<dyn LifecycleReporter>>,
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: LifecycleReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_arc(&mut self, reporter: Arc<dyn LifecycleReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn LifecycleReporter>] {
        &self.reporters
    }
}

impl Default for ReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleReporter for ReporterRegistry {
    /// Broadcast an event to all registered reporters
    fn report(&self, event: &LifecycleEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(task: &str) -> LifecycleEvent {
        LifecycleEvent::Finished {
            task: task.to_string(),
            state: State::Succeeded,
            message: "done".to_string(),
            log_links: vec![LogLink::new("dashboard", "https://dash/1")],
        }
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        reporter.report(&LifecycleEvent::Polled {
            task: "t".to_string(),
            state: State::Running,
            attempt: 1,
        });
        reporter.report(&finished("t"));

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.poll_count(), 1);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&LifecycleEvent::CleanupScheduled {
            task: "t".to_string(),
        });
        reporter.report(&finished("t"));
    }

    #[test]
    fn test_progress_reporter_lifecycle() {
        let reporter = ProgressReporter::hidden();
        reporter.report(&LifecycleEvent::Created {
            task: "t".to_string(),
            completed: false,
        });
        assert!(reporter.is_active());

        reporter.report(&LifecycleEvent::Polled {
            task: "t".to_string(),
            state: State::Running,
            attempt: 1,
        });
        assert!(reporter.is_active());

        reporter.report(&finished("t"));
        assert!(!reporter.is_active());
    }

    #[test]
    fn test_progress_reporter_skips_completed_creates() {
        let reporter = ProgressReporter::hidden();
        reporter.report(&LifecycleEvent::Created {
            task: "t".to_string(),
            completed: true,
        });
        assert!(!reporter.is_active());
    }

    #[test]
    fn test_registry_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = ReporterRegistry::empty();
        registry.register_arc(collecting.clone());
        registry.register(TracingReporter);

        registry.report(&LifecycleEvent::CleanupScheduled {
            task: "t".to_string(),
        });

        assert_eq!(registry.all().len(), 2);
        assert_eq!(collecting.events().len(), 1);
    }
}
