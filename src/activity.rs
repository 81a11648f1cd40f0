//! Append-only JSONL record of what happened during one client run.

use crate::events::{EventBus, SessionEvent, Subscriber};
use crate::guard::Mount;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ActivityLog {
    pub path: PathBuf,
    run_id: String,
    file: RefCell<File>,
    failed: Cell<bool>,
}

#[derive(Serialize)]
struct Entry<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn new(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            file: RefCell::new(file),
            failed: Cell::new(false),
        })
    }

    /// Pass through the first failed write of this run; later ones are dropped
    pub fn first_failure(&self, result: Result<()>) -> Option<anyhow::Error> {
        match result {
            Err(e) if !self.failed.replace(true) => Some(e),
            _ => None,
        }
    }

    pub fn log(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let entry = Entry {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = self.file.borrow_mut();
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    pub fn navigation(&self, mount: &Mount) -> Result<()> {
        if mount.redirected() {
            self.log(
                "guard_redirect",
                json!({
                    "requested": mount.requested.path(),
                    "route": mount.route.path(),
                    "rule": mount.rule,
                    "hard": mount.hard,
                }),
            )
        } else {
            self.log("navigation", json!({ "route": mount.route.path() }))
        }
    }

    pub fn form_submit(&self, form: &str, ok: bool, message: Option<&str>) -> Result<()> {
        self.log(
            "form_submit",
            json!({ "form": form, "ok": ok, "message": message }),
        )
    }

    pub fn admin_action(&self, action: &str, email: &str, ok: bool) -> Result<()> {
        self.log(
            "admin_action",
            json!({ "action": action, "email": email, "ok": ok }),
        )
    }

    pub fn report_solved(&self, id: &str, ok: bool) -> Result<()> {
        self.log("report_solved", json!({ "id": id, "ok": ok }))
    }
}

impl Subscriber for ActivityLog {
    fn on_event(&self, event: &SessionEvent, _bus: &EventBus) {
        let data = match event {
            SessionEvent::SignedIn { email } => json!({ "event": event.kind(), "email": email }),
            SessionEvent::SignedOut => json!({ "event": event.kind() }),
            SessionEvent::AccountBlockToggled { email, blocked } => {
                json!({ "event": event.kind(), "email": email, "blocked": blocked })
            }
            SessionEvent::SessionInvalidated { email } => {
                json!({ "event": event.kind(), "email": email })
            }
        };
        if let Some(e) = self.first_failure(self.log("session_event", data)) {
            eprintln!(
                "Warning: failed to write activity log {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Route;

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_entries_are_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity").join("run.jsonl");
        let log = ActivityLog::new(&path, "run-1").unwrap();

        log.form_submit("login", false, Some("Invalid credentials!"))
            .unwrap();
        log.admin_action("verify", "a@x.org", true).unwrap();

        let entries = lines(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["type"], "form_submit");
        assert_eq!(entries[0]["run_id"], "run-1");
        assert_eq!(entries[0]["message"], "Invalid credentials!");
        assert_eq!(entries[1]["action"], "verify");
        assert!(entries[1]["ts"].is_string());
    }

    #[test]
    fn test_redirect_logged_as_guard_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let log = ActivityLog::new(&path, "run-2").unwrap();

        log.navigation(&Mount {
            route: Route::Login,
            requested: Route::Dashboard,
            hard: false,
            rule: Some("authenticated"),
        })
        .unwrap();
        log.navigation(&Mount {
            route: Route::Home,
            requested: Route::Home,
            hard: false,
            rule: None,
        })
        .unwrap();

        let entries = lines(&path);
        assert_eq!(entries[0]["type"], "guard_redirect");
        assert_eq!(entries[0]["requested"], "/dashboard");
        assert_eq!(entries[0]["rule"], "authenticated");
        assert_eq!(entries[1]["type"], "navigation");
        assert_eq!(entries[1]["route"], "/");
    }

    #[test]
    fn test_only_first_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(&dir.path().join("run.jsonl"), "run-4").unwrap();

        assert!(log.first_failure(Ok(())).is_none());
        let first = log.first_failure(Err(anyhow::anyhow!("disk full")));
        assert_eq!(first.map(|e| e.to_string()).as_deref(), Some("disk full"));
        assert!(log
            .first_failure(Err(anyhow::anyhow!("disk full")))
            .is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_surfaces() {
        let log = ActivityLog::new(Path::new("/dev/full"), "run-5").unwrap();
        let result = log.report_solved("r1", true);
        assert!(log.first_failure(result).is_some());
        assert!(log.first_failure(log.report_solved("r1", true)).is_none());
    }

    #[test]
    fn test_session_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let bus = EventBus::new();
        let log = std::rc::Rc::new(ActivityLog::new(&path, "run-3").unwrap());
        bus.subscribe(log.clone());

        bus.publish(SessionEvent::SessionInvalidated {
            email: Some("a@x.org".to_string()),
        });

        let entries = lines(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["type"], "session_event");
        assert_eq!(entries[0]["event"], "session_invalidated");
    }
}
