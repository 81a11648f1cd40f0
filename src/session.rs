//! Persistent session state.
//!
//! `SessionStore` is a flat string key/value map written through to a JSON
//! file on every change, the on-disk counterpart of browser local storage.
//! `SessionContext` is the only way the rest of the client reads or changes
//! it.

use crate::api::LoginResponse;
use crate::events::{EventBus, SessionEvent, Subscriber};
use crate::models::Role;
use anyhow::{Context as _, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const TOKEN: &str = "token";
pub const ROLE: &str = "role";
pub const IS_VERIFIED: &str = "isVerified";
pub const IS_BLOCKED: &str = "isBlocked";
pub const EMAIL: &str = "email";

#[derive(Debug, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl SessionStore {
    /// Open the store backed by `path`; a missing or unreadable file is empty
    pub fn open(path: &Path) -> Self {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            values: BTreeMap::new(),
        };
        store.reload();
        store
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file, discarding in-memory values
    pub fn reload(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        self.values = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                eprintln!(
                    "Warning: ignoring unreadable session file {}: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_all(&[(key, value)])
    }

    /// Write several keys at once; on failure nothing changes
    pub fn set_all(&mut self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut values = self.values.clone();
        for (key, value) in pairs {
            values.insert(key.to_string(), value.to_string());
        }
        self.replace(values)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.replace(BTreeMap::new())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Persist `values`, then adopt them
    fn replace(&mut self, values: BTreeMap<String, String>) -> Result<()> {
        self.persist(&values)?;
        self.values = values;
        Ok(())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session file {}", path.display()))?;
        Ok(())
    }
}

/// Typed snapshot of the stored session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub role: Option<Role>,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub email: Option<String>,
}

impl Session {
    fn from_store(store: &SessionStore) -> Self {
        Self {
            token: store
                .get(TOKEN)
                .filter(|t| !t.is_empty())
                .map(String::from),
            role: store.get(ROLE).map(Role::parse),
            is_verified: store.get(IS_VERIFIED) == Some("true"),
            is_blocked: store.get(IS_BLOCKED) == Some("true"),
            email: store.get(EMAIL).map(String::from),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

pub struct SessionContext {
    store: RefCell<SessionStore>,
}

impl SessionContext {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store: RefCell::new(store),
        }
    }

    pub fn session(&self) -> Session {
        Session::from_store(&self.store.borrow())
    }

    /// Record a successful login
    pub fn sign_in(&self, email: &str, login: &LoginResponse) -> Result<()> {
        self.store.borrow_mut().set_all(&[
            (TOKEN, &login.token),
            (ROLE, login.role.as_str()),
            (IS_VERIFIED, bool_str(login.is_verified)),
            (IS_BLOCKED, bool_str(login.is_blocked)),
            (EMAIL, email),
        ])
    }

    /// Drop every session key
    pub fn sign_out(&self) -> Result<()> {
        self.store.borrow_mut().clear()
    }

    /// Tear the session down without the user asking and announce it
    pub fn invalidate(&self, bus: &EventBus, email: Option<String>) {
        if let Err(e) = self.sign_out() {
            eprintln!("Warning: failed to clear session: {}", e);
        }
        bus.publish(SessionEvent::SessionInvalidated { email });
    }

    /// Pick up changes made to the backing file
    pub fn reload(&self) {
        self.store.borrow_mut().reload();
    }

    /// Whether `email` is the account signed in on this client
    pub fn owns(&self, email: &str) -> bool {
        let session = self.session();
        session.is_authenticated()
            && session
                .email
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(email.trim()))
    }

    /// Stored keys for display, with the token shortened
    pub fn describe(&self) -> Vec<(String, String)> {
        self.store
            .borrow()
            .entries()
            .map(|(k, v)| {
                let shown = if k == TOKEN && v.chars().count() > 12 {
                    format!("{}…", v.chars().take(12).collect::<String>())
                } else {
                    v.to_string()
                };
                (k.to_string(), shown)
            })
            .collect()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.store.borrow().path().map(Path::to_path_buf)
    }
}

impl Subscriber for SessionContext {
    fn on_event(&self, event: &SessionEvent, bus: &EventBus) {
        if let SessionEvent::AccountBlockToggled { email, .. } = event {
            if self.owns(email) {
                self.invalidate(bus, Some(email.clone()));
            }
        }
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn login(role: Role, verified: bool, blocked: bool) -> LoginResponse {
        LoginResponse {
            token: "tok-123".to_string(),
            role,
            is_verified: verified,
            is_blocked: blocked,
        }
    }

    #[test]
    fn test_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut store = SessionStore::open(&path);
        assert!(store.entries().next().is_none());
        store.set(TOKEN, "abc").unwrap();
        store.set(ROLE, "admin").unwrap();

        let reopened = SessionStore::open(&path);
        assert_eq!(reopened.get(TOKEN), Some("abc"));
        assert_eq!(reopened.get(ROLE), Some("admin"));
    }

    #[test]
    fn test_store_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = SessionStore::open(&path);
        store.set(TOKEN, "abc").unwrap();
        store.clear().unwrap();
        assert!(store.get(TOKEN).is_none());
        assert!(SessionStore::open(&path).entries().next().is_none());
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SessionStore::open(&path).entries().next().is_none());
    }

    #[test]
    fn test_sign_in_writes_typed_session() {
        let ctx = SessionContext::new(SessionStore::in_memory());
        ctx.sign_in("rina@example.com", &login(Role::User, true, false))
            .unwrap();

        let session = ctx.session();
        assert_eq!(session.token.as_deref(), Some("tok-123"));
        assert_eq!(session.role, Some(Role::User));
        assert!(session.is_verified);
        assert!(!session.is_blocked);
        assert!(ctx.owns("RINA@example.com"));
        assert!(!ctx.owns("other@example.com"));
    }

    #[test]
    fn test_sign_out_clears_all_keys() {
        let ctx = SessionContext::new(SessionStore::in_memory());
        ctx.sign_in("a@x.org", &login(Role::Admin, true, false)).unwrap();
        ctx.sign_out().unwrap();
        assert_eq!(ctx.session(), Session::default());
        assert!(ctx.describe().is_empty());
    }

    #[test]
    fn test_describe_shortens_token() {
        let ctx = SessionContext::new(SessionStore::in_memory());
        let mut resp = login(Role::User, false, false);
        resp.token = "abcdefghijklmnopqrstuvwxyz".to_string();
        ctx.sign_in("a@x.org", &resp).unwrap();
        let token = ctx
            .describe()
            .into_iter()
            .find(|(k, _)| k == TOKEN)
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(token, "abcdefghijkl…");
    }

    #[test]
    fn test_failed_write_leaves_session_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let ctx = SessionContext::new(SessionStore::open(&blocker.join("session.json")));

        assert!(ctx
            .sign_in("a@x.org", &login(Role::Admin, true, false))
            .is_err());
        assert_eq!(ctx.session(), Session::default());
        assert!(ctx.describe().is_empty());
    }

    #[test]
    fn test_failed_clear_keeps_memory_in_step_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let ctx = SessionContext::new(SessionStore::open(&path));
        ctx.sign_in("a@x.org", &login(Role::Admin, true, true)).unwrap();

        // Swap the file for a directory so the next write fails
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(ctx.sign_out().is_err());
        assert_eq!(ctx.session().email.as_deref(), Some("a@x.org"));
        assert!(ctx.session().is_blocked);
    }

    #[test]
    fn test_block_of_own_account_invalidates() {
        let bus = EventBus::new();
        let ctx = Rc::new(SessionContext::new(SessionStore::in_memory()));
        ctx.sign_in("a@x.org", &login(Role::Admin, true, false)).unwrap();
        bus.subscribe(ctx.clone());

        bus.publish(SessionEvent::AccountBlockToggled {
            email: "someone@else.org".to_string(),
            blocked: true,
        });
        assert!(ctx.session().is_authenticated());

        bus.publish(SessionEvent::AccountBlockToggled {
            email: "a@x.org".to_string(),
            blocked: true,
        });
        assert!(!ctx.session().is_authenticated());
        assert!(ctx.describe().is_empty());
    }
}
