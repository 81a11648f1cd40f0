//! Route guarding and navigation.
//!
//! Each route declares the capability it needs. Access is decided by a small
//! policy table walked in order; the first rule that denies wins and names
//! the redirect target. A blocked session is torn down before the table is
//! consulted.

use crate::events::{EventBus, SessionEvent, Subscriber};
use crate::session::{Session, SessionContext};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Register,
    Login,
    Report,
    NotVerified,
    Dashboard,
    Profile,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Home,
        Route::Register,
        Route::Login,
        Route::Report,
        Route::NotVerified,
        Route::Dashboard,
        Route::Profile,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Register => "/register",
            Self::Login => "/login",
            Self::Report => "/report",
            Self::NotVerified => "/not-verified",
            Self::Dashboard => "/dashboard",
            Self::Profile => "/profile",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        Self::ALL.into_iter().find(|r| r.path() == path)
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Dashboard => Capability::Admin,
            Self::Profile => Capability::VerifiedUser,
            _ => Capability::None,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// What a route requires of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    None,
    Admin,
    VerifiedUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Render,
    Redirect(Route),
    /// Blocked session: clear it and hard-redirect to login
    ForceLogout,
}

struct Rule {
    name: &'static str,
    applies: fn(Capability) -> bool,
    denies: fn(&Session) -> bool,
    redirect: Route,
}

fn any_guarded(cap: Capability) -> bool {
    cap != Capability::None
}

fn needs_admin(cap: Capability) -> bool {
    cap == Capability::Admin
}

fn needs_verified(cap: Capability) -> bool {
    cap == Capability::VerifiedUser
}

fn no_token(s: &Session) -> bool {
    !s.is_authenticated()
}

fn not_admin(s: &Session) -> bool {
    !s.is_admin()
}

fn not_verified(s: &Session) -> bool {
    !s.is_verified
}

/// Ordered by priority
const POLICY: &[Rule] = &[
    Rule {
        name: "authenticated",
        applies: any_guarded,
        denies: no_token,
        redirect: Route::Login,
    },
    Rule {
        name: "admin",
        applies: needs_admin,
        denies: not_admin,
        redirect: Route::Home,
    },
    Rule {
        name: "verifiedUser",
        applies: needs_verified,
        denies: not_verified,
        redirect: Route::NotVerified,
    },
];

/// Decide whether `session` may mount a view requiring `capability`
/// Returns (Decision, Option<rule_name>)
pub fn evaluate(capability: Capability, session: &Session) -> (Decision, Option<&'static str>) {
    if capability == Capability::None {
        return (Decision::Render, None);
    }

    if session.is_blocked {
        return (Decision::ForceLogout, Some("blocked"));
    }

    for rule in POLICY {
        if (rule.applies)(capability) && (rule.denies)(session) {
            return (Decision::Redirect(rule.redirect), Some(rule.name));
        }
    }

    (Decision::Render, None)
}

/// Result of a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Route actually mounted
    pub route: Route,
    pub requested: Route,
    /// Full remount: view state dropped, session reloaded
    pub hard: bool,
    pub rule: Option<&'static str>,
}

impl Mount {
    pub fn redirected(&self) -> bool {
        self.route != self.requested
    }
}

pub struct Router {
    current: Cell<Route>,
    history: RefCell<Vec<Route>>,
    remount: Cell<bool>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            current: Cell::new(Route::Home),
            history: RefCell::new(Vec::new()),
            remount: Cell::new(false),
        }
    }

    pub fn current(&self) -> Route {
        self.current.get()
    }

    pub fn history(&self) -> Vec<Route> {
        self.history.borrow().clone()
    }

    /// Navigate to `target`, evaluating its guard exactly once
    pub fn navigate(&self, target: Route, sessions: &SessionContext, bus: &EventBus) -> Mount {
        let session = sessions.session();
        let (decision, rule) = evaluate(target.capability(), &session);

        match decision {
            Decision::Render => {
                self.push(target);
                Mount {
                    route: target,
                    requested: target,
                    hard: false,
                    rule,
                }
            }
            Decision::Redirect(to) => {
                self.push(to);
                Mount {
                    route: to,
                    requested: target,
                    hard: false,
                    rule,
                }
            }
            Decision::ForceLogout => {
                // Our own subscription performs the hard redirect
                sessions.invalidate(bus, session.email);
                if self.current() != Route::Login {
                    self.hard_redirect(Route::Login);
                }
                Mount {
                    route: Route::Login,
                    requested: target,
                    hard: true,
                    rule,
                }
            }
        }
    }

    /// Client-side route change
    pub fn push(&self, route: Route) {
        self.history.borrow_mut().push(self.current.get());
        self.current.set(route);
    }

    /// Full reload at `route`: history is dropped and views must remount
    pub fn hard_redirect(&self, route: Route) {
        self.history.borrow_mut().clear();
        self.current.set(route);
        self.remount.set(true);
    }

    /// Whether a hard redirect happened since the last call
    pub fn take_remount(&self) -> bool {
        self.remount.replace(false)
    }
}

impl Subscriber for Router {
    fn on_event(&self, event: &SessionEvent, _bus: &EventBus) {
        if let SessionEvent::SessionInvalidated { .. } = event {
            self.hard_redirect(Route::Login);
        }
    }
}
