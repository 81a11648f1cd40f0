//! Admin dashboard.
//!
//! Local state only changes after the server has confirmed a mutation. A
//! failed call leaves the tables exactly as they were.

use crate::api::{server_message, ApiClient, BlockUpdate, ReportsResponse};
use crate::events::{EventBus, SessionEvent};
use crate::map::{self, SolveForm};
use crate::models::{Report, User};
use crate::notify::Notice;
use crate::table;

/// Figures shown above the report table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: u64,
    pub last_24_hours: u64,
    pub unsolved: u64,
}

impl ReportSummary {
    fn from_response(resp: &ReportsResponse) -> Self {
        Self {
            total: resp.total(),
            last_24_hours: resp.last_24_hours(),
            unsolved: resp.all_reports.iter().filter(|r| !r.is_solved).count() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveAction {
    Decline,
    Delete,
}

impl RemoveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decline => "decline",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Default)]
pub struct Dashboard {
    users: Vec<User>,
    reports: Vec<Report>,
    summary: ReportSummary,
}

impl Dashboard {
    pub fn new(users: Vec<User>, reports: Vec<Report>) -> Self {
        let summary = ReportSummary {
            total: reports.len() as u64,
            last_24_hours: 0,
            unsolved: reports.iter().filter(|r| !r.is_solved).count() as u64,
        };
        Self {
            users,
            reports,
            summary,
        }
    }

    /// Fetch users and reports; either may fail without affecting the other
    pub fn load(api: &dyn ApiClient) -> (Self, Vec<Notice>) {
        let mut notices = Vec::new();

        let users = match api.users() {
            Ok(users) => users,
            Err(e) => {
                notices.push(fetch_failed("users", &e));
                Vec::new()
            }
        };

        let dashboard = match api.reports() {
            Ok(resp) => {
                let summary = ReportSummary::from_response(&resp);
                let mut dashboard = Self::new(users, resp.all_reports);
                dashboard.summary = summary;
                dashboard
            }
            Err(e) => {
                notices.push(fetch_failed("reports", &e));
                Self::new(users, Vec::new())
            }
        };

        (dashboard, notices)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Admin records, shown apart from the managed users
    pub fn admins(&self) -> Vec<&User> {
        self.users.iter().filter(|u| u.is_admin()).collect()
    }

    /// Non-admin users awaiting verification
    pub fn pending(&self) -> Vec<&User> {
        self.users
            .iter()
            .filter(|u| !u.is_admin() && !u.is_verified)
            .collect()
    }

    /// Non-admin users already verified
    pub fn verified(&self) -> Vec<&User> {
        self.users
            .iter()
            .filter(|u| !u.is_admin() && u.is_verified)
            .collect()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Mark a report solved, keeping the unsolved count in step
    pub fn solve(&mut self, api: &dyn ApiClient, id: &str, form: &SolveForm) -> Notice {
        let notice = map::solve_report(api, &mut self.reports, id, form);
        if !notice.is_error() {
            self.summary.unsolved = self.summary.unsolved.saturating_sub(1);
        }
        notice
    }

    pub fn summary(&self) -> ReportSummary {
        self.summary
    }

    fn find(&self, email: &str) -> Option<usize> {
        let email = email.trim();
        self.users
            .iter()
            .position(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn unknown(email: &str) -> Notice {
        Notice::error(format!("No user with email {}", email.trim()))
    }

    fn failed(action: &str, err: &anyhow::Error) -> Notice {
        match server_message(err) {
            Some(msg) => Notice::error(format!("Failed to {} user: {}", action, msg)),
            None => Notice::error(format!("Failed to {} user", action)),
        }
    }

    pub fn verify(&mut self, api: &dyn ApiClient, email: &str) -> Notice {
        let Some(idx) = self.find(email) else {
            return Self::unknown(email);
        };
        let email = self.users[idx].email.clone();

        match api.verify_user(&email) {
            Ok(()) => {
                self.users[idx].is_verified = true;
                Notice::success(format!("{} verified", email))
            }
            Err(e) => Self::failed("verify", &e),
        }
    }

    /// Decline (pending table) and delete (verified table) both remove the account
    pub fn remove(&mut self, api: &dyn ApiClient, email: &str, action: RemoveAction) -> Notice {
        let Some(idx) = self.find(email) else {
            return Self::unknown(email);
        };
        let email = self.users[idx].email.clone();

        match api.delete_user(&email) {
            Ok(()) => {
                self.users.remove(idx);
                match action {
                    RemoveAction::Decline => Notice::success(format!("{} declined", email)),
                    RemoveAction::Delete => Notice::success(format!("{} deleted", email)),
                }
            }
            Err(e) => Self::failed(action.as_str(), &e),
        }
    }

    /// Flip the block state of `email`; on success announce it on the bus so
    /// a session belonging to that account is torn down
    pub fn toggle_block(&mut self, api: &dyn ApiClient, bus: &EventBus, email: &str) -> Notice {
        let Some(idx) = self.find(email) else {
            return Self::unknown(email);
        };
        let email = self.users[idx].email.clone();
        let update = BlockUpdate::toggle(self.users[idx].is_blocked);
        let action = if update.is_blocked { "block" } else { "unblock" };

        match api.block_user(&email, &update) {
            Ok(()) => {
                let user = &mut self.users[idx];
                user.is_blocked = update.is_blocked;
                user.is_verified = update.is_verified;
                bus.publish(SessionEvent::AccountBlockToggled {
                    email: email.clone(),
                    blocked: update.is_blocked,
                });
                Notice::success(format!("{} {}ed", email, action))
            }
            Err(e) => Self::failed(action, &e),
        }
    }

    pub fn render_users(&self) -> String {
        let mut out = String::new();

        for admin in self.admins() {
            out.push_str(&format!("Admin: {} <{}>\n\n", admin.name, admin.email));
        }

        let pending = self.pending();
        out.push_str(&format!("Pending verification ({})\n", pending.len()));
        out.push_str(&user_table(&pending));
        out.push('\n');

        let verified = self.verified();
        out.push_str(&format!("Verified users ({})\n", verified.len()));
        out.push_str(&user_table(&verified));
        out
    }

    pub fn render_reports(&self) -> String {
        let s = self.summary;
        let mut out = format!(
            "Reports: {} total, {} in the last 24 hours, {} unsolved\n",
            s.total, s.last_24_hours, s.unsolved
        );
        let rows: Vec<Vec<String>> = self
            .reports
            .iter()
            .map(|r| {
                vec![
                    r.id.clone(),
                    table::truncate(&r.name, 24),
                    r.mobile_number.clone(),
                    table::truncate(r.cause_label(), 28),
                    r.created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                    if r.is_solved {
                        format!("solved by {}", r.solver_name.as_deref().unwrap_or("?"))
                    } else {
                        "open".to_string()
                    },
                ]
            })
            .collect();
        out.push_str(&table::render(
            &["ID", "Name", "Mobile", "Cause", "Created", "Status"],
            &rows,
        ));
        out
    }
}

fn fetch_failed(what: &str, err: &anyhow::Error) -> Notice {
    let detail = server_message(err)
        .map(String::from)
        .unwrap_or_else(|| err.to_string());
    Notice::error(format!("Error fetching {}: {}", what, detail))
}

fn user_table(users: &[&User]) -> String {
    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|u| {
            vec![
                table::truncate(&u.name, 24),
                u.email.clone(),
                table::truncate(&u.institution, 24),
                u.designation.clone(),
                u.mobile_number.clone(),
                if u.is_blocked { "blocked" } else { "" }.to_string(),
            ]
        })
        .collect();
    table::render(
        &["Name", "Email", "Institution", "Designation", "Mobile", ""],
        &rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::api::LoginResponse;
    use crate::guard::{Route, Router};
    use crate::models::{Location, Role};
    use crate::session::{SessionContext, SessionStore};
    use std::rc::Rc;

    fn user(email: &str, role: Role, verified: bool, blocked: bool) -> User {
        User {
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            institution: "Dhaka Medical".to_string(),
            location: Some(Location::new(23.7, 90.4)),
            mobile_number: "01712345678".to_string(),
            designation: "Midwife".to_string(),
            role,
            is_verified: verified,
            is_blocked: blocked,
        }
    }

    fn sample_users() -> Vec<User> {
        vec![
            user("admin@x.org", Role::Admin, true, false),
            user("p1@x.org", Role::User, false, false),
            user("v1@x.org", Role::User, true, false),
            user("p2@x.org", Role::User, false, true),
            user("v2@x.org", Role::User, true, false),
        ]
    }

    fn loaded(api: &MockApi) -> Dashboard {
        let (dashboard, notices) = Dashboard::load(api);
        assert!(notices.is_empty());
        dashboard
    }

    #[test]
    fn test_partition_covers_every_user_once() {
        let users: Vec<User> = sample_users()
            .into_iter()
            .filter(|u| !u.is_admin())
            .collect();
        let dashboard = Dashboard::new(users.clone(), Vec::new());
        let pending = dashboard.pending();
        let verified = dashboard.verified();

        for u in &users {
            let in_pending = pending.iter().any(|p| p.email == u.email);
            let in_verified = verified.iter().any(|v| v.email == u.email);
            assert!(in_pending ^ in_verified, "{} must be in exactly one list", u.email);
            assert_eq!(in_verified, u.is_verified);
        }
        assert_eq!(pending.len() + verified.len(), users.len());
    }

    #[test]
    fn test_admin_listed_separately() {
        let dashboard = Dashboard::new(sample_users(), Vec::new());
        let admins = dashboard.admins();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "admin@x.org");
        assert!(dashboard.pending().iter().all(|u| !u.is_admin()));
        assert!(dashboard.verified().iter().all(|u| !u.is_admin()));
        assert!(dashboard.render_users().contains("Admin: admin <admin@x.org>"));
    }

    #[test]
    fn test_load_is_independent() {
        let api = MockApi::with_users(sample_users());
        *api.fail_users.borrow_mut() = true;
        api.reports.borrow_mut().push(Report {
            id: "r1".to_string(),
            name: "Asha".to_string(),
            mobile_number: "01812345678".to_string(),
            address: "Mirpur".to_string(),
            cause: "Food Assistance".to_string(),
            other_cause: None,
            location: Location::new(23.8, 90.36),
            created_at: None,
            is_solved: false,
            solution: None,
            solver_name: None,
        });

        let (dashboard, notices) = Dashboard::load(&api);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Error fetching users"));
        assert!(dashboard.users().is_empty());
        assert_eq!(dashboard.reports().len(), 1);
        assert_eq!(dashboard.summary().unsolved, 1);
    }

    #[test]
    fn test_verify_after_confirmation() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);

        let notice = dashboard.verify(&api, "p1@x.org");
        assert!(!notice.is_error());
        assert!(dashboard.verified().iter().any(|u| u.email == "p1@x.org"));
        assert_eq!(api.calls.borrow().last().unwrap(), "verify p1@x.org");
    }

    #[test]
    fn test_failed_verify_leaves_state() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);

        api.fail_with(500, Some("Database unavailable"));
        let notice = dashboard.verify(&api, "p1@x.org");
        assert!(notice.is_error());
        assert!(notice.message.contains("Database unavailable"));
        assert!(dashboard.pending().iter().any(|u| u.email == "p1@x.org"));

        *api.mutation_body.borrow_mut() = r#"{"success":false}"#.to_string();
        let notice = dashboard.verify(&api, "p1@x.org");
        assert!(notice.is_error());
        assert!(dashboard.pending().iter().any(|u| u.email == "p1@x.org"));
    }

    #[test]
    fn test_decline_and_delete_remove() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);

        let notice = dashboard.remove(&api, "p1@x.org", RemoveAction::Decline);
        assert_eq!(notice.message, "p1@x.org declined");
        let notice = dashboard.remove(&api, "V1@x.org", RemoveAction::Delete);
        assert_eq!(notice.message, "v1@x.org deleted");
        assert_eq!(dashboard.users().len(), 3);
        assert_eq!(
            api.calls.borrow()[2..].to_vec(),
            vec!["delete p1@x.org".to_string(), "delete v1@x.org".to_string()]
        );
    }

    #[test]
    fn test_failed_delete_keeps_user() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);
        api.fail_with(404, None);
        let notice = dashboard.remove(&api, "v2@x.org", RemoveAction::Delete);
        assert_eq!(notice.message, "Failed to delete user");
        assert_eq!(dashboard.users().len(), 5);
    }

    #[test]
    fn test_unknown_email_not_sent() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);
        let calls = api.calls.borrow().len();
        let notice = dashboard.verify(&api, "ghost@x.org");
        assert!(notice.is_error());
        assert_eq!(api.calls.borrow().len(), calls);
    }

    #[test]
    fn test_toggle_block_flips_verification() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);
        let bus = EventBus::new();

        dashboard.toggle_block(&api, &bus, "v1@x.org");
        let v1 = dashboard.users().iter().find(|u| u.email == "v1@x.org").unwrap();
        assert!(v1.is_blocked);
        assert!(!v1.is_verified);
        assert!(dashboard.pending().iter().any(|u| u.email == "v1@x.org"));

        dashboard.toggle_block(&api, &bus, "v1@x.org");
        let v1 = dashboard.users().iter().find(|u| u.email == "v1@x.org").unwrap();
        assert!(!v1.is_blocked);
        assert!(v1.is_verified);
    }

    #[test]
    fn test_toggle_block_on_own_account_logs_out() {
        for body in [r#"{"success":true}"#, r#"{"message":"ok"}"#, "", "updated"] {
            let api = MockApi::with_users(sample_users());
            *api.mutation_body.borrow_mut() = body.to_string();
            let mut dashboard = loaded(&api);

            let bus = EventBus::new();
            let sessions = Rc::new(SessionContext::new(SessionStore::in_memory()));
            let router = Rc::new(Router::new());
            bus.subscribe(sessions.clone());
            bus.subscribe(router.clone());
            sessions
                .sign_in(
                    "admin@x.org",
                    &LoginResponse {
                        token: "t".to_string(),
                        role: Role::Admin,
                        is_verified: true,
                        is_blocked: false,
                    },
                )
                .unwrap();
            router.push(Route::Dashboard);

            let notice = dashboard.toggle_block(&api, &bus, "admin@x.org");

            assert!(!notice.is_error(), "body {:?}", body);
            assert!(sessions.describe().is_empty(), "body {:?}", body);
            assert_eq!(router.current(), Route::Login);
            assert!(router.take_remount());
        }
    }

    #[test]
    fn test_toggle_block_other_account_keeps_session() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);
        let bus = EventBus::new();
        let sessions = Rc::new(SessionContext::new(SessionStore::in_memory()));
        let router = Rc::new(Router::new());
        bus.subscribe(sessions.clone());
        bus.subscribe(router.clone());
        sessions
            .sign_in(
                "admin@x.org",
                &LoginResponse {
                    token: "t".to_string(),
                    role: Role::Admin,
                    is_verified: true,
                    is_blocked: false,
                },
            )
            .unwrap();
        router.push(Route::Dashboard);

        dashboard.toggle_block(&api, &bus, "v2@x.org");
        assert!(sessions.session().is_authenticated());
        assert_eq!(router.current(), Route::Dashboard);
        assert!(!router.take_remount());
    }

    #[test]
    fn test_solve_updates_unsolved_count() {
        let api = MockApi::new();
        let report = Report {
            id: "r1".to_string(),
            name: "Asha".to_string(),
            mobile_number: "01812345678".to_string(),
            address: "Mirpur".to_string(),
            cause: "Financial Help".to_string(),
            other_cause: None,
            location: Location::new(23.8, 90.36),
            created_at: None,
            is_solved: false,
            solution: None,
            solver_name: None,
        };
        let mut dashboard = Dashboard::new(Vec::new(), vec![report]);
        assert_eq!(dashboard.summary().unsolved, 1);

        let form = SolveForm {
            solution: "Funds released".to_string(),
            solver_name: "Nasrin".to_string(),
        };
        assert!(!dashboard.solve(&api, "r1", &form).is_error());
        assert_eq!(dashboard.summary().unsolved, 0);
        assert!(dashboard.reports()[0].is_solved);
        assert!(dashboard.render_reports().contains("solved by Nasrin"));

        assert!(dashboard.solve(&api, "r1", &form).is_error());
        assert_eq!(dashboard.summary().unsolved, 0);
    }

    #[test]
    fn test_failed_toggle_publishes_nothing() {
        let api = MockApi::with_users(sample_users());
        let mut dashboard = loaded(&api);
        let bus = EventBus::new();
        let sessions = Rc::new(SessionContext::new(SessionStore::in_memory()));
        bus.subscribe(sessions.clone());
        sessions
            .sign_in(
                "admin@x.org",
                &LoginResponse {
                    token: "t".to_string(),
                    role: Role::Admin,
                    is_verified: true,
                    is_blocked: false,
                },
            )
            .unwrap();

        api.fail_with(403, Some("Forbidden"));
        let notice = dashboard.toggle_block(&api, &bus, "admin@x.org");
        assert!(notice.is_error());
        assert!(sessions.session().is_authenticated());
        let admin = &dashboard.admins()[0];
        assert!(!admin.is_blocked);
    }
}
