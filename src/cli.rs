use crate::{
    activity::ActivityLog,
    api::{server_message, ApiClient},
    config::{Config, CONFIG_DIR},
    dashboard::{Dashboard, RemoveAction},
    events::{EventBus, SessionEvent},
    forms::{
        login::LoginForm, register::RegistrationForm, report::ReportForm, Field, Form, Outcome,
    },
    geo::Locator,
    guard::{Mount, Route, Router},
    map::{self, MapView, SolveForm},
    models::Report,
    notify::Notice,
    session::SessionContext,
    Args,
};
use anyhow::Result;
use rustyline::completion::Completer;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{ColorMode, DefaultEditor, Editor, Helper};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Write};
use std::rc::Rc;

pub struct Context {
    pub args: Args,
    pub config: Config,
    pub api: Rc<dyn ApiClient>,
    pub locator: Box<dyn Locator>,
    pub sessions: Rc<SessionContext>,
    pub router: Rc<Router>,
    pub bus: EventBus,
    pub activity: Rc<ActivityLog>,
    pub run_id: String,
    pub tracing: RefCell<bool>,
    /// State of the mounted view; dropped on every hard redirect
    pub view: RefCell<ViewState>,
}

#[derive(Default)]
pub struct ViewState {
    pub dashboard: Option<Dashboard>,
    /// Reports shown on the profile map
    pub reports: Option<Vec<Report>>,
}

/// Source of form input
pub trait Prompt {
    /// None when input ended
    fn ask(&mut self, field: &Field) -> Option<String>;
}

/// Reads answers line by line from stdin; secret fields are masked
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, field: &Field) -> Option<String> {
        if let Some(hint) = field.hint {
            println!("  {}", hint);
        }
        if field.secret {
            return read_masked(&format!("{}: ", field.label));
        }
        print!("{}: ", field.label);
        io::stdout().flush().ok();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

/// Draws every typed character as `*`
struct Masked;

impl Highlighter for Masked {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Completer for Masked {
    type Candidate = String;
}

impl Hinter for Masked {
    type Hint = String;
}

impl Validator for Masked {}

impl Helper for Masked {}

fn read_masked(label: &str) -> Option<String> {
    let mut rl = match Editor::<Masked, DefaultHistory>::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Input error: {}", e);
            return None;
        }
    };
    rl.set_helper(Some(Masked));
    rl.set_color_mode(ColorMode::Forced);
    rl.set_auto_add_history(false);

    match rl.readline(label) {
        Ok(line) => Some(line),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => None,
        Err(e) => {
            eprintln!("Input error: {}", e);
            None
        }
    }
}

fn trace(ctx: &Context, label: &str, content: &str) {
    if *ctx.tracing.borrow() {
        eprintln!("[TRACE:{}] {}", label, content);
    }
}

fn verbose(ctx: &Context, message: &str) {
    if ctx.args.verbose || ctx.args.debug {
        eprintln!("[VERBOSE] {}", message);
    }
}

/// Activity logging never aborts a command
fn record(ctx: &Context, result: Result<()>) {
    if let Some(e) = ctx.activity.first_failure(result) {
        verbose(
            ctx,
            &format!(
                "failed to write activity log {}: {}",
                ctx.activity.path.display(),
                e
            ),
        );
    }
}

pub fn run_once(ctx: &Context, line: &str) -> Result<()> {
    let mut prompt = StdinPrompt;
    handle_command(ctx, line, &mut prompt);
    settle(ctx);
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = dirs::home_dir().map(|h| h.join(CONFIG_DIR).join("history.txt"));
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }
    let mut prompt = StdinPrompt;

    println!("projonmo - type /help for commands, /exit to quit");
    let start = ctx.router.current();
    go(&ctx, start, &[], &mut prompt);
    settle(&ctx);

    loop {
        match rl.readline(&format!("{} > ", ctx.router.current())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !carries_secret(line) {
                    rl.add_history_entry(line)?;
                }

                if handle_command(&ctx, line, &mut prompt) {
                    break;
                }
                settle(&ctx);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }
    Ok(())
}

/// Whether `line` has an inline value for a secret form field
fn carries_secret(line: &str) -> bool {
    let secrets: Vec<&str> = LoginForm::default()
        .fields()
        .iter()
        .chain(RegistrationForm::default().fields())
        .filter(|f| f.secret)
        .map(|f| f.name)
        .collect();
    line.split_whitespace().any(|word| {
        let word = word.trim_start_matches(['\'', '"']);
        word.split_once('=')
            .is_some_and(|(key, _)| secrets.contains(&key))
    })
}

/// Finish a hard redirect: drop mounted view state and re-read the session
fn settle(ctx: &Context) {
    if !ctx.router.take_remount() {
        return;
    }
    ctx.sessions.reload();
    *ctx.view.borrow_mut() = ViewState::default();
    ctx.api.set_token(ctx.sessions.session().token.as_deref());
    verbose(ctx, "hard redirect: view state dropped, session reloaded");
    Notice::info(format!(
        "Your session has ended. Now at {}; use /login to sign in again.",
        ctx.router.current()
    ))
    .show();
}

pub fn handle_command(ctx: &Context, line: &str, prompt: &mut dyn Prompt) -> bool {
    if !line.starts_with('/') {
        println!("Commands start with '/'. Type /help for a list.");
        return false;
    }
    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => {
            println!("Could not parse command: {}", e);
            return false;
        }
    };
    let Some((cmd, args)) = words.split_first() else {
        return false;
    };
    trace(ctx, "command", &format!("{} {:?}", cmd, args));

    match cmd.as_str() {
        "/exit" | "/quit" => return true,
        "/help" => print_help(),
        "/home" => go(ctx, Route::Home, args, prompt),
        "/register" => go(ctx, Route::Register, args, prompt),
        "/login" => go(ctx, Route::Login, args, prompt),
        "/report" => go(ctx, Route::Report, args, prompt),
        "/profile" => go(ctx, Route::Profile, args, prompt),
        "/dashboard" => go(ctx, Route::Dashboard, args, prompt),
        "/not-verified" => go(ctx, Route::NotVerified, args, prompt),
        "/logout" => logout(ctx),
        "/users" => with_dashboard(ctx, |d| println!("{}", d.render_users())),
        "/reports" => with_dashboard(ctx, |d| println!("{}", d.render_reports())),
        "/map" => show_map(ctx, args.first().map(String::as_str)),
        "/verify" | "/decline" | "/delete" | "/block" => admin_action(ctx, &cmd[1..], args),
        "/solve" => solve(ctx, args, prompt),
        "/session" => {
            println!("Run: {}", ctx.run_id);
            match ctx.sessions.path() {
                Some(path) => println!("Session file: {}", path.display()),
                None => println!("Session file: (memory only)"),
            }
            println!("Activity log: {}", ctx.activity.path.display());
            let history: Vec<String> = ctx
                .router
                .history()
                .iter()
                .map(|r| r.to_string())
                .collect();
            println!(
                "Route: {} (back: {})",
                ctx.router.current(),
                if history.is_empty() {
                    "-".to_string()
                } else {
                    history.join(" ")
                }
            );
            let entries = ctx.sessions.describe();
            if entries.is_empty() {
                println!("Not signed in");
            }
            for (key, value) in entries {
                println!("  {}: {}", key, value);
            }
        }
        "/config" => match toml::to_string_pretty(&ctx.config) {
            Ok(text) => {
                println!("API: {}", ctx.config.api.base_url());
                println!(
                    "Geolocation: {}",
                    ctx.config.geolocation().provider.as_str()
                );
                println!("{}", text);
            }
            Err(e) => eprintln!("Failed to render config: {}", e),
        },
        "/trace" => {
            let mut t = ctx.tracing.borrow_mut();
            *t = !*t;
            println!("Tracing: {}", if *t { "on" } else { "off" });
        }
        _ => println!("Unknown command: {}", cmd),
    }
    false
}

fn print_help() {
    println!("Navigation:");
    println!("  /home                - welcome screen");
    println!("  /register [f=v ...]  - create an account");
    println!("  /login [f=v ...]     - sign in");
    println!("  /report [f=v ...]    - submit an emergency report");
    println!("  /profile             - your profile and the report map");
    println!("  /dashboard           - admin dashboard");
    println!("  /not-verified        - verification status");
    println!("  /logout              - sign out");
    println!("Dashboard:");
    println!("  /users               - pending and verified users");
    println!("  /reports             - report table");
    println!("  /map [users|reports] - markers with map links");
    println!("  /verify <email>      - verify a pending user");
    println!("  /decline <email>     - decline a pending user");
    println!("  /delete <email>      - delete a verified user");
    println!("  /block <email>       - block or unblock a user");
    println!("  /solve <id> [solution] [solver] - mark a report solved");
    println!("Other:");
    println!("  /session             - show stored session keys");
    println!("  /config              - show effective configuration");
    println!("  /trace               - toggle tracing");
    println!("  /help, /exit");
    println!("Form fields may be given inline as name=value; the rest are prompted.");
}

/// Navigate to `route` and mount whatever view the guard allows
fn go(ctx: &Context, route: Route, args: &[String], prompt: &mut dyn Prompt) {
    let mount = ctx.router.navigate(route, &ctx.sessions, &ctx.bus);
    record(ctx, ctx.activity.navigation(&mount));
    if let Some(rule) = mount.rule {
        trace(
            ctx,
            "guard",
            &format!("{} denied by '{}', mounted {}", mount.requested, rule, mount.route),
        );
    }
    if mount.hard {
        return;
    }

    // Inline field values only apply to the view that was asked for
    let args = if mount.redirected() { &[][..] } else { args };
    show(ctx, &mount, args, prompt);
}

fn show(ctx: &Context, mount: &Mount, args: &[String], prompt: &mut dyn Prompt) {
    match mount.route {
        Route::Home => {
            println!("Welcome to Projonmo Foundation");
            println!("Register first; an admin reviews new accounts within 24 hours.");
            println!("Once verified, sign in with /login. Anyone may file a /report.");
        }
        Route::NotVerified => {
            println!("You are not verified");
            println!("Please wait for admin verification. This usually takes 24 hours.");
        }
        Route::Register => {
            let mut form = RegistrationForm::default();
            if fill_form(&mut form, args, prompt) {
                let outcome = form.submit(ctx.api.as_ref(), ctx.locator.as_ref());
                finish(ctx, form.name(), outcome, prompt);
            }
        }
        Route::Login => {
            let mut form = LoginForm::default();
            if fill_form(&mut form, args, prompt) {
                let outcome =
                    form.submit(ctx.api.as_ref(), ctx.locator.as_ref(), &ctx.sessions, &ctx.bus);
                finish(ctx, form.name(), outcome, prompt);
            }
        }
        Route::Report => {
            let mut form = ReportForm::default();
            if fill_form(&mut form, args, prompt) {
                let outcome = form.submit(ctx.api.as_ref(), ctx.locator.as_ref());
                finish(ctx, form.name(), outcome, prompt);
            }
        }
        Route::Dashboard => {
            let (dashboard, notices) = Dashboard::load(ctx.api.as_ref());
            for notice in &notices {
                notice.show();
            }
            println!("{}", dashboard.render_users());
            println!("{}", dashboard.render_reports());
            ctx.view.borrow_mut().dashboard = Some(dashboard);
        }
        Route::Profile => {
            println!("Congratulations! Your account has been successfully verified.");
            match ctx.api.reports() {
                Ok(resp) => {
                    let view = MapView::new(&ctx.config.map, &resp.all_reports);
                    println!("{}", view.render("Reports"));
                    ctx.view.borrow_mut().reports = Some(resp.all_reports);
                }
                Err(e) => Notice::error(format!(
                    "Error fetching reports: {}",
                    server_message(&e).map(String::from).unwrap_or_else(|| e.to_string())
                ))
                .show(),
            }
        }
    }
}

/// Apply inline `name=value` pairs, then prompt for every other wanted field.
/// Returns false if the form should not be submitted.
pub fn fill_form(form: &mut dyn Form, args: &[String], prompt: &mut dyn Prompt) -> bool {
    let mut given = HashSet::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            println!("Expected name=value, got '{}'", arg);
            return false;
        };
        if !form.set(key, value) {
            let names: Vec<&str> = form.fields().iter().map(|f| f.name).collect();
            println!("Unknown field '{}'. Fields: {}", key, names.join(", "));
            return false;
        }
        given.insert(key.to_string());
    }

    for field in form.fields() {
        if given.contains(field.name) || !form.wants(field.name) {
            continue;
        }
        match prompt.ask(field) {
            Some(value) => {
                form.set(field.name, &value);
            }
            None => {
                println!("Cancelled");
                return false;
            }
        }
    }
    true
}

fn finish(ctx: &Context, form: &str, outcome: Outcome, prompt: &mut dyn Prompt) {
    record(
        ctx,
        ctx.activity
            .form_submit(form, outcome.is_success(), outcome.message()),
    );
    verbose(ctx, &format!("{} form: {:?}", form, outcome));

    match outcome {
        Outcome::Invalid(errors) => {
            for error in errors {
                Notice::error(error.to_string()).show();
            }
        }
        Outcome::Failed(message) => Notice::error(message).show(),
        Outcome::Submitted(notice) => notice.show(),
        Outcome::Redirect(route, notice) => {
            if let Some(notice) = notice {
                notice.show();
            }
            go(ctx, route, &[], prompt);
        }
    }
}

fn logout(ctx: &Context) {
    if let Err(e) = ctx.sessions.sign_out() {
        Notice::error(format!("Could not sign out: {}", e)).show();
        return;
    }
    ctx.api.set_token(None);
    ctx.bus.publish(SessionEvent::SignedOut);
    *ctx.view.borrow_mut() = ViewState::default();
    ctx.router.push(Route::Login);
    record(
        ctx,
        ctx.activity.navigation(&Mount {
            route: Route::Login,
            requested: Route::Login,
            hard: false,
            rule: None,
        }),
    );
    Notice::info("Signed out").show();
}

fn with_dashboard(ctx: &Context, f: impl FnOnce(&mut Dashboard)) {
    let mut view = ctx.view.borrow_mut();
    match (ctx.router.current(), view.dashboard.as_mut()) {
        (Route::Dashboard, Some(dashboard)) => f(dashboard),
        _ => println!("Open /dashboard first"),
    }
}

fn show_map(ctx: &Context, which: Option<&str>) {
    if ctx.router.current() == Route::Profile {
        match (which, ctx.view.borrow().reports.as_deref()) {
            (None | Some("reports"), Some(reports)) => {
                println!("{}", MapView::new(&ctx.config.map, reports).render("Reports"));
            }
            _ => println!("Usage on /profile: /map [reports]"),
        }
        return;
    }

    with_dashboard(ctx, |d| match which {
        None | Some("reports") => {
            println!("{}", MapView::new(&ctx.config.map, d.reports()).render("Reports"));
        }
        Some("users") => {
            println!("{}", MapView::new(&ctx.config.map, d.users()).render("Users"));
        }
        Some(other) => println!("Unknown map '{}'. Use: users, reports", other),
    });
}

fn admin_action(ctx: &Context, action: &str, args: &[String]) {
    let Some(email) = args.first() else {
        println!("Usage: /{} <email>", action);
        return;
    };
    let api = ctx.api.as_ref();

    with_dashboard(ctx, |d| {
        let notice = match action {
            "verify" => d.verify(api, email),
            "decline" => d.remove(api, email, RemoveAction::Decline),
            "delete" => d.remove(api, email, RemoveAction::Delete),
            _ => d.toggle_block(api, &ctx.bus, email),
        };
        record(ctx, ctx.activity.admin_action(action, email, !notice.is_error()));
        notice.show();
    });
}

fn solve(ctx: &Context, args: &[String], prompt: &mut dyn Prompt) {
    let Some(id) = args.first() else {
        println!("Usage: /solve <id> [solution] [solver]");
        return;
    };
    let route = ctx.router.current();
    if !matches!(route, Route::Dashboard | Route::Profile) {
        println!("Open /dashboard or /profile first");
        return;
    }

    let mut form = SolveForm::default();
    let mut inline = Vec::new();
    if let Some(solution) = args.get(1) {
        inline.push(format!("solution={}", solution));
    }
    if let Some(solver) = args.get(2) {
        inline.push(format!("solverName={}", solver));
    }
    if !fill_form(&mut form, &inline, prompt) {
        return;
    }

    let mut view = ctx.view.borrow_mut();
    let notice = match route {
        Route::Dashboard => match view.dashboard.as_mut() {
            Some(dashboard) => dashboard.solve(ctx.api.as_ref(), id, &form),
            None => Notice::error("Open /dashboard first"),
        },
        _ => match view.reports.as_mut() {
            Some(reports) => map::solve_report(ctx.api.as_ref(), reports, id, &form),
            None => Notice::error("Open /profile first"),
        },
    };
    drop(view);

    record(ctx, ctx.activity.report_solved(id, !notice.is_error()));
    notice.show();
}
