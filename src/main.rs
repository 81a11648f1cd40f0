mod activity;
mod api;
mod cli;
mod config;
mod dashboard;
mod events;
mod forms;
mod geo;
mod guard;
mod map;
mod models;
mod notify;
mod session;
mod table;

use anyhow::{bail, Result};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "projonmo",
    about = "Terminal client for the Projonmo Foundation reporting platform"
)]
pub struct Args {
    #[arg(short, long, help = "Run one command (e.g. \"/dashboard\") and exit")]
    pub command: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "PROJONMO_API_URL", help = "API base URL (overrides config)")]
    pub api_url: Option<String>,

    #[arg(long, help = "Session file (overrides config)")]
    pub session_file: Option<PathBuf>,

    #[arg(
        long,
        requires = "lng",
        allow_hyphen_values = true,
        help = "Latitude to report instead of looking it up"
    )]
    pub lat: Option<f64>,

    #[arg(
        long,
        requires = "lat",
        allow_hyphen_values = true,
        help = "Longitude to report instead of looking it up"
    )]
    pub lng: Option<f64>,

    #[arg(long, help = "Activity log directory")]
    pub activity_dir: Option<PathBuf>,

    #[arg(long, help = "Enable tracing of commands and guard decisions")]
    pub trace: bool,

    #[arg(long, help = "Verbose output (print form outcomes)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (print settings at startup)")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };

    if let Some(url) = &args.api_url {
        cfg.api.base_url = Some(url.clone());
    }
    if let Some(path) = &args.session_file {
        cfg.session.path = Some(path.clone());
    }
    if let Some(dir) = &args.activity_dir {
        cfg.activity.dir = Some(dir.clone());
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        bail!("Invalid configuration ({} error(s))", errors.len());
    }

    let explicit = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => {
            let loc = models::Location::new(lat, lng);
            if !loc.is_valid() {
                bail!("--lat/--lng out of range: {}", loc);
            }
            Some(loc)
        }
        _ => None,
    };

    if args.debug {
        eprintln!("[DEBUG] API: {}", cfg.api.base_url());
        eprintln!("[DEBUG] Timeout: {}ms", cfg.api.timeout_ms());
        eprintln!("[DEBUG] Session file: {}", cfg.session.path().display());
        eprintln!(
            "[DEBUG] Geolocation: {}",
            if explicit.is_some() {
                "command line"
            } else {
                cfg.geolocation().provider.as_str()
            }
        );
    }

    let root = std::env::current_dir()?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let activity_path = cfg
        .activity_dir(&root)
        .join(format!("{}.jsonl", run_id));
    let activity = Rc::new(activity::ActivityLog::new(&activity_path, &run_id)?);

    let sessions = Rc::new(session::SessionContext::new(session::SessionStore::open(
        &cfg.session.path(),
    )));
    let router = Rc::new(guard::Router::new());
    let bus = events::EventBus::new();
    bus.subscribe(sessions.clone());
    bus.subscribe(router.clone());
    bus.subscribe(activity.clone());

    let api = api::Client::new(
        cfg.api.base_url(),
        Duration::from_millis(cfg.api.timeout_ms()),
    );
    api::ApiClient::set_token(&api, sessions.session().token.as_deref());
    let locator = geo::from_config(&cfg.geolocation(), explicit);

    let trace = args.trace;
    let ctx = cli::Context {
        args,
        config: cfg,
        api: Rc::new(api),
        locator,
        sessions,
        router,
        bus,
        activity,
        run_id,
        tracing: RefCell::new(trace),
        view: RefCell::new(cli::ViewState::default()),
    };

    if let Some(line) = &ctx.args.command {
        cli::run_once(&ctx, line)
    } else {
        cli::run_repl(ctx)
    }
}
