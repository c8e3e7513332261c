pub mod models {
    pub mod reading;
}

pub mod classify;
pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod source;
}
pub mod env_file;
pub mod render;
pub mod schema;
pub mod series;
pub mod services {
    pub mod fake_data;
    pub mod history;
    pub mod live;
}

use crate::client::{ReadingSource, SupabaseClient};
use crate::config::{Config, StoreConfig, View};
use crate::db::source::PgReadingSource;
use crate::render::{Presenter, TerminalPresenter};
use crate::services::fake_data::{self, FakeSource};
use crate::services::history;
use crate::services::live::{LiveSettings, LiveView};
use chrono::Utc;
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    view: Option<View>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Command {
    Show(View),
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "q" | "quit" | "exit" => Some(Command::Quit),
            other => other.parse().ok().map(Command::Show),
        }
    }
}

/// A fresh source per view activation; views never share a connection.
/// Only the startup probe connects eagerly to Postgres.
fn open_source(cfg: &Config, eager: bool) -> Result<Box<dyn ReadingSource>, String> {
    match &cfg.store {
        StoreConfig::Postgres { database_url } if eager => PgReadingSource::connect(database_url, cfg.request_timeout)
            .map(|s| Box::new(s) as Box<dyn ReadingSource>),
        StoreConfig::Postgres { database_url } => {
            Ok(Box::new(PgReadingSource::lazy(database_url, cfg.request_timeout)))
        }
        StoreConfig::Rest { url, api_key } => SupabaseClient::new(url, api_key, cfg.request_timeout)
            .map(|s| Box::new(s) as Box<dyn ReadingSource>)
            .map_err(|e| e.to_string()),
        StoreConfig::Fake => Ok(Box::new(FakeSource::new(fake_data::DEFAULT_SEED, Utc::now()))),
    }
}

/// Stdin commands (`l`, `h`, `f`, `q`); the channel closes on EOF.
fn spawn_command_reader() -> Result<Receiver<Command>, String> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!("Unknown command {:?}; use l (live), h (history), f (forecast) or q (quit)", line.trim()),
                }
            }
        })
        .map_err(|e| format!("spawning stdin reader failed: {}", e))?;
    Ok(rx)
}

/// Show `view` until the operator picks another one. `None` means quit.
fn show_view(cfg: &Config, view: View, commands: &Receiver<Command>) -> Result<Option<View>, String> {
    info!("Showing {} view", view);
    match view {
        View::Live => {
            let settings = LiveSettings {
                interval: cfg.refresh_interval,
                zone: cfg.display_tz,
            };
            let live = LiveView::activate(open_source(cfg, false)?, TerminalPresenter::stdout(), settings)
                .map_err(|e| format!("starting live view failed: {}", e))?;
            match commands.recv() {
                Ok(cmd) => {
                    live.deactivate();
                    Ok(next_view(cmd))
                }
                Err(_) => {
                    // stdin closed: keep refreshing until the process is stopped
                    live.wait();
                    Ok(None)
                }
            }
        }
        View::History => {
            let mut source = open_source(cfg, false)?;
            let history = history::build(&mut source, cfg.history_limit, cfg.display_tz);
            TerminalPresenter::stdout()
                .present_history(&history)
                .map_err(|e| format!("rendering history failed: {}", e))?;
            Ok(commands.recv().ok().and_then(next_view))
        }
        View::Forecast => {
            TerminalPresenter::stdout()
                .present_forecast()
                .map_err(|e| format!("rendering forecast failed: {}", e))?;
            Ok(commands.recv().ok().and_then(next_view))
        }
    }
}

fn next_view(cmd: Command) -> Option<View> {
    match cmd {
        Command::Show(view) => Some(view),
        Command::Quit => None,
    }
}

pub fn run(requested_view: Option<View>) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (store={}, refresh_interval={}s, history_limit={}, request_timeout={}s, display_tz={}, default_view={})",
        cfg.store.kind(),
        cfg.refresh_interval.as_duration().as_secs(),
        cfg.history_limit,
        cfg.request_timeout.as_secs(),
        cfg.display_tz,
        cfg.default_view
    );

    // 2) Initialize the store client and check it answers
    let mut probe_source = open_source(&cfg, true).map_err(|e| format!("Store initialization failed: {}", e))?;
    match probe_source.probe() {
        Ok(()) => info!("Store reachable via {}", probe_source.describe()),
        Err(e) if e.is_configuration() => {
            return Err(format!("Store rejected the configured endpoint or credentials: {}", e));
        }
        Err(e) => warn!("Store probe failed ({}); views will keep trying each cycle", e),
    }
    drop(probe_source);

    // 3) Route between views until quit
    let commands = spawn_command_reader()?;
    let mut view = requested_view.unwrap_or(cfg.default_view);
    while let Some(next) = show_view(&cfg, view, &commands)? {
        view = next;
    }
    info!("Exiting");
    Ok(())
}

fn parse_cli_args(args: impl IntoIterator<Item = std::ffi::OsString>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg, None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            let v = match inline_value.clone() {
                Some(v) => v,
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", name))?,
            };
            if v.is_empty() {
                return Err(format!("`{}` requires a value", name));
            }
            Ok(v)
        };

        match flag.as_str() {
            "--env-file" => {
                if parsed.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                parsed.env_file = Some(PathBuf::from(value("--env-file")?));
            }
            "--view" => {
                if parsed.view.is_some() {
                    return Err("`--view` provided more than once".to_string());
                }
                parsed.view = Some(value("--view")?.parse()?);
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    Ok(parsed)
}

fn load_env_from_args(args: &CliArgs) -> Result<Option<(PathBuf, bool)>, String> {
    let (path, explicit) = match &args.env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path.clone(), true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    env_file::load(&path)?;
    Ok(Some((path, explicit)))
}

fn main() {
    let args = match parse_cli_args(std::env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };
    let loaded_env = match load_env_from_args(&args) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some((path, explicit)) = loaded_env.as_ref() {
        let origin = if *explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, path.display());
    }

    info!(
        "aqi-monitor {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(args.view) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
