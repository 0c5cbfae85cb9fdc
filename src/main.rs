pub mod models {
    pub mod device;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod state;
pub mod utils;
pub mod services {
    pub mod connectivity;
    pub mod dispatch;
    pub mod sync;
    pub mod telemetry;
}

use std::path::PathBuf;

use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, error, info, warn};

use crate::client::DeviceClient;
use crate::config::Config;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::dispatch;
use crate::services::sync::Synchronizer;
use crate::services::telemetry::TelemetryMirror;
use crate::state::AppState;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (device={}, poll_interval={}ms, probe_interval={}ms, auto_reconnect={}, alert_policy={:?})",
        cfg.endpoint.api_base(),
        cfg.poll_interval.as_millis(),
        cfg.probe_interval.as_millis(),
        cfg.auto_reconnect,
        cfg.alert_policy,
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;

    // 4) Client identity: a stable UUID generated locally, never device-reported
    let device_id = utils::load_or_create_device_id(&cfg.device_id_file)?;
    info!("Device identity {}", device_id);

    // 5) Build the state containers and services
    let client = DeviceClient::new(&cfg.endpoint);
    let monitor = ConnectivityMonitor::new(cfg.probe_interval);
    let mut synchronizer = Synchronizer::new(cfg.poll_interval);
    let mut mirror = TelemetryMirror::new(device_id, cfg.alert_policy);
    let mut state = AppState::default();

    // 6) Connect, apply startup intents once, then poll until the link drops;
    //    reconnect forever unless auto-reconnect is off.
    let mut first_connect = true;
    loop {
        monitor.wait_until_ready(&client, &mut state);

        if first_connect {
            first_connect = false;
            apply_startup_intents(&cfg, &client, &mut state);
            log_device_events(&client);
        }

        synchronizer.run_loop(&mut conn, &client, &monitor, &mut mirror, &mut state);

        if !cfg.auto_reconnect {
            info!("Connectivity lost and auto-reconnect is disabled; shutting down");
            return Ok(());
        }
        info!("Connectivity lost; re-entering probe loop");
    }
}

/// Push the configured one-shot intents through the dispatcher. Failures are
/// surfaced and dropped, exactly like a user-issued command would be.
fn apply_startup_intents(cfg: &Config, client: &DeviceClient, state: &mut AppState) {
    if let (Some(ssid), Some(password)) = (cfg.station_ssid.as_deref(), cfg.station_password.as_deref()) {
        if let Err(e) = dispatch::provision_station(client, state, ssid, password) {
            warn!("Startup station provisioning failed: {}", e);
        }
    }
    if let Some(setpoint) = cfg.startup_setpoint {
        if let Err(e) = dispatch::apply_setpoint(client, state, setpoint, true) {
            warn!("Startup setpoint failed: {}", e);
        }
    }
    if let Some(mode) = cfg.startup_fan_mode {
        if let Err(e) = dispatch::apply_mode(client, state, mode) {
            warn!("Startup fan mode failed: {}", e);
        }
    }
}

/// Surface the device's own on-flash event log once per session.
fn log_device_events(client: &DeviceClient) {
    match client.events() {
        Ok(events) => {
            info!("Device reports {} stored event(s)", events.len());
            if let Some(latest) = events.last() {
                debug!(
                    "Most recent device event: type={:?} code={:?} description={:?}",
                    latest.event_type, latest.event_code, latest.description
                );
            }
        }
        Err(e) => warn!("Reading device event log failed: {}", e),
    }
}

fn configure_env_from_cli() -> Result<Option<PathBuf>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let Some(s) = arg.to_str() else {
            return Err("argument contains invalid UTF-8".to_string());
        };
        match s {
            "--env-file" => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            _ if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path = &s["--env-file=".len()..];
                if path.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path));
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    if let Some(path) = env_file {
        config::load_env_file(&path)?;
        Ok(Some(path))
    } else {
        let default_path = PathBuf::from(".env");
        if default_path.is_file() {
            config::load_env_file(&default_path)?;
            Ok(Some(default_path))
        } else {
            Ok(None)
        }
    }
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(path) => path,
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

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "purifier-bridge {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
