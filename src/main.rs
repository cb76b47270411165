use media_node::cli::Args;
use media_node::node::{AppSettings, CommandRunner, Displays, Instances, NodeSettings, SystemCommand};
use media_node::paths::{self, PathConfig};
use media_node::server::{ApiServer, AppState};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;

/// Logger setup: `-v` count (raised to debug by `debug = true` in app.ini),
/// optional file target.
fn init_logging(args: &Args, verbosity: u8, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| path_config.config_file(paths::LOG_FILE));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    // app.ini is read before the logger exists so `debug` can raise the level
    let app_settings = AppSettings::load(path_config.config_file(paths::APP_FILE));
    let verbosity = match &app_settings {
        Ok(app) if app.debug => args.verbosity.max(2),
        _ => args.verbosity,
    };
    init_logging(&args, verbosity, &path_config)?;

    info!("Media node backend starting...");
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", path_config.dir().display());

    // CLI flags win over app.ini
    let mut app = app_settings.context("Failed to load app settings")?;
    if let Some(host) = &args.host {
        app.host = host.clone();
    }
    if let Some(port) = args.port {
        app.port = port;
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommand);
    let settings = NodeSettings::open(path_config.config_file(paths::NODE_FILE), runner.clone())
        .context("Failed to open node settings")?;
    let state = Arc::new(AppState {
        settings,
        displays: Displays::new(path_config.config_file(paths::DISPLAYS_FILE), runner),
        players: Instances::players(path_config.players_dir()),
        browsers: Instances::browsers(path_config.browsers_dir()),
        cors: app.cors,
    });

    for instances in [&state.players, &state.browsers] {
        match instances.list() {
            Ok(list) => info!("Found {} {} instance(s)", list.len(), instances.label()),
            Err(e) => warn!("Cannot list {} instances: {}", instances.label(), e),
        }
    }

    let (_, handle) = ApiServer::start(&app.bind_addr(), state)?;

    handle
        .join()
        .map_err(|_| anyhow!("API server thread panicked"))
}
