use clap::Parser;
use colored::*;
use env_logger::{Builder, Env, Target};
use log::{info, warn};
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use textfinder::app::FinderApp;
use textfinder::cli::Cli;
use textfinder::config::Config;
use textfinder::error::{FinderError, Result};
use textfinder::metrics::Metrics;
use textfinder::search::CancellationToken;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    setup_logging(cli)?;
    info!("Application started with command: {:?}", cli.command);

    let config = Config::load(cli.config.as_deref())?;
    let color = !cli.no_color
        && config.display.color
        && is_terminal::is_terminal(&std::io::stdout());
    if !color {
        colored::control::set_override(false);
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Failed to install Ctrl-C handler: {e}");
    }

    let metrics = Arc::new(Metrics::new()?);
    let app = FinderApp::new(config, metrics, cancel).with_color(color);
    let result = app.run(cli);

    if cli.metrics {
        eprint!("{}", app.metrics().gather());
    }
    result
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let default_filter = if cli.verbose { "info" } else { "warn" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir).map_err(FinderError::Io)?;
            }
        }
        let log_file = fs::File::create(log_path).map_err(FinderError::Io)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| FinderError::Other(e.to_string()))?;
    Ok(())
}
