mod logging;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use dbgbridge_config::{load_config, load_file, Config};
use dbgbridge_dap::DapDebugSession;
use dbgbridge_server::{
    router, serve, AppState, BreakpointRegistry, EventCorrelator, HttpCallbackSender,
};

/// HTTP control server for a debug adapter session.
#[derive(Debug, Parser)]
#[command(name = "dbgbridge", version, about)]
struct Cli {
    /// Load only this configuration file instead of the global and project files.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `[server] bind`.
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error), overriding `[log] level`.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn load(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let config_dir = dirs::config_dir()
                .context("no configuration directory on this platform")?
                .join("dbgbridge");
            let project_dir = std::env::current_dir().ok();
            load_config(&config_dir, project_dir.as_deref())
                .with_context(|| format!("failed to load config from {}", config_dir.display()))?
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn run(config: Config) -> Result<()> {
    let session = Arc::new(DapDebugSession::new(&config));
    let registry = Arc::new(BreakpointRegistry::new());
    let sender = HttpCallbackSender::new(Duration::from_secs(config.callback.timeout_secs))
        .context("failed to build callback HTTP client")?;

    let correlator = EventCorrelator::new(
        session.clone(),
        registry.clone(),
        Arc::new(sender),
        config.session.configuration_name.clone(),
        config.callback.watch,
    )
    .spawn();

    let app = router(AppState {
        session: session.clone(),
        registry,
    });
    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    let served = serve(listener, app, shutdown_signal()).await;

    correlator.abort();
    session.shutdown().await;
    served.context("control endpoint failed")?;
    info!("dbgbridge stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    let level = cli
        .log_level
        .as_deref()
        .map(logging::log_level_to_filter)
        .unwrap_or_else(|| config.log.level.as_filter());
    logging::init(level, config.log.file.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind,
        configuration = %config.session.configuration_name,
        targets = config.targets.len(),
        "dbgbridge starting"
    );
    run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from([
            "dbgbridge",
            "--config",
            "/tmp/dbgbridge.toml",
            "--bind",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/dbgbridge.toml")));
        assert_eq!(cli.bind, Some("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn cli_rejects_bad_bind_address() {
        assert!(Cli::try_parse_from(["dbgbridge", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn load_explicit_file_applies_bind_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\nconfiguration_name = \"Launch Tests\"\n\n[targets.\"Launch Tests\"]\nprogram = \"/usr/bin/true\""
        )
        .unwrap();
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            bind: Some("127.0.0.1:9999".parse().unwrap()),
            log_level: None,
        };
        let config = load(&cli).unwrap();
        assert_eq!(config.session.configuration_name, "Launch Tests");
        assert_eq!(config.server.bind.port(), 9999);
        assert!(config.targets.contains_key("Launch Tests"));
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/dbgbridge.toml")),
            bind: None,
            log_level: None,
        };
        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
