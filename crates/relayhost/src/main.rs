use std::env;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relayhost::api;
use relayhost::container::{ContainerRuntime, ContainerRuntimeApi};
use relayhost::joincode;
use relayhost::session::SessionService;
use relayhost::settings::{self, APP_NAME, AppConfig};

fn main() {
    if let Err(err) = run(Cli::parse()) {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_file = settings::resolve_config_path(cli.log.config.as_deref())?;

    // `init` and `completions` must work without a readable config.
    match &cli.command {
        Command::Init { force } => return init_config(&config_file, *force),
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = settings::load(&config_file)?;
    init_logging(&cli.log, &config.logging.level);
    debug!(config = %config_file.display(), "configuration loaded");

    match cli.command {
        Command::Serve(args) => serve(config, args),
        Command::Config { command } => show_config(&config, &config_file, command),
        Command::JoinCode { count } => {
            let mut stdout = io::stdout().lock();
            for _ in 0..count {
                writeln!(stdout, "{}", joincode::generate())?;
            }
            Ok(())
        }
        Command::Init { .. } | Command::Completions { .. } => Ok(()),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Relayhost - game session host orchestrator.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    log: GlobalOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct GlobalOpts {
    /// Config file or directory (default: $XDG_CONFIG_HOME/relayhost/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in logs (also honors NO_COLOR)
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

impl GlobalOpts {
    fn log_level(&self, configured: &str) -> String {
        match (self.quiet, self.verbose) {
            (true, _) => "error".to_string(),
            (false, 0) => configured.to_string(),
            (false, 1) => "debug".to_string(),
            (false, _) => "trace".to_string(),
        }
    }

    fn use_color(&self) -> bool {
        !self.no_color && env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeArgs),
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print freshly generated join codes
    JoinCode {
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
    /// Enable local container execution (overrides local.enabled)
    #[arg(long)]
    local: bool,
}

impl ServeArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.local {
            config.local.enabled = true;
        }
    }
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show {
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },
    /// Print the config file path
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Toml,
    Json,
    Yaml,
}

fn init_logging(opts: &GlobalOpts, configured: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = opts.log_level(configured);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{APP_NAME}={level},tower_http={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if opts.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(opts.use_color()),
            )
            .try_init()
            .ok();
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    settings::write_default(path)?;
    println!("{}", path.display());
    Ok(())
}

fn show_config(config: &AppConfig, path: &Path, command: ConfigCommand) -> Result<()> {
    let rendered = match command {
        ConfigCommand::Path => path.display().to_string(),
        ConfigCommand::Show { format } => match format {
            Format::Toml => toml::to_string_pretty(config).context("rendering config as TOML")?,
            Format::Json => {
                serde_json::to_string_pretty(config).context("rendering config as JSON")?
            }
            Format::Yaml => serde_yaml::to_string(config).context("rendering config as YAML")?,
        },
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

#[tokio::main]
async fn serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    let runtime = match (config.local.runtime, &config.local.binary) {
        (Some(rt), Some(binary)) => ContainerRuntime::with_binary(rt, binary.clone()),
        (Some(rt), None) => ContainerRuntime::with_type(rt),
        (None, _) => ContainerRuntime::detect(),
    };
    if config.local.enabled {
        match runtime.health_check().await {
            Ok(_) => info!(runtime = %runtime.runtime_type(), "container runtime available"),
            Err(e) => warn!(
                runtime = %runtime.runtime_type(),
                "container runtime health check failed, local hosting may fail: {e}"
            ),
        }
    }

    let shutdown = CancellationToken::new();
    let runtime: Arc<dyn ContainerRuntimeApi> = Arc::new(runtime);
    let sessions = SessionService::from_config(config.clone(), runtime, shutdown.clone())
        .context("creating control plane client")?;
    info!(
        control_plane = config.control_plane.base_url().unwrap_or("-"),
        delegate = sessions.control_plane_configured(),
        local = sessions.local_enabled(),
        image = %config.local.image,
        "hosting tiers ready"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("listening on http://{addr}");

    let app = api::create_router(api::AppState::new(sessions, config.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("running server")?;

    info!("shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, then cancel in-flight log scans.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, cancelling pending log scans");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_init_force_parses() {
        let cli = Cli::try_parse_from(["relayhost", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Command::Init { force: true }));

        let cli = Cli::try_parse_from(["relayhost", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn test_init_writes_then_refuses_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayhost").join("config.toml");
        let config = format!("{}", dir.path().display());

        let cli = Cli::try_parse_from(["relayhost", "--config", &config, "init"]).unwrap();
        assert_eq!(
            settings::resolve_config_path(cli.log.config.as_deref()).unwrap(),
            dir.path().join("config.toml")
        );

        init_config(&path, false).unwrap();
        assert!(path.exists());
        let err = init_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        init_config(&path, true).unwrap();
    }

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::try_parse_from(["relayhost", "-vv", "join-code"]).unwrap();
        assert_eq!(cli.log.log_level("info"), "trace");

        let cli = Cli::try_parse_from(["relayhost", "join-code", "-q"]).unwrap();
        assert_eq!(cli.log.log_level("info"), "error");

        let cli = Cli::try_parse_from(["relayhost", "join-code"]).unwrap();
        assert_eq!(cli.log.log_level("warn"), "warn");

        assert!(Cli::try_parse_from(["relayhost", "-q", "-v", "join-code"]).is_err());
    }

    #[test]
    fn test_serve_overrides_config() {
        let cli =
            Cli::try_parse_from(["relayhost", "serve", "--port", "9000", "--local"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.local.enabled);
    }

    #[test]
    fn test_config_show_format() {
        let cli = Cli::try_parse_from(["relayhost", "config", "show", "--format", "yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Show {
                    format: Format::Yaml
                }
            }
        ));
    }
}
