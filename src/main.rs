use anyhow::Result;
use axum::routing::get;
use clap::Parser;
use patron::config::LoggingConfig;
use patron::{IntervalScheduler, PatronConfig, Route, ServiceBuilder};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Exit status for configuration problems detected before startup
const EXIT_CONFIGURATION: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "patron")]
#[command(about = "Service runtime with an HTTP server, health checks and coordinated shutdown")]
#[command(version)]
#[command(long_about = "Runs an HTTP server exposing /health and /info next to a heartbeat \
scheduler. SIGTERM and SIGINT stop every component within the configured grace period; \
SIGHUP reloads and re-validates the configuration file without stopping anything.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "patron.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Documentation file served by the info endpoint
    #[arg(long, value_name = "FILE", help = "Documentation file served by /info")]
    docs: Option<String>,

    /// Heartbeat period in seconds
    #[arg(long, default_value_t = 30, help = "Seconds between heartbeat log lines")]
    heartbeat_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        println!("# Patron Configuration File");
        println!("# Environment overrides use PATRON_<SECTION>__<KEY>, e.g. PATRON_HTTP__PORT");
        println!();
        println!("{}", PatronConfig::default().to_toml()?);
        return Ok(());
    }

    let mut config = match PatronConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    init_logging(&args, &config.logging)?;

    info!("Starting patron v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if let Some(docs) = &args.docs {
        config.service.docs_path = Some(docs.clone());
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
        }
        std::process::exit(EXIT_CONFIGURATION);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let service = match build_service(&args, &config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to build service: {}", e);
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    let summary = service.run().await.map_err(|e| {
        error!("Service runtime error: {}", e);
        e
    })?;

    for report in &summary.reports {
        info!(component = %report.component, outcome = ?report.outcome, "Component report");
    }
    info!(reason = %summary.reason, "patron exited with code: {}", summary.exit_code);

    // Exit with appropriate code for the process supervisor
    std::process::exit(summary.exit_code);
}

fn build_service(args: &Args, config: &PatronConfig) -> patron::Result<patron::Service> {
    let started = Instant::now();
    let heartbeat = IntervalScheduler::new(
        "heartbeat",
        Duration::from_secs(args.heartbeat_seconds.max(1)),
        move || async move {
            info!(uptime_seconds = started.elapsed().as_secs(), "Heartbeat");
            Ok(())
        },
    );

    let name = config.service.name.clone();
    let config_path = args.config.clone();

    ServiceBuilder::from_config(config)
        .routes(vec![Route::new(
            "/",
            get(move || {
                let name = name.clone();
                async move { name }
            }),
        )])
        .component(heartbeat)
        .sighup(move || match PatronConfig::load_from_file(&config_path) {
            Ok(reloaded) => match reloaded.validate() {
                Ok(()) => info!(path = %config_path, "Configuration reloaded and valid"),
                Err(e) => warn!(path = %config_path, "Reloaded configuration is invalid: {}", e),
            },
            Err(e) => warn!(path = %config_path, "Failed to reload configuration: {}", e),
        })
        .build()
}

/// Verbosity flags win over the `[logging]` section; RUST_LOG wins over both
fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        logging.level.as_str()
    };
    let log_format = args.log_format.as_deref().unwrap_or(logging.format.as_str());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("patron={},tower_http={}", log_level, log_level))
    });

    // Configure format based on options
    let fmt_layer = match log_format {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        format => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
