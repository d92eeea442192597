//! Certsmith - Main entry point
//!
//! Issues and renews ACME certificates for the domains in a KDL configuration
//! file, then deploys them.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use certsmith::{run_domains, Capabilities, CleanupRegistry, RunOutcome};
use certsmith_config::validate::certs::validate_certificates;
use certsmith_config::Config;

/// Certsmith - unattended ACME certificate issuance and renewal
#[derive(Parser, Debug)]
#[command(name = "certsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(
        short = 'c',
        long = "config",
        env = "CERTSMITH_CONFIG",
        default_value = "certsmith.kdl",
        global = true
    )]
    config: String,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long = "quiet", global = true)]
    quiet: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and existing certificates, then exit
    Test,
    /// Issue or renew certificates
    Run {
        /// Primary domain names to process, in order
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        domains: Vec<String>,

        /// Process every configured domain
        #[arg(long = "all")]
        all: bool,

        /// Reissue even if the current certificate is not due
        #[arg(long = "force")]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        _ if cli.test => test_config(&cli.config),
        None | Some(Commands::Test) => test_config(&cli.config),
        Some(Commands::Run {
            domains,
            all,
            force,
        }) => run(&cli.config, domains, *all, *force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(config_path: &str) -> Result<Config> {
    let config = Config::from_file(config_path).context("Failed to load configuration file")?;

    let warnings = config
        .validate()
        .into_result()
        .context("Configuration validation failed")?;
    for warning in &warnings {
        warn!("{}", warning);
    }

    Ok(config)
}

/// Test configuration file and exit
fn test_config(config_path: &str) -> Result<()> {
    info!("Testing configuration file: {}", config_path);
    let config = load_config(config_path)?;

    let certs = validate_certificates(&config, Utc::now());
    for warning in &certs.warnings {
        warn!("{}", warning);
    }
    certs
        .into_result()
        .context("Existing certificate check failed")?;

    info!("Configuration test successful:");
    info!("  - CA {}", config.acme.ca);
    info!("  - {} domain(s)", config.domains.len());

    println!(
        "certsmith: configuration file {} test is successful",
        config_path
    );
    Ok(())
}

/// Issue or renew the selected domains
fn run(config_path: &str, domains: &[String], all: bool, force: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let names: Vec<String> = if all {
        config.domains.iter().map(|d| d.name.clone()).collect()
    } else {
        domains.to_vec()
    };
    if names.is_empty() {
        bail!("no domains to process");
    }

    let cleanup = CleanupRegistry::new();
    cleanup
        .install()
        .context("Failed to install signal handlers")?;
    let caps = Capabilities::system().context("Failed to initialize system capabilities")?;

    let outcomes = run_domains(&config, &names, force, &caps, &cleanup)?;
    for (domain, outcome) in outcomes {
        match outcome {
            RunOutcome::Issued {
                certificate,
                not_after,
                ..
            } => info!(
                domain = %domain,
                certificate = %certificate.display(),
                not_after = %not_after,
                "Certificate issued"
            ),
            RunOutcome::NotDue { not_after } => info!(
                domain = %domain,
                not_after = %not_after,
                "Certificate not yet due for renewal"
            ),
        }
    }

    Ok(())
}
