//! Drill configuration and CLI argument parsing
//!
//! Settings come from command-line arguments and environment variables with
//! the `BULWARK_` prefix. Guards and bindings come from a TOML policy file
//! (see [`crate::policy`]).
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # 10k calls against the checkout binding from 64 workers
//! bulwark --policy policy.toml --call-site checkout --requests 10000 --workers 64
//!
//! # Same drill configured through the environment
//! export BULWARK_POLICY=policy.toml
//! export BULWARK_CALL_SITE=checkout
//! bulwark --format json
//! ```

use crate::policy::PolicyConfig;
use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to run the binary
#[derive(Debug, Clone)]
pub struct Config {
    /// Guards and call-site bindings
    pub policy: PolicyConfig,
    /// Load to drive through the call site
    pub drill: DrillConfig,
    /// Report format
    pub format: OutputFormat,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Validate the policy and print its bindings instead of running a drill
    pub check_only: bool,
}

/// Shape of the synthetic load
#[derive(Debug, Clone)]
pub struct DrillConfig {
    /// Call site whose chain is exercised
    pub call_site: String,
    /// Total calls across all workers
    pub requests: u64,
    /// Concurrent worker tasks
    pub workers: usize,
    /// Distinct principals calls are spread over; 0 makes every call anonymous
    pub principals: u64,
    /// How long each admitted action runs
    pub hold: Duration,
    /// Every n-th action fails; 0 disables failures
    pub fail_every: u64,
}

impl Default for DrillConfig {
    fn default() -> Self {
        DrillConfig {
            call_site: "default".to_string(),
            requests: 1_000,
            workers: 16,
            principals: 10,
            hold: Duration::from_millis(1),
            fail_every: 0,
        }
    }
}

/// Report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable summary
    Text,
    /// Report and guard snapshots as JSON
    Json,
    /// Prometheus text exposition
    Prometheus,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "prometheus" => Ok(OutputFormat::Prometheus),
            _ => Err(anyhow!(
                "Invalid output format: {}. Valid options are: text, json, prometheus",
                s
            )),
        }
    }
}

/// Command-line arguments
///
/// All arguments can also be set via environment variables with the
/// BULWARK_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "bulwark",
    about = "Drive a guarded call site with synthetic load",
    long_about = "Loads a guard policy, resolves the guard chain for a call site and drives it with concurrent synthetic callers, then reports how every call ended.\n\nEnvironment variables with BULWARK_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "FILE",
        help = "Guard policy file (TOML)",
        env = "BULWARK_POLICY"
    )]
    pub policy: Option<PathBuf>,
    #[arg(
        long,
        value_name = "NAME",
        help = "Call site to drill",
        default_value = "default",
        env = "BULWARK_CALL_SITE"
    )]
    pub call_site: String,

    // Load shape
    #[arg(
        long,
        value_name = "N",
        help = "Total calls to make",
        default_value_t = 1_000,
        env = "BULWARK_REQUESTS"
    )]
    pub requests: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Concurrent workers",
        default_value_t = 16,
        env = "BULWARK_WORKERS"
    )]
    pub workers: usize,
    #[arg(
        long,
        value_name = "N",
        help = "Distinct principals (0 = anonymous callers)",
        default_value_t = 10,
        env = "BULWARK_PRINCIPALS"
    )]
    pub principals: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Time each admitted action runs (milliseconds)",
        default_value_t = 1,
        env = "BULWARK_HOLD_MS"
    )]
    pub hold_ms: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Fail every n-th action (0 = never)",
        default_value_t = 0,
        env = "BULWARK_FAIL_EVERY"
    )]
    pub fail_every: u64,

    // Output
    #[arg(
        long,
        value_name = "FORMAT",
        help = "Report format: text, json, prometheus",
        default_value = "text",
        env = "BULWARK_FORMAT"
    )]
    pub format: OutputFormat,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "warn",
        env = "BULWARK_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "Validate the policy, print its bindings and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub check: bool,
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No policy file is given or it cannot be loaded
    /// - Drill parameters are out of range
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let path = args.policy.ok_or_else(|| {
            anyhow!(
                "A policy file must be specified.\n\n\
                Example:\n  \
                bulwark --policy policy.toml --call-site checkout\n\n\
                For more information, try '--help'"
            )
        })?;
        let policy = PolicyConfig::from_file(&path)?;

        let config = Config {
            policy,
            drill: DrillConfig {
                call_site: args.call_site,
                requests: args.requests,
                workers: args.workers,
                principals: args.principals,
                hold: Duration::from_millis(args.hold_ms),
                fail_every: args.fail_every,
            },
            format: args.format,
            log_level: args.log_level,
            check_only: args.check,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Guard limits and bindings are checked separately, when the registry is
    /// built from the policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy declares no guards, or a drill would make
    /// no calls.
    pub fn validate(&self) -> Result<()> {
        if self.policy.guards.is_empty() {
            return Err(anyhow!("The policy must declare at least one guard"));
        }
        if self.drill.requests == 0 {
            return Err(anyhow!("--requests must be at least 1"));
        }
        if self.drill.workers == 0 {
            return Err(anyhow!("--workers must be at least 1"));
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Bulwark Environment Variables");
        println!("=============================");
        println!();
        println!("All environment variables use the BULWARK_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Policy:");
        println!("  BULWARK_POLICY=<file>            Guard policy file (TOML)");
        println!("  BULWARK_CALL_SITE=<name>         Call site to drill [default: default]");
        println!();

        println!("Load Shape:");
        println!("  BULWARK_REQUESTS=<n>             Total calls to make [default: 1000]");
        println!("  BULWARK_WORKERS=<n>              Concurrent workers [default: 16]");
        println!(
            "  BULWARK_PRINCIPALS=<n>           Distinct principals, 0 = anonymous [default: 10]"
        );
        println!("  BULWARK_HOLD_MS=<ms>             Time each admitted action runs [default: 1]");
        println!("  BULWARK_FAIL_EVERY=<n>           Fail every n-th action, 0 = never [default: 0]");
        println!();

        println!("Output:");
        println!(
            "  BULWARK_FORMAT=<format>          Report format: text, json, prometheus [default: text]"
        );
        println!(
            "  BULWARK_LOG_LEVEL=<level>        Log level: error, warn, info, debug, trace [default: warn]"
        );
        println!();

        println!("Examples:");
        println!("  export BULWARK_POLICY=policy.toml");
        println!("  export BULWARK_CALL_SITE=checkout");
        println!("  bulwark --requests 5000  # CLI overrides env");
    }
}
