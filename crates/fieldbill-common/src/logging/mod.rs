//! Unified logging initialization for fieldbill binaries
//!
//! Filter priority, highest first:
//! 1. CLI flags (`-v/-q`)
//! 2. RUST_LOG environment variable
//! 3. Binary-specific defaults

use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used for audit-worthy billing events (clamped discounts, overpayments,
/// refunds). Route it separately with e.g. `RUST_LOG=fieldbill::audit=info`.
pub const AUDIT_TARGET: &str = "fieldbill::audit";

/// Initialize logging with the specified verbosity level and default filter.
///
/// # Example
///
/// ```no_run
/// use clap::Parser;
/// use clap_verbosity_flag::{Verbosity, InfoLevel};
/// use fieldbill_common::logging;
///
/// #[derive(Parser)]
/// struct Args {
///     #[clap(flatten)]
///     verbosity: Verbosity<InfoLevel>,
/// }
///
/// let args = Args::parse();
/// logging::init_logging(&args.verbosity, "fieldbill_billing=info").unwrap();
/// ```
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<()> {
    let level = verbosity.log_level().map(|l| l.to_string());
    let filter = build_filter(level.as_deref(), default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Initialize logging only when explicitly requested.
///
/// The `fieldbill` CLI prints JSON on stdout, so it stays quiet unless `-v`
/// or RUST_LOG ask for diagnostics. Returns whether a subscriber was installed.
pub fn init_cli_logging<L: LogLevel>(
    verbosity: &Verbosity<L>,
    default_filter: &str,
) -> Result<bool> {
    if verbosity.log_level().is_some() || std::env::var("RUST_LOG").is_ok() {
        init_logging(verbosity, default_filter)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn build_filter(level: Option<&str>, default_filter: &str) -> Result<EnvFilter> {
    let filter = match level {
        Some(log_level) => EnvFilter::try_new(log_level)?,
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
        }
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_builds_filter() {
        let filter = build_filter(Some("debug"), "fieldbill_billing=warn").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_default_filter_used_without_flags() {
        assert!(build_filter(None, "fieldbill_billing=info").is_ok());
    }
}
