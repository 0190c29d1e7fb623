//! Centralized logging configuration for testsuite harnesses
//!
//! Wraps `tracing` and `tracing-subscriber` so that harness binaries and test
//! suites driving a service share one initialization path.
//!
//! # Usage
//!
//! ```rust,ignore
//! use testsuite_logging::{init, LogConfig, LogOutput};
//!
//! // Harness binary with defaults
//! init(LogConfig::default());
//!
//! // Verbose harness, logs kept off stdout
//! init(LogConfig::new().debug(true).output(LogOutput::Stderr));
//!
//! // Inside tests
//! testsuite_logging::init_test();
//! ```
//!
//! # Re-exports
//!
//! Commonly used tracing macros are re-exported:
//! - `trace!`, `debug!`, `info!`, `warn!`, `error!`
//! - `Level`

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::{debug, error, info, trace, warn, Level};

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Write logs to stdout (default)
    #[default]
    Stdout,
    /// Write logs to stderr (keeps stdout clean for test reports)
    Stderr,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    /// Output destination
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::Stdout,
            show_target: false,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug-level logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the default log level (used when RUST_LOG is not set)
    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Set the output destination
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Show or hide module target in log output
    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// Convenience: Configure for a harness binary
    pub fn harness(debug: bool) -> Self {
        Self::new().debug(debug).output(LogOutput::Stderr)
    }

    /// Convenience: Configure for tests
    pub fn test() -> Self {
        Self::new().default_level("debug")
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Override log level (e.g., `RUST_LOG=testsuite_client=trace`)
///
/// Calling this more than once is a no-op: the first subscriber wins.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();

    match config.output {
        LogOutput::Stdout => {
            let is_tty = std::io::stdout().is_terminal();
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(is_tty)
                .try_init();
        }
        LogOutput::Stderr => {
            let is_tty = std::io::stderr().is_terminal();
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(is_tty)
                .try_init();
        }
    }
}

/// Initialize logging for tests.
///
/// Uses `with_test_writer()` to capture logs in test output.
/// Safe to call multiple times (uses `try_init` internally).
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
