//! Common types and utilities shared across commands

use clap::Parser;
use plugify_manifest::{Diagnostic, Severity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Overrides the console filter derived from `-v`/`-q`
pub const LOG_ENV: &str = "PLUGIFY_LOG";

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, global = true, help = "Emit tracing events as JSON lines on stderr")]
    pub log_json: bool,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// `tracing` filter directive for the console layer
    pub fn tracing_directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub fn init_tracing(opts: &GlobalOpts) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(opts.tracing_directive()));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if opts.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(!opts.no_color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(e) = result {
        plugify_logger::debug(&format!("Tracing already initialized: {}", e));
    }
}

/// Print a generator diagnostic with the logger level matching its severity
pub fn report_diagnostic(diagnostic: &Diagnostic) {
    let text = diagnostic.to_string();
    match diagnostic.severity {
        Severity::Error => plugify_logger::error(&text),
        Severity::Warning => plugify_logger::warn(&text),
        Severity::Info => plugify_logger::note(&text),
    }
}
