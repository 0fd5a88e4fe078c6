//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tailtop")]
#[command(about = "top-like, continuously refreshing view of a web access log")]
#[command(version)]
pub struct Cli {
    /// Access log file to parse; "-" reads standard input
    #[arg(short = 'l', long = "access-log")]
    pub access_log: Option<String>,

    /// Log format: "combined", "common", or a log_format template
    #[arg(short = 'f', long = "log-format")]
    pub log_format: Option<String>,

    /// Process the current file content once instead of watching for
    /// newly appended lines
    #[arg(long = "no-follow")]
    pub no_follow: bool,

    /// Report interval in seconds when following
    #[arg(short = 't', long = "interval", default_value_t = 2.0)]
    pub interval: f64,

    /// Group-by field of the default report
    #[arg(short = 'g', long = "group-by", default_value = "request_path")]
    pub group_by: String,

    /// Having clause of the default report
    #[arg(short = 'w', long = "having", default_value = "1")]
    pub having: String,

    /// Order of output for the default report
    #[arg(short = 'o', long = "order-by", default_value = "count")]
    pub order_by: String,

    /// Number of rows included in the report
    #[arg(short = 'n', long = "limit", default_value_t = 10)]
    pub limit: usize,

    /// Seconds of records kept in memory before the window resets
    #[arg(short = 's', long = "window", default_value_t = 20)]
    pub window: u64,

    /// Record filter applied after parsing, e.g. 'status >= 400'
    #[arg(short = 'i', long = "filter")]
    pub filter: Option<String>,

    /// Line filter (regex) applied before parsing
    #[arg(short = 'p', long = "pre-filter")]
    pub pre_filter: Option<String>,

    /// nginx config file to read the access log location and format from
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// More verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Trace every line and parsed record
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show distinct rows of the given fields
    Print {
        #[arg(required = true)]
        vars: Vec<String>,
    },

    /// Top occurrences of each given field, by request count
    Top {
        #[arg(required = true)]
        vars: Vec<String>,
    },

    /// Averages of the given numeric fields
    Avg {
        #[arg(required = true)]
        vars: Vec<String>,
    },

    /// Sums of the given numeric fields
    Sum {
        #[arg(required = true)]
        vars: Vec<String>,
    },

    /// Run a raw aggregation expression
    Query { expr: String },

    /// Show the resolved log path, format, and its variables
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["tailtop"]);
        assert_eq!(cli.interval, 2.0);
        assert_eq!(cli.group_by, "request_path");
        assert_eq!(cli.having, "1");
        assert_eq!(cli.order_by, "count");
        assert_eq!(cli.limit, 10);
        assert_eq!(cli.window, 20);
        assert!(!cli.no_follow);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_top_subcommand_takes_fields() {
        let cli = Cli::parse_from(["tailtop", "-l", "access.log", "top", "request_path", "remote_addr"]);
        match cli.command {
            Some(Command::Top { vars }) => {
                assert_eq!(vars, vec!["request_path", "remote_addr"]);
            }
            other => panic!("expected top subcommand, got {other:?}"),
        }
    }

    #[test]
    fn test_top_requires_at_least_one_field() {
        assert!(Cli::try_parse_from(["tailtop", "top"]).is_err());
    }

    #[test]
    fn test_stdin_spelling() {
        let cli = Cli::parse_from(["tailtop", "-l", "-", "-f", "combined"]);
        assert_eq!(cli.access_log.as_deref(), Some("-"));
    }
}
