//! Boot — logging init, log-config resolution, pipeline wiring.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::format::{variable_names, LogPattern};
use engine::record::filter::Predicate;
use engine::report::{Pipeline, StdoutSink};
use engine::source::filter::{FilterMode, LineFilter};
use engine::source::{self, SourceSpec};
use engine::store::query::{default_queries, QuerySpec};
use engine::store::WindowStore;

use crate::args::{Cli, Command};
use crate::conf;
use crate::screen::Screen;

/// Initialise the tracing / logging subsystem. Logs go to stderr so the
/// live screen owns stdout.
pub fn init_logging(args: &Cli) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("cli={level},engine={level}"))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct ResolvedConfig {
    access_log: String,
    log_format: String,
    config_path: Option<PathBuf>,
}

/// Build everything from the arguments and run the selected mode. All
/// setup failures surface here, before any ingestion starts.
pub async fn run(args: Cli) -> anyhow::Result<()> {
    let resolved = resolve_log_config(&args)?;

    if matches!(args.command, Some(Command::Info)) {
        print_info(&resolved);
        return Ok(());
    }

    let queries = build_queries(&args)?;
    let store = WindowStore::new(queries, Duration::from_secs(args.window));
    let pattern = LogPattern::compile(&resolved.log_format);

    let mut pipeline = Pipeline::new(pattern, store);
    if let Some(expr) = &args.pre_filter {
        pipeline = pipeline.with_line_filter(LineFilter::new(expr, FilterMode::Include)?);
    }
    if let Some(expr) = &args.filter {
        pipeline = pipeline.with_record_filter(Predicate::parse(expr)?);
    }

    let spec = if resolved.access_log == "-" {
        SourceSpec::Stdin
    } else {
        SourceSpec::File {
            path: PathBuf::from(&resolved.access_log),
            follow: !args.no_follow,
        }
    };
    info!(
        access_log = %resolved.access_log,
        log_format = %resolved.log_format,
        "starting"
    );
    let stream = source::open(&spec)
        .await
        .context("cannot open the access log")?;

    if args.no_follow {
        let mut sink = StdoutSink;
        pipeline.run_once(stream, &mut sink).await?;
        return Ok(());
    }

    let interval = Duration::from_secs_f64(args.interval.max(0.0));
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    match Screen::new() {
        Ok(mut screen) => {
            pipeline.run_live(stream, &mut screen, interval, shutdown).await?;
        }
        Err(e) => {
            // No display surface; keep aggregating and print reports
            // plainly instead of crashing ingestion.
            warn!("no display surface ({e}); falling back to stdout reports");
            let mut sink = StdoutSink;
            pipeline.run_live(stream, &mut sink, interval, shutdown).await?;
        }
    }
    Ok(())
}

fn resolve_log_config(args: &Cli) -> anyhow::Result<ResolvedConfig> {
    if let (Some(access_log), Some(log_format)) = (&args.access_log, &args.log_format) {
        return Ok(ResolvedConfig {
            access_log: access_log.clone(),
            log_format: log_format.clone(),
            config_path: None,
        });
    }
    let discovered = conf::discover(args.config.as_deref())?;
    Ok(ResolvedConfig {
        access_log: args
            .access_log
            .clone()
            .unwrap_or(discovered.access_log),
        log_format: args.log_format.clone().unwrap_or(discovered.log_format),
        config_path: Some(discovered.config_path),
    })
}

fn build_queries(args: &Cli) -> anyhow::Result<Vec<QuerySpec>> {
    let queries = match &args.command {
        Some(Command::Print { vars }) => vec![QuerySpec::print(vars)],
        Some(Command::Top { vars }) => vars
            .iter()
            .map(|var| QuerySpec::top(var, args.limit))
            .collect(),
        Some(Command::Avg { vars }) => vec![QuerySpec::avg(vars)],
        Some(Command::Sum { vars }) => vec![QuerySpec::sum(vars)],
        Some(Command::Query { expr }) => vec![QuerySpec::parse("query:", expr)?],
        Some(Command::Info) | None => {
            let having = Predicate::parse(&args.having)?;
            default_queries(&args.group_by, having, &args.order_by, args.limit)?
        }
    };
    Ok(queries)
}

fn print_info(resolved: &ResolvedConfig) {
    match &resolved.config_path {
        Some(path) => println!("configuration file:\n  {}", path.display()),
        None => println!("configuration file:\n  (not used)"),
    }
    println!("access log file:\n  {}", resolved.access_log);
    println!("access log format:\n  {}", resolved.log_format);
    let mut variables = variable_names(&resolved.log_format);
    variables.sort();
    println!("available variables:\n  {}", variables.join(", "));
}
