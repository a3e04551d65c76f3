//! depweave CLI: reconcile tracker issues with a declared dependency graph.
//!
//! Usage:
//!   depweave run [--config FILE] [--repo OWNER/NAME] [--dry-run] ...
//!   depweave graph [--config FILE] [--items DIR] [--format json]
//!
//! Exit codes: 0 success (warnings allowed), 1 run aborted, 2 bad config/usage.

use clap::{Args, Parser, Subcommand, ValueEnum};
use depweave::{
    build_graph, logger, Config, ConfigError, GhTracker, LinkMode, Origin, ReconcileError, Reconciler, RunReport,
};
use std::path::PathBuf;
use std::sync::Arc;

const EXIT_ABORTED: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "depweave",
    version,
    about = "Reconcile tracker issues with a declared dependency graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation against the tracker
    Run {
        #[command(flatten)]
        sources: SourceArgs,
        /// Target repository (owner/name)
        #[arg(long)]
        repo: Option<String>,
        /// auto | annotation-only
        #[arg(long)]
        link_mode: Option<LinkMode>,
        /// Log every mutation instead of performing it
        #[arg(long)]
        dry_run: bool,
        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        report: OutputFormat,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Print the relation graph extracted from sources (offline)
    Graph {
        #[command(flatten)]
        sources: SourceArgs,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
        #[arg(long, default_value = "warn")]
        log_level: String,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Config file (default: ./depweave.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of per-item markdown files
    #[arg(long)]
    items: Option<PathBuf>,
    /// Aggregate roadmap document
    #[arg(long)]
    aggregate: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn load_config(args: &SourceArgs) -> Result<Config, ConfigError> {
    let mut config = Config::discover(args.config.as_deref())?;
    if let Some(items) = &args.items {
        config.items_dir = Some(items.clone());
    }
    if let Some(aggregate) = &args.aggregate {
        config.aggregate = Some(aggregate.clone());
    }
    Ok(config)
}

fn print_report(report: &RunReport, format: OutputFormat) -> i32 {
    match format {
        OutputFormat::Text => {
            print!("{}", report);
            0
        }
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: cannot encode report: {}", e);
                EXIT_ABORTED
            }
        },
    }
}

fn cmd_run(
    sources: &SourceArgs,
    repo: Option<String>,
    link_mode: Option<LinkMode>,
    dry_run: bool,
    format: OutputFormat,
) -> i32 {
    let mut config = match load_config(sources) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_USAGE;
        }
    };
    if repo.is_some() {
        config.repository = repo;
    }
    if let Some(mode) = link_mode {
        config.link_mode = mode;
    }
    config.dry_run |= dry_run;
    if let Err(e) = config.validate_for_run() {
        eprintln!("Error: {}", e);
        return EXIT_USAGE;
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return EXIT_ABORTED;
        }
    };

    let repository = config.repository.clone().unwrap_or_default();
    let reconciler = Reconciler::new(Arc::new(GhTracker::new(repository)), config);
    match rt.block_on(reconciler.run()) {
        Ok(report) => print_report(&report, format),
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                ReconcileError::Config(_) => EXIT_USAGE,
                _ => EXIT_ABORTED,
            }
        }
    }
}

fn cmd_graph(sources: &SourceArgs, format: OutputFormat) -> i32 {
    let config = match load_config(sources) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_USAGE;
        }
    };
    if config.items_dir.is_none() && config.aggregate.is_none() {
        eprintln!("Error: no sources; pass --items/--aggregate or set them in the config");
        return EXIT_USAGE;
    }

    let mut report = RunReport::default();
    let build = build_graph(&config, &mut report);

    match format {
        OutputFormat::Text => {
            if build.graph.is_empty() {
                println!("No relations found.");
            }
            for edge in build.graph.views() {
                let origins: Vec<&str> = edge
                    .origins
                    .iter()
                    .map(|o| match o {
                        Origin::Extracted => "extracted",
                        Origin::Static => "static",
                        Origin::CoOccurrence => "co-occurrence",
                    })
                    .collect();
                println!("{} -[{}]-> {}  ({})", edge.from, edge.kind, edge.to, origins.join(", "));
            }
            let warnings = report.warning_count();
            if warnings > 0 {
                eprintln!("{} warning(s)", warnings);
            }
            0
        }
        OutputFormat::Json => {
            let titles = build.all_titles();
            let doc = serde_json::json!({
                "titles": titles,
                "edges": build.graph.views(),
                "warnings": report.warnings,
            });
            match serde_json::to_string_pretty(&doc) {
                Ok(json) => {
                    println!("{}", json);
                    0
                }
                Err(e) => {
                    eprintln!("Error: cannot encode graph: {}", e);
                    EXIT_ABORTED
                }
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let log_level = match &cli.command {
        Commands::Run { log_level, .. } | Commands::Graph { log_level, .. } => log_level.clone(),
    };
    if let Err(e) = logger::init(&log_level) {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_USAGE);
    }

    let code = match cli.command {
        Commands::Run {
            sources,
            repo,
            link_mode,
            dry_run,
            report,
            ..
        } => cmd_run(&sources, repo, link_mode, dry_run, report),
        Commands::Graph { sources, format, .. } => cmd_graph(&sources, format),
    };
    std::process::exit(code);
}
