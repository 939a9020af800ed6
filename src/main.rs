//! prevalence: survey-weighted chronic condition prevalence report

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use prevalence::analysis::PrevalenceEngine;
use prevalence::cache::DownloadCache;
use prevalence::cleaner::clean;
use prevalence::config::{default_config_json, load_config, CONFIG_FILENAME};
use prevalence::loader::Loader;
use prevalence::reporter::{ConsoleReporter, HtmlReporter, JsonReporter, MarkdownReporter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Compare chronic condition prevalence between two survey data sources
#[derive(Parser, Debug)]
#[command(name = "prevalence")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Working directory holding the config and the survey extracts
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Path to config file (default: search .prevalencerc.json in DIR and parents)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format as JSON
    #[arg(long, short)]
    json: bool,

    /// Output markdown tables
    #[arg(long, short)]
    markdown: bool,

    /// Write a self-contained HTML report to FILE
    #[arg(long, value_name = "FILE")]
    html: Option<PathBuf>,

    /// Only print the significant-findings table
    #[arg(long)]
    summary_only: bool,

    /// Family-wise significance level (overrides config)
    #[arg(long, value_name = "A")]
    alpha: Option<f64>,

    /// Number of parallel threads (default: number of CPU cores)
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Quiet mode (no status lines)
    #[arg(long, short)]
    quiet: bool,

    /// Verbose output (debug logging, dropped combinations)
    #[arg(long, short)]
    verbose: bool,

    /// Ignore cached downloads and fetch again
    #[arg(long)]
    no_cache: bool,

    /// Clear the download cache before running
    #[arg(long)]
    clear_cache: bool,

    /// Exit 1 when no combination survives the reliability filter
    #[arg(long)]
    fail_on_empty: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create .prevalencerc.json with the default configuration
    Init {
        /// Directory in which to create config (default: current)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(Commands::Init { dir }) = args.command {
        return run_init(dir.as_deref());
    }

    let work_dir = args.dir.as_path();
    if !work_dir.is_dir() {
        anyhow::bail!("Not a directory: {}", work_dir.display());
    }

    // CLI flags override config file
    let config = load_config(work_dir, args.config.as_deref())?.merge_with_cli(args.alpha);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Clearing works on the on-disk cache even when this run bypasses it
    if args.clear_cache {
        let mut on_disk = DownloadCache::new(work_dir);
        on_disk.clear();
        match on_disk.save() {
            Ok(()) if !args.quiet => eprintln!("{}: Cache cleared", "Info".blue()),
            Ok(()) => {}
            Err(e) => eprintln!("{}: Failed to clear cache: {}", "Warning".yellow(), e),
        }
    }
    let cache = if args.no_cache {
        DownloadCache::disabled()
    } else {
        DownloadCache::new(work_dir)
    };

    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    let mut loader = Loader::new(work_dir, config.delimiter()).with_cache(cache);
    let raw = loader
        .load(&config.get_sources())
        .context("Failed to load survey extracts")?;

    if let Err(e) = loader.cache().save() {
        if !args.quiet {
            eprintln!("{}: Failed to save cache: {}", "Warning".yellow(), e);
        }
    }

    if !args.quiet {
        for count in raw.counts() {
            eprintln!("{}: {} rows loaded for {}", "Info".blue(), count.rows, count.source);
        }
    }

    let survey = clean(&raw, &config).context("Failed to clean survey extracts")?;
    let engine = PrevalenceEngine::from_config(&config);
    let report = engine.run(&survey, raw.counts());

    if let Some(ref html_path) = args.html {
        std::fs::write(html_path, HtmlReporter::new().report(&report))
            .with_context(|| format!("Failed to write {}", html_path.display()))?;
        if !args.quiet {
            eprintln!("{}: HTML report written to {}", "Info".blue(), html_path.display());
        }
    }

    if args.json {
        println!("{}", JsonReporter::new().pretty().report(&report));
    } else if args.markdown {
        let reporter = if args.summary_only {
            MarkdownReporter::new().summary_only()
        } else {
            MarkdownReporter::new()
        };
        print!("{}", reporter.report(&report));
    } else if args.html.is_none() || args.summary_only {
        let mut reporter = ConsoleReporter::new();
        if args.verbose {
            reporter = reporter.verbose();
        }
        if args.summary_only {
            reporter.report_summary_only(&report);
        } else {
            reporter.report(&report);
        }
    }

    if report.rows.is_empty() {
        if !args.quiet {
            eprintln!(
                "{}: No combination met the reliability criteria",
                "Warning".yellow()
            );
        }
        if args.fail_on_empty {
            return Ok(ExitCode::from(1));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_init(dir: Option<&Path>) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let dir = dir.unwrap_or(&cwd);
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() {
        eprintln!(
            "{}: {} already exists; use --dir to write elsewhere or remove it first",
            "Warning".yellow(),
            config_path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    std::fs::write(&config_path, default_config_json())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    eprintln!("{}: Created {}", "Info".blue(), config_path.display());
    Ok(ExitCode::SUCCESS)
}
