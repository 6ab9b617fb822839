use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;
use zotero_digest_core::config_file::LOG_LEVELS;
use zotero_digest_core::{
    AnalysisStats, AnalyzerConfig, ConfigManager, OpenAiClient, PaperAnalyzer, ProgressEvent,
    run_batch,
};
use zotero_digest_library::Library;
use zotero_digest_pdf_mupdf::MupdfBackend;

mod logging;
mod output;

use output::ColorMode;

/// Directory (relative to the working directory) for rotated log files.
const LOG_DIR: &str = "logs";

/// Zotero Digest - summarize the papers in a local Zotero library into CSV reports
#[derive(Parser, Debug)]
#[command(name = "zotero-digest", version, about, long_about = None)]
struct Cli {
    /// Configuration directory (default: platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze library items and export CSV reports
    Analyze(AnalyzeArgs),

    /// List collections (with keys for --collection)
    Collections {
        /// Only show collections whose name contains this text
        #[arg(long)]
        search: Option<String>,

        /// Path to zotero.sqlite (default: auto-detect)
        #[arg(long)]
        database_path: Option<PathBuf>,
    },

    /// Show or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Move user.json aside, restoring defaults
    Reset,
    /// Write the effective configuration (API key masked) to a file
    Export { file: PathBuf },
    /// Replace user.json with a configuration file
    Import { file: PathBuf },
    /// Set one value in user.json
    Set { key: String, value: String },
}

#[derive(Args, Debug, Default)]
struct AnalyzeArgs {
    /// Path to zotero.sqlite (default: auto-detect)
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Collection key to analyze; repeat for several (default: whole library)
    #[arg(long = "collection", value_name = "KEY")]
    collections: Vec<String>,

    /// API key (default: config, then OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Output language for summaries and translated titles
    #[arg(long)]
    language: Option<String>,

    /// Analyze at most this many items (0 = no limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Comma-separated item types to include, e.g. journalArticle,conferencePaper
    #[arg(long, value_delimiter = ',')]
    include_types: Vec<String>,

    /// Comma-separated title keywords to exclude
    #[arg(long, value_delimiter = ',')]
    exclude_keywords: Vec<String>,

    /// Seconds to wait between items
    #[arg(long, value_parser = parse_delay)]
    delay: Option<f64>,

    /// Maximum PDF pages to read per paper
    #[arg(long)]
    max_pages: Option<usize>,

    /// Token budget for paper text in the prompt
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Directory for CSV reports
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also write the detailed report
    #[arg(long)]
    export_detailed: bool,

    /// Skip the statistics report
    #[arg(long)]
    no_export_statistics: bool,

    /// Do not translate English titles
    #[arg(long)]
    no_translate: bool,

    /// Debug logging, also on stderr
    #[arg(long)]
    debug: bool,

    /// Log level
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<String>,
}

fn parse_delay(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|_| format!("invalid number: {}", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err("delay must be a non-negative number of seconds".into());
    }
    Ok(secs)
}

fn parse_log_level(s: &str) -> Result<String, String> {
    let level = s.to_ascii_uppercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(format!("expected one of {}", LOG_LEVELS.join(", ")))
    }
}

/// CLI flags take precedence over stored configuration.
fn apply_overrides(cfg: &mut AnalyzerConfig, args: &AnalyzeArgs) {
    if let Some(path) = &args.database_path {
        cfg.database_path = path.display().to_string();
    }
    if !args.collections.is_empty() {
        cfg.selected_collections = args.collections.clone();
    }
    if let Some(key) = &args.api_key {
        cfg.api_key = key.clone();
    }
    if let Some(url) = &args.base_url {
        cfg.base_url = url.clone();
    }
    if let Some(model) = &args.model {
        cfg.model = model.clone();
    }
    if let Some(language) = &args.language {
        cfg.language = language.clone();
    }
    if let Some(limit) = args.limit {
        cfg.limit = Some(limit);
    }
    if !args.include_types.is_empty() {
        cfg.include_types = args.include_types.clone();
    }
    if !args.exclude_keywords.is_empty() {
        cfg.exclude_keywords = args.exclude_keywords.clone();
    }
    if let Some(delay) = args.delay {
        cfg.delay = delay;
    }
    if let Some(pages) = args.max_pages {
        cfg.max_pages = pages;
    }
    if let Some(tokens) = args.max_tokens {
        cfg.max_tokens = tokens;
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.display().to_string();
    }
    if args.export_detailed {
        cfg.export_detailed = true;
    }
    if args.no_export_statistics {
        cfg.export_statistics = false;
    }
    if args.no_translate {
        cfg.translate_titles = false;
    }
    if args.debug {
        cfg.debug = true;
    }
    if let Some(level) = &args.log_level {
        cfg.log_level = level.clone();
    }
}

fn open_config(dir: Option<PathBuf>) -> anyhow::Result<ConfigManager> {
    let manager = match dir {
        Some(dir) => ConfigManager::new(dir)?,
        None => ConfigManager::open_default()?,
    };
    Ok(manager)
}

fn database_path(cfg: &AnalyzerConfig) -> anyhow::Result<PathBuf> {
    if cfg.database_path.is_empty() {
        Ok(zotero_digest_library::locate_database()?)
    } else {
        Ok(PathBuf::from(&cfg.database_path))
    }
}

fn open_library(path: &Path) -> anyhow::Result<Library> {
    Library::open(path).with_context(|| format!("failed to open Zotero database {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let color = ColorMode(!cli.no_color);
    let manager = open_config(cli.config_dir)?;

    match cli.command {
        Command::Analyze(args) => analyze(&manager, args, color).await,
        Command::Collections {
            search,
            database_path,
        } => {
            let mut cfg = manager.load();
            if let Some(path) = database_path {
                cfg.database_path = path.display().to_string();
            }
            let _guard = logging::init(
                cfg.effective_log_level(),
                cfg.debug,
                Path::new(LOG_DIR),
                &ProgressBar::hidden(),
            )?;
            collections(&cfg, search.as_deref(), color)
        }
        Command::Config { action } => {
            let cfg = manager.load();
            let _guard = logging::init(
                cfg.effective_log_level(),
                cfg.debug,
                Path::new(LOG_DIR),
                &ProgressBar::hidden(),
            )?;
            config(&manager, action, color)
        }
    }
}

async fn analyze(manager: &ConfigManager, args: AnalyzeArgs, color: ColorMode) -> anyhow::Result<()> {
    let mut cfg = manager.load();
    apply_overrides(&mut cfg, &args);
    if cfg.api_key.is_empty()
        && let Ok(key) = std::env::var("OPENAI_API_KEY")
    {
        cfg.api_key = key;
    }

    // Hidden until the batch starts; log lines are printed around it.
    let bar = ProgressBar::hidden();
    let _guard = logging::init(cfg.effective_log_level(), cfg.debug, Path::new(LOG_DIR), &bar)?;
    tracing::info!(config_dir = %manager.dir().display(), "starting analysis run");

    let mut stdout = std::io::stdout();

    // Load items
    let db_path = database_path(&cfg)?;
    let library = open_library(&db_path)?;
    let tree = library.collections()?;

    let (items, collection_names) = if cfg.selected_collections.is_empty() {
        (library.items()?, Vec::new())
    } else {
        let names: Vec<String> = cfg
            .selected_collections
            .iter()
            .filter_map(|key| tree.get(key).map(|c| c.name.clone()))
            .collect();
        tracing::info!(collections = ?names, "analyzing selected collections");
        (library.items_in_collections(&cfg.selected_collections)?, names)
    };

    if items.is_empty() {
        bail!("No items found in the Zotero library");
    }
    let found = items.len();
    let items = cfg.item_filter().apply(items);
    if items.is_empty() {
        bail!("No items remain after filtering ({} found)", found);
    }
    if cfg.api_key.is_empty() {
        bail!("No API key configured. Use --api-key, `config set api_key ...`, or OPENAI_API_KEY");
    }

    // Remember this run; the key stays out of recent.json
    let recent = AnalyzerConfig {
        api_key: String::new(),
        ..cfg.clone()
    };
    if let Err(e) = manager.save_recent(&recent) {
        tracing::warn!(error = %e, "could not save recent config");
    }

    let llm = Arc::new(OpenAiClient::new(
        &cfg.base_url,
        &cfg.api_key,
        Duration::from_secs(cfg.request_timeout_secs),
    ));
    let analyzer = PaperAnalyzer::new(llm, Arc::new(MupdfBackend::new()), cfg.analyzer_settings())?;

    output::print_run_header(&mut stdout, &db_path, items.len(), &cfg.model, &cfg.language, color)?;

    bar.set_length(items.len() as u64);
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} (eta {eta}) {msg}",
        )?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_cb = {
        let bar = bar.clone();
        move |event: ProgressEvent| match event {
            ProgressEvent::Started { .. } => {}
            ProgressEvent::Analyzing { title, .. } => {
                bar.set_message(output::short_title(&title));
            }
            ProgressEvent::Finished {
                index,
                total,
                analysis,
                elapsed,
            } => {
                bar.println(output::item_line(index, total, &analysis, elapsed, color));
                bar.inc(1);
            }
            ProgressEvent::Interrupted { completed, total } => {
                bar.abandon_with_message(format!("interrupted after {}/{}", completed, total));
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let delay = Duration::try_from_secs_f64(cfg.delay).unwrap_or(Duration::ZERO);
    let planned = items.len();
    let analyses = run_batch(
        &items,
        &analyzer,
        library.data_dir(),
        delay,
        &cancel,
        progress_cb,
    )
    .await;
    bar.finish_and_clear();

    if analyses.is_empty() {
        writeln!(stdout, "Nothing was analyzed; no reports written.")?;
        return Ok(());
    }

    let reports = zotero_digest_reporting::export_all(
        &analyses,
        Path::new(&cfg.output_dir),
        &collection_names,
        cfg.export_statistics,
        cfg.export_detailed,
    )?;

    let stats = AnalysisStats::from_analyses(&analyses);
    tracing::info!(
        total = stats.total,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "analysis run complete"
    );
    output::print_summary(&mut stdout, &stats, planned, &reports, color)?;
    Ok(())
}

fn collections(cfg: &AnalyzerConfig, search: Option<&str>, color: ColorMode) -> anyhow::Result<()> {
    let library = open_library(&database_path(cfg)?)?;
    let tree = library.collections()?;
    let mut stdout = std::io::stdout();
    match search {
        Some(term) => output::print_collection_matches(&mut stdout, &tree, term, color)?,
        None => output::print_collection_tree(&mut stdout, &tree, color)?,
    }
    Ok(())
}

fn config(manager: &ConfigManager, action: ConfigAction, color: ColorMode) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match action {
        ConfigAction::Show => {
            let cfg = manager.load();
            output::print_config(&mut stdout, manager.dir(), &cfg.summary(), color)?;
        }
        ConfigAction::Reset => match manager.reset()? {
            Some(backup) => writeln!(stdout, "User config reset; backup saved to {}", backup.display())?,
            None => writeln!(stdout, "No user config to reset.")?,
        },
        ConfigAction::Export { file } => {
            manager.export(&file)?;
            writeln!(stdout, "Config exported to {} (API key masked)", file.display())?;
        }
        ConfigAction::Import { file } => {
            manager
                .import(&file)
                .with_context(|| format!("failed to import {}", file.display()))?;
            writeln!(stdout, "Config imported from {}", file.display())?;
        }
        ConfigAction::Set { key, value } => {
            manager.set_user_value(&key, &value)?;
            let shown = if key == "api_key" { "(hidden)" } else { value.as_str() };
            writeln!(stdout, "Set {} = {}", key, shown)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("zotero-digest").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = parse(&[
            "analyze",
            "--collection",
            "AAAA1111",
            "--collection",
            "BBBB2222",
            "--exclude-keywords",
            "erratum,survey",
            "--limit",
            "5",
            "--log-level",
            "debug",
            "--no-color",
        ]);
        assert!(cli.no_color);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.collections, vec!["AAAA1111", "BBBB2222"]);
        assert_eq!(args.exclude_keywords, vec!["erratum", "survey"]);
        assert_eq!(args.limit, Some(5));
        assert_eq!(args.log_level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn negative_delay_rejected() {
        let res = Cli::try_parse_from(["zotero-digest", "analyze", "--delay", "-1"]);
        assert!(res.is_err());
        assert!(parse_delay("0.5").is_ok());
    }

    #[test]
    fn config_set_parses() {
        let cli = parse(&["config", "set", "model", "gpt-4o-mini"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }

    #[test]
    fn overrides_win_over_config() {
        let mut cfg = AnalyzerConfig {
            model: "from-config".into(),
            export_statistics: true,
            ..Default::default()
        };
        let args = AnalyzeArgs {
            model: Some("from-cli".into()),
            no_export_statistics: true,
            no_translate: true,
            collections: vec!["KEY".into()],
            ..Default::default()
        };
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.model, "from-cli");
        assert!(!cfg.export_statistics);
        assert!(!cfg.translate_titles);
        assert_eq!(cfg.selected_collections, vec!["KEY"]);
        // Absent flags leave config values alone.
        assert_eq!(cfg.output_dir, "output");
    }
}
