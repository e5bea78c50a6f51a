use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

use comic_sync::config::{parse_bool, split_list, Config};
use comic_sync::pipeline::Pipeline;

const LOG_FILE_SIZE_LIMIT: u64 = 1_000_000;
const LOG_FILE_COUNT: u32 = 5;

/// Sync character volumes from ComicVine to Mylar (resumable, filtered).
#[derive(Parser, Debug)]
#[command(name = "comic_sync", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory for checkpoint files
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Comma-separated character ids (e.g. "4005-1443,4005-2048")
    #[arg(long)]
    character_ids: Option<String>,

    #[arg(long)]
    comicvine_api_key: Option<String>,

    #[arg(long)]
    comicvine_user_agent: Option<String>,

    #[arg(long)]
    mylar_base_url: Option<String>,

    #[arg(long)]
    mylar_api_key: Option<String>,

    /// Log and count what would be registered without calling Mylar
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    log_level: Option<String>,

    /// Seconds to pause after every catalog call
    #[arg(long)]
    rate_delay: Option<f64>,

    #[arg(long)]
    request_timeout: Option<u64>,

    #[arg(long)]
    max_issue_pages_per_run: Option<u64>,

    /// "true" or "false"; whether to run the exhaustive issues sweep
    #[arg(long)]
    use_issue_fallback: Option<String>,

    /// Pipe-separated publisher names or ids
    #[arg(long)]
    publisher_allow: Option<String>,

    #[arg(long)]
    name_allow_regex: Option<String>,

    #[arg(long)]
    name_deny_regex: Option<String>,

    #[arg(long)]
    start_year_min: Option<i32>,

    #[arg(long)]
    count_of_issues_min: Option<i64>,

    #[arg(long)]
    min_appearances_in_volume: Option<u64>,

    #[arg(long)]
    min_appearance_ratio: Option<f64>,
}

/// CLI flags win over environment and file values.
fn apply_cli(cfg: &mut Config, cli: &Cli) {
    if let Some(v) = &cli.state_dir {
        cfg.paths.state_dir = v.clone();
    }
    if let Some(v) = &cli.log_dir {
        cfg.paths.log_dir = v.clone();
    }
    if let Some(v) = &cli.character_ids {
        cfg.comicvine.character_ids = split_list(v, ',');
    }
    if let Some(v) = &cli.comicvine_api_key {
        cfg.comicvine.api_key = v.clone();
    }
    if let Some(v) = &cli.comicvine_user_agent {
        cfg.comicvine.user_agent = v.clone();
    }
    if let Some(v) = &cli.mylar_base_url {
        cfg.mylar.base_url = v.clone();
    }
    if let Some(v) = &cli.mylar_api_key {
        cfg.mylar.api_key = v.clone();
    }
    if cli.dry_run {
        cfg.behavior.dry_run = true;
    }
    if let Some(v) = &cli.log_level {
        cfg.behavior.log_level = v.clone();
    }
    if let Some(v) = cli.rate_delay {
        cfg.behavior.rate_delay = v;
    }
    if let Some(v) = cli.request_timeout {
        cfg.behavior.request_timeout = v;
    }
    if let Some(v) = cli.max_issue_pages_per_run {
        cfg.behavior.max_issue_pages_per_run = v;
    }
    if let Some(b) = cli.use_issue_fallback.as_deref().and_then(parse_bool) {
        cfg.behavior.use_issue_fallback = b;
    }
    if let Some(v) = &cli.publisher_allow {
        cfg.filters.publisher_allow = split_list(v, '|');
    }
    if let Some(v) = &cli.name_allow_regex {
        cfg.filters.name_allow_regex = v.clone();
    }
    if let Some(v) = &cli.name_deny_regex {
        cfg.filters.name_deny_regex = v.clone();
    }
    if let Some(v) = cli.start_year_min {
        cfg.filters.start_year_min = v;
    }
    if let Some(v) = cli.count_of_issues_min {
        cfg.filters.count_of_issues_min = v;
    }
    if let Some(v) = cli.min_appearances_in_volume {
        cfg.filters.min_appearances_in_volume = v;
    }
    if let Some(v) = cli.min_appearance_ratio {
        cfg.filters.min_appearance_ratio = v;
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Console plus a size-rotated file under `log_dir`.
fn init_logging(level: &str, log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l:<8} {m}{n}")))
        .build();

    let log_path = log_dir.join("comic_sync.log");
    let roll_pattern = format!("{}.{{}}", log_path.display());
    let roller = FixedWindowRoller::builder().build(&roll_pattern, LOG_FILE_COUNT)?;
    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_FILE_SIZE_LIMIT)),
        Box::new(roller),
    );
    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l:<8} {m}{n}",
        )))
        .build(&log_path, Box::new(policy))?;

    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level_filter(level)),
        )?;
    log4rs::init_config(config)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config);
    cfg.apply_env(|key| std::env::var(key).ok());
    apply_cli(&mut cfg, &cli);

    // checked before any network activity
    if cfg.comicvine.api_key.is_empty() {
        eprintln!("Missing ComicVine API key. Set COMICVINE_API_KEY or [comicvine] api_key.");
        std::process::exit(2);
    }
    if cfg.mylar.api_key.is_empty() {
        eprintln!("Missing Mylar API key. Set MYLAR_API_KEY or [mylar] api_key.");
        std::process::exit(2);
    }

    if let Err(e) = init_logging(&cfg.behavior.log_level, &cfg.paths.log_dir) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let mut pipeline = match Pipeline::new(cfg) {
        Ok(p) => p,
        Err(e) => {
            log::error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl+C aborts the in-flight pass; everything checkpointed so far is
    // flushed one final time before exiting.
    let outcome = {
        let run = pipeline.run();
        tokio::pin!(run);
        tokio::select! {
            result = &mut run => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    let code = match outcome {
        None => {
            log::warn!("interrupted, flushing checkpoint before exit");
            if let Err(e) = pipeline.save_state() {
                log::error!("final checkpoint flush failed: {}", e);
            }
            130
        }
        Some(Ok(())) => {
            match serde_json::to_string_pretty(pipeline.summary()) {
                Ok(report) => println!("{}", report),
                Err(e) => log::error!("cannot render run summary: {}", e),
            }
            0
        }
        Some(Err(e)) => {
            log::error!("run failed: {}", e);
            if let Err(e) = pipeline.save_state() {
                log::error!("final checkpoint flush failed: {}", e);
            }
            1
        }
    };
    std::process::exit(code);
}
