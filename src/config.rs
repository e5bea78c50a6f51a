use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::FilterConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub comicvine: ComicVineConfig,
    #[serde(default)]
    pub mylar: MylarConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ComicVineConfig {
    /// Base URL of the catalog API
    #[serde(default = "default_cv_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Sent on every catalog and Mylar request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Namespace-qualified character ids, e.g. "4005-1443"
    #[serde(default = "default_character_ids")]
    pub character_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MylarConfig {
    #[serde(default = "default_mylar_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BehaviorConfig {
    /// Log and count what would be registered without calling Mylar
    #[serde(default = "default_false")]
    pub dry_run: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Pause after every successful catalog call, in seconds
    #[serde(default = "default_rate_delay")]
    pub rate_delay: f64,

    /// Timeout for HTTP requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Issue-sweep pages fetched per run before stopping cleanly
    #[serde(default = "default_max_issue_pages")]
    pub max_issue_pages_per_run: u64,

    /// Run the exhaustive issues sweep after the credits query
    #[serde(default = "default_true")]
    pub use_issue_fallback: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_cv_base_url() -> String { "https://comicvine.gamespot.com/api".to_string() }
fn default_user_agent() -> String { "ComicSync/1.0".to_string() }
fn default_character_ids() -> Vec<String> { vec!["4005-1443".to_string()] }
fn default_mylar_base_url() -> String { "http://localhost:8090".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_rate_delay() -> f64 { 1.1 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_issue_pages() -> u64 { 180 }
fn default_state_dir() -> PathBuf { PathBuf::from("state") }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }

impl Default for ComicVineConfig {
    fn default() -> Self {
        Self {
            base_url: default_cv_base_url(),
            api_key: String::new(),
            user_agent: default_user_agent(),
            character_ids: default_character_ids(),
        }
    }
}

impl Default for MylarConfig {
    fn default() -> Self {
        Self {
            base_url: default_mylar_base_url(),
            api_key: String::new(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_level: default_log_level(),
            rate_delay: default_rate_delay(),
            request_timeout: default_request_timeout(),
            max_issue_pages_per_run: default_max_issue_pages(),
            use_issue_fallback: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing or unparsable. Logging is not up yet at this point, so
    /// complaints go to stderr.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => eprintln!(
                        "config {} is not valid TOML, using defaults: {}",
                        path.display(),
                        e
                    ),
                },
                Err(e) => eprintln!("cannot read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Overlay environment variables onto the file/default values.
    ///
    /// The lookup is injected so the merge can be exercised without touching
    /// the process environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("COMICVINE_API_KEY") {
            self.comicvine.api_key = v;
        }
        if let Some(v) = var("COMICVINE_USER_AGENT") {
            self.comicvine.user_agent = v;
        }
        if let Some(v) = var("CHARACTER_IDS") {
            self.comicvine.character_ids = split_list(&v, ',');
        }
        if let Some(v) = var("MYLAR_BASE_URL") {
            self.mylar.base_url = v;
        }
        if let Some(v) = var("MYLAR_API_KEY") {
            self.mylar.api_key = v;
        }
        if let Some(b) = var("DRY_RUN").as_deref().and_then(parse_bool) {
            self.behavior.dry_run = b;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.behavior.log_level = v;
        }
        if let Some(n) = var("CV_RATE_DELAY").and_then(|v| v.parse().ok()) {
            self.behavior.rate_delay = n;
        }
        if let Some(n) = var("REQUEST_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.behavior.request_timeout = n;
        }
        if let Some(n) = var("MAX_ISSUE_PAGES_PER_RUN").and_then(|v| v.parse().ok()) {
            self.behavior.max_issue_pages_per_run = n;
        }
        if let Some(b) = var("USE_ISSUE_FALLBACK").as_deref().and_then(parse_bool) {
            self.behavior.use_issue_fallback = b;
        }
        if let Some(v) = var("PUBLISHER_ALLOW") {
            self.filters.publisher_allow = split_list(&v, '|');
        }
        if let Some(v) = var("NAME_ALLOW_REGEX") {
            self.filters.name_allow_regex = v;
        }
        if let Some(v) = var("NAME_DENY_REGEX") {
            self.filters.name_deny_regex = v;
        }
        if let Some(n) = var("START_YEAR_MIN").and_then(|v| v.parse().ok()) {
            self.filters.start_year_min = n;
        }
        if let Some(n) = var("COUNT_OF_ISSUES_MIN").and_then(|v| v.parse().ok()) {
            self.filters.count_of_issues_min = n;
        }
        if let Some(n) = var("MIN_APPEARANCES_IN_VOLUME").and_then(|v| v.parse().ok()) {
            self.filters.min_appearances_in_volume = n;
        }
        if let Some(n) = var("MIN_APPEARANCE_RATIO").and_then(|v| v.parse().ok()) {
            self.filters.min_appearance_ratio = n;
        }
        if let Some(v) = var("STATE_DIR") {
            self.paths.state_dir = PathBuf::from(v);
        }
        if let Some(v) = var("LOG_DIR") {
            self.paths.log_dir = PathBuf::from(v);
        }
    }
}

/// Accepts "1"/"true"/"yes" and "0"/"false"/"no" in any case.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Split a delimited list, dropping empty entries.
pub fn split_list(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
