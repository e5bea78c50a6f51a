//! Mylar registration client
//!
//! Mylar's API is a single GET endpoint dispatched on a `cmd` parameter.
//! The `getIndex` response shape is observed rather than documented, so
//! existing ids are harvested by walking the whole JSON tree instead of
//! decoding a fixed schema.

use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::Config;
use crate::error::SyncError;

/// Key spellings under which Mylar has been seen to report a series id
const ID_KEYS: [&str; 3] = ["ComicID", "comicid", "comic_id"];

pub struct MylarClient {
    client: Client,
    base_url: String,
    api_key: String,
    dry_run: bool,
}

impl MylarClient {
    pub fn new(cfg: &Config) -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(cfg.comicvine.user_agent.clone())
            .timeout(Duration::from_secs(cfg.behavior.request_timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.mylar.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.mylar.api_key.clone(),
            dry_run: cfg.behavior.dry_run,
        })
    }

    async fn api(&self, cmd: &str, extra: &[(&str, String)]) -> Result<Value, SyncError> {
        let url = format!("{}/api", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("cmd", cmd.to_string()),
            ("apikey", self.api_key.clone()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let response = self.client.get(&url).query(&query).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Snapshot of every series id Mylar already knows. Read once per run;
    /// failure here is fatal because without the baseline there is no
    /// duplicate-registration protection.
    pub async fn existing_ids(&self) -> Result<HashSet<String>, SyncError> {
        let index = self.api("getIndex", &[]).await?;
        let root = index
            .get("data")
            .or_else(|| index.get("results"))
            .unwrap_or(&index);
        let mut existing = HashSet::new();
        harvest_ids(root, &mut existing);
        log::info!("[Mylar] existing series detected: {}", existing.len());
        Ok(existing)
    }

    /// Register one volume. In dry-run mode no request is made and a
    /// synthetic acknowledgment is returned.
    pub async fn add(&self, comic_id: &str) -> Result<Value, SyncError> {
        if self.dry_run {
            log::info!("[DRY-RUN] would add {}", comic_id);
            return Ok(json!({ "status": "DRY_RUN" }));
        }
        self.api("addComic", &[("ComicID", comic_id.to_string())]).await
    }
}

/// Collect series ids found under any known key spelling, at any depth.
fn harvest_ids(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for key in ID_KEYS {
                match map.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => {
                        out.insert(s.clone());
                    }
                    Some(Value::Number(n)) => {
                        out.insert(n.to_string());
                    }
                    _ => {}
                }
            }
            for child in map.values() {
                harvest_ids(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                harvest_ids(item, out);
            }
        }
        _ => {}
    }
}
