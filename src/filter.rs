//! Volume inclusion rules
//!
//! The filter is evaluated once per not-yet-processed volume, cheapest
//! criterion first: with nothing configured it includes immediately without
//! fetching anything; metadata rules need one volume-detail lookup
//! (memoized per run); the appearance gate is the expensive path, issuing
//! its own paginated sweep scoped to one (character, volume) pair, and only
//! runs after every metadata rule has already passed.
//!
//! All caches live on the engine, which is scoped to a single run.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::comicvine::{
    volume_comic_id, ComicVineClient, VolumeDetail, VolumeRef, PAGE_SIZE, PUBLISHER_TYPE_PREFIX,
};
use crate::discovery::character_suffix;
use crate::error::SyncError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// Publisher names or ids; empty means any publisher
    #[serde(default)]
    pub publisher_allow: Vec<String>,

    /// Volume name must match when set
    #[serde(default)]
    pub name_allow_regex: String,

    /// Volume name must not match when set
    #[serde(default)]
    pub name_deny_regex: String,

    /// 0 disables; an unknown start year fails a configured minimum
    #[serde(default)]
    pub start_year_min: i32,

    /// 0 disables
    #[serde(default)]
    pub count_of_issues_min: i64,

    /// 0 disables
    #[serde(default)]
    pub min_appearances_in_volume: u64,

    /// 0 disables
    #[serde(default)]
    pub min_appearance_ratio: f64,
}

pub struct FilterEngine {
    filters: FilterConfig,
    name_allow: Option<Regex>,
    name_deny: Option<Regex>,
    detail_cache: HashMap<i64, VolumeDetail>,
    appearance_cache: HashMap<(String, i64), (u64, i64)>,
}

impl FilterEngine {
    /// Compiles the name patterns up front; an invalid pattern is a startup
    /// error, not something to discover volumes deep into a run.
    pub fn new(filters: FilterConfig) -> Result<Self, SyncError> {
        let name_allow = compile_pattern(&filters.name_allow_regex)?;
        let name_deny = compile_pattern(&filters.name_deny_regex)?;
        Ok(Self {
            filters,
            name_allow,
            name_deny,
            detail_cache: HashMap::new(),
            appearance_cache: HashMap::new(),
        })
    }

    /// True when any criterion is configured. When false, `should_include`
    /// answers without any metadata fetch.
    pub fn is_active(&self) -> bool {
        let f = &self.filters;
        !f.publisher_allow.is_empty()
            || !f.name_allow_regex.is_empty()
            || !f.name_deny_regex.is_empty()
            || f.start_year_min > 0
            || f.count_of_issues_min > 0
            || self.wants_appearances()
    }

    /// True when an appearance threshold (count and/or ratio) is configured.
    pub fn wants_appearances(&self) -> bool {
        self.filters.min_appearances_in_volume > 0 || self.filters.min_appearance_ratio > 0.0
    }

    /// Decide whether `vol` passes the configured rules for `char_id`.
    pub async fn should_include(
        &mut self,
        cv: &ComicVineClient,
        vol: &VolumeRef,
        char_id: &str,
    ) -> Result<bool, SyncError> {
        if !self.is_active() {
            return Ok(true);
        }

        let detail = self.volume_detail(cv, vol.id).await?;
        if !self.metadata_passes(vol.id, &detail, vol.name.as_deref()) {
            return Ok(false);
        }

        if self.wants_appearances() {
            let suffix = character_suffix(char_id).to_string();
            let (appearances, total) = self.appearances(cv, &suffix, vol.id).await?;
            if !self.appearance_passes(appearances, total) {
                log::debug!(
                    "[FILTER] vol {} rejected: appearances {}/{} below threshold",
                    vol.id,
                    appearances,
                    total
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Apply the metadata criteria in order, stopping at the first failure.
    pub fn metadata_passes(
        &self,
        volume_id: i64,
        detail: &VolumeDetail,
        fallback_name: Option<&str>,
    ) -> bool {
        let f = &self.filters;
        let name = detail
            .name
            .as_deref()
            .or(fallback_name)
            .unwrap_or("");

        if !f.publisher_allow.is_empty() {
            let publisher_name = detail
                .publisher
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .unwrap_or("")
                .to_lowercase();
            let publisher_id = detail.publisher.as_ref().and_then(|p| p.id);
            let bare_id = publisher_id.map(|id| id.to_string()).unwrap_or_default();
            let prefixed_id = publisher_id
                .map(|id| format!("{}-{}", PUBLISHER_TYPE_PREFIX, id))
                .unwrap_or_default();
            let allowed = f.publisher_allow.iter().any(|entry| {
                let entry = entry.to_lowercase();
                entry == publisher_name || entry == bare_id || entry == prefixed_id
            });
            if !allowed {
                log::debug!(
                    "[FILTER] vol {} '{}' rejected: publisher '{}' not allowed",
                    volume_id,
                    name,
                    publisher_name
                );
                return false;
            }
        }

        if let Some(rx) = &self.name_allow {
            if !rx.is_match(name) {
                log::debug!(
                    "[FILTER] vol {} '{}' rejected: does not match name allow pattern",
                    volume_id,
                    name
                );
                return false;
            }
        }

        if let Some(rx) = &self.name_deny {
            if rx.is_match(name) {
                log::debug!(
                    "[FILTER] vol {} '{}' rejected: matches name deny pattern",
                    volume_id,
                    name
                );
                return false;
            }
        }

        if f.start_year_min > 0 {
            match detail.start_year_value() {
                Some(year) if year >= f.start_year_min => {}
                year => {
                    log::debug!(
                        "[FILTER] vol {} '{}' rejected: start_year {:?} < {}",
                        volume_id,
                        name,
                        year,
                        f.start_year_min
                    );
                    return false;
                }
            }
        }

        if f.count_of_issues_min > 0 {
            let count = detail.count_of_issues.unwrap_or(0);
            if count < f.count_of_issues_min {
                log::debug!(
                    "[FILTER] vol {} '{}' rejected: count_of_issues {} < {}",
                    volume_id,
                    name,
                    count,
                    f.count_of_issues_min
                );
                return false;
            }
        }

        true
    }

    /// Evaluate the appearance thresholds against a measured (count, total).
    pub fn appearance_passes(&self, appearances: u64, total_issues: i64) -> bool {
        let f = &self.filters;
        if f.min_appearances_in_volume > 0 && appearances < f.min_appearances_in_volume {
            return false;
        }
        if f.min_appearance_ratio > 0.0 {
            let ratio = if total_issues > 0 {
                appearances as f64 / total_issues as f64
            } else {
                0.0
            };
            if ratio < f.min_appearance_ratio {
                return false;
            }
        }
        true
    }

    /// Fetch volume metadata, memoized for the remainder of the run.
    pub async fn volume_detail(
        &mut self,
        cv: &ComicVineClient,
        volume_id: i64,
    ) -> Result<VolumeDetail, SyncError> {
        if let Some(detail) = self.detail_cache.get(&volume_id) {
            return Ok(detail.clone());
        }
        let path = format!("volume/{}/", volume_comic_id(volume_id));
        let envelope = cv
            .search(
                &path,
                &[(
                    "field_list",
                    "id,name,publisher,start_year,count_of_issues".to_string(),
                )],
            )
            .await?;
        let detail: VolumeDetail = if envelope.results.is_null() {
            VolumeDetail::default()
        } else {
            serde_json::from_value(envelope.results)?
        };
        self.detail_cache.insert(volume_id, detail.clone());
        Ok(detail)
    }

    /// Count how many of a volume's issues carry the character, by paging
    /// issues filtered on both ids until a short page. Memoized per
    /// (character, volume) for the life of the process.
    pub async fn appearances(
        &mut self,
        cv: &ComicVineClient,
        char_suffix: &str,
        volume_id: i64,
    ) -> Result<(u64, i64), SyncError> {
        let key = (char_suffix.to_string(), volume_id);
        if let Some(&cached) = self.appearance_cache.get(&key) {
            return Ok(cached);
        }

        let total_issues = self
            .volume_detail(cv, volume_id)
            .await?
            .count_of_issues
            .unwrap_or(0);

        let mut appearances: u64 = 0;
        let mut offset: u64 = 0;
        loop {
            let envelope = cv
                .search(
                    "issues/",
                    &[
                        ("field_list", "id".to_string()),
                        (
                            "filter",
                            format!(
                                "character_credits:{},volume:{}",
                                char_suffix,
                                volume_comic_id(volume_id)
                            ),
                        ),
                        ("limit", PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                        ("sort", "id:asc".to_string()),
                    ],
                )
                .await?;
            let page_len = match envelope.results {
                Value::Array(items) => items.len() as u64,
                _ => 0,
            };
            appearances += page_len;
            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        let measured = (appearances, total_issues);
        self.appearance_cache.insert(key, measured);
        Ok(measured)
    }

    /// Seed the detail cache so decision paths can be exercised without a
    /// live catalog.
    #[cfg(test)]
    pub(crate) fn prime_detail_cache(&mut self, detail: VolumeDetail) {
        self.detail_cache.insert(detail.id, detail);
    }
}

fn compile_pattern(pattern: &str) -> Result<Option<Regex>, SyncError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let rx = RegexBuilder::new(pattern).case_insensitive(true).build()?;
    Ok(Some(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail(name: &str, publisher: &str, year: i64, issues: i64) -> VolumeDetail {
        serde_json::from_value(json!({
            "id": 2127,
            "name": name,
            "publisher": {"id": 31, "name": publisher},
            "start_year": year,
            "count_of_issues": issues,
        }))
        .unwrap()
    }

    fn engine(filters: FilterConfig) -> FilterEngine {
        FilterEngine::new(filters).unwrap()
    }

    #[test]
    fn test_inactive_engine_has_no_criteria() {
        let eng = engine(FilterConfig::default());
        assert!(!eng.is_active());
        assert!(!eng.wants_appearances());
    }

    #[test]
    fn test_year_and_issue_count_example() {
        let vol = detail("Amazing Stories", "Marvel", 2001, 12);

        let eng = engine(FilterConfig {
            start_year_min: 2000,
            count_of_issues_min: 6,
            ..Default::default()
        });
        assert!(eng.metadata_passes(2127, &vol, None));

        // raising the issue minimum excludes the same volume, and the
        // decision never reaches the appearance gate
        let eng = engine(FilterConfig {
            start_year_min: 2000,
            count_of_issues_min: 20,
            ..Default::default()
        });
        assert!(!eng.metadata_passes(2127, &vol, None));
        assert!(!eng.wants_appearances());
    }

    #[test]
    fn test_unknown_year_fails_configured_minimum() {
        let vol: VolumeDetail = serde_json::from_value(json!({
            "id": 9, "name": "Undated", "count_of_issues": 50
        }))
        .unwrap();
        let eng = engine(FilterConfig {
            start_year_min: 1990,
            ..Default::default()
        });
        assert!(!eng.metadata_passes(9, &vol, None));
    }

    #[test]
    fn test_publisher_allow_matches_name_or_id() {
        let vol = detail("Spider-Man", "Marvel", 1990, 100);

        for allow in ["marvel", "31", "4010-31"] {
            let eng = engine(FilterConfig {
                publisher_allow: vec![allow.to_string()],
                ..Default::default()
            });
            assert!(eng.metadata_passes(2127, &vol, None), "allow entry {allow}");
        }

        let eng = engine(FilterConfig {
            publisher_allow: vec!["DC Comics".to_string()],
            ..Default::default()
        });
        assert!(!eng.metadata_passes(2127, &vol, None));
    }

    #[test]
    fn test_missing_publisher_fails_allow_list() {
        let vol: VolumeDetail =
            serde_json::from_value(json!({"id": 9, "name": "Orphan"})).unwrap();
        let eng = engine(FilterConfig {
            publisher_allow: vec!["Marvel".to_string()],
            ..Default::default()
        });
        assert!(!eng.metadata_passes(9, &vol, None));
    }

    #[test]
    fn test_name_patterns_are_case_insensitive() {
        let vol = detail("The Spectacular Spider-Man", "Marvel", 1976, 263);

        let eng = engine(FilterConfig {
            name_allow_regex: "spider-man".to_string(),
            ..Default::default()
        });
        assert!(eng.metadata_passes(2127, &vol, None));

        let eng = engine(FilterConfig {
            name_deny_regex: "SPECTACULAR".to_string(),
            ..Default::default()
        });
        assert!(!eng.metadata_passes(2127, &vol, None));
    }

    #[test]
    fn test_fallback_name_used_when_detail_has_none() {
        let vol: VolumeDetail = serde_json::from_value(json!({"id": 9})).unwrap();
        let eng = engine(FilterConfig {
            name_allow_regex: "^untold".to_string(),
            ..Default::default()
        });
        assert!(eng.metadata_passes(9, &vol, Some("Untold Tales")));
        assert!(!eng.metadata_passes(9, &vol, Some("Other Tales")));
    }

    #[test]
    fn test_invalid_pattern_is_a_startup_error() {
        let result = FilterEngine::new(FilterConfig {
            name_allow_regex: "(unclosed".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(SyncError::Pattern(_))));
    }

    #[test]
    fn test_appearance_threshold_example() {
        let eng = engine(FilterConfig {
            min_appearances_in_volume: 5,
            ..Default::default()
        });
        assert!(!eng.appearance_passes(3, 40));
        assert!(eng.appearance_passes(6, 40));
    }

    #[test]
    fn test_appearance_ratio() {
        let eng = engine(FilterConfig {
            min_appearance_ratio: 0.5,
            ..Default::default()
        });
        assert!(!eng.appearance_passes(10, 40));
        assert!(eng.appearance_passes(30, 40));
        // unknown total counts as ratio zero
        assert!(!eng.appearance_passes(10, 0));
    }

    #[test]
    fn test_tightening_thresholds_never_includes_more() {
        let vol = detail("Web of Intrigue", "Marvel", 1985, 24);

        let loose = FilterConfig {
            start_year_min: 1980,
            count_of_issues_min: 10,
            ..Default::default()
        };
        let loose_pass = engine(loose.clone()).metadata_passes(2127, &vol, None);

        for tightened in [
            FilterConfig { start_year_min: 1990, ..loose.clone() },
            FilterConfig { count_of_issues_min: 30, ..loose.clone() },
            FilterConfig {
                name_deny_regex: "intrigue".to_string(),
                ..loose.clone()
            },
        ] {
            let tight_pass = engine(tightened).metadata_passes(2127, &vol, None);
            // a tighter filter can only flip include -> exclude
            assert!(!tight_pass || loose_pass);
            assert!(!tight_pass);
        }
        assert!(loose_pass);
    }
}
