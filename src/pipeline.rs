//! Run orchestration
//!
//! Per character the pipeline runs the credits scan, then the resumable
//! issues sweep. Candidates from both strategies funnel through
//! `process_volume`, where the checkpoint membership check is the merge
//! key: a volume surfaced by both strategies, or by different runs, is
//! filtered and registered exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::comicvine::{volume_comic_id, ComicVineClient, VolumeRef, PAGE_SIZE};
use crate::config::Config;
use crate::discovery::{self, character_suffix};
use crate::error::SyncError;
use crate::filter::FilterEngine;
use crate::mylar::MylarClient;
use crate::state::RunState;

/// End-of-run report, printed as JSON.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub characters: Vec<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Candidates streamed through the pipeline this run, repeats included
    pub volumes_discovered: u64,
    /// Checkpoint size after the run
    pub volumes_processed_total: usize,
    pub issue_pages_this_run: u64,
    pub added: u64,
    pub already_in_mylar: u64,
    pub filtered_out: u64,
    pub errors: u64,
}

pub struct Pipeline {
    cv: ComicVineClient,
    mylar: MylarClient,
    cfg: Config,
    state: RunState,
    filter: FilterEngine,
    existing: HashSet<String>,
    summary: RunSummary,
}

impl Pipeline {
    pub fn new(cfg: Config) -> Result<Self, SyncError> {
        let cv = ComicVineClient::new(&cfg)?;
        let mylar = MylarClient::new(&cfg)?;
        let filter = FilterEngine::new(cfg.filters.clone())?;
        let state = RunState::load(&cfg.paths.state_dir);
        let summary = RunSummary {
            characters: cfg.comicvine.character_ids.clone(),
            dry_run: cfg.behavior.dry_run,
            started_at: Utc::now(),
            finished_at: None,
            volumes_discovered: 0,
            volumes_processed_total: state.processed_count(),
            issue_pages_this_run: 0,
            added: 0,
            already_in_mylar: 0,
            filtered_out: 0,
            errors: 0,
        };
        Ok(Self {
            cv,
            mylar,
            cfg,
            state,
            filter,
            existing: HashSet::new(),
            summary,
        })
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Flush the checkpoint; also called from the top level on interrupt.
    pub fn save_state(&self) -> std::io::Result<()> {
        self.state.save()
    }

    pub async fn run(&mut self) -> Result<(), SyncError> {
        log::info!("=== comic_sync start ===");
        log::info!("characters: {:?}", self.cfg.comicvine.character_ids);
        log::info!(
            "dry_run={} | rate_delay={}s | timeout={}s",
            self.cfg.behavior.dry_run,
            self.cfg.behavior.rate_delay,
            self.cfg.behavior.request_timeout
        );
        log::info!(
            "max issue pages per run: {} | use_issue_fallback={}",
            self.cfg.behavior.max_issue_pages_per_run,
            self.cfg.behavior.use_issue_fallback
        );

        // Without this baseline there is no duplicate protection, so a
        // failure here ends the run.
        self.existing = self.mylar.existing_ids().await?;

        let characters = self.cfg.comicvine.character_ids.clone();
        for char_id in &characters {
            let processed = self.credits_scan(char_id).await?;
            log::info!("[CV] {}: volume_credits processed volumes={}", char_id, processed);

            if self.cfg.behavior.use_issue_fallback {
                let pages = self.sweep_scan(char_id).await?;
                self.summary.issue_pages_this_run += pages;
            } else {
                log::info!("use_issue_fallback=false, skipping issues sweep for {}", char_id);
            }
        }

        self.state.save()?;
        self.summary.volumes_processed_total = self.state.processed_count();
        self.summary.finished_at = Some(Utc::now());
        log::info!("=== comic_sync complete ===");
        Ok(())
    }

    /// Strategy A: stream the credits list through the pipeline, flushing
    /// the checkpoint every 25 candidates.
    async fn credits_scan(&mut self, char_id: &str) -> Result<u64, SyncError> {
        let volumes = discovery::credits_volumes(&self.cv, char_id).await?;
        log::info!("[CV] {}: volume_credits returned {} volumes", char_id, volumes.len());

        let mut count: u64 = 0;
        for vol in &volumes {
            self.process_volume(vol, char_id).await?;
            count += 1;
            if count % 25 == 0 {
                self.state.save()?;
            }
        }
        self.state.save()?;
        Ok(count)
    }

    /// Strategy B: page through every issue tagged with the character,
    /// resuming from the persisted offset and stopping cleanly at the
    /// per-run page budget. Pages are committed (offset advanced, counter
    /// bumped, checkpoint flushed) strictly in ascending offset order, so
    /// the saved offset is always a valid resume point. A transport failure
    /// ends the pass without erroring the run; progress already saved
    /// stands.
    async fn sweep_scan(&mut self, char_id: &str) -> Result<u64, SyncError> {
        let budget = self.cfg.behavior.max_issue_pages_per_run;
        let suffix = character_suffix(char_id).to_string();
        let mut pages_this_pass: u64 = 0;
        let mut offset = self.state.offset(char_id);
        let mut total_pages: Option<u64> = None;

        loop {
            if pages_this_pass >= budget {
                log::warn!(
                    "[LIMIT] hit max_issue_pages_per_run={} for {}; resuming from offset {} next run",
                    budget,
                    char_id,
                    offset
                );
                break;
            }
            if let Some(pages) = total_pages {
                if offset >= pages * PAGE_SIZE {
                    break;
                }
            }

            let page = match discovery::issue_page(&self.cv, &suffix, offset).await {
                Ok(page) => page,
                Err(SyncError::Transport(e)) => {
                    log::error!(
                        "[HTTP] issues page at offset={} failed for {}: {}",
                        offset,
                        char_id,
                        e
                    );
                    self.summary.errors += 1;
                    break;
                }
                Err(e) => return Err(e),
            };
            if total_pages.is_none() {
                total_pages = Some(discovery::total_pages(page.total, PAGE_SIZE));
                log::info!(
                    "[CV] {}: issues total={}, starting offset={}",
                    char_id,
                    page.total,
                    offset
                );
            }

            let mut pass_aborted = false;
            for vol in &page.volumes {
                match self.process_volume(vol, char_id).await {
                    Ok(()) => {}
                    Err(SyncError::Transport(e)) => {
                        log::error!(
                            "[HTTP] candidate volume {} failed for {}: {}; ending sweep pass",
                            vol.id,
                            char_id,
                            e
                        );
                        self.summary.errors += 1;
                        pass_aborted = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            if pass_aborted {
                // page not committed; the next run redoes it from the
                // saved offset
                break;
            }

            pages_this_pass += 1;
            offset += PAGE_SIZE;
            self.state.set_offset(char_id, offset);
            self.state.inc_pages_done(char_id);
            self.state.save()?;

            if pages_this_pass % 10 == 0 {
                log::info!(
                    "[CV] {}: paged {} this pass (offset {}, {} pages total)",
                    char_id,
                    pages_this_pass,
                    offset,
                    total_pages.unwrap_or(0)
                );
            }
        }

        Ok(pages_this_pass)
    }

    /// Filter-and-register decision for one candidate. The checkpoint check
    /// up front makes this idempotent across strategies and across runs;
    /// whatever the outcome (excluded, already present, added, or a failed
    /// registration) the volume is marked processed so it is never
    /// revisited.
    async fn process_volume(&mut self, vol: &VolumeRef, char_id: &str) -> Result<(), SyncError> {
        self.summary.volumes_discovered += 1;
        if self.state.is_processed(vol.id) {
            return Ok(());
        }

        if !self.filter.should_include(&self.cv, vol, char_id).await? {
            self.state.mark_processed(vol.id);
            self.summary.filtered_out += 1;
            return Ok(());
        }

        let comic_id = volume_comic_id(vol.id);
        let name = vol.name.as_deref().unwrap_or("?");

        if self.existing.contains(&comic_id) {
            log::debug!("[SKIP] already in Mylar: {} - {}", comic_id, name);
            self.state.mark_processed(vol.id);
            self.summary.already_in_mylar += 1;
            return Ok(());
        }

        match self.mylar.add(&comic_id).await {
            Ok(resp) => {
                let keys: Vec<&String> = resp
                    .as_object()
                    .map(|o| o.keys().take(5).collect())
                    .unwrap_or_default();
                log::info!("[ADD] {} - {} :: keys={:?}", comic_id, name, keys);
                self.summary.added += 1;
            }
            Err(e) => {
                // No automatic retry: a volume that keeps failing would
                // hot-loop every run. Clearing its checkpoint entry is the
                // operator's way to retry.
                log::error!("[ADD-ERR] {} - {} :: {}", comic_id, name, e);
                self.summary.errors += 1;
            }
        }
        self.state.mark_processed(vol.id);
        Ok(())
    }
}
