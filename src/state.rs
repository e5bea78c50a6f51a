//! Durable run state: which volumes have been fully processed, and how far
//! each character's issue sweep has advanced. Both records are rewritten in
//! full on every `save()`, so a crash loses at most the work since the last
//! flush. A missing or unreadable file degrades to empty state instead of
//! failing startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PROCESSED_FILE: &str = "processed_volumes.json";
const PROGRESS_FILE: &str = "character_progress.json";

/// Per-character sweep progress, persisted across runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterProgress {
    /// Next `issues/` offset to resume the sweep from
    #[serde(default)]
    pub issues_offset: u64,
    /// Sweep pages completed over the lifetime of the checkpoint
    #[serde(default)]
    pub issue_pages_done: u64,
}

pub struct RunState {
    dir: PathBuf,
    processed: HashSet<i64>,
    progress: HashMap<String, CharacterProgress>,
}

impl RunState {
    pub fn load(dir: &Path) -> Self {
        let mut state = Self {
            dir: dir.to_path_buf(),
            processed: HashSet::new(),
            progress: HashMap::new(),
        };

        match fs::read_to_string(state.dir.join(PROCESSED_FILE)) {
            Ok(text) => match serde_json::from_str::<Vec<i64>>(&text) {
                Ok(ids) => state.processed = ids.into_iter().collect(),
                Err(e) => log::warn!("processed-volumes checkpoint unreadable, starting empty: {}", e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("cannot read processed-volumes checkpoint, starting empty: {}", e),
        }

        match fs::read_to_string(state.dir.join(PROGRESS_FILE)) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(progress) => state.progress = progress,
                Err(e) => log::warn!("character-progress checkpoint unreadable, starting empty: {}", e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("cannot read character-progress checkpoint, starting empty: {}", e),
        }

        state
    }

    /// Flush all in-memory state to disk, overwriting both files.
    pub fn save(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut ids: Vec<i64> = self.processed.iter().copied().collect();
        ids.sort_unstable();
        fs::write(self.dir.join(PROCESSED_FILE), serde_json::to_string(&ids)?)?;
        fs::write(
            self.dir.join(PROGRESS_FILE),
            serde_json::to_string_pretty(&self.progress)?,
        )?;
        Ok(())
    }

    pub fn is_processed(&self, volume_id: i64) -> bool {
        self.processed.contains(&volume_id)
    }

    /// Idempotent; repeated calls for the same id are harmless.
    pub fn mark_processed(&mut self, volume_id: i64) {
        self.processed.insert(volume_id);
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn offset(&self, char_id: &str) -> u64 {
        self.progress.get(char_id).map(|p| p.issues_offset).unwrap_or(0)
    }

    pub fn set_offset(&mut self, char_id: &str, offset: u64) {
        self.progress.entry(char_id.to_string()).or_default().issues_offset = offset;
    }

    pub fn pages_done(&self, char_id: &str) -> u64 {
        self.progress.get(char_id).map(|p| p.issue_pages_done).unwrap_or(0)
    }

    pub fn inc_pages_done(&mut self, char_id: &str) {
        self.progress.entry(char_id.to_string()).or_default().issue_pages_done += 1;
    }
}
