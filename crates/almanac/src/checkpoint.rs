//! Per-league progress files.
//!
//! One pretty-printed JSON document per league, replaced atomically after
//! every unit so an interrupted run resumes from the last finished season.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::League;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Corrupt checkpoint file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub league: League,
    pub last_completed_year: Option<i32>,
    pub failed_years: BTreeSet<i32>,
    pub total_completed: u32,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(league: League) -> Self {
        Self {
            league,
            last_completed_year: None,
            failed_years: BTreeSet::new(),
            total_completed: 0,
            saved_at: Utc::now(),
        }
    }

    /// Record a unit the sweep has moved past, successfully or not.
    pub fn record(&mut self, year: i32, succeeded: bool) {
        self.last_completed_year = Some(self.last_completed_year.map_or(year, |y| y.max(year)));
        if succeeded {
            self.failed_years.remove(&year);
            self.total_completed += 1;
        } else {
            self.failed_years.insert(year);
        }
    }

    /// A failed year that succeeded on a later pass.
    pub fn recover(&mut self, year: i32) {
        if self.failed_years.remove(&year) {
            self.total_completed += 1;
        }
    }
}

/// Where a league's sweep should start, and which years to retry at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    pub years: Vec<i32>,
    pub retry: BTreeSet<i32>,
}

pub fn plan(first: i32, last: i32, checkpoint: Option<&Checkpoint>) -> ResumePlan {
    let start = checkpoint
        .and_then(|c| c.last_completed_year)
        .map_or(first, |year| (year + 1).max(first));
    let retry = checkpoint
        .map(|c| {
            c.failed_years
                .iter()
                .copied()
                .filter(|y| (first..=last).contains(y))
                .collect()
        })
        .unwrap_or_default();

    ResumePlan {
        years: (start..=last).collect(),
        retry,
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, league: League) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", league.code()))
    }

    pub fn load(&self, league: League) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(league);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        let checkpoint = serde_json::from_str(&content)
            .map_err(|source| CheckpointError::Corrupt {
                path: path.clone(),
                source,
            })
            .inspect_err(|e| log::error!("{}", e))?;

        log::info!("Loaded checkpoint {}", path.display());
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| CheckpointError::Io { path, source }
        };

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        }

        let path = self.path_for(checkpoint.league);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(checkpoint)?;

        // Contents must be durable before the rename publishes them
        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(io_err(&tmp))?;
        drop(file);
        fs::rename(&tmp, &path)
            .map_err(io_err(&path))
            .inspect_err(|e| log::error!("{}", e))?;

        log::debug!(
            "Saved checkpoint for {} at {:?}",
            checkpoint.league,
            checkpoint.last_completed_year
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));

        let mut checkpoint = Checkpoint::new(League::National);
        checkpoint.record(1876, true);
        checkpoint.record(1877, false);
        checkpoint.record(1878, true);
        store.save(&checkpoint).unwrap();

        let loaded = store.load(League::National).unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.last_completed_year, Some(1878));
        assert_eq!(loaded.failed_years, BTreeSet::from([1877]));
        assert_eq!(loaded.total_completed, 2);
        assert!(store.path_for(League::National).ends_with("checkpoint_n.json"));
    }

    #[test]
    fn test_save_replaces_without_leftover_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut checkpoint = Checkpoint::new(League::American);
        checkpoint.record(1901, true);
        store.save(&checkpoint).unwrap();
        checkpoint.record(1902, false);
        store.save(&checkpoint).unwrap();

        let path = store.path_for(League::American);
        assert!(!path.with_extension("json.tmp").exists());
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.load(League::American).unwrap().unwrap(), checkpoint);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        assert!(store.load(League::American).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path_for(League::American), "{ not json").unwrap();

        let err = store.load(League::American).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_resume_starts_after_last_completed() {
        let mut checkpoint = Checkpoint::new(League::American);
        checkpoint.last_completed_year = Some(1955);
        checkpoint.failed_years = BTreeSet::from([1903, 1950]);

        let plan = plan(1901, 2001, Some(&checkpoint));
        assert_eq!(plan.years.first(), Some(&1956));
        assert_eq!(plan.years.last(), Some(&2001));
        assert_eq!(plan.retry, BTreeSet::from([1903, 1950]));
    }

    #[test]
    fn test_fresh_plan_covers_whole_range() {
        let plan = plan(1901, 1905, None);
        assert_eq!(plan.years, vec![1901, 1902, 1903, 1904, 1905]);
        assert!(plan.retry.is_empty());
    }

    #[test]
    fn test_recover_clears_failure() {
        let mut checkpoint = Checkpoint::new(League::American);
        checkpoint.record(1901, false);
        checkpoint.recover(1901);
        checkpoint.recover(1902);

        assert!(checkpoint.failed_years.is_empty());
        assert_eq!(checkpoint.total_completed, 1);
    }
}
