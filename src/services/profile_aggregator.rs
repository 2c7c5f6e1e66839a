//! Profile aggregator service.
//!
//! Folds per-package profiles into one profile per (mode, file) using the
//! merge engine and writes one coverprofile per mode.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, instrument};

use crate::domain::errors::MergeFailure;
use crate::domain::models::profile::{CoverMode, Profile};
use crate::infrastructure::profile_format;
use crate::services::merge_engine::merge_blocks;

/// Accumulates merged profiles keyed by mode, then by file name.
#[derive(Debug, Default)]
pub struct ProfileAggregator {
    accumulators: BTreeMap<CoverMode, BTreeMap<String, Profile>>,
    /// Keys whose merge failed; later profiles for them are ignored.
    poisoned: BTreeSet<(CoverMode, String)>,
    file_excludes: Vec<Regex>,
}

impl ProfileAggregator {
    pub fn new(file_excludes: Vec<Regex>) -> Self {
        Self {
            accumulators: BTreeMap::new(),
            poisoned: BTreeSet::new(),
            file_excludes,
        }
    }

    /// Fold one file's profile into its accumulator.
    pub fn add(&mut self, profile: Profile) -> Result<(), MergeFailure> {
        let key = (profile.mode, profile.file_name.clone());
        if self.poisoned.contains(&key) {
            debug!(file = %profile.file_name, mode = %profile.mode, "skipping profile for failed merge");
            return Ok(());
        }

        let files = self.accumulators.entry(profile.mode).or_default();
        let Some(acc) = files.get_mut(&profile.file_name) else {
            files.insert(profile.file_name.clone(), profile);
            return Ok(());
        };

        match merge_blocks(&acc.blocks, &profile.blocks) {
            Ok(blocks) => {
                acc.blocks = blocks;
                debug_assert!(acc.is_disjoint(), "merge left overlapping blocks");
                Ok(())
            }
            Err(source) => {
                error!(
                    file = %profile.file_name,
                    mode = %profile.mode,
                    error = %source,
                    "profile merge rejected"
                );
                files.remove(&profile.file_name);
                self.poisoned.insert(key);
                Err(MergeFailure {
                    file_name: profile.file_name,
                    mode: profile.mode,
                    source,
                })
            }
        }
    }

    /// Fold every profile from one package, collecting merge failures.
    pub fn add_all(&mut self, profiles: impl IntoIterator<Item = Profile>) -> Vec<MergeFailure> {
        profiles
            .into_iter()
            .filter_map(|p| self.add(p).err())
            .collect()
    }

    /// Modes seen so far.
    pub fn modes(&self) -> Vec<CoverMode> {
        self.accumulators
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(mode, _)| *mode)
            .collect()
    }

    /// Merged profiles for `mode`, sorted by file name, without excluded files.
    pub fn profiles(&self, mode: CoverMode) -> Vec<Profile> {
        self.accumulators
            .get(&mode)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|p| !self.is_excluded(&p.file_name))
            .cloned()
            .collect()
    }

    fn is_excluded(&self, file_name: &str) -> bool {
        self.file_excludes.iter().any(|re| re.is_match(file_name))
    }

    /// Name of the merged profile written for `mode`.
    pub fn output_path(dir: &Path, base_name: &str, mode: CoverMode) -> PathBuf {
        dir.join(format!("{base_name}-{mode}.coverprofile"))
    }

    /// Write one coverprofile per mode into `dir`.
    #[instrument(skip(self), fields(modes = self.accumulators.len()))]
    pub fn write_all(&self, dir: &Path, base_name: &str) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for mode in self.modes() {
            let path = Self::output_path(dir, base_name, mode);
            let profiles = self.profiles(mode);
            profile_format::write_file(&path, mode, &profiles)?;
            debug!(path = %path.display(), files = profiles.len(), "wrote merged profile");
            written.push(path);
        }
        Ok(written)
    }
}
