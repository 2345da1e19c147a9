//! Media probing, behind a trait so the session never touches codecs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use reelcut_core::TimeRange;

/// What a media file contains, as far as editing cares.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub video: Option<TimeRange>,
    pub audio: Option<TimeRange>,
}

/// Reads a media file's header to learn its valid time ranges. Probing
/// happens only on explicit user actions such as inserting an audio
/// clip, never during playback.
pub trait MediaProbe {
    fn probe(&self, path: &Path) -> anyhow::Result<MediaInfo>;
}

/// A fixed path-to-info table. Useful for tests and for embedders that
/// probe media up front.
#[derive(Debug, Default)]
pub struct StaticProbe {
    entries: HashMap<PathBuf, MediaInfo>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, info: MediaInfo) {
        self.entries.insert(path.into(), info);
    }
}

impl MediaProbe for StaticProbe {
    fn probe(&self, path: &Path) -> anyhow::Result<MediaInfo> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no media info for {}", path.display()))
    }
}
