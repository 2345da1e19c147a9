//! Open documents and their backing storage.
//!
//! Every committed edit is persisted to the document's path as pretty
//! JSON. Documents that started life as ordinary media acquire a
//! synthetic temporary EDL path on their first edit; those paths follow
//! the pattern `EDL<pid>.<index>.otio` in the system temp directory and
//! are recognized by that pattern alone, then swept at shutdown.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use reelcut_core::{Item, RationalTime, TimeRange, Timeline, Track, TrackKind};

use crate::annotations::Annotation;
use crate::error::Result;

static EDL_INDEX: AtomicUsize = AtomicUsize::new(1);

/// An open timeline plus its playback and annotation state.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: PathBuf,
    pub timeline: Timeline,
    pub annotations: Vec<Annotation>,
    /// Overall visible range of the timeline.
    pub time_range: TimeRange,
    /// User-selected in/out sub-range.
    pub in_out_range: TimeRange,
    pub current_time: RationalTime,
    pub speed: f64,
    pub playing: bool,
}

impl Document {
    pub fn new(path: PathBuf, timeline: Timeline) -> Self {
        let duration = timeline.duration();
        let range = TimeRange::new(RationalTime::zero(duration.rate), duration);
        Self {
            path,
            timeline,
            annotations: Vec::new(),
            time_range: range,
            in_out_range: range,
            current_time: range.start_time,
            speed: duration.rate,
            playing: false,
        }
    }

    /// A fresh in-memory EDL with one empty video track, backed by a
    /// temporary path.
    pub fn empty_edl() -> Self {
        let mut timeline = Timeline::new("EDL");
        timeline.stack.tracks.push(Track::new("Video", TrackKind::Video));
        Self::new(temporary_edl_path(), timeline)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let timeline = Timeline::read_from_file(path)?;
        Ok(Self::new(path.to_path_buf(), timeline))
    }

    pub fn save(&self) -> Result<()> {
        self.timeline.write_to_file(&self.path)?;
        Ok(())
    }

    /// Path string used as the anchor identity in history snapshots.
    pub fn file_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Playhead position relative to the visible range: the edit
    /// anchor. The raw clock may carry a global start offset.
    pub fn local_time(&self) -> RationalTime {
        self.current_time - self.time_range.start_time
    }

    /// Move the playhead to a time given relative to the visible
    /// range, clamped into it.
    pub fn seek(&mut self, local: RationalTime) {
        let range = self.time_range;
        self.current_time = range.start_time + local;
        if self.current_time < range.start_time {
            self.current_time = range.start_time;
        } else if self.current_time >= range.end_time_exclusive() {
            let last = range.end_time_exclusive() - RationalTime::new(1.0, range.duration.rate);
            self.current_time = if last < range.start_time {
                range.start_time
            } else {
                last
            };
        }
    }

    /// Install a new overall range, clamping the in/out range and the
    /// playhead into it.
    pub fn apply_time_range(&mut self, range: TimeRange) {
        self.time_range = range;
        self.in_out_range = range;
        if self.current_time < range.start_time {
            self.current_time = range.start_time;
        } else if self.current_time >= range.end_time_exclusive() {
            let last = range.end_time_exclusive() - RationalTime::new(1.0, range.duration.rate);
            self.current_time = if last < range.start_time {
                range.start_time
            } else {
                last
            };
        }
    }
}

/// Allocate the next temporary EDL path: `<tmp>/EDL<pid>.<index>.otio`.
pub fn temporary_edl_path() -> PathBuf {
    let index = EDL_INDEX.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("EDL{}.{}.otio", std::process::id(), index))
}

/// Temporary EDLs are recognized by location and name pattern, not by
/// any stored flag.
pub fn is_temporary_edl(path: &Path) -> bool {
    let in_temp = path
        .parent()
        .map(|p| p == std::env::temp_dir())
        .unwrap_or(false);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    in_temp && name.starts_with("EDL") && name.ends_with(".otio")
}

/// Delete this process's temporary EDL files. Returns how many were
/// removed.
pub fn sweep_temporary_edls() -> std::io::Result<usize> {
    let prefix = format!("EDL{}.", std::process::id());
    let mut removed = 0;
    for entry in std::fs::read_dir(std::env::temp_dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".otio") {
            if let Err(error) = std::fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), %error, "could not remove temporary EDL");
            } else {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Rewrite relative clip media targets as absolute paths against
/// `base`. Done before capturing undo snapshots so a restored timeline
/// resolves its media from anywhere.
pub fn make_paths_absolute(timeline: &mut Timeline, base: &Path) {
    for track in &mut timeline.stack.tracks {
        for child in &mut track.children {
            if let Item::Clip(clip) = child {
                if clip.media.is_relative() {
                    let joined = base.join(clip.media.target());
                    clip.media.set_target(&joined.to_string_lossy());
                }
            }
        }
    }
}

/// Rewrite absolute clip media targets as paths relative to the
/// directory containing `otio_file`, when they live under it. Used
/// when saving a temporary EDL to a user-chosen location.
pub fn make_paths_relative(timeline: &mut Timeline, otio_file: &Path) {
    let Some(base) = otio_file.parent() else {
        return;
    };
    for track in &mut timeline.stack.tracks {
        for child in &mut track.children {
            if let Item::Clip(clip) = child {
                let target = PathBuf::from(clip.media.target());
                if let Ok(relative) = target.strip_prefix(base) {
                    clip.media.set_target(&relative.to_string_lossy());
                }
            }
        }
    }
}
