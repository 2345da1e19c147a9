use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::time::{RationalTime, TimeRange};

/// Kind of a track: video tracks run at a frame rate, audio tracks at a
/// sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Where a clip's media lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaReference {
    /// A single media file addressed by URL or path.
    External {
        target_url: String,
        available_range: Option<TimeRange>,
    },
    /// A numbered image sequence addressed by a base directory and
    /// file name prefix.
    ImageSequence {
        target_url_base: String,
        name_prefix: String,
        start_frame: i64,
        frame_rate: f64,
        available_range: Option<TimeRange>,
    },
}

impl MediaReference {
    /// The URL (or base URL for sequences) this reference points at.
    pub fn target(&self) -> &str {
        match self {
            MediaReference::External { target_url, .. } => target_url,
            MediaReference::ImageSequence { target_url_base, .. } => target_url_base,
        }
    }

    /// Repoint the reference at a new URL without touching any time data.
    pub fn set_target(&mut self, url: &str) {
        match self {
            MediaReference::External { target_url, .. } => *target_url = url.to_string(),
            MediaReference::ImageSequence { target_url_base, .. } => {
                *target_url_base = url.to_string()
            }
        }
    }

    pub fn available_range(&self) -> Option<&TimeRange> {
        match self {
            MediaReference::External { available_range, .. } => available_range.as_ref(),
            MediaReference::ImageSequence { available_range, .. } => available_range.as_ref(),
        }
    }

    /// True when the target is a relative filesystem path.
    pub fn is_relative(&self) -> bool {
        Path::new(self.target()).is_relative()
    }
}

/// A span of source media placed on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    pub media: MediaReference,
    /// The portion of the referenced media this clip shows.
    pub source_range: TimeRange,
}

/// A placeholder occupying time with no media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub source_range: TimeRange,
}

/// A dissolve between two adjacent items, borrowing `in_offset` frames
/// from the item before it and `out_offset` frames from the item after.
/// Transitions occupy no time of their own on the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub transition_type: String,
    pub in_offset: RationalTime,
    pub out_offset: RationalTime,
}

/// A member of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Clip(Clip),
    Gap(Gap),
    Transition(Transition),
}

impl Item {
    pub fn is_clip(&self) -> bool {
        matches!(self, Item::Clip(_))
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, Item::Gap(_))
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Item::Transition(_))
    }

    /// The source range of a clip or gap. Transitions have none.
    pub fn source_range(&self) -> Option<&TimeRange> {
        match self {
            Item::Clip(clip) => Some(&clip.source_range),
            Item::Gap(gap) => Some(&gap.source_range),
            Item::Transition(_) => None,
        }
    }

    /// Replace the source range of a clip or gap. No-op for transitions.
    pub fn set_source_range(&mut self, range: TimeRange) {
        match self {
            Item::Clip(clip) => clip.source_range = range,
            Item::Gap(gap) => gap.source_range = range,
            Item::Transition(_) => {}
        }
    }

    /// Time the item occupies on its track. Transitions overlap their
    /// neighbors and contribute no duration of their own.
    pub fn duration(&self) -> RationalTime {
        match self.source_range() {
            Some(range) => range.duration,
            None => RationalTime::zero(24.0),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Item::Clip(clip) => &clip.name,
            Item::Gap(_) => "gap",
            Item::Transition(t) => &t.transition_type,
        }
    }
}

/// An ordered sequence of items, contiguous in time. Silence or black
/// must be an explicit [`Gap`]; there are no implicit holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub kind: TrackKind,
    pub enabled: bool,
    pub children: Vec<Item>,
}

impl Track {
    pub fn new(name: &str, kind: TrackKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            enabled: true,
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The rate of the track: the highest rate among its children's
    /// durations, which is what repeated cross-rate addition converges to.
    pub fn rate(&self) -> f64 {
        let mut rate: f64 = 0.0;
        for child in &self.children {
            if let Some(range) = child.source_range() {
                rate = rate.max(range.duration.rate);
            }
        }
        if rate > 0.0 {
            rate
        } else {
            24.0
        }
    }

    /// Total duration of the track at its own rate.
    pub fn duration(&self) -> RationalTime {
        self.trimmed_range().duration
    }

    /// The whole track as a range starting at zero, at the track rate.
    pub fn trimmed_range(&self) -> TimeRange {
        let rate = self.rate();
        let mut value = 0.0;
        for child in &self.children {
            value += child.duration().value_rescaled_to(rate);
        }
        TimeRange::new(RationalTime::zero(rate), RationalTime::new(value, rate))
    }

    /// The range a child occupies within the track, at the track rate.
    /// The start is the cumulative duration of all preceding siblings.
    pub fn range_of_child(&self, index: usize) -> Result<TimeRange> {
        if index >= self.children.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: self.children.len(),
            });
        }
        let rate = self.rate();
        let mut start = 0.0;
        for child in &self.children[..index] {
            start += child.duration().value_rescaled_to(rate);
        }
        let duration = self.children[index].duration().value_rescaled_to(rate);
        Ok(TimeRange::new(
            RationalTime::new(start, rate),
            RationalTime::new(duration, rate),
        ))
    }

    /// Index of the clip or gap occupying `time`, by half-open
    /// containment. Transitions are skipped; they overlap their
    /// neighbors rather than occupying time.
    pub fn child_at_time(&self, time: RationalTime) -> Option<usize> {
        let rate = self.rate();
        let mut start = 0.0;
        for (index, child) in self.children.iter().enumerate() {
            let duration = child.duration().value_rescaled_to(rate);
            if child.is_transition() {
                continue;
            }
            let range = TimeRange::new(
                RationalTime::new(start, rate),
                RationalTime::new(duration, rate),
            );
            if range.contains(time) {
                return Some(index);
            }
            start += duration;
        }
        None
    }
}

/// The ordered set of tracks in a timeline. Track order is z-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub tracks: Vec<Track>,
}

impl Stack {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// True when every track has zero children. Restoring such a state
    /// requires a media-cache refresh downstream.
    pub fn is_all_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.is_empty())
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

/// The root of the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    pub global_start_time: Option<RationalTime>,
    pub stack: Stack,
}

impl Timeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            global_start_time: None,
            stack: Stack::new(),
        }
    }

    /// Duration of the longest track.
    pub fn duration(&self) -> RationalTime {
        let mut duration = RationalTime::zero(24.0);
        for track in &self.stack.tracks {
            let d = track.duration();
            if d > duration {
                duration = d;
            }
        }
        duration
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.stack.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.stack.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// Indices into the stack of all tracks of the given kind.
    pub fn track_indices(&self, kind: TrackKind) -> Vec<usize> {
        self.stack
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Compact JSON, used for snapshot equality checks.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_string(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON written to the backing document.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
