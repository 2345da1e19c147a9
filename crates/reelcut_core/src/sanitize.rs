//! Rate normalization across a whole timeline.
//!
//! Edits on one track can change which track carries the highest video
//! or audio rate, so after every structural edit the whole timeline is
//! rescaled to the maximum observed rate per class. Start and duration
//! are rounded to whole frames independently, keeping cross-rate
//! arithmetic exact on later edits.

use crate::time::{RationalTime, TimeRange};
use crate::types::{Timeline, TrackKind};

/// The outcome of a sanitize pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeResult {
    /// Range of the longest video track, the new overall visible range.
    pub time_range: TimeRange,
    pub video_rate: f64,
    pub sample_rate: f64,
}

/// Rescale every clip and gap to the highest rate found in its track
/// class, rounding to whole frames. `video_rate` and `sample_rate`
/// seed the search so callers can force a floor (e.g. from clipboard
/// contents); pass `0.0` to use only what the timeline contains.
pub fn sanitize_rates(
    timeline: &mut Timeline,
    mut video_rate: f64,
    mut sample_rate: f64,
) -> SanitizeResult {
    for track in &timeline.stack.tracks {
        for child in &track.children {
            let Some(range) = child.source_range() else {
                continue;
            };
            match track.kind {
                TrackKind::Video => video_rate = video_rate.max(range.duration.rate),
                TrackKind::Audio => sample_rate = sample_rate.max(range.duration.rate),
            }
        }
    }

    let mut time_range: Option<TimeRange> = None;
    for track in &mut timeline.stack.tracks {
        let rate = match track.kind {
            TrackKind::Video => video_rate,
            TrackKind::Audio => sample_rate,
        };
        if rate > 0.0 {
            for child in &mut track.children {
                let Some(range) = child.source_range() else {
                    continue;
                };
                let start = range.start_time.rescaled_to(rate).round();
                let duration = range.duration.rescaled_to(rate).round();
                child.set_source_range(TimeRange::new(start, duration));
            }
        }
        if track.kind == TrackKind::Video {
            let range = track.trimmed_range();
            let longest = time_range
                .map(|r| range.duration >= r.duration)
                .unwrap_or(true);
            if longest {
                time_range = Some(range);
            }
        }
    }

    let time_range = time_range.unwrap_or_else(|| {
        let rate = if video_rate > 0.0 { video_rate } else { 24.0 };
        TimeRange::new(
            RationalTime::zero(rate),
            timeline.duration().rescaled_to(rate),
        )
    });

    SanitizeResult {
        time_range,
        video_rate,
        sample_rate,
    }
}
