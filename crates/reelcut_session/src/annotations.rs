//! Frame-anchored annotations and the retiming rules that keep them
//! consistent with structural edits.
//!
//! Annotations live beside the timeline, not inside it, so every edit
//! that changes the frame count or moves content has to re-anchor them
//! here. All functions are pure transformations over in-memory
//! collections; none of them fail.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reelcut_core::{RationalTime, TimeRange};

/// A point in a drawn shape, in normalized viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One drawn stroke or marker belonging to an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub tool: String,
    pub points: Vec<Point>,
    pub color: [f32; 4],
}

/// A user marking anchored to a frame, or flagged to show on all
/// frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub time: RationalTime,
    pub all_frames: bool,
    pub shapes: Vec<Shape>,
    pub note: Option<String>,
}

impl Annotation {
    pub fn new(time: RationalTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            all_frames: false,
            shapes: Vec::new(),
            note: None,
        }
    }
}

/// Keep all-frames annotations plus those anchored inside `range`.
/// Used after a collapsing removal, with the new shrunk overall range.
pub fn remove_annotations(range: &TimeRange, annotations: &[Annotation]) -> Vec<Annotation> {
    let mut out = Vec::new();
    for a in annotations {
        if a.all_frames {
            out.push(a.clone());
        }
    }
    for a in annotations {
        if !a.all_frames && range.contains(a.time) {
            out.push(a.clone());
        }
    }
    out
}

/// Retime annotations around a frame-count change at `time`.
///
/// Everything before `time` stays put. For an insertion (positive
/// `offset`) everything at or past the far side of the inserted span
/// shifts later; for a removal (negative `offset`) everything past the
/// near side shifts earlier. Annotations that fall into neither bucket
/// anchored inside the inserted span are dropped. The kept group comes
/// first in the output, then the shifted group.
pub fn offset_annotations(
    time: RationalTime,
    offset: RationalTime,
    annotations: &[Annotation],
) -> Vec<Annotation> {
    let mut out = Vec::new();
    let far_side = time + offset;
    for a in annotations {
        if a.all_frames || a.time < time {
            out.push(a.clone());
        }
    }
    for a in annotations {
        if a.all_frames || a.time < time {
            continue;
        }
        let shifted = if offset.value >= 0.0 {
            a.time >= far_side
        } else {
            a.time > far_side
        };
        if shifted {
            let mut a = a.clone();
            a.time += offset;
            out.push(a);
        }
    }
    out
}

/// Append a source document's annotations onto a destination set.
///
/// Destination annotations pass through unchanged. Source annotations
/// anchored inside `clip_range` are deep-copied under fresh ids and
/// shifted forward by `duration`, the destination content length they
/// now sit after. Copies must not alias the source document's set.
pub fn add_annotations(
    duration: RationalTime,
    existing: &[Annotation],
    clip_range: &TimeRange,
    source: &[Annotation],
) -> Vec<Annotation> {
    let mut out = existing.to_vec();
    for a in source {
        if !clip_range.contains(a.time) {
            continue;
        }
        let mut copy = a.clone();
        copy.id = Uuid::new_v4();
        copy.time += duration;
        out.push(copy);
    }
    out
}

/// Retime annotations for an item moved from `range` to `insert_time`.
///
/// `previous` is true when the item moved to a later position, in
/// which case `insert_time` is the far edge of the destination
/// neighbor and the intervening annotations shift back by the moved
/// range's duration. Moving earlier shifts the annotations between the
/// insert point and the old range forward instead. Annotations inside
/// the moved range travel with it.
pub fn shift_annotations(
    range: &TimeRange,
    insert_time: RationalTime,
    previous: bool,
    annotations: &[Annotation],
) -> Vec<Annotation> {
    let mut out: Vec<Annotation> = annotations.to_vec();
    let mut done = vec![false; out.len()];

    let start_time = range.start_time;
    let range_duration = range.duration;

    for (i, a) in out.iter_mut().enumerate() {
        if a.all_frames {
            continue;
        }
        if previous {
            if a.time <= start_time || a.time >= insert_time {
                done[i] = true;
            } else if range.contains(a.time) {
                let offset = a.time - start_time;
                a.time = insert_time + offset - range_duration;
                done[i] = true;
            }
        } else if range.contains(a.time) {
            let offset = a.time - start_time;
            a.time = insert_time + offset;
            done[i] = true;
        }
    }

    if previous {
        for (i, a) in out.iter_mut().enumerate() {
            if a.all_frames || done[i] {
                continue;
            }
            a.time -= range_duration;
        }
    } else {
        let end_time = range.end_time_exclusive();
        for (i, a) in out.iter_mut().enumerate() {
            if a.all_frames || done[i] {
                continue;
            }
            if a.time >= insert_time && a.time < end_time {
                a.time += range_duration;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(value: f64) -> RationalTime {
        RationalTime::new(value, 24.0)
    }

    fn ann(frame: f64) -> Annotation {
        Annotation::new(t(frame))
    }

    fn all_frames_ann() -> Annotation {
        let mut a = Annotation::new(t(0.0));
        a.all_frames = true;
        a
    }

    fn times(annotations: &[Annotation]) -> Vec<f64> {
        annotations.iter().map(|a| a.time.value).collect()
    }

    // ------------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------------

    #[test]
    fn remove_keeps_in_range_and_all_frames() {
        let annotations = vec![ann(2.0), ann(8.0), all_frames_ann(), ann(20.0)];
        let range = TimeRange::new(t(0.0), t(10.0));
        let kept = remove_annotations(&range, &annotations);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].all_frames);
        assert_eq!(kept[1].time, t(2.0));
        assert_eq!(kept[2].time, t(8.0));
    }

    // ------------------------------------------------------------------------
    // Offset
    // ------------------------------------------------------------------------

    #[test]
    fn insert_shifts_later_annotations_forward() {
        let annotations = vec![ann(3.0), ann(7.0), all_frames_ann()];
        let out = offset_annotations(t(5.0), t(1.0), &annotations);
        assert_eq!(out.len(), 3);
        // Before the insert point: unchanged.
        assert_eq!(out[0].time, t(3.0));
        // After: one frame later.
        assert_eq!(out[2].time, t(8.0));
    }

    #[test]
    fn insert_shift_is_exactly_one_frame_at_the_edge() {
        let annotations = vec![ann(6.0)];
        let out = offset_annotations(t(5.0), t(1.0), &annotations);
        assert_eq!(times(&out), vec![7.0]);
    }

    #[test]
    fn insert_emits_kept_group_before_shifted_group() {
        // The kept annotations come first, then the shifted ones,
        // regardless of input order.
        let annotations = vec![ann(9.0), ann(2.0), all_frames_ann()];
        let out = offset_annotations(t(5.0), t(1.0), &annotations);
        assert_eq!(times(&out), vec![2.0, 0.0, 10.0]);
        assert!(out[1].all_frames);
    }

    #[test]
    fn cut_shifts_later_annotations_back() {
        let annotations = vec![ann(3.0), ann(5.0), ann(9.0)];
        let out = offset_annotations(t(5.0), t(-1.0), &annotations);
        // Annotation on the removed frame lands on the previous frame;
        // later ones shift back one.
        assert_eq!(times(&out), vec![3.0, 4.0, 8.0]);
    }

    #[test]
    fn offset_preserves_all_frames_annotations() {
        let annotations = vec![all_frames_ann()];
        let out = offset_annotations(t(5.0), t(-1.0), &annotations);
        assert_eq!(out.len(), 1);
        assert!(out[0].all_frames);
    }

    // ------------------------------------------------------------------------
    // Add
    // ------------------------------------------------------------------------

    #[test]
    fn add_deep_copies_and_retimes_source() {
        let existing = vec![ann(2.0)];
        let source = vec![ann(10.0), ann(40.0)];
        let clip_range = TimeRange::new(t(5.0), t(20.0));
        let out = add_annotations(t(72.0), &existing, &clip_range, &source);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].time, t(2.0));
        // In-range source annotation shifted past the destination content.
        assert_eq!(out[1].time, t(82.0));
        // Deep copy: fresh identity, no aliasing of the source set.
        assert_ne!(out[1].id, source[0].id);
    }

    #[test]
    fn add_skips_out_of_range_source() {
        let source = vec![ann(100.0)];
        let clip_range = TimeRange::new(t(0.0), t(10.0));
        let out = add_annotations(t(50.0), &[], &clip_range, &source);
        assert!(out.is_empty());
    }

    // ------------------------------------------------------------------------
    // Shift (move/reorder)
    // ------------------------------------------------------------------------

    #[test]
    fn move_later_carries_range_annotations() {
        // Item at [0, 10) moved after a neighbor ending at 30.
        let range = TimeRange::new(t(0.0), t(10.0));
        let annotations = vec![ann(4.0), ann(15.0), ann(40.0)];
        let out = shift_annotations(&range, t(30.0), true, &annotations);
        // Inside the moved range: lands at insert point minus the
        // range's own length plus the in-range offset.
        assert_eq!(out[0].time, t(24.0));
        // Between old position and insert point: shifts back.
        assert_eq!(out[1].time, t(5.0));
        // Past the insert point: untouched.
        assert_eq!(out[2].time, t(40.0));
    }

    #[test]
    fn move_earlier_carries_range_annotations() {
        // Item at [20, 30) moved before a neighbor starting at 5.
        let range = TimeRange::new(t(20.0), t(10.0));
        let annotations = vec![ann(24.0), ann(8.0), ann(2.0)];
        let out = shift_annotations(&range, t(5.0), false, &annotations);
        // Inside the moved range: follows the item.
        assert_eq!(out[0].time, t(9.0));
        // Between insert point and the old range: shifts forward.
        assert_eq!(out[1].time, t(18.0));
        // Before the insert point: untouched.
        assert_eq!(out[2].time, t(2.0));
    }

    #[test]
    fn shift_ignores_all_frames() {
        let range = TimeRange::new(t(0.0), t(10.0));
        let annotations = vec![all_frames_ann()];
        let out = shift_annotations(&range, t(30.0), true, &annotations);
        assert_eq!(out[0].time, t(0.0));
    }
}
