//! Drag-reorder reconciliation.
//!
//! A drag gesture in the UI produces a batch of move descriptors. Each
//! one relocates an item between track positions, retimes the
//! annotations that the move dragged along or displaced, and finally
//! strands any transition whose neighbors changed, which gets it
//! removed.

use serde::{Deserialize, Serialize};
use tracing::error;

use reelcut_core::{Timeline, TrackKind};

use crate::annotations::{shift_annotations, Annotation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    /// Relocate an item.
    Move,
    /// The batch only wants an undo checkpoint; no structural change.
    UndoOnly,
}

/// One move descriptor from a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    pub from_track: usize,
    pub from_index: usize,
    pub to_track: usize,
    pub to_index: usize,
    pub kind: MoveKind,
}

/// True when the batch is a bare undo checkpoint request.
pub fn is_undo_only(moves: &[MoveEntry]) -> bool {
    moves.len() == 1 && moves[0].kind == MoveKind::UndoOnly
}

/// Apply a batch of moves to the timeline, retiming `annotations` as
/// items relocate. Invalid descriptors are logged and skipped; the
/// rest of the batch still applies.
pub fn apply_moves(
    timeline: &mut Timeline,
    annotations: &mut Vec<Annotation>,
    moves: &[MoveEntry],
) {
    // Positions whose neighborhoods changed, per track.
    let mut touched: Vec<(usize, usize)> = Vec::new();

    for entry in moves {
        if entry.kind != MoveKind::Move {
            continue;
        }
        let track_count = timeline.stack.tracks.len();
        if entry.from_track >= track_count || entry.to_track >= track_count {
            error!(?entry, "move references a track that does not exist");
            continue;
        }
        let from_len = timeline.stack.tracks[entry.from_track].children.len();
        if entry.from_index >= from_len {
            error!(?entry, "move source index out of range");
            continue;
        }

        // Removing first shifts later same-track indices down by one.
        let mut to_index = entry.to_index;
        if entry.from_track == entry.to_track && entry.to_index > entry.from_index {
            to_index -= 1;
        }
        let to_len = if entry.from_track == entry.to_track {
            from_len - 1
        } else {
            timeline.stack.tracks[entry.to_track].children.len()
        };
        if to_index > to_len {
            error!(?entry, "move destination index out of range");
            continue;
        }

        let from_kind = timeline.stack.tracks[entry.from_track].kind;
        let rate = timeline.stack.tracks[entry.from_track].rate();
        let old_range = match timeline.stack.tracks[entry.from_track].range_of_child(entry.from_index)
        {
            Ok(range) => range.rescaled_to(rate),
            Err(err) => {
                error!(?entry, %err, "could not resolve moved item's range");
                continue;
            }
        };

        let item = timeline.stack.tracks[entry.from_track]
            .children
            .remove(entry.from_index);
        timeline.stack.tracks[entry.to_track]
            .children
            .insert(to_index, item);
        touched.push((entry.from_track, entry.from_index));
        touched.push((entry.to_track, to_index));

        // Audio reordering carries no visible annotations.
        if from_kind != TrackKind::Video {
            continue;
        }

        let new_range = match timeline.stack.tracks[entry.to_track].range_of_child(to_index) {
            Ok(range) => range,
            Err(err) => {
                error!(?entry, %err, "could not resolve moved item's new range");
                continue;
            }
        };
        let previous = to_index > entry.from_index;
        let insert_time = if previous {
            new_range.end_time_exclusive()
        } else {
            new_range.start_time
        }
        .rescaled_to(rate);

        *annotations = shift_annotations(&old_range, insert_time, previous, annotations);
    }

    for (track_index, position) in touched {
        remove_stranded_transitions(timeline, track_index, position);
    }
}

// A transition is built for the two items flanking it; moving either
// one strands it. Remove transitions adjacent to `position`, highest
// index first so earlier removals do not shift later ones.
fn remove_stranded_transitions(timeline: &mut Timeline, track_index: usize, position: usize) {
    let Some(track) = timeline.stack.tracks.get_mut(track_index) else {
        return;
    };
    let len = track.children.len();
    let mut doomed: Vec<usize> = Vec::new();
    for candidate in [
        position.checked_sub(1),
        Some(position),
        position.checked_add(1),
    ]
    .into_iter()
    .flatten()
    {
        if candidate < len && track.children[candidate].is_transition() {
            doomed.push(candidate);
        }
    }
    doomed.sort_unstable();
    doomed.dedup();
    for index in doomed.into_iter().rev() {
        track.children.remove(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_core::{
        Clip, Gap, Item, MediaReference, RationalTime, TimeRange, Track, Transition,
    };

    fn t(value: f64) -> RationalTime {
        RationalTime::new(value, 24.0)
    }

    fn clip(name: &str, duration: f64) -> Item {
        Item::Clip(Clip {
            name: name.to_string(),
            media: MediaReference::External {
                target_url: format!("/media/{name}.mov"),
                available_range: None,
            },
            source_range: TimeRange::new(t(0.0), t(duration)),
        })
    }

    fn timeline_with(items: Vec<Item>) -> Timeline {
        let mut timeline = Timeline::new("test");
        let mut track = Track::new("Video", TrackKind::Video);
        track.children = items;
        timeline.stack.tracks.push(track);
        timeline
    }

    fn names(timeline: &Timeline, track: usize) -> Vec<&str> {
        timeline.stack.tracks[track]
            .children
            .iter()
            .map(|c| c.name())
            .collect()
    }

    fn mv(from_index: usize, to_index: usize) -> MoveEntry {
        MoveEntry {
            from_track: 0,
            from_index,
            to_track: 0,
            to_index,
            kind: MoveKind::Move,
        }
    }

    #[test]
    fn undo_only_batch_is_detected() {
        let batch = [MoveEntry {
            from_track: 0,
            from_index: 0,
            to_track: 0,
            to_index: 0,
            kind: MoveKind::UndoOnly,
        }];
        assert!(is_undo_only(&batch));
        assert!(!is_undo_only(&[mv(0, 1)]));
    }

    #[test]
    fn move_later_within_a_track() {
        let mut timeline = timeline_with(vec![clip("a", 10.0), clip("b", 10.0), clip("c", 10.0)]);
        let mut annotations = Vec::new();
        apply_moves(&mut timeline, &mut annotations, &[mv(0, 2)]);
        assert_eq!(names(&timeline, 0), vec!["b", "a", "c"]);
    }

    #[test]
    fn move_earlier_within_a_track() {
        let mut timeline = timeline_with(vec![clip("a", 10.0), clip("b", 10.0), clip("c", 10.0)]);
        let mut annotations = Vec::new();
        apply_moves(&mut timeline, &mut annotations, &[mv(2, 0)]);
        assert_eq!(names(&timeline, 0), vec!["c", "a", "b"]);
    }

    #[test]
    fn move_later_retimes_annotations() {
        // a[0,10) b[10,20): move a after b.
        let mut timeline = timeline_with(vec![clip("a", 10.0), clip("b", 10.0)]);
        let mut annotations = vec![Annotation::new(t(4.0)), Annotation::new(t(15.0))];
        apply_moves(&mut timeline, &mut annotations, &[mv(0, 2)]);
        assert_eq!(names(&timeline, 0), vec!["b", "a"]);
        // The annotation on "a" follows it to [10, 20).
        assert_eq!(annotations[0].time, t(14.0));
        // The annotation on "b" shifts back to [0, 10).
        assert_eq!(annotations[1].time, t(5.0));
    }

    #[test]
    fn audio_moves_skip_annotation_retiming() {
        let mut timeline = Timeline::new("test");
        let mut track = Track::new("Audio", TrackKind::Audio);
        track.children = vec![clip("a", 10.0), clip("b", 10.0)];
        timeline.stack.tracks.push(track);
        let mut annotations = vec![Annotation::new(t(4.0))];
        apply_moves(
            &mut timeline,
            &mut annotations,
            &[MoveEntry {
                from_track: 0,
                from_index: 0,
                to_track: 0,
                to_index: 2,
                kind: MoveKind::Move,
            }],
        );
        assert_eq!(names(&timeline, 0), vec!["b", "a"]);
        assert_eq!(annotations[0].time, t(4.0));
    }

    #[test]
    fn invalid_indices_are_skipped() {
        let mut timeline = timeline_with(vec![clip("a", 10.0)]);
        let mut annotations = Vec::new();
        apply_moves(&mut timeline, &mut annotations, &[mv(5, 0)]);
        assert_eq!(names(&timeline, 0), vec!["a"]);
    }

    #[test]
    fn move_across_tracks() {
        let mut timeline = timeline_with(vec![clip("a", 10.0), clip("b", 10.0)]);
        let mut other = Track::new("V2", TrackKind::Video);
        other.children = vec![Item::Gap(Gap {
            source_range: TimeRange::new(t(0.0), t(10.0)),
        })];
        timeline.stack.tracks.push(other);
        let mut annotations = Vec::new();
        apply_moves(
            &mut timeline,
            &mut annotations,
            &[MoveEntry {
                from_track: 0,
                from_index: 1,
                to_track: 1,
                to_index: 1,
                kind: MoveKind::Move,
            }],
        );
        assert_eq!(names(&timeline, 0), vec!["a"]);
        assert_eq!(names(&timeline, 1), vec!["gap", "b"]);
    }

    #[test]
    fn stranded_transition_is_removed() {
        let transition = Item::Transition(Transition {
            transition_type: "SMPTE_Dissolve".to_string(),
            in_offset: t(2.0),
            out_offset: t(2.0),
        });
        let mut timeline =
            timeline_with(vec![clip("a", 10.0), transition, clip("b", 10.0), clip("c", 10.0)]);
        let mut annotations = Vec::new();
        // Move "b" (index 2) to the end; the dissolve between a and b
        // loses its right neighbor.
        apply_moves(&mut timeline, &mut annotations, &[mv(2, 4)]);
        assert_eq!(names(&timeline, 0), vec!["a", "c", "b"]);
    }
}
