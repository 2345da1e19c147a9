//! Structural edit operations over a single track.
//!
//! These are the building blocks the session layer composes into
//! user-facing commands: slicing, inserting, overwriting, removing and
//! joining items with transitions. Each operation reports expected
//! failures (nothing at the given time, bad index, too-short neighbors)
//! through [`CoreError`] so callers can skip the offending track and
//! keep going.

use crate::error::{CoreError, Result};
use crate::time::{RationalTime, TimeRange};
use crate::types::{Gap, Item, Timeline, Track, Transition};

impl Track {
    /// Split the item occupying `time` in two, partitioning its source
    /// range at the cut point.
    ///
    /// Returns `false` without touching the track when nothing occupies
    /// `time` or when `time` lands exactly on an existing boundary, so
    /// slicing twice at the same spot is a no-op. Callers use that
    /// signal to throw away speculative undo entries.
    pub fn slice(&mut self, time: RationalTime) -> Result<bool> {
        let index = match self.child_at_time(time) {
            Some(index) => index,
            None => return Ok(false),
        };
        let range = self.range_of_child(index)?;
        if range.start_time == time || range.end_time_exclusive() == time {
            return Ok(false);
        }

        let source = *self.children[index]
            .source_range()
            .ok_or(CoreError::NoSourceRange)?;
        let offset = (time - range.start_time).rescaled_to(source.duration.rate);
        let left = TimeRange::new(source.start_time, offset);
        let right = TimeRange::new(source.start_time + offset, source.duration - offset);

        let mut right_item = self.children[index].clone();
        right_item.set_source_range(right);
        self.children[index].set_source_range(left);
        self.children.insert(index + 1, right_item);
        Ok(true)
    }

    /// Insert `item` at `time`, splitting whatever is there and pushing
    /// every later sibling back by the item's duration. Past the end of
    /// the track the item is simply appended.
    pub fn insert(&mut self, item: Item, time: RationalTime) -> Result<()> {
        let end = self.trimmed_range().end_time_exclusive();
        if time >= end {
            self.children.push(item);
            return Ok(());
        }
        self.slice(time)?;
        let mut index = self.children.len();
        for i in 0..self.children.len() {
            if self.children[i].is_transition() {
                continue;
            }
            if self.range_of_child(i)?.start_time >= time {
                index = i;
                break;
            }
        }
        self.children.insert(index, item);
        Ok(())
    }

    /// Replace whatever occupies `range` with `item`, trimming partial
    /// overlaps and deleting fully covered children. Writing past the
    /// end pads the track with a gap first.
    pub fn overwrite(&mut self, item: Item, range: TimeRange) -> Result<()> {
        let end = self.trimmed_range().end_time_exclusive();
        if range.start_time >= end {
            let pad = range.start_time - end;
            if pad.value > 0.0 {
                self.children.push(Item::Gap(Gap {
                    source_range: TimeRange::new(RationalTime::zero(pad.rate), pad),
                }));
            }
            self.children.push(item);
            return Ok(());
        }

        // Boundary slices turn partial overlaps into whole children.
        self.slice(range.start_time)?;
        if range.end_time_exclusive() < end {
            self.slice(range.end_time_exclusive())?;
        }

        let mut doomed = Vec::new();
        let mut insert_at = None;
        for i in 0..self.children.len() {
            if self.children[i].is_transition() {
                continue;
            }
            let child_range = self.range_of_child(i)?;
            if child_range.start_time >= range.start_time
                && child_range.end_time_exclusive() <= range.end_time_exclusive()
            {
                doomed.push(i);
            } else if insert_at.is_none() && child_range.start_time >= range.start_time {
                insert_at = Some(i);
            }
        }
        let index = doomed.first().copied().or(insert_at).unwrap_or(self.children.len());
        for &i in doomed.iter().rev() {
            self.children.remove(i);
        }
        self.children.insert(index, item);
        Ok(())
    }

    /// Delete the item occupying `time` and return it. With
    /// `fill_with_gap` the vacated range is kept open as an explicit
    /// gap; otherwise later siblings close over it.
    pub fn remove(&mut self, time: RationalTime, fill_with_gap: bool) -> Result<Item> {
        let index = self
            .child_at_time(time)
            .ok_or(CoreError::NoItemAtTime(time))?;
        let range = self.range_of_child(index)?;
        let removed = self.children.remove(index);
        if fill_with_gap {
            let duration = range.duration;
            self.children.insert(
                index,
                Item::Gap(Gap {
                    source_range: TimeRange::new(RationalTime::zero(duration.rate), duration),
                }),
            );
        }
        Ok(removed)
    }

    /// Insert a dissolve between two contiguous children, borrowing up
    /// to half of each neighbor (capped at half a second) for the
    /// in/out offsets. Fails without mutating the track when the items
    /// are not adjacent or an offset would come out under one frame.
    pub fn add_transition(&mut self, first: usize, second: usize) -> Result<usize> {
        let len = self.children.len();
        for index in [first, second] {
            if index >= len {
                return Err(CoreError::IndexOutOfRange { index, len });
            }
            if self.children[index].is_transition() {
                return Err(CoreError::NoSourceRange);
            }
        }

        let first_range = self.range_of_child(first)?;
        let second_range = self.range_of_child(second)?;
        let (left, left_range, right_range) = if first_range.start_time <= second_range.start_time {
            (first, first_range, second_range)
        } else {
            (second, second_range, first_range)
        };

        if left_range.end_time_exclusive() != right_range.start_time {
            return Err(CoreError::NotAdjacent);
        }

        let in_offset = transition_offset(&left_range)?;
        let out_offset = transition_offset(&right_range)?;

        self.children.insert(
            left + 1,
            Item::Transition(Transition {
                transition_type: "SMPTE_Dissolve".to_string(),
                in_offset,
                out_offset,
            }),
        );
        Ok(left + 1)
    }
}

// Half the neighbor, capped at half a second of frames. A neighbor
// shorter than two frames cannot lend a whole frame and is rejected.
fn transition_offset(range: &TimeRange) -> Result<RationalTime> {
    let rate = range.duration.rate;
    let frames = (range.duration.value / 2.0).min(rate / 2.0);
    if frames < 1.0 {
        return Err(CoreError::TransitionTooShort);
    }
    Ok(RationalTime::new(frames, rate))
}

/// Repoint every clip whose media target matches `old_url` at
/// `new_url`, leaving all time data untouched. Returns the number of
/// clips rewritten.
pub fn relink_media(timeline: &mut Timeline, old_url: &str, new_url: &str) -> usize {
    let mut count = 0;
    for track in &mut timeline.stack.tracks {
        for child in &mut track.children {
            if let Item::Clip(clip) = child {
                if clip.media.target() == old_url {
                    clip.media.set_target(new_url);
                    count += 1;
                }
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Clip, MediaReference, TrackKind};

    fn clip(name: &str, start: f64, duration: f64, rate: f64) -> Item {
        Item::Clip(Clip {
            name: name.to_string(),
            media: MediaReference::External {
                target_url: format!("/media/{name}.mov"),
                available_range: None,
            },
            source_range: TimeRange::new(
                RationalTime::new(start, rate),
                RationalTime::new(duration, rate),
            ),
        })
    }

    fn video_track(items: Vec<Item>) -> Track {
        let mut track = Track::new("Video", TrackKind::Video);
        track.children = items;
        track
    }

    fn t(value: f64) -> RationalTime {
        RationalTime::new(value, 24.0)
    }

    // ------------------------------------------------------------------------
    // Slice
    // ------------------------------------------------------------------------

    #[test]
    fn slice_partitions_source_range() {
        let mut track = video_track(vec![clip("a", 10.0, 10.0, 24.0)]);
        let changed = track.slice(t(4.0)).unwrap();
        assert!(changed);
        assert_eq!(track.children.len(), 2);
        assert_eq!(
            track.children[0].source_range().unwrap(),
            &TimeRange::new(t(10.0), t(4.0))
        );
        assert_eq!(
            track.children[1].source_range().unwrap(),
            &TimeRange::new(t(14.0), t(6.0))
        );
        // Total duration is unchanged.
        assert_eq!(track.duration(), t(10.0));
    }

    #[test]
    fn slice_at_boundary_is_noop() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0), clip("b", 0.0, 5.0, 24.0)]);
        let before = serde_json::to_string(&track).unwrap();
        assert!(!track.slice(t(0.0)).unwrap());
        assert!(!track.slice(t(10.0)).unwrap());
        assert!(!track.slice(t(15.0)).unwrap());
        assert!(!track.slice(t(20.0)).unwrap());
        assert_eq!(serde_json::to_string(&track).unwrap(), before);
    }

    #[test]
    fn slice_twice_at_same_time_is_idempotent() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        assert!(track.slice(t(4.0)).unwrap());
        let before = serde_json::to_string(&track).unwrap();
        assert!(!track.slice(t(4.0)).unwrap());
        assert_eq!(serde_json::to_string(&track).unwrap(), before);
    }

    #[test]
    fn slice_audio_rate_track() {
        let mut track = Track::new("Audio", TrackKind::Audio);
        track.children = vec![clip("a", 0.0, 48000.0, 48000.0)];
        // Cut at video frame 12 of a one second clip.
        assert!(track.slice(RationalTime::new(12.0, 24.0)).unwrap());
        assert_eq!(
            track.children[0].source_range().unwrap().duration,
            RationalTime::new(24000.0, 48000.0)
        );
        assert_eq!(
            track.children[1].source_range().unwrap().start_time,
            RationalTime::new(24000.0, 48000.0)
        );
    }

    // ------------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------------

    #[test]
    fn insert_mid_item_splits_and_shifts() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        track.insert(clip("x", 0.0, 1.0, 24.0), t(5.0)).unwrap();
        assert_eq!(track.children.len(), 3);
        assert_eq!(track.duration(), t(11.0));
        assert_eq!(track.child_at_time(t(5.0)), Some(1));
        assert_eq!(track.children[1].name(), "x");
        // Later content moved one frame later.
        let tail = track.range_of_child(2).unwrap();
        assert_eq!(tail.start_time, t(6.0));
    }

    #[test]
    fn insert_at_boundary_does_not_split() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0), clip("b", 0.0, 5.0, 24.0)]);
        track.insert(clip("x", 0.0, 1.0, 24.0), t(10.0)).unwrap();
        assert_eq!(track.children.len(), 3);
        assert_eq!(track.children[1].name(), "x");
        assert_eq!(track.duration(), t(16.0));
    }

    #[test]
    fn insert_past_end_appends() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        track.insert(clip("x", 0.0, 1.0, 24.0), t(30.0)).unwrap();
        assert_eq!(track.children.len(), 2);
        assert_eq!(track.children[1].name(), "x");
    }

    #[test]
    fn insert_then_remove_restores_duration() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        track.insert(clip("x", 0.0, 1.0, 24.0), t(5.0)).unwrap();
        assert_eq!(track.duration(), t(11.0));
        track.remove(t(5.0), false).unwrap();
        assert_eq!(track.duration(), t(10.0));
    }

    // ------------------------------------------------------------------------
    // Overwrite
    // ------------------------------------------------------------------------

    #[test]
    fn overwrite_one_frame_window() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        let range = TimeRange::new(t(5.0), t(1.0));
        track.overwrite(clip("x", 0.0, 1.0, 24.0), range).unwrap();
        assert_eq!(track.duration(), t(10.0));
        let index = track.child_at_time(t(5.0)).unwrap();
        assert_eq!(track.children[index].name(), "x");
        // Frame 6 is still the original clip.
        let after = track.child_at_time(t(6.0)).unwrap();
        assert_eq!(track.children[after].name(), "a");
    }

    #[test]
    fn overwrite_whole_item() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0), clip("b", 0.0, 5.0, 24.0)]);
        let range = TimeRange::new(t(10.0), t(5.0));
        track.overwrite(clip("x", 0.0, 5.0, 24.0), range).unwrap();
        assert_eq!(track.children.len(), 2);
        assert_eq!(track.children[1].name(), "x");
        assert_eq!(track.duration(), t(15.0));
    }

    #[test]
    fn overwrite_past_end_pads_with_gap() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        let range = TimeRange::new(t(15.0), t(1.0));
        track.overwrite(clip("x", 0.0, 1.0, 24.0), range).unwrap();
        assert_eq!(track.children.len(), 3);
        assert!(track.children[1].is_gap());
        assert_eq!(track.children[1].duration(), t(5.0));
        assert_eq!(track.duration(), t(16.0));
    }

    // ------------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------------

    #[test]
    fn remove_collapses_by_default() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0), clip("b", 0.0, 5.0, 24.0)]);
        let removed = track.remove(t(3.0), false).unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(track.duration(), t(5.0));
        assert_eq!(track.child_at_time(t(0.0)), Some(0));
    }

    #[test]
    fn remove_with_gap_keeps_duration() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0), clip("b", 0.0, 5.0, 24.0)]);
        track.remove(t(3.0), true).unwrap();
        assert_eq!(track.duration(), t(15.0));
        assert!(track.children[0].is_gap());
    }

    #[test]
    fn remove_at_empty_time_fails() {
        let mut track = video_track(vec![clip("a", 0.0, 10.0, 24.0)]);
        assert!(track.remove(t(20.0), false).is_err());
        assert_eq!(track.children.len(), 1);
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    #[test]
    fn add_transition_between_adjacent_clips() {
        let mut track = video_track(vec![
            clip("a", 0.0, 48.0, 24.0),
            clip("b", 0.0, 48.0, 24.0),
        ]);
        let index = track.add_transition(0, 1).unwrap();
        assert_eq!(index, 1);
        match &track.children[1] {
            Item::Transition(transition) => {
                // Half of 48 frames capped at half a second (12 frames).
                assert_eq!(transition.in_offset, RationalTime::new(12.0, 24.0));
                assert_eq!(transition.out_offset, RationalTime::new(12.0, 24.0));
                assert_eq!(transition.transition_type, "SMPTE_Dissolve");
            }
            other => panic!("expected transition, got {other:?}"),
        }
        // Transitions occupy no track time.
        assert_eq!(track.duration(), t(96.0));
    }

    #[test]
    fn add_transition_normalizes_order() {
        let mut track = video_track(vec![
            clip("a", 0.0, 48.0, 24.0),
            clip("b", 0.0, 48.0, 24.0),
        ]);
        let index = track.add_transition(1, 0).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn add_transition_rejects_non_adjacent() {
        let mut track = video_track(vec![
            clip("a", 0.0, 24.0, 24.0),
            clip("b", 0.0, 24.0, 24.0),
            clip("c", 0.0, 24.0, 24.0),
        ]);
        let before = serde_json::to_string(&track).unwrap();
        assert!(matches!(
            track.add_transition(0, 2),
            Err(CoreError::NotAdjacent)
        ));
        assert_eq!(serde_json::to_string(&track).unwrap(), before);
    }

    #[test]
    fn add_transition_rejects_one_frame_neighbors() {
        let mut track = video_track(vec![
            clip("a", 0.0, 1.0, 24.0),
            clip("b", 0.0, 1.0, 24.0),
        ]);
        let before = serde_json::to_string(&track).unwrap();
        assert!(matches!(
            track.add_transition(0, 1),
            Err(CoreError::TransitionTooShort)
        ));
        assert_eq!(serde_json::to_string(&track).unwrap(), before);
    }

    #[test]
    fn add_transition_rejects_bad_index() {
        let mut track = video_track(vec![clip("a", 0.0, 24.0, 24.0)]);
        assert!(track.add_transition(0, 5).is_err());
    }

    // ------------------------------------------------------------------------
    // Relink
    // ------------------------------------------------------------------------

    #[test]
    fn relink_substitutes_matching_clips() {
        let mut timeline = crate::types::Timeline::new("test");
        let mut track = video_track(vec![
            clip("a", 0.0, 10.0, 24.0),
            clip("b", 0.0, 10.0, 24.0),
            clip("a", 10.0, 10.0, 24.0),
        ]);
        track.children.insert(1, Item::Gap(Gap {
            source_range: TimeRange::new(t(0.0), t(2.0)),
        }));
        timeline.stack.tracks.push(track);

        let count = relink_media(&mut timeline, "/media/a.mov", "/mnt/new/a.mov");
        assert_eq!(count, 2);
        let track = &timeline.stack.tracks[0];
        match &track.children[0] {
            Item::Clip(c) => {
                assert_eq!(c.media.target(), "/mnt/new/a.mov");
                // Time data untouched.
                assert_eq!(c.source_range, TimeRange::new(t(0.0), t(10.0)));
            }
            other => panic!("expected clip, got {other:?}"),
        }
    }

    #[test]
    fn relink_without_match_changes_nothing() {
        let mut timeline = crate::types::Timeline::new("test");
        timeline
            .stack
            .tracks
            .push(video_track(vec![clip("a", 0.0, 10.0, 24.0)]));
        assert_eq!(relink_media(&mut timeline, "/nope.mov", "/new.mov"), 0);
    }
}
