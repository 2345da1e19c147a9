//! The edit session: user-facing commands over open documents.
//!
//! Every command follows the same shape: capture an undo snapshot,
//! mutate the timeline through the track operations in
//! [`reelcut_core`], renormalize rates, persist the document and
//! broadcast the command for collaborators. Per-track failures are
//! logged and skipped so one bad track never aborts a whole edit.

use std::path::Path;

use tracing::{error, warn};

use reelcut_core::{
    relink_media, sanitize_rates, Clip, Gap, Item, MediaReference, RationalTime, SanitizeResult,
    TimeRange, Timeline, Track, TrackKind,
};

use crate::annotations::{add_annotations, offset_annotations, remove_annotations};
use crate::broadcast::{Broadcaster, Message, RemoteCommand};
use crate::document::{self, Document};
use crate::error::{Result, SessionError};
use crate::history::{History, Snapshot};
use crate::moves::{self, MoveEntry};
use crate::probe::MediaProbe;

/// One frame lifted off one track by a copy or cut.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub track_index: usize,
    /// Rate of the originating track, a floor for paste targets.
    pub rate: f64,
    pub kind: TrackKind,
    /// Clone of the source item trimmed to a single frame.
    pub item: Item,
}

type Hook = Box<dyn Fn()>;

/// Holds the cross-document editing state: history, the frame
/// clipboard, the outbound broadcaster and the refresh hooks an
/// embedder installs.
#[derive(Default)]
pub struct EditSession {
    history: History,
    clipboard: Vec<FrameRecord>,
    broadcaster: Broadcaster,
    on_media_cache_refresh: Option<Hook>,
    on_thumbnail_refresh: Option<Hook>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn has_undo(&self) -> bool {
        self.history.has_undo()
    }

    pub fn has_redo(&self) -> bool {
        self.history.has_redo()
    }

    pub fn clipboard(&self) -> &[FrameRecord] {
        &self.clipboard
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut Broadcaster {
        &mut self.broadcaster
    }

    /// Called when track topology changes in a way that invalidates
    /// decoded media caches, e.g. a track appears or empties out.
    pub fn set_media_cache_refresh(&mut self, hook: impl Fn() + 'static) {
        self.on_media_cache_refresh = Some(Box::new(hook));
    }

    pub fn set_thumbnail_refresh(&mut self, hook: impl Fn() + 'static) {
        self.on_thumbnail_refresh = Some(Box::new(hook));
    }

    fn refresh_media_cache(&self) {
        if let Some(hook) = &self.on_media_cache_refresh {
            hook();
        }
    }

    fn refresh_thumbnails(&self) {
        if let Some(hook) = &self.on_thumbnail_refresh {
            hook();
        }
    }

    // ------------------------------------------------------------------------
    // History plumbing
    // ------------------------------------------------------------------------

    /// Snapshot the document onto the undo stack. Media paths are made
    /// absolute first so a restored timeline resolves from anywhere,
    /// and documents not yet backed by an EDL get a temporary one.
    /// Returns whether an entry was actually stored; an edit that then
    /// turns out to be a no-op uses that to discard its snapshot.
    fn store_undo(&mut self, doc: &mut Document) -> Result<bool> {
        let base = doc.path.parent().map(Path::to_path_buf).unwrap_or_default();
        document::make_paths_absolute(&mut doc.timeline, &base);
        let json = doc.timeline.to_json_string()?;
        if self.history.undo_top_json() == Some(json.as_str()) {
            return Ok(false);
        }
        if doc.path.extension().and_then(|e| e.to_str()) != Some("otio") {
            doc.path = document::temporary_edl_path();
        }
        doc.save()?;
        Ok(self.history.push_undo(Snapshot {
            json,
            file_name: doc.file_name(),
            annotations: doc.annotations.clone(),
        }))
    }

    fn store_redo(&mut self, doc: &mut Document) -> Result<bool> {
        let base = doc.path.parent().map(Path::to_path_buf).unwrap_or_default();
        document::make_paths_absolute(&mut doc.timeline, &base);
        let json = doc.timeline.to_json_string()?;
        doc.save()?;
        Ok(self.history.push_redo(Snapshot {
            json,
            file_name: doc.file_name(),
            annotations: doc.annotations.clone(),
        }))
    }

    /// Persist a committed edit: save, invalidate redo, fire hooks.
    fn after_edit(&mut self, doc: &mut Document) -> Result<()> {
        doc.save()?;
        self.history.clear_redo();
        if doc.timeline.stack.is_all_empty() {
            self.refresh_media_cache();
        }
        self.refresh_thumbnails();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Frame clipboard
    // ------------------------------------------------------------------------

    /// Lift the frame under the playhead off every track into the
    /// clipboard. The copies are trimmed to one frame each; the
    /// timeline is untouched.
    pub fn copy_frame(&mut self, doc: &mut Document) -> Result<()> {
        doc.playing = false;
        let base = doc.path.parent().map(Path::to_path_buf).unwrap_or_default();
        document::make_paths_absolute(&mut doc.timeline, &base);

        let time = doc.local_time();
        let one_frame = RationalTime::new(1.0, time.rate);
        self.clipboard.clear();
        for (track_index, track) in doc.timeline.stack.tracks.iter().enumerate() {
            let Some(index) = track.child_at_time(time) else {
                continue;
            };
            let Some(clip_range) = track.children[index].source_range().copied() else {
                continue;
            };
            let track_range = match track.range_of_child(index) {
                Ok(range) => range,
                Err(err) => {
                    warn!(track_index, %err, "could not resolve frame to copy");
                    continue;
                }
            };
            let start = time - track_range.start_time + clip_range.start_time;
            let mut item = track.children[index].clone();
            item.set_source_range(TimeRange::new(start, one_frame));
            self.clipboard.push(FrameRecord {
                track_index,
                rate: track.rate(),
                kind: track.kind,
                item,
            });
        }
        self.broadcaster.push("Edit/Frame/Copy", time);
        Ok(())
    }

    /// Copy the frame under the playhead, then delete it from every
    /// track, closing the hole and retiming later annotations back one
    /// frame.
    pub fn cut_frame(&mut self, doc: &mut Document) -> Result<()> {
        self.copy_frame(doc)?;
        if self.clipboard.is_empty() {
            return Ok(());
        }

        let time = doc.local_time();
        let one_frame = RationalTime::new(1.0, time.rate);
        let out_time = time + one_frame;
        self.store_undo(doc)?;

        let track_indices: Vec<usize> = self.clipboard.iter().map(|r| r.track_index).collect();
        for track_index in track_indices {
            let Some(track) = doc.timeline.stack.tracks.get_mut(track_index) else {
                warn!(track_index, "cut references a missing track");
                continue;
            };
            if let Err(err) = track.slice(time) {
                warn!(track_index, %err, "could not slice at the cut frame");
                continue;
            }
            if let Err(err) = track.slice(out_time) {
                warn!(track_index, %err, "could not slice past the cut frame");
                continue;
            }
            // Probe the middle of the frame; an interior point resolves
            // unambiguously at any track rate.
            let rate = track.rate();
            let probe = time.rescaled_to(rate) + RationalTime::new(0.5, rate);
            let Some(index) = track.child_at_time(probe) else {
                warn!(track_index, "cut frame vanished after slicing");
                continue;
            };
            track.children.remove(index);
        }

        doc.annotations =
            offset_annotations(time, RationalTime::new(-1.0, time.rate), &doc.annotations);
        resize(doc, 0.0, 0.0, time);
        self.after_edit(doc)?;
        self.broadcaster.push("Edit/Frame/Cut", time);
        Ok(())
    }

    /// Overwrite one frame at the playhead with the clipboard contents,
    /// track for track. Durations do not change.
    pub fn paste_frame(&mut self, doc: &mut Document) -> Result<()> {
        if self.clipboard.is_empty() {
            return Ok(());
        }
        doc.playing = false;
        let time = doc.local_time();
        self.store_undo(doc)?;

        let (seed_video, seed_audio) = self.clipboard_rates();
        let result = sanitize_rates(&mut doc.timeline, seed_video, seed_audio);
        let video_rate = if result.video_rate > 0.0 {
            result.video_rate
        } else {
            time.rate
        };
        let scaled_time = time.rescaled_to(video_rate);
        let range = TimeRange::new(scaled_time, RationalTime::new(1.0, video_rate));

        let records = self.clipboard.clone();
        for record in records {
            let Some(track) = doc.timeline.stack.tracks.get_mut(record.track_index) else {
                warn!(track_index = record.track_index, "paste references a missing track");
                continue;
            };
            if track.kind != record.kind {
                continue;
            }
            let rate = track.rate();
            let target = if rate > range.duration.rate {
                range.rescaled_to(rate)
            } else {
                range
            };
            if let Err(err) = track.overwrite(record.item.clone(), target) {
                warn!(track_index = record.track_index, %err, "could not paste frame");
            }
        }

        resize(doc, seed_video, seed_audio, scaled_time);
        self.after_edit(doc)?;
        self.broadcaster.push("Edit/Frame/Paste", time);
        Ok(())
    }

    /// Splice the clipboard frame in at the playhead, lengthening every
    /// affected track by one frame and retiming later annotations
    /// forward.
    pub fn insert_frame(&mut self, doc: &mut Document) -> Result<()> {
        if self.clipboard.is_empty() {
            return Ok(());
        }
        doc.playing = false;
        let time = doc.local_time();
        self.store_undo(doc)?;

        let (seed_video, seed_audio) = self.clipboard_rates();
        let result = sanitize_rates(&mut doc.timeline, seed_video, seed_audio);
        let video_rate = if result.video_rate > 0.0 {
            result.video_rate
        } else {
            time.rate
        };
        let scaled_time = time.rescaled_to(video_rate);

        let records = self.clipboard.clone();
        for record in records {
            let Some(track) = doc.timeline.stack.tracks.get_mut(record.track_index) else {
                warn!(track_index = record.track_index, "insert references a missing track");
                continue;
            };
            if track.kind != record.kind {
                continue;
            }
            if let Err(err) = track.insert(record.item.clone(), scaled_time) {
                warn!(track_index = record.track_index, %err, "could not insert frame");
            }
        }

        doc.annotations = offset_annotations(
            scaled_time,
            RationalTime::new(1.0, video_rate),
            &doc.annotations,
        );
        resize(doc, seed_video, seed_audio, scaled_time);
        self.after_edit(doc)?;
        self.broadcaster.push("Edit/Frame/Insert", time);
        Ok(())
    }

    fn clipboard_rates(&self) -> (f64, f64) {
        let mut video: f64 = 0.0;
        let mut audio: f64 = 0.0;
        for record in &self.clipboard {
            match record.kind {
                TrackKind::Video => video = video.max(record.rate),
                TrackKind::Audio => audio = audio.max(record.rate),
            }
        }
        (video, audio)
    }

    // ------------------------------------------------------------------------
    // Structural commands
    // ------------------------------------------------------------------------

    /// Split every track at the playhead. Cutting on an existing
    /// boundary changes nothing and leaves history untouched.
    pub fn slice(&mut self, doc: &mut Document) -> Result<()> {
        doc.playing = false;
        let time = doc.local_time();
        let pushed = self.store_undo(doc)?;

        let mut changed = false;
        for track in &mut doc.timeline.stack.tracks {
            match track.slice(time) {
                Ok(sliced) => changed |= sliced,
                Err(err) => warn!(%err, "could not slice track"),
            }
        }
        if !changed {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(());
        }

        doc.save()?;
        self.history.clear_redo();
        self.refresh_thumbnails();
        self.broadcaster.push("Edit/Slice", time);
        Ok(())
    }

    /// Delete the item under the playhead from every track, closing the
    /// hole. Annotations left outside the shrunk range are dropped.
    pub fn remove_clip(&mut self, doc: &mut Document) -> Result<()> {
        doc.playing = false;
        let time = doc.local_time();
        self.store_undo(doc)?;

        for track in &mut doc.timeline.stack.tracks {
            let rate = track.rate();
            let probe = time.rescaled_to(rate) + RationalTime::new(0.5, rate);
            if let Err(err) = track.remove(probe, false) {
                warn!(%err, "nothing to remove on track");
            }
        }

        resize(doc, 0.0, 0.0, time);
        doc.annotations = remove_annotations(&doc.time_range, &doc.annotations);
        self.after_edit(doc)?;
        self.broadcaster.push("Edit/Remove", time);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Gap and audio commands
    // ------------------------------------------------------------------------

    pub fn insert_video_gap(&mut self, doc: &mut Document) -> Result<()> {
        self.insert_gap(doc, TrackKind::Video, "Edit/Video Gap/Insert")
    }

    pub fn insert_audio_gap(&mut self, doc: &mut Document) -> Result<()> {
        self.insert_gap(doc, TrackKind::Audio, "Edit/Audio Gap/Insert")
    }

    /// Insert a gap aligned with the video item under the playhead into
    /// every track of `kind`, creating the first such track on demand.
    /// Tracks whose slot already holds an item of the same range are
    /// left alone. A no-op when no video item sits under the playhead.
    fn insert_gap(&mut self, doc: &mut Document, kind: TrackKind, command: &str) -> Result<()> {
        doc.playing = false;
        let time = doc.local_time();
        let Some((reference, source)) = video_reference(&doc.timeline, time, false) else {
            return Ok(());
        };

        let pushed = self.store_undo(doc)?;
        let mut created_track = false;
        if doc.timeline.track_indices(kind).is_empty() {
            let name = match kind {
                TrackKind::Video => "Video",
                TrackKind::Audio => "Audio",
            };
            doc.timeline.stack.tracks.push(Track::new(name, kind));
            created_track = true;
        }

        let mut modified = created_track;
        for index in doc.timeline.track_indices(kind) {
            let track = &mut doc.timeline.stack.tracks[index];
            let rate = track.rate();
            let gap = Item::Gap(Gap {
                source_range: source.rescaled_to(rate),
            });
            if let Some(i) = track.child_at_time(time) {
                match track.range_of_child(i) {
                    Ok(existing) if existing == reference.rescaled_to(rate) => continue,
                    Ok(_) => track.children.insert(i, gap),
                    Err(err) => {
                        warn!(track_index = index, %err, "could not resolve gap slot");
                        continue;
                    }
                }
            } else {
                track.children.push(gap);
            }
            modified = true;
        }

        if !modified {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(());
        }

        resize(doc, 0.0, 0.0, time);
        doc.save()?;
        self.history.clear_redo();
        if created_track {
            self.refresh_media_cache();
        }
        self.refresh_thumbnails();
        self.broadcaster.push(command, time);
        Ok(())
    }

    pub fn remove_video_gap(&mut self, doc: &mut Document) -> Result<()> {
        self.remove_matching(doc, TrackKind::Video, true, "Edit/Video Gap/Remove")
    }

    pub fn remove_audio_gap(&mut self, doc: &mut Document) -> Result<()> {
        self.remove_matching(doc, TrackKind::Audio, true, "Edit/Audio Gap/Remove")
    }

    pub fn remove_audio_clip(&mut self, doc: &mut Document) -> Result<()> {
        self.remove_matching(doc, TrackKind::Audio, false, "Edit/Audio Clip/Remove")
    }

    /// Delete the item under the playhead from every track of `kind`,
    /// but only items of the wanted flavor (gap or clip). Later
    /// siblings close over the hole.
    fn remove_matching(
        &mut self,
        doc: &mut Document,
        kind: TrackKind,
        want_gap: bool,
        command: &str,
    ) -> Result<()> {
        doc.playing = false;
        let time = doc.local_time();
        let pushed = self.store_undo(doc)?;

        let mut modified = false;
        for index in doc.timeline.track_indices(kind) {
            let track = &mut doc.timeline.stack.tracks[index];
            let Some(i) = track.child_at_time(time) else {
                continue;
            };
            if track.children[i].is_gap() != want_gap {
                continue;
            }
            track.children.remove(i);
            modified = true;
        }

        if !modified {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(());
        }

        resize(doc, 0.0, 0.0, time);
        self.after_edit(doc)?;
        self.broadcaster.push(command, time);
        Ok(())
    }

    /// Probe `path` and lay its audio down on an audio track, aligned
    /// with the video clip under the playhead. Creates the first audio
    /// track on demand; stops after the first track that accepts the
    /// clip. A no-op when no video clip sits under the playhead.
    pub fn insert_audio_clip(
        &mut self,
        doc: &mut Document,
        path: &str,
        probe: &dyn MediaProbe,
    ) -> Result<()> {
        doc.playing = false;
        let time = doc.local_time();
        let Some((reference, _)) = video_reference(&doc.timeline, time, true) else {
            return Ok(());
        };
        let info = match probe.probe(Path::new(path)) {
            Ok(info) => info,
            Err(err) => {
                warn!(path, %err, "could not probe audio file");
                return Ok(());
            }
        };
        let Some(audio_range) = info.audio else {
            warn!(path, "file carries no audio");
            return Ok(());
        };

        let pushed = self.store_undo(doc)?;
        let mut created_track = false;
        if doc.timeline.track_indices(TrackKind::Audio).is_empty() {
            doc.timeline
                .stack
                .tracks
                .push(Track::new("Audio", TrackKind::Audio));
            created_track = true;
        }

        let mut modified = false;
        for index in doc.timeline.track_indices(TrackKind::Audio) {
            let track = &mut doc.timeline.stack.tracks[index];
            let slot = track.child_at_time(time);
            if let Some(i) = slot {
                let rate = track.rate();
                match track.range_of_child(i) {
                    Ok(existing) if existing == reference.rescaled_to(rate) => continue,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(track_index = index, %err, "could not resolve audio slot");
                        continue;
                    }
                }
            }

            let name = Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            let item = Item::Clip(Clip {
                name,
                media: MediaReference::External {
                    target_url: path.to_string(),
                    available_range: Some(audio_range),
                },
                source_range: audio_range,
            });
            match slot {
                Some(i) => track.children.insert(i, item),
                None => track.children.push(item),
            }
            modified = true;
            break;
        }

        if !modified {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(());
        }

        resize(doc, 0.0, 0.0, time);
        doc.save()?;
        self.history.clear_redo();
        if created_track {
            self.refresh_media_cache();
        }
        self.refresh_thumbnails();
        self.broadcaster.push("Edit/Audio Clip/Insert", path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Join selected neighbors with dissolves. The selection holds
    /// `(track, child)` pairs: two items on one track, or four items
    /// forming a video pair and an audio pair. Pairs that cannot take a
    /// transition are logged and skipped.
    pub fn add_transition(
        &mut self,
        doc: &mut Document,
        selection: &[(usize, usize)],
    ) -> Result<()> {
        if selection.len() != 2 && selection.len() != 4 {
            return Err(SessionError::InvalidSelection(selection.len()));
        }
        doc.playing = false;
        let pushed = self.store_undo(doc)?;

        let mut video = Vec::new();
        let mut audio = Vec::new();
        for &(track_index, child_index) in selection {
            let Some(track) = doc.timeline.stack.tracks.get(track_index) else {
                warn!(track_index, "transition selection references a missing track");
                continue;
            };
            match track.kind {
                TrackKind::Video => video.push((track_index, child_index)),
                TrackKind::Audio => audio.push((track_index, child_index)),
            }
        }

        let mut changed = false;
        for pair in [video, audio] {
            let [(track_a, first), (track_b, second)] = pair.as_slice() else {
                continue;
            };
            if track_a != track_b {
                warn!("transition endpoints sit on different tracks");
                continue;
            }
            match doc.timeline.stack.tracks[*track_a].add_transition(*first, *second) {
                Ok(_) => changed = true,
                Err(err) => warn!(track_index = *track_a, %err, "could not add transition"),
            }
        }

        if !changed {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(());
        }

        doc.save()?;
        self.history.clear_redo();
        self.refresh_thumbnails();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Cross-document
    // ------------------------------------------------------------------------

    /// Append the in/out portion of `source` onto the end of `dest`,
    /// padding shorter tracks with gaps so everything stays aligned and
    /// carrying the in-range source annotations along.
    pub fn add_clip_to_timeline(&mut self, dest: &mut Document, source: &Document) -> Result<()> {
        dest.playing = false;
        self.store_undo(dest)?;

        let was_all_empty = dest.timeline.stack.is_all_empty();
        let dest_duration = dest.timeline.duration();
        append_timeline(
            &mut dest.timeline,
            &source.timeline,
            source.in_out_range,
            source.time_range,
        );

        let result = sanitize_rates(&mut dest.timeline, 0.0, 0.0);
        let video_rate = if result.video_rate > 0.0 {
            result.video_rate
        } else {
            24.0
        };
        dest.annotations = add_annotations(
            dest_duration.rescaled_to(video_rate),
            &dest.annotations,
            &source.in_out_range,
            &source.annotations,
        );
        if result.video_rate > 0.0 {
            dest.speed = result.video_rate;
        }
        dest.apply_time_range(result.time_range);

        dest.save()?;
        self.history.clear_redo();
        if was_all_empty {
            self.refresh_media_cache();
        }
        self.refresh_thumbnails();
        self.broadcaster
            .push("Edit/Timeline/Add Clip", source.file_name());
        Ok(())
    }

    /// Repoint every clip referencing `old_url` at `new_url`. Returns
    /// how many clips were rewritten; zero leaves history untouched.
    pub fn relink(&mut self, doc: &mut Document, old_url: &str, new_url: &str) -> Result<usize> {
        let pushed = self.store_undo(doc)?;
        let count = relink_media(&mut doc.timeline, old_url, new_url);
        if count == 0 {
            if pushed {
                self.history.discard_undo();
            }
            return Ok(0);
        }
        doc.save()?;
        self.history.clear_redo();
        self.refresh_thumbnails();
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------------

    /// Apply a drag-reorder batch. A bare undo-checkpoint batch stores
    /// the snapshot and stops.
    pub fn move_items(&mut self, doc: &mut Document, batch: &[MoveEntry]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        doc.playing = false;
        let time = doc.local_time();
        self.store_undo(doc)?;
        if moves::is_undo_only(batch) {
            return Ok(());
        }

        let mut annotations = std::mem::take(&mut doc.annotations);
        moves::apply_moves(&mut doc.timeline, &mut annotations, batch);
        doc.annotations = annotations;

        resize(doc, 0.0, 0.0, time);
        self.after_edit(doc)?;
        self.broadcaster.push("Edit/Move", batch);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // History commands
    // ------------------------------------------------------------------------

    /// Restore the most recent undo snapshot onto whichever open
    /// document it belongs to. Returns the index of that document. When
    /// the document is no longer open the entry is lost and an error
    /// reported; other documents are unaffected.
    pub fn undo(&mut self, docs: &mut [Document], active: usize) -> Result<usize> {
        if !self.history.has_undo() {
            return Ok(active);
        }
        self.broadcaster.push("Edit/Undo", 0);
        let Some(snapshot) = self.history.pop_undo() else {
            return Ok(active);
        };
        let Some(index) = docs.iter().position(|d| d.file_name() == snapshot.file_name) else {
            error!(file = %snapshot.file_name, "document no longer open, cannot undo");
            return Err(SessionError::DocumentNotLoaded(snapshot.file_name));
        };
        self.store_redo(&mut docs[index])?;
        self.restore(&mut docs[index], snapshot)?;
        self.refresh_thumbnails();
        Ok(index)
    }

    /// Mirror of [`EditSession::undo`] over the redo stack.
    pub fn redo(&mut self, docs: &mut [Document], active: usize) -> Result<usize> {
        if !self.history.has_redo() {
            return Ok(active);
        }
        self.broadcaster.push("Edit/Redo", 0);
        let Some(snapshot) = self.history.pop_redo() else {
            return Ok(active);
        };
        let Some(index) = docs.iter().position(|d| d.file_name() == snapshot.file_name) else {
            error!(file = %snapshot.file_name, "document no longer open, cannot redo");
            return Err(SessionError::DocumentNotLoaded(snapshot.file_name));
        };
        let refresh = docs[index].timeline.stack.is_all_empty();
        self.store_undo(&mut docs[index])?;
        self.restore(&mut docs[index], snapshot)?;
        if refresh {
            self.refresh_media_cache();
        }
        self.refresh_thumbnails();
        Ok(index)
    }

    fn restore(&mut self, doc: &mut Document, snapshot: Snapshot) -> Result<()> {
        let mut timeline = match Timeline::from_json_string(&snapshot.json) {
            Ok(timeline) => timeline,
            Err(err) => {
                error!(%err, "corrupt history snapshot");
                return Err(err.into());
            }
        };
        let result = sanitize_rates(&mut timeline, 0.0, 0.0);
        doc.timeline = timeline;
        doc.annotations = snapshot.annotations;
        if result.video_rate > 0.0 {
            doc.speed = result.video_rate;
        }
        doc.apply_time_range(result.time_range);
        doc.save()?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Remote replay
    // ------------------------------------------------------------------------

    /// Replay a command received from a collaborator against the open
    /// documents. The broadcaster is locked for the duration so the
    /// replay never echoes back to its sender. Returns the index of the
    /// document the command landed on.
    pub fn replay(
        &mut self,
        docs: &mut [Document],
        active: usize,
        message: &Message,
        probe: &dyn MediaProbe,
    ) -> Result<usize> {
        let command = RemoteCommand::parse(message)?;
        self.broadcaster.lock();
        let result = self.dispatch(docs, active, command, probe);
        self.broadcaster.unlock();
        result
    }

    fn dispatch(
        &mut self,
        docs: &mut [Document],
        active: usize,
        command: RemoteCommand,
        probe: &dyn MediaProbe,
    ) -> Result<usize> {
        if active >= docs.len() {
            return Err(SessionError::DocumentNotLoaded(format!("#{active}")));
        }
        match command {
            RemoteCommand::Undo => return self.undo(docs, active),
            RemoteCommand::Redo => return self.redo(docs, active),
            RemoteCommand::AddClipToTimeline(ref file) => {
                let Some(position) = docs.iter().position(|d| d.file_name() == *file) else {
                    return Err(SessionError::DocumentNotLoaded(file.clone()));
                };
                let source = docs[position].clone();
                self.add_clip_to_timeline(&mut docs[active], &source)?;
                return Ok(active);
            }
            _ => {}
        }

        let doc = &mut docs[active];
        match command {
            RemoteCommand::CopyFrame(time) => {
                doc.seek(time);
                self.copy_frame(doc)?;
            }
            RemoteCommand::CutFrame(time) => {
                doc.seek(time);
                self.cut_frame(doc)?;
            }
            RemoteCommand::PasteFrame(time) => {
                doc.seek(time);
                self.paste_frame(doc)?;
            }
            RemoteCommand::InsertFrame(time) => {
                doc.seek(time);
                self.insert_frame(doc)?;
            }
            RemoteCommand::Slice(time) => {
                doc.seek(time);
                self.slice(doc)?;
            }
            RemoteCommand::RemoveClip(time) => {
                doc.seek(time);
                self.remove_clip(doc)?;
            }
            RemoteCommand::InsertVideoGap(time) => {
                doc.seek(time);
                self.insert_video_gap(doc)?;
            }
            RemoteCommand::RemoveVideoGap(time) => {
                doc.seek(time);
                self.remove_video_gap(doc)?;
            }
            RemoteCommand::InsertAudioGap(time) => {
                doc.seek(time);
                self.insert_audio_gap(doc)?;
            }
            RemoteCommand::RemoveAudioGap(time) => {
                doc.seek(time);
                self.remove_audio_gap(doc)?;
            }
            RemoteCommand::InsertAudioClip(path) => {
                self.insert_audio_clip(doc, &path, probe)?;
            }
            RemoteCommand::RemoveAudioClip(time) => {
                doc.seek(time);
                self.remove_audio_clip(doc)?;
            }
            RemoteCommand::MoveItems(batch) => {
                self.move_items(doc, &batch)?;
            }
            // Handled above.
            RemoteCommand::Undo
            | RemoteCommand::Redo
            | RemoteCommand::AddClipToTimeline(_) => {}
        }
        Ok(active)
    }
}

/// Renormalize rates after a structural edit and bring the document's
/// playback state in line with the new overall range.
fn resize(
    doc: &mut Document,
    seed_video: f64,
    seed_audio: f64,
    seek: RationalTime,
) -> SanitizeResult {
    let result = sanitize_rates(&mut doc.timeline, seed_video, seed_audio);
    if result.video_rate > 0.0 {
        doc.speed = result.video_rate;
    }
    doc.apply_time_range(result.time_range);
    doc.seek(seek);
    result
}

/// The first video item under `time`: its range in the track and its
/// source range. With `clips_only` gaps do not qualify.
fn video_reference(
    timeline: &Timeline,
    time: RationalTime,
    clips_only: bool,
) -> Option<(TimeRange, TimeRange)> {
    for track in timeline.video_tracks() {
        let Some(index) = track.child_at_time(time) else {
            continue;
        };
        let child = &track.children[index];
        if clips_only && !child.is_clip() {
            continue;
        }
        let (Ok(range), Some(source)) = (track.range_of_child(index), child.source_range()) else {
            continue;
        };
        return Some((range, *source));
    }
    None
}

// ----------------------------------------------------------------------------
// Timeline appending
// ----------------------------------------------------------------------------

/// Append the video and audio tracks of `source` onto `dest`, trimmed
/// to `in_out`. Track alignment anchors on the longest destination
/// video track; shorter tracks are padded with gaps first.
fn append_timeline(dest: &mut Timeline, source: &Timeline, in_out: TimeRange, time_range: TimeRange) {
    let global_start = source
        .global_start_time
        .unwrap_or_else(|| RationalTime::zero(time_range.duration.rate));

    let mut dest_start: Option<RationalTime> = None;
    for track in dest.video_tracks() {
        let duration = track.duration();
        if dest_start.map(|d| duration > d).unwrap_or(true) {
            dest_start = Some(duration);
        }
    }
    let dest_start = dest_start.unwrap_or_else(|| RationalTime::zero(24.0));

    append_tracks(dest, source, TrackKind::Video, dest_start, global_start, in_out, time_range);
    if source.track_indices(TrackKind::Audio).is_empty() {
        // Sourceless audio still needs padding so a later append stays
        // aligned with the video above it.
        for index in dest.track_indices(TrackKind::Audio) {
            pad_track(&mut dest.stack.tracks[index], dest_start);
        }
    }
    append_tracks(dest, source, TrackKind::Audio, dest_start, global_start, in_out, time_range);
}

fn pad_track(track: &mut Track, dest_start: RationalTime) {
    let duration = dest_start - track.duration();
    if duration.value > 0.0 {
        track.children.push(Item::Gap(Gap {
            source_range: TimeRange::new(RationalTime::zero(duration.rate), duration),
        }));
    }
}

fn append_tracks(
    dest: &mut Timeline,
    source: &Timeline,
    kind: TrackKind,
    dest_start: RationalTime,
    global_start: RationalTime,
    in_out: TimeRange,
    time_range: TimeRange,
) {
    for (position, &source_index) in source.track_indices(kind).iter().enumerate() {
        let dest_index = match dest.track_indices(kind).get(position) {
            Some(&index) => index,
            None => {
                let name = match kind {
                    TrackKind::Video => "Video",
                    TrackKind::Audio => "Audio",
                };
                dest.stack.tracks.push(Track::new(name, kind));
                dest.stack.tracks.len() - 1
            }
        };
        let source_track = &source.stack.tracks[source_index];
        let track = &mut dest.stack.tracks[dest_index];
        pad_track(track, dest_start);

        let mut rate = track.rate().max(source_track.rate());
        for (child_index, child) in source_track.children.iter().enumerate() {
            let Some(item_range) = child.source_range().copied() else {
                continue;
            };
            let Ok(track_range) = source_track.range_of_child(child_index) else {
                continue;
            };
            rate = rate.max(item_range.duration.rate);

            let global_range = TimeRange::new(
                track_range.start_time.rescaled_to(rate) + global_start.rescaled_to(rate),
                track_range.duration.rescaled_to(rate),
            );
            if !in_out.rescaled_to(rate).intersects(&global_range) {
                continue;
            }

            let mut start = item_range.start_time.rescaled_to(rate);
            let mut duration = item_range.duration.rescaled_to(rate);
            if in_out.start_time > time_range.start_time {
                // Audio deliberately goes through the same media-time
                // mapping as video so the two stay frame locked.
                let mut media_start =
                    to_media_time(in_out.start_time, &global_range, &item_range, rate);
                let mut media_end = to_media_time(
                    in_out.end_time_exclusive(),
                    &global_range,
                    &item_range,
                    rate,
                );
                if media_start < item_range.start_time {
                    media_start = item_range.start_time.rescaled_to(rate);
                }
                if media_end > item_range.end_time_exclusive() {
                    media_end = item_range.end_time_exclusive().rescaled_to(rate);
                }
                start = media_start;
                duration = media_end - media_start;
            }
            if in_out.duration.rescaled_to(rate) < duration {
                duration = in_out.duration.rescaled_to(rate);
            }

            let mut item = child.clone();
            item.set_source_range(TimeRange::new(start, duration));
            track.children.push(item);
        }
    }
}

// Map a global track time into the media time of the item covering it.
fn to_media_time(
    time: RationalTime,
    global_range: &TimeRange,
    item_range: &TimeRange,
    rate: f64,
) -> RationalTime {
    ((time.rescaled_to(rate) - global_range.start_time) + item_range.start_time.rescaled_to(rate))
        .rescaled_to(rate)
        .floor()
}
