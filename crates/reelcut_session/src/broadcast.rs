//! Outbound notifications and inbound remote commands for
//! collaborative sessions.
//!
//! Every committed edit pushes a `{command, value}` message onto the
//! outbound queue; a transport outside this crate drains and ships
//! them. While a remote-originated command is being replayed the queue
//! is locked so the replay does not echo back to its sender.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::error;

use reelcut_core::RationalTime;

use crate::error::{Result, SessionError};
use crate::moves::MoveEntry;

/// A fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub command: String,
    pub value: serde_json::Value,
}

/// Outbound message queue with an echo-suppression lock.
#[derive(Debug, Default)]
pub struct Broadcaster {
    queue: VecDeque<Message>,
    locked: bool,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message unless the broadcaster is locked for a replay.
    pub fn push(&mut self, command: &str, value: impl Serialize) {
        if self.locked {
            return;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.queue.push_back(Message {
                command: command.to_string(),
                value,
            }),
            Err(err) => error!(command, %err, "could not serialize broadcast payload"),
        }
    }

    /// Suppress outgoing messages while a remote command is replayed.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Take everything queued so far, in order.
    pub fn drain(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A remote edit command, parsed from the wire into a closed set so
/// dispatch is checked at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    CopyFrame(RationalTime),
    CutFrame(RationalTime),
    PasteFrame(RationalTime),
    InsertFrame(RationalTime),
    Slice(RationalTime),
    RemoveClip(RationalTime),
    InsertVideoGap(RationalTime),
    RemoveVideoGap(RationalTime),
    InsertAudioGap(RationalTime),
    RemoveAudioGap(RationalTime),
    InsertAudioClip(String),
    RemoveAudioClip(RationalTime),
    /// Append a whole open document, identified by its path.
    AddClipToTimeline(String),
    MoveItems(Vec<MoveEntry>),
    Undo,
    Redo,
}

impl RemoteCommand {
    /// Decode an inbound message. Unknown command names are an error;
    /// the set of commands is closed.
    pub fn parse(message: &Message) -> Result<Self> {
        let time = |value: &serde_json::Value| -> Result<RationalTime> {
            Ok(serde_json::from_value(value.clone())?)
        };
        match message.command.as_str() {
            "Edit/Frame/Copy" => Ok(Self::CopyFrame(time(&message.value)?)),
            "Edit/Frame/Cut" => Ok(Self::CutFrame(time(&message.value)?)),
            "Edit/Frame/Paste" => Ok(Self::PasteFrame(time(&message.value)?)),
            "Edit/Frame/Insert" => Ok(Self::InsertFrame(time(&message.value)?)),
            "Edit/Slice" => Ok(Self::Slice(time(&message.value)?)),
            "Edit/Remove" => Ok(Self::RemoveClip(time(&message.value)?)),
            "Edit/Video Gap/Insert" => Ok(Self::InsertVideoGap(time(&message.value)?)),
            "Edit/Video Gap/Remove" => Ok(Self::RemoveVideoGap(time(&message.value)?)),
            "Edit/Audio Gap/Insert" => Ok(Self::InsertAudioGap(time(&message.value)?)),
            "Edit/Audio Gap/Remove" => Ok(Self::RemoveAudioGap(time(&message.value)?)),
            "Edit/Audio Clip/Insert" => {
                Ok(Self::InsertAudioClip(serde_json::from_value(message.value.clone())?))
            }
            "Edit/Audio Clip/Remove" => Ok(Self::RemoveAudioClip(time(&message.value)?)),
            "Edit/Timeline/Add Clip" => {
                Ok(Self::AddClipToTimeline(serde_json::from_value(message.value.clone())?))
            }
            "Edit/Move" => Ok(Self::MoveItems(serde_json::from_value(message.value.clone())?)),
            "Edit/Undo" => Ok(Self::Undo),
            "Edit/Redo" => Ok(Self::Redo),
            other => Err(SessionError::UnknownCommand(other.to_string())),
        }
    }
}
