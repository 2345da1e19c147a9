//! Session layer for reelcut: documents, history, annotations and the
//! user-facing edit commands.
//!
//! Where [`reelcut_core`] knows how to restructure a single track, this
//! crate knows what an *edit* is: snapshot the document for undo, apply
//! the change across every track, renormalize rates, retime the
//! annotations, persist the backing EDL file and broadcast the command
//! to collaborators. [`EditSession`] ties all of that together over a
//! set of open [`Document`]s.
//!
//! # Example
//!
//! ```
//! use reelcut_session::{Document, EditSession};
//!
//! let mut session = EditSession::new();
//! let mut doc = Document::empty_edl();
//! // Nothing under the playhead yet, so this is a no-op.
//! session.slice(&mut doc).unwrap();
//! assert!(!session.has_undo());
//! ```

pub mod annotations;
pub mod broadcast;
pub mod document;
pub mod error;
pub mod history;
pub mod moves;
pub mod probe;
pub mod session;

pub use annotations::{Annotation, Point, Shape};
pub use broadcast::{Broadcaster, Message, RemoteCommand};
pub use document::{
    is_temporary_edl, make_paths_absolute, make_paths_relative, sweep_temporary_edls, Document,
};
pub use error::{Result, SessionError};
pub use history::{History, Snapshot};
pub use moves::{MoveEntry, MoveKind};
pub use probe::{MediaInfo, MediaProbe, StaticProbe};
pub use session::{EditSession, FrameRecord};

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
