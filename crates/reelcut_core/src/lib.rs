//! Core timeline model and edit operations for reelcut.
//!
//! This crate holds the data model (a tree of tracks containing clips,
//! gaps and transitions), exact rational-time arithmetic, the
//! structural edit operations (slice, insert, overwrite, remove,
//! transitions, relink) and the rate-sanitization pass that keeps
//! mixed video/audio rates exact across edits.
//!
//! # Example
//!
//! ```
//! use reelcut_core::{Clip, Item, MediaReference, RationalTime, TimeRange, Track, TrackKind};
//!
//! let mut track = Track::new("Video", TrackKind::Video);
//! track.children.push(Item::Clip(Clip {
//!     name: "shot01".to_string(),
//!     media: MediaReference::External {
//!         target_url: "/media/shot01.mov".to_string(),
//!         available_range: None,
//!     },
//!     source_range: TimeRange::new(RationalTime::zero(24.0), RationalTime::new(48.0, 24.0)),
//! }));
//!
//! track.slice(RationalTime::new(24.0, 24.0)).unwrap();
//! assert_eq!(track.children.len(), 2);
//! assert_eq!(track.duration(), RationalTime::new(48.0, 24.0));
//! ```

pub mod editing;
pub mod error;
pub mod sanitize;
pub mod time;
pub mod types;

pub use editing::relink_media;
pub use error::{CoreError, Result};
pub use sanitize::{sanitize_rates, SanitizeResult};
pub use time::{RationalTime, TimeRange};
pub use types::{Clip, Gap, Item, MediaReference, Stack, Timeline, Track, TrackKind, Transition};

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
