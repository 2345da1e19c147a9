//! Snapshot-based undo/redo.
//!
//! A snapshot is a deep copy of everything an edit can touch: the
//! timeline serialized to JSON, the path identifying which document it
//! belongs to, and the annotation set. Restoring deserializes a fresh
//! timeline, so snapshots never alias the live tree.

use crate::annotations::Annotation;

/// One history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Compact timeline JSON; equality on this string is the dedup rule.
    pub json: String,
    /// Path of the backing document the snapshot belongs to.
    pub file_name: String,
    pub annotations: Vec<Annotation>,
}

/// Two LIFO stacks of snapshots.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push onto the undo stack unless the top already holds an
    /// identical timeline. Returns whether the entry was stored.
    pub fn push_undo(&mut self, snapshot: Snapshot) -> bool {
        if self.undo.last().map(|s| s.json == snapshot.json).unwrap_or(false) {
            return false;
        }
        self.undo.push(snapshot);
        true
    }

    pub fn push_redo(&mut self, snapshot: Snapshot) -> bool {
        if self.redo.last().map(|s| s.json == snapshot.json).unwrap_or(false) {
            return false;
        }
        self.redo.push(snapshot);
        true
    }

    pub fn pop_undo(&mut self) -> Option<Snapshot> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<Snapshot> {
        self.redo.pop()
    }

    /// Drop the most recent undo entry. Used when a speculative push
    /// turned out to be a no-op edit.
    pub fn discard_undo(&mut self) {
        self.undo.pop();
    }

    /// Cleared after every committed non-history edit.
    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn has_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn has_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_top_json(&self) -> Option<&str> {
        self.undo.last().map(|s| s.json.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(json: &str) -> Snapshot {
        Snapshot {
            json: json.to_string(),
            file_name: "/tmp/a.otio".to_string(),
            annotations: Vec::new(),
        }
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut history = History::new();
        assert!(history.push_undo(snapshot("one")));
        assert!(history.push_undo(snapshot("two")));
        assert_eq!(history.pop_undo().unwrap().json, "two");
        assert_eq!(history.pop_undo().unwrap().json, "one");
        assert!(history.pop_undo().is_none());
    }

    #[test]
    fn identical_top_is_deduped() {
        let mut history = History::new();
        assert!(history.push_undo(snapshot("same")));
        assert!(!history.push_undo(snapshot("same")));
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn dedup_only_looks_at_the_top() {
        let mut history = History::new();
        history.push_undo(snapshot("a"));
        history.push_undo(snapshot("b"));
        assert!(history.push_undo(snapshot("a")));
        assert_eq!(history.undo_len(), 3);
    }

    #[test]
    fn clear_redo_empties_only_redo() {
        let mut history = History::new();
        history.push_undo(snapshot("a"));
        history.push_redo(snapshot("b"));
        history.clear_redo();
        assert!(history.has_undo());
        assert!(!history.has_redo());
    }

    #[test]
    fn discard_drops_latest() {
        let mut history = History::new();
        history.push_undo(snapshot("a"));
        history.push_undo(snapshot("b"));
        history.discard_undo();
        assert_eq!(history.undo_top_json(), Some("a"));
    }
}
