//! Bounded linear undo/redo over document snapshots.

use crate::model::{Connection, Layer, LayerId, Shape, ShapeId};
use crate::{Direction, HISTORY_CAP};

/// One captured document state. Connections are stored by shape id, so a
/// restored snapshot re-resolves identities instead of reviving stale
/// references; endpoints that no longer exist are dropped on restore.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub shapes: Vec<Shape>,
    pub connections: Vec<Connection>,
    /// Group-id chain of the drill-down position at capture time.
    pub scope_path: Vec<ShapeId>,
    pub layers: Vec<Layer>,
    pub active_layer: Option<LayerId>,
    pub direction: Direction,
}

/// Linear history: a bounded snapshot list plus a cursor. Pushing while the
/// cursor sits behind the tail discards everything ahead of it — there is no
/// branching.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<Snapshot>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        History {
            entries: Vec::new(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.entries.is_empty() && self.cursor + 1 < self.entries.len() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(snapshot);
        if self.entries.len() > HISTORY_CAP {
            self.entries.remove(0);
        } else if self.entries.len() > 1 {
            self.cursor += 1;
        }
        self.cursor = self.cursor.min(self.entries.len() - 1);
    }

    pub fn undo(&mut self) -> Option<Snapshot> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    pub fn redo(&mut self) -> Option<Snapshot> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
