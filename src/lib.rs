pub mod cli;
pub mod dsl;
pub mod geometry;
pub mod history;
pub mod impact;
pub mod model;
pub mod persist;

pub use dsl::{ImportReport, auto_layout, export_dsl, import_dsl};
pub use geometry::{Handle, Segment};
pub use history::{History, Snapshot};
pub use impact::{ImpactReport, TargetImpact};
pub use model::{
    ArrowStyle, Connection, ContextIndicator, EditError, EditorSession, Layer, LayerId, LineStyle,
    Shape, ShapeId, ShapeKind, Style,
};
pub use persist::DocumentFile;

use serde::{Deserialize, Serialize};

/// Distance within which a click counts as hitting a connection line.
pub const CONNECTION_HIT_THRESHOLD: f32 = 8.0;
/// Perpendicular offset applied to the first connection of each direction in a
/// bidirectional pair.
pub const BIDIRECTIONAL_BASE_OFFSET: f32 = 20.0;
/// Spacing between parallel connections sharing a shape pair.
pub const PARALLEL_SPREAD: f32 = 25.0;
/// Grab radius around a resize handle.
pub const HANDLE_GRAB_RADIUS: f32 = 6.0;
/// Shapes never shrink below this on either axis.
pub const MIN_SHAPE_SIZE: f32 = 20.0;
/// Maximum number of undo snapshots retained.
pub const HISTORY_CAP: usize = 50;

pub(crate) const LAYOUT_ORIGIN: f32 = 100.0;
pub(crate) const LAYOUT_LEVEL_SPACING_H: f32 = 250.0;
pub(crate) const LAYOUT_NODE_SPACING_H: f32 = 120.0;
pub(crate) const LAYOUT_LEVEL_SPACING_V: f32 = 150.0;
pub(crate) const LAYOUT_NODE_SPACING_V: f32 = 180.0;
pub(crate) const IMPORT_SHAPE_WIDTH: f32 = 120.0;
pub(crate) const IMPORT_SHAPE_HEIGHT: f32 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    /// Normalizes two opposite corners into a rectangle regardless of which
    /// corner came first.
    pub fn from_corners(a: Point, b: Point) -> Rect {
        Rect {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

/// Flow orientation of the document, shared by the DSL header and auto-layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "TD", alias = "TB")]
    TopDown,
    #[serde(rename = "BT")]
    BottomTop,
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "RL")]
    RightLeft,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::LeftRight
    }
}

impl Direction {
    pub fn as_token(&self) -> &'static str {
        match self {
            Direction::TopDown => "TD",
            Direction::BottomTop => "BT",
            Direction::LeftRight => "LR",
            Direction::RightLeft => "RL",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "TD" | "TB" => Some(Direction::TopDown),
            "BT" => Some(Direction::BottomTop),
            "LR" => Some(Direction::LeftRight),
            "RL" => Some(Direction::RightLeft),
            _ => None,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(self, Direction::LeftRight | Direction::RightLeft)
    }

    /// Levels grow toward negative screen coordinates for these orientations.
    pub fn is_reversed(&self) -> bool {
        matches!(self, Direction::RightLeft | Direction::BottomTop)
    }
}
