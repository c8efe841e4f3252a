use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{self, Handle};
use crate::history::{History, Snapshot};
use crate::impact::{self, ImpactReport};
use crate::{Direction, Point};

/// Identity of a shape, unique across the whole document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(Uuid);

impl ShapeId {
    pub(crate) fn generate() -> Self {
        ShapeId(Uuid::new_v4())
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Decision,
    DataStore,
    Cloud,
    Server,
    Api,
    Actor,
    Process,
    Group,
    Text,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
            ShapeKind::Decision => "decision",
            ShapeKind::DataStore => "data-store",
            ShapeKind::Cloud => "cloud",
            ShapeKind::Server => "server",
            ShapeKind::Api => "api",
            ShapeKind::Actor => "actor",
            ShapeKind::Process => "process",
            ShapeKind::Group => "group",
            ShapeKind::Text => "text",
        }
    }

    /// Text annotations are the only kind that can never hold a sub-diagram.
    pub fn supports_children(&self) -> bool {
        !matches!(self, ShapeKind::Text)
    }

    pub fn default_size(&self) -> (f32, f32) {
        match self {
            ShapeKind::Text => (120.0, 24.0),
            _ => (120.0, 80.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowStyle {
    None,
    Arrow,
    Circle,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f32,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            fill: "#ffffff".to_string(),
            stroke: "#000000".to_string(),
            stroke_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Shape>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerId>,
    /// Identifier carried through DSL round trips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Shape {
    pub fn new(kind: ShapeKind, x: f32, y: f32) -> Self {
        let (width, height) = kind.default_size();
        Shape {
            id: ShapeId::generate(),
            kind,
            x,
            y,
            width,
            height,
            style: Style::default(),
            label: String::new(),
            children: Vec::new(),
            child_connections: Vec::new(),
            layer: None,
            external_id: None,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn rect(&self) -> crate::Rect {
        crate::Rect {
            min_x: self.x,
            min_y: self.y,
            max_x: self.x + self.width,
            max_y: self.y + self.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: ShapeId,
    pub to: ShapeId,
    /// Monotonic creation number. Multi-edge routing keys off this rather
    /// than list position so undo/redo cannot flip offset sides.
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub start_arrow: ArrowStyle,
    pub end_arrow: ArrowStyle,
    pub line_style: LineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub z_index: usize,
}

/// Read-only summary of a connection crossing the boundary of the group the
/// session is currently inside. Never part of the editable scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextIndicator {
    pub inbound: bool,
    pub shape: ShapeId,
    pub label: String,
}

#[derive(Debug, Clone)]
struct ScopeFrame {
    group: ShapeId,
    shapes: Vec<Shape>,
    connections: Vec<Connection>,
    indicators: Vec<ContextIndicator>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("no shape with id {0} in the active scope")]
    NotFound(ShapeId),
    #[error("no connection with sequence {0} in the active scope")]
    ConnectionNotFound(u64),
    #[error("shape {0} cannot contain a sub-diagram")]
    NotAGroup(ShapeId),
    #[error("cannot enter a group while the comparison view is active")]
    ComparisonActive,
    #[error("structural edits are disabled while impact analysis is active")]
    AnalysisActive,
    #[error("the last layer cannot be removed")]
    LastLayer,
    #[error("no layer with id {0:?}")]
    LayerNotFound(LayerId),
    #[error("shape {0} is on a locked layer")]
    Locked(ShapeId),
}

/// The authoring surface: one document, one active scope, explicit state for
/// everything the original kept in ambient globals.
#[derive(Debug)]
pub struct EditorSession {
    pub direction: Direction,
    shapes: Vec<Shape>,
    connections: Vec<Connection>,
    scope_stack: Vec<ScopeFrame>,
    indicators: Vec<ContextIndicator>,
    layers: Vec<Layer>,
    active_layer: Option<LayerId>,
    next_layer_id: u32,
    next_seq: u64,
    selected_shapes: Vec<ShapeId>,
    selected_connections: Vec<u64>,
    history: History,
    comparison_view: bool,
    impact_targets: Option<Vec<ShapeId>>,
    impact_report: Option<ImpactReport>,
    pub default_start_arrow: ArrowStyle,
    pub default_end_arrow: ArrowStyle,
    pub default_line_style: LineStyle,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        let mut session = EditorSession {
            direction: Direction::default(),
            shapes: Vec::new(),
            connections: Vec::new(),
            scope_stack: Vec::new(),
            indicators: Vec::new(),
            layers: Vec::new(),
            active_layer: None,
            next_layer_id: 0,
            next_seq: 0,
            selected_shapes: Vec::new(),
            selected_connections: Vec::new(),
            history: History::new(),
            comparison_view: false,
            impact_targets: None,
            impact_report: None,
            default_start_arrow: ArrowStyle::None,
            default_end_arrow: ArrowStyle::Arrow,
            default_line_style: LineStyle::Solid,
        };
        let base = session.create_layer("High Level".to_string());
        session.active_layer = Some(base);
        session.history.push(session.snapshot());
        session
    }

    // --- queries -----------------------------------------------------------

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn selected_shapes(&self) -> &[ShapeId] {
        &self.selected_shapes
    }

    pub fn selected_connections(&self) -> &[u64] {
        &self.selected_connections
    }

    pub fn context_indicators(&self) -> &[ContextIndicator] {
        &self.indicators
    }

    pub fn depth(&self) -> usize {
        self.scope_stack.len()
    }

    pub fn current_group(&self) -> Option<ShapeId> {
        self.scope_stack.last().map(|frame| frame.group)
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|shape| shape.id == id)
    }

    pub fn connection(&self, seq: u64) -> Option<&Connection> {
        self.connections.iter().find(|conn| conn.seq == seq)
    }

    /// Shapes the renderer should draw: anything unlayered or on a visible
    /// layer, in scope order.
    pub fn visible_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter().filter(|shape| match shape.layer {
            Some(layer_id) => self
                .layers
                .iter()
                .find(|layer| layer.id == layer_id)
                .map(|layer| layer.visible)
                .unwrap_or(true),
            None => true,
        })
    }

    pub fn hit_shape(&self, point: Point) -> Option<ShapeId> {
        geometry::shape_at(&self.shapes, point).map(|shape| shape.id)
    }

    pub fn hit_connection(&self, point: Point) -> Option<u64> {
        geometry::connection_at(&self.shapes, &self.connections, point).map(|conn| conn.seq)
    }

    /// Resize handle under the cursor for the primary selected shape.
    pub fn handle_at(&self, point: Point) -> Option<Handle> {
        let id = *self.selected_shapes.first()?;
        let shape = self.shape(id)?;
        geometry::handle_at(shape, point)
    }

    // --- selection ---------------------------------------------------------

    pub fn select_shape(&mut self, id: ShapeId) -> Result<(), EditError> {
        if self.shape(id).is_none() {
            return Err(EditError::NotFound(id));
        }
        self.selected_shapes = vec![id];
        self.selected_connections.clear();
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected_shapes.clear();
        self.selected_connections.clear();
    }

    /// Drag-rectangle selection; corners may arrive in any order.
    pub fn marquee_select(&mut self, a: Point, b: Point) {
        let (shapes, connections) =
            geometry::marquee_select(&self.shapes, &self.connections, a, b);
        self.selected_shapes = shapes;
        self.selected_connections = connections;
    }

    // --- shape and connection edits ---------------------------------------

    pub fn add_shape(&mut self, kind: ShapeKind, x: f32, y: f32) -> Result<ShapeId, EditError> {
        self.ensure_editable()?;
        let mut shape = Shape::new(kind, x, y);
        shape.layer = self.active_layer;
        let id = shape.id;
        self.shapes.push(shape);
        self.commit();
        Ok(id)
    }

    /// Connects two shapes of the active scope. Cross-scope connections are
    /// impossible by construction: both endpoints must resolve here.
    pub fn connect(&mut self, from: ShapeId, to: ShapeId) -> Result<u64, EditError> {
        self.ensure_editable()?;
        for id in [from, to] {
            if self.shape(id).is_none() {
                return Err(EditError::NotFound(id));
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.connections.push(Connection {
            from,
            to,
            seq,
            label: None,
            note: None,
            start_arrow: self.default_start_arrow,
            end_arrow: self.default_end_arrow,
            line_style: self.default_line_style,
        });
        self.commit();
        Ok(seq)
    }

    /// Repositions a shape without committing history; call [`finish_drag`]
    /// when the gesture ends.
    ///
    /// [`finish_drag`]: EditorSession::finish_drag
    pub fn move_shape(&mut self, id: ShapeId, x: f32, y: f32) -> Result<(), EditError> {
        self.ensure_editable()?;
        self.ensure_unlocked(id)?;
        let shape = self
            .shapes
            .iter_mut()
            .find(|shape| shape.id == id)
            .ok_or(EditError::NotFound(id))?;
        shape.x = x;
        shape.y = y;
        Ok(())
    }

    /// Applies one step of a handle drag, also without committing.
    pub fn resize_shape(&mut self, id: ShapeId, handle: Handle, to: Point) -> Result<(), EditError> {
        self.ensure_editable()?;
        self.ensure_unlocked(id)?;
        let shape = self
            .shapes
            .iter_mut()
            .find(|shape| shape.id == id)
            .ok_or(EditError::NotFound(id))?;
        geometry::resize(shape, handle, to);
        Ok(())
    }

    /// Commits the snapshot for a completed move/resize gesture.
    pub fn finish_drag(&mut self) {
        self.commit();
    }

    pub fn set_label(&mut self, id: ShapeId, label: &str) -> Result<(), EditError> {
        self.ensure_editable()?;
        let shape = self
            .shapes
            .iter_mut()
            .find(|shape| shape.id == id)
            .ok_or(EditError::NotFound(id))?;
        shape.label = label.to_string();
        self.commit();
        Ok(())
    }

    pub fn set_style(&mut self, id: ShapeId, style: Style) -> Result<(), EditError> {
        self.ensure_editable()?;
        let shape = self
            .shapes
            .iter_mut()
            .find(|shape| shape.id == id)
            .ok_or(EditError::NotFound(id))?;
        shape.style = style;
        self.commit();
        Ok(())
    }

    pub fn set_connection_label(&mut self, seq: u64, label: Option<String>) -> Result<(), EditError> {
        self.ensure_editable()?;
        let conn = self
            .connections
            .iter_mut()
            .find(|conn| conn.seq == seq)
            .ok_or(EditError::ConnectionNotFound(seq))?;
        conn.label = label;
        self.commit();
        Ok(())
    }

    pub fn set_connection_note(&mut self, seq: u64, note: Option<String>) -> Result<(), EditError> {
        self.ensure_editable()?;
        let conn = self
            .connections
            .iter_mut()
            .find(|conn| conn.seq == seq)
            .ok_or(EditError::ConnectionNotFound(seq))?;
        conn.note = note;
        self.commit();
        Ok(())
    }

    pub fn set_connection_arrows(
        &mut self,
        seq: u64,
        start: ArrowStyle,
        end: ArrowStyle,
        line: LineStyle,
    ) -> Result<(), EditError> {
        self.ensure_editable()?;
        let conn = self
            .connections
            .iter_mut()
            .find(|conn| conn.seq == seq)
            .ok_or(EditError::ConnectionNotFound(seq))?;
        conn.start_arrow = start;
        conn.end_arrow = end;
        conn.line_style = line;
        self.commit();
        Ok(())
    }

    /// Removes a shape, every connection touching it, and any selection entry
    /// pointing at it.
    pub fn delete_shape(&mut self, id: ShapeId) -> Result<(), EditError> {
        self.ensure_editable()?;
        let before = self.shapes.len();
        self.shapes.retain(|shape| shape.id != id);
        if self.shapes.len() == before {
            return Err(EditError::NotFound(id));
        }
        self.connections
            .retain(|conn| conn.from != id && conn.to != id);
        let remaining: HashSet<u64> = self.connections.iter().map(|conn| conn.seq).collect();
        self.selected_shapes.retain(|selected| *selected != id);
        self.selected_connections
            .retain(|seq| remaining.contains(seq));
        self.commit();
        Ok(())
    }

    pub fn delete_connection(&mut self, seq: u64) -> Result<(), EditError> {
        self.ensure_editable()?;
        let before = self.connections.len();
        self.connections.retain(|conn| conn.seq != seq);
        if self.connections.len() == before {
            return Err(EditError::ConnectionNotFound(seq));
        }
        self.selected_connections.retain(|selected| *selected != seq);
        self.commit();
        Ok(())
    }

    pub fn delete_selection(&mut self) -> Result<(), EditError> {
        self.ensure_editable()?;
        let shapes: HashSet<ShapeId> = self.selected_shapes.drain(..).collect();
        let conns: HashSet<u64> = self.selected_connections.drain(..).collect();
        if shapes.is_empty() && conns.is_empty() {
            return Ok(());
        }
        self.shapes.retain(|shape| !shapes.contains(&shape.id));
        self.connections.retain(|conn| {
            !conns.contains(&conn.seq) && !shapes.contains(&conn.from) && !shapes.contains(&conn.to)
        });
        self.commit();
        Ok(())
    }

    // --- hierarchy ---------------------------------------------------------

    /// Drills into a group: pushes the current scope and switches to the
    /// group's children, recording boundary connections as read-only context
    /// indicators computed from the parent scope at this moment.
    pub fn enter_group(&mut self, id: ShapeId) -> Result<(), EditError> {
        if self.comparison_view {
            return Err(EditError::ComparisonActive);
        }
        self.end_impact_analysis();
        let position = self
            .shapes
            .iter()
            .position(|shape| shape.id == id)
            .ok_or(EditError::NotFound(id))?;
        if !self.shapes[position].kind.supports_children() {
            return Err(EditError::NotAGroup(id));
        }
        self.enter_group_unchecked(position);
        Ok(())
    }

    fn enter_group_unchecked(&mut self, position: usize) {
        let id = self.shapes[position].id;
        let mut indicators = Vec::new();
        for conn in &self.connections {
            if conn.to == id {
                self.push_indicator(&mut indicators, true, conn.from);
            }
            if conn.from == id {
                self.push_indicator(&mut indicators, false, conn.to);
            }
        }

        let children = std::mem::take(&mut self.shapes[position].children);
        let child_connections = std::mem::take(&mut self.shapes[position].child_connections);

        let parent_shapes = std::mem::replace(&mut self.shapes, children);
        let parent_connections = std::mem::replace(&mut self.connections, child_connections);
        let parent_indicators = std::mem::replace(&mut self.indicators, indicators);

        self.scope_stack.push(ScopeFrame {
            group: id,
            shapes: parent_shapes,
            connections: parent_connections,
            indicators: parent_indicators,
        });
        self.clear_selection();
    }

    fn push_indicator(&self, out: &mut Vec<ContextIndicator>, inbound: bool, shape: ShapeId) {
        if out.iter().any(|ind| ind.inbound == inbound && ind.shape == shape) {
            return;
        }
        let label = self
            .shape(shape)
            .map(|shape| shape.label.clone())
            .unwrap_or_default();
        out.push(ContextIndicator {
            inbound,
            shape,
            label,
        });
    }

    /// Writes the active lists back onto the group and pops one level.
    /// Returns false (a no-op) at the root.
    pub fn exit_group(&mut self) -> bool {
        let Some(frame) = self.scope_stack.pop() else {
            return false;
        };
        self.end_impact_analysis();
        let children = std::mem::replace(&mut self.shapes, frame.shapes);
        let child_connections = std::mem::replace(&mut self.connections, frame.connections);
        self.indicators = frame.indicators;
        if let Some(group) = self
            .shapes
            .iter_mut()
            .find(|shape| shape.id == frame.group)
        {
            group.children = children;
            group.child_connections = child_connections;
        }
        self.clear_selection();
        true
    }

    pub fn set_comparison_view(&mut self, active: bool) {
        self.comparison_view = active;
    }

    // --- impact analysis ---------------------------------------------------

    pub fn begin_impact_analysis(&mut self) {
        self.impact_targets = Some(Vec::new());
        self.impact_report = None;
    }

    pub fn impact_active(&self) -> bool {
        self.impact_targets.is_some()
    }

    /// Additive multi-select: clicking a target again removes it.
    pub fn toggle_impact_target(&mut self, id: ShapeId) -> Result<(), EditError> {
        if self.shape(id).is_none() {
            return Err(EditError::NotFound(id));
        }
        let Some(targets) = self.impact_targets.as_mut() else {
            return Ok(());
        };
        if let Some(position) = targets.iter().position(|target| *target == id) {
            targets.remove(position);
        } else {
            targets.push(id);
        }
        self.impact_report = if targets.is_empty() {
            None
        } else {
            Some(impact::analyze(&self.connections, targets))
        };
        Ok(())
    }

    pub fn impact_report(&self) -> Option<&ImpactReport> {
        self.impact_report.as_ref()
    }

    pub fn end_impact_analysis(&mut self) {
        self.impact_targets = None;
        self.impact_report = None;
    }

    // --- layers ------------------------------------------------------------

    fn create_layer(&mut self, name: String) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        self.layers.push(Layer {
            id,
            name,
            visible: true,
            locked: false,
            z_index: self.layers.len(),
        });
        id
    }

    /// Adds a layer and makes it active.
    pub fn add_layer(&mut self, name: Option<String>) -> Result<LayerId, EditError> {
        self.ensure_editable()?;
        let name = name.unwrap_or_else(|| format!("Layer {}", self.next_layer_id));
        let id = self.create_layer(name);
        self.active_layer = Some(id);
        self.commit();
        Ok(id)
    }

    /// Removes a layer, migrating its shapes to the first remaining layer.
    /// The last layer stays.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<(), EditError> {
        self.ensure_editable()?;
        if self.layers.len() <= 1 {
            return Err(EditError::LastLayer);
        }
        let position = self
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or(EditError::LayerNotFound(id))?;
        self.layers.remove(position);
        let fallback = self.layers[0].id;
        for shape in &mut self.shapes {
            if shape.layer == Some(id) {
                shape.layer = Some(fallback);
            }
        }
        if self.active_layer == Some(id) {
            self.active_layer = Some(fallback);
        }
        self.reindex_layers();
        self.commit();
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> Result<(), EditError> {
        self.ensure_editable()?;
        let layer = self.layer_mut(id)?;
        layer.name = name.to_string();
        self.commit();
        Ok(())
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<(), EditError> {
        let layer = self.layer_mut(id)?;
        layer.visible = visible;
        self.commit();
        Ok(())
    }

    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) -> Result<(), EditError> {
        let layer = self.layer_mut(id)?;
        layer.locked = locked;
        self.commit();
        Ok(())
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> Result<(), EditError> {
        self.layer_mut(id)?;
        self.active_layer = Some(id);
        Ok(())
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.active_layer
    }

    pub fn move_layer_up(&mut self, id: LayerId) -> Result<(), EditError> {
        self.ensure_editable()?;
        let position = self
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or(EditError::LayerNotFound(id))?;
        if position + 1 < self.layers.len() {
            self.layers.swap(position, position + 1);
            self.reindex_layers();
            self.commit();
        }
        Ok(())
    }

    pub fn move_layer_down(&mut self, id: LayerId) -> Result<(), EditError> {
        self.ensure_editable()?;
        let position = self
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or(EditError::LayerNotFound(id))?;
        if position > 0 {
            self.layers.swap(position, position - 1);
            self.reindex_layers();
            self.commit();
        }
        Ok(())
    }

    pub fn layer_shape_count(&self, id: LayerId) -> usize {
        self.shapes
            .iter()
            .filter(|shape| shape.layer == Some(id))
            .count()
    }

    fn reindex_layers(&mut self) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.z_index = index;
        }
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, EditError> {
        self.layers
            .iter_mut()
            .find(|layer| layer.id == id)
            .ok_or(EditError::LayerNotFound(id))
    }

    // --- history -----------------------------------------------------------

    /// Captures the document after a completed mutation. Drag steps skip this
    /// and call [`finish_drag`] once.
    ///
    /// [`finish_drag`]: EditorSession::finish_drag
    pub fn commit(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    fn snapshot(&self) -> Snapshot {
        let (shapes, connections) = self.document_tree();
        Snapshot {
            shapes,
            connections,
            scope_path: self.scope_stack.iter().map(|frame| frame.group).collect(),
            layers: self.layers.clone(),
            active_layer: self.active_layer,
            direction: self.direction,
        }
    }

    /// Folds the scope stack back into a full document tree without
    /// disturbing the live session.
    fn document_tree(&self) -> (Vec<Shape>, Vec<Connection>) {
        let mut shapes = self.shapes.clone();
        let mut connections = self.connections.clone();
        for frame in self.scope_stack.iter().rev() {
            let mut parent_shapes = frame.shapes.clone();
            if let Some(group) = parent_shapes
                .iter_mut()
                .find(|shape| shape.id == frame.group)
            {
                group.children = shapes;
                group.child_connections = connections;
            }
            shapes = parent_shapes;
            connections = frame.connections.clone();
        }
        (shapes, connections)
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.shapes = snapshot.shapes;
        self.connections = snapshot.connections;
        self.scope_stack.clear();
        self.indicators.clear();
        self.layers = snapshot.layers;
        self.active_layer = snapshot.active_layer;
        self.direction = snapshot.direction;
        self.clear_selection();
        self.end_impact_analysis();
        self.prune_dangling();
        // Re-descend the recorded drill-down path; stop at the first group
        // that no longer exists.
        for group in snapshot.scope_path {
            match self.shapes.iter().position(|shape| shape.id == group) {
                Some(position) => self.enter_group_unchecked(position),
                None => break,
            }
        }
    }

    fn prune_dangling(&mut self) {
        let ids: HashSet<ShapeId> = self.shapes.iter().map(|shape| shape.id).collect();
        self.connections
            .retain(|conn| ids.contains(&conn.from) && ids.contains(&conn.to));
    }

    // --- document I/O ------------------------------------------------------

    /// Replaces the document contents in a single committed step, e.g. after
    /// a DSL import. Resets hierarchy, selection, and analysis state.
    pub fn replace_document(&mut self, shapes: Vec<Shape>, connections: Vec<Connection>) {
        while self.exit_group() {}
        self.end_impact_analysis();
        self.clear_selection();
        let active = self.active_layer;
        self.shapes = shapes;
        for shape in &mut self.shapes {
            if shape.layer.is_none() {
                shape.layer = active;
            }
        }
        self.connections = connections;
        self.adopt_sequence_numbers();
        self.prune_dangling();
        self.commit();
    }

    /// Full tree as seen from the root, regardless of drill-down depth.
    pub fn document(&self) -> (Vec<Shape>, Vec<Connection>) {
        self.document_tree()
    }

    /// Parses DSL text into the session, replacing the document. Returns the
    /// importer's non-fatal warnings.
    pub fn import_dsl(&mut self, source: &str) -> Vec<String> {
        let report = crate::dsl::import_dsl(source, self.direction);
        self.direction = report.direction;
        self.replace_document(report.shapes, report.connections);
        report.warnings
    }

    /// Serializes the active scope as DSL text.
    pub fn export_dsl(&self) -> String {
        crate::dsl::export_dsl(&self.shapes, &self.connections, self.direction)
    }

    pub(crate) fn restore_from_parts(
        &mut self,
        direction: Direction,
        layers: Vec<Layer>,
        shapes: Vec<Shape>,
        connections: Vec<Connection>,
    ) {
        while self.exit_group() {}
        self.direction = direction;
        if !layers.is_empty() {
            self.next_layer_id = layers.iter().map(|layer| layer.id.0 + 1).max().unwrap_or(0);
            self.active_layer = layers.first().map(|layer| layer.id);
            self.layers = layers;
        }
        self.shapes = shapes;
        self.connections = connections;
        self.adopt_sequence_numbers();
        self.prune_dangling();
        self.clear_selection();
        self.end_impact_analysis();
        self.commit();
    }

    /// Keeps the session counter ahead of every sequence number in the tree.
    fn adopt_sequence_numbers(&mut self) {
        fn max_seq(shapes: &[Shape], connections: &[Connection]) -> u64 {
            let mut highest = connections.iter().map(|conn| conn.seq).max().unwrap_or(0);
            for shape in shapes {
                highest = highest.max(max_seq(&shape.children, &shape.child_connections));
            }
            highest
        }
        let highest = max_seq(&self.shapes, &self.connections);
        if self.next_seq <= highest {
            self.next_seq = highest + 1;
        }
    }

    fn ensure_editable(&self) -> Result<(), EditError> {
        if self.impact_targets.is_some() {
            return Err(EditError::AnalysisActive);
        }
        Ok(())
    }

    fn ensure_unlocked(&self, id: ShapeId) -> Result<(), EditError> {
        let Some(shape) = self.shape(id) else {
            return Err(EditError::NotFound(id));
        };
        if let Some(layer_id) = shape.layer {
            if self
                .layers
                .iter()
                .any(|layer| layer.id == layer_id && layer.locked)
            {
                return Err(EditError::Locked(id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_pair() -> (EditorSession, ShapeId, ShapeId) {
        let mut session = EditorSession::new();
        let a = session.add_shape(ShapeKind::Rectangle, 0.0, 0.0).unwrap();
        let b = session.add_shape(ShapeKind::Rectangle, 300.0, 0.0).unwrap();
        (session, a, b)
    }

    #[test]
    fn delete_cascades_to_connections_and_selection() {
        let (mut session, a, b) = session_with_pair();
        session.connect(a, b).unwrap();
        session.select_shape(a).unwrap();

        session.delete_shape(a).unwrap();

        assert!(session.shape(a).is_none());
        assert!(
            session
                .connections()
                .iter()
                .all(|conn| conn.from != a && conn.to != a)
        );
        assert!(session.selected_shapes().is_empty());
    }

    #[test]
    fn connect_rejects_shapes_outside_the_active_scope() {
        let (mut session, a, _) = session_with_pair();
        let group = session.add_shape(ShapeKind::Group, 600.0, 0.0).unwrap();
        session.enter_group(group).unwrap();
        let inner = session.add_shape(ShapeKind::Rectangle, 10.0, 10.0).unwrap();

        // `a` lives in the parent scope and is invisible from in here.
        assert_eq!(session.connect(inner, a), Err(EditError::NotFound(a)));
    }

    #[test]
    fn enter_and_exit_round_trips_the_parent_scope() {
        let (mut session, a, b) = session_with_pair();
        session.connect(a, b).unwrap();
        let group = session.add_shape(ShapeKind::Group, 600.0, 0.0).unwrap();
        let shapes_before: Vec<ShapeId> = session.shapes().iter().map(|s| s.id).collect();
        let conn_count = session.connections().len();

        session.enter_group(group).unwrap();
        assert!(session.shapes().is_empty());
        assert!(session.exit_group());

        let shapes_after: Vec<ShapeId> = session.shapes().iter().map(|s| s.id).collect();
        assert_eq!(shapes_before, shapes_after);
        assert_eq!(conn_count, session.connections().len());
    }

    #[test]
    fn context_indicators_reflect_boundary_connections() {
        let (mut session, a, _) = session_with_pair();
        let group = session.add_shape(ShapeKind::Group, 600.0, 0.0).unwrap();
        session.set_label(a, "Feeder").unwrap();
        session.connect(a, group).unwrap();
        session.connect(group, a).unwrap();

        session.enter_group(group).unwrap();

        let indicators = session.context_indicators();
        assert_eq!(indicators.len(), 2);
        assert!(indicators.iter().any(|ind| ind.inbound && ind.shape == a));
        assert!(indicators.iter().any(|ind| !ind.inbound && ind.shape == a));
        assert_eq!(indicators[0].label, "Feeder");
        // Indicators never leak into the editable scope.
        assert!(session.shapes().is_empty());
        assert!(session.connections().is_empty());

        session.exit_group();
        assert!(session.context_indicators().is_empty());
    }

    #[test]
    fn enter_is_rejected_while_comparison_view_is_active() {
        let mut session = EditorSession::new();
        let group = session.add_shape(ShapeKind::Group, 0.0, 0.0).unwrap();
        session.set_comparison_view(true);
        assert_eq!(session.enter_group(group), Err(EditError::ComparisonActive));
        session.set_comparison_view(false);
        assert!(session.enter_group(group).is_ok());
    }

    #[test]
    fn enter_rejects_missing_and_childless_shapes() {
        let mut session = EditorSession::new();
        let text = session.add_shape(ShapeKind::Text, 0.0, 0.0).unwrap();
        let gone = ShapeId::generate();
        assert_eq!(session.enter_group(gone), Err(EditError::NotFound(gone)));
        assert_eq!(session.enter_group(text), Err(EditError::NotAGroup(text)));
        assert!(!session.exit_group());
    }

    #[test]
    fn mutations_are_rejected_during_impact_analysis() {
        let (mut session, a, b) = session_with_pair();
        session.begin_impact_analysis();
        session.toggle_impact_target(a).unwrap();

        assert_eq!(
            session.add_shape(ShapeKind::Circle, 0.0, 0.0),
            Err(EditError::AnalysisActive)
        );
        assert_eq!(session.connect(a, b), Err(EditError::AnalysisActive));
        assert_eq!(session.delete_shape(b), Err(EditError::AnalysisActive));

        session.end_impact_analysis();
        assert!(session.add_shape(ShapeKind::Circle, 0.0, 0.0).is_ok());
    }

    #[test]
    fn locked_layer_blocks_move_and_resize() {
        let (mut session, a, _) = session_with_pair();
        let layer = session.active_layer().unwrap();
        session.set_layer_locked(layer, true).unwrap();

        assert_eq!(session.move_shape(a, 5.0, 5.0), Err(EditError::Locked(a)));

        session.set_layer_locked(layer, false).unwrap();
        assert!(session.move_shape(a, 5.0, 5.0).is_ok());
    }

    #[test]
    fn last_layer_cannot_be_removed() {
        let mut session = EditorSession::new();
        let base = session.active_layer().unwrap();
        assert_eq!(session.remove_layer(base), Err(EditError::LastLayer));

        let extra = session.add_layer(Some("Detail".into())).unwrap();
        assert_eq!(session.active_layer(), Some(extra));
        session.remove_layer(extra).unwrap();
        assert_eq!(session.active_layer(), Some(base));
    }

    #[test]
    fn removing_a_layer_migrates_its_shapes() {
        let mut session = EditorSession::new();
        let base = session.active_layer().unwrap();
        let extra = session.add_layer(Some("Detail".into())).unwrap();
        let shape = session.add_shape(ShapeKind::Rectangle, 0.0, 0.0).unwrap();
        assert_eq!(session.layer_shape_count(extra), 1);

        session.remove_layer(extra).unwrap();

        assert_eq!(session.shape(shape).unwrap().layer, Some(base));
        assert_eq!(session.layer_shape_count(base), 1);
    }

    #[test]
    fn hidden_layers_filter_visible_shapes_but_not_hit_tests() {
        let mut session = EditorSession::new();
        let layer = session.active_layer().unwrap();
        let shape = session.add_shape(ShapeKind::Rectangle, 0.0, 0.0).unwrap();
        session.set_layer_visible(layer, false).unwrap();

        assert_eq!(session.visible_shapes().count(), 0);
        assert_eq!(session.hit_shape(Point::new(10.0, 10.0)), Some(shape));
    }
}
