//! The compact textual graph notation.
//!
//! One line per connection, `id<bracket>label<bracket>` definitions inlined at
//! first use, a leading `flowchart <DIR>` orientation directive. Parsing is
//! deliberately tolerant of hand-edited text: malformed lines are skipped and
//! reported on the import report instead of failing the whole document.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{ArrowStyle, Connection, LineStyle, Shape, ShapeId, ShapeKind};
use crate::{
    Direction, IMPORT_SHAPE_HEIGHT, IMPORT_SHAPE_WIDTH, LAYOUT_LEVEL_SPACING_H,
    LAYOUT_LEVEL_SPACING_V, LAYOUT_NODE_SPACING_H, LAYOUT_NODE_SPACING_V, LAYOUT_ORIGIN,
};

/// `id` immediately followed by a bracketed definition. Alternation order
/// matters: the two-character bracket pairs must win over their one-character
/// prefixes.
static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_]+)(\[\([^\[\]()]*\)\]|\(\([^()]*\)\)|\{[^{}]*\}|\[[^\[\]]*\]|\([^()]*\))")
        .expect("definition pattern is valid")
});

/// The cloud form `id)label(` uses reversed parentheses and needs its own
/// scan.
static CLOUD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9_]+)\)([^()]+)\(").expect("cloud pattern is valid"));

static ARROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<?)(-\.+-|-{2,}|={2,})(>?)").expect("arrow pattern is valid"));

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|([^|]*)\|").expect("label pattern is valid"));

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("identifier pattern is valid"));

/// Outcome of a tolerant parse: the graph plus any lines that had to be
/// skipped. `direction` is the caller's default unless the text carried its
/// own orientation directive.
#[derive(Debug)]
pub struct ImportReport {
    pub shapes: Vec<Shape>,
    pub connections: Vec<Connection>,
    pub direction: Direction,
    pub warnings: Vec<String>,
}

struct Importer {
    shapes: Vec<Shape>,
    by_external: HashMap<String, ShapeId>,
}

impl Importer {
    fn new() -> Self {
        Importer {
            shapes: Vec::new(),
            by_external: HashMap::new(),
        }
    }

    /// Registers a shape for `id`, classifying the bracketed definition when
    /// one is given. Endpoints that never receive a definition become plain
    /// rectangles labeled with their identifier.
    fn get_or_create(&mut self, id: &str, def: Option<&str>) -> ShapeId {
        if let Some(existing) = self.by_external.get(id) {
            return *existing;
        }
        let (kind, label) = match def {
            Some(def) => classify_definition(def).unwrap_or((ShapeKind::Rectangle, id.to_string())),
            None => (ShapeKind::Rectangle, id.to_string()),
        };
        let mut shape = Shape::new(kind, 0.0, 0.0);
        shape.width = IMPORT_SHAPE_WIDTH;
        shape.height = IMPORT_SHAPE_HEIGHT;
        shape.label = label;
        shape.external_id = Some(id.to_string());
        let shape_id = shape.id;
        self.by_external.insert(id.to_string(), shape_id);
        self.shapes.push(shape);
        shape_id
    }
}

fn classify_definition(def: &str) -> Option<(ShapeKind, String)> {
    let inner = |outer: usize| def[outer..def.len() - outer].trim().to_string();
    if def.starts_with("[(") && def.ends_with(")]") {
        Some((ShapeKind::DataStore, inner(2)))
    } else if def.starts_with("((") && def.ends_with("))") {
        Some((ShapeKind::Circle, inner(2)))
    } else if def.starts_with('{') && def.ends_with('}') {
        Some((ShapeKind::Decision, inner(1)))
    } else if def.starts_with('[') && def.ends_with(']') {
        Some((ShapeKind::Rectangle, inner(1)))
    } else if def.starts_with(')') && def.ends_with('(') {
        Some((ShapeKind::Cloud, inner(1)))
    } else if def.starts_with('(') && def.ends_with(')') {
        // Rounded nodes are not a distinct kind here; keep the label.
        Some((ShapeKind::Rectangle, inner(1)))
    } else {
        None
    }
}

/// Replaces every bracketed definition with its bare identifier so endpoint
/// scanning cannot mistake label words for node ids.
fn strip_definitions(segment: &str) -> String {
    let stripped = DEF_RE.replace_all(segment, "$1");
    CLOUD_RE.replace_all(&stripped, "$1").into_owned()
}

fn is_directive(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("flowchart") || lower.starts_with("graph")
}

/// Parses the DSL. Never fails: unrecognized lines are skipped and listed on
/// the report. Imported shapes receive a fresh auto-layout.
pub fn import_dsl(source: &str, default_direction: Direction) -> ImportReport {
    let mut direction = default_direction;
    let mut warnings = Vec::new();
    let mut importer = Importer::new();

    let lines: Vec<(usize, &str)> = source
        .lines()
        .enumerate()
        .map(|(number, line)| (number + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("%%"))
        .collect();

    let mut body = Vec::new();
    for (number, line) in lines {
        if is_directive(line) {
            match line.split_whitespace().nth(1).and_then(Direction::from_token) {
                Some(found) => direction = found,
                None => warnings.push(format!(
                    "line {number}: orientation directive without a usable direction"
                )),
            }
            continue;
        }
        body.push((number, line));
    }

    // First pass: register every bracketed definition so endpoints resolve to
    // the right kind no matter where the definition appears.
    for &(_, line) in &body {
        for caps in DEF_RE.captures_iter(line) {
            let id = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let def = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            importer.get_or_create(id, Some(def));
        }
        for caps in CLOUD_RE.captures_iter(line) {
            let id = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let def = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let def = &def[id.len()..];
            importer.get_or_create(id, Some(def));
        }
    }

    // Second pass: connections.
    let mut connections: Vec<Connection> = Vec::new();
    for &(number, line) in &body {
        let Some(arrow) = ARROW_RE.captures(line) else {
            let plain = strip_definitions(line);
            let plain = plain.trim();
            if ID_RE.is_match(plain) && plain.chars().all(|c| c.is_alphanumeric() || c == '_') {
                // A standalone definition or bare identifier line.
                importer.get_or_create(plain, None);
            } else if DEF_RE.is_match(line) || CLOUD_RE.is_match(line) {
                // Pure definition line already handled in the first pass.
            } else {
                warnings.push(format!("line {number}: skipped unparseable line: {line}"));
            }
            continue;
        };

        let token = arrow.get(2).map(|m| m.as_str()).unwrap_or_default();
        let has_start = arrow.get(1).is_some_and(|m| !m.as_str().is_empty());
        let has_end = arrow.get(3).is_some_and(|m| !m.as_str().is_empty());
        let line_style = if token.contains('.') {
            LineStyle::Dashed
        } else {
            LineStyle::Solid
        };

        let whole = arrow.get(0).map(|m| m.range()).unwrap_or(0..0);
        let label = LABEL_RE
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|label| !label.is_empty());
        let left_unlabeled = LABEL_RE.replace(&line[..whole.start], " ");
        let left = strip_definitions(&left_unlabeled);
        let right_raw = &line[whole.end..];
        let right_unlabeled = LABEL_RE.replace(right_raw, " ");
        let right = strip_definitions(&right_unlabeled);

        let from_id = ID_RE.find_iter(&left).last().map(|m| m.as_str().to_string());
        let to_id = ID_RE.find(&right).map(|m| m.as_str().to_string());

        let (Some(from_id), Some(to_id)) = (from_id, to_id) else {
            warnings.push(format!(
                "line {number}: arrow without two resolvable endpoints: {line}"
            ));
            continue;
        };

        let from = importer.get_or_create(&from_id, None);
        let to = importer.get_or_create(&to_id, None);
        connections.push(Connection {
            from,
            to,
            seq: connections.len() as u64,
            label,
            note: None,
            start_arrow: if has_start {
                ArrowStyle::Arrow
            } else {
                ArrowStyle::None
            },
            end_arrow: if has_end {
                ArrowStyle::Arrow
            } else {
                ArrowStyle::None
            },
            line_style,
        });
    }

    for warning in &warnings {
        log::warn!("dsl import: {warning}");
    }

    let mut shapes = importer.shapes;
    auto_layout(&mut shapes, &connections, direction);

    ImportReport {
        shapes,
        connections,
        direction,
        warnings,
    }
}

/// Grid placement after an import: breadth-first levels from the in-degree
/// zero roots (or the first shape when every node sits on a cycle), levels
/// along the flow axis, siblings along the other.
pub fn auto_layout(shapes: &mut [Shape], connections: &[Connection], direction: Direction) {
    if shapes.is_empty() {
        return;
    }

    let ids: Vec<ShapeId> = shapes.iter().map(|shape| shape.id).collect();
    let mut indegree: HashMap<ShapeId, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut adjacency: HashMap<ShapeId, Vec<ShapeId>> =
        ids.iter().map(|id| (*id, Vec::new())).collect();
    for conn in connections {
        if let Some(neighbors) = adjacency.get_mut(&conn.from) {
            neighbors.push(conn.to);
        }
        if let Some(degree) = indegree.get_mut(&conn.to) {
            *degree += 1;
        }
    }

    let mut roots: Vec<ShapeId> = ids
        .iter()
        .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
        .copied()
        .collect();
    if roots.is_empty() {
        roots.push(ids[0]);
    }

    let mut levels: HashMap<ShapeId, usize> = HashMap::new();
    let mut queue: std::collections::VecDeque<ShapeId> = std::collections::VecDeque::new();
    for root in roots {
        levels.insert(root, 0);
        queue.push_back(root);
    }
    while let Some(current) = queue.pop_front() {
        let level = levels.get(&current).copied().unwrap_or(0);
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if !levels.contains_key(neighbor) {
                    levels.insert(*neighbor, level + 1);
                    queue.push_back(*neighbor);
                }
            }
        }
    }

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, id) in ids.iter().enumerate() {
        let level = levels.get(id).copied().unwrap_or(0);
        grouped.entry(level).or_default().push(index);
    }

    let level_count = grouped.len();
    let (level_spacing, node_spacing) = if direction.is_horizontal() {
        (LAYOUT_LEVEL_SPACING_H, LAYOUT_NODE_SPACING_H)
    } else {
        (LAYOUT_LEVEL_SPACING_V, LAYOUT_NODE_SPACING_V)
    };

    for (rank, (_, members)) in grouped.iter().enumerate() {
        let rank = if direction.is_reversed() {
            level_count - 1 - rank
        } else {
            rank
        };
        let primary = LAYOUT_ORIGIN + rank as f32 * level_spacing;
        for (slot, &index) in members.iter().enumerate() {
            let secondary = LAYOUT_ORIGIN + slot as f32 * node_spacing;
            let shape = &mut shapes[index];
            if direction.is_horizontal() {
                shape.x = primary;
                shape.y = secondary;
            } else {
                shape.x = secondary;
                shape.y = primary;
            }
        }
    }
}

/// Serializes one scope. Ids reuse the imported external identifier when
/// present, otherwise derive from the sanitized label with numeric suffixes
/// on collision. Definitions are inlined at a shape's first appearance;
/// unconnected shapes trail as standalone definitions.
pub fn export_dsl(shapes: &[Shape], connections: &[Connection], direction: Direction) -> String {
    let mut output = format!("flowchart {}\n", direction.as_token());

    let mut ids: HashMap<ShapeId, String> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    for (index, shape) in shapes.iter().enumerate() {
        let base = match &shape.external_id {
            Some(external) => external.clone(),
            None => {
                let sanitized: String = shape
                    .label
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .take(20)
                    .collect();
                if sanitized.is_empty() {
                    format!("Node{index}")
                } else {
                    sanitized
                }
            }
        };
        let mut candidate = base.clone();
        let mut counter = 1;
        while !used.insert(candidate.clone()) {
            candidate = format!("{base}{counter}");
            counter += 1;
        }
        ids.insert(shape.id, candidate);
    }

    let definition = |shape: &Shape, id: &str| -> String {
        let label = if shape.label.is_empty() {
            id
        } else {
            shape.label.as_str()
        };
        match shape.kind {
            ShapeKind::Decision => format!("{id}{{{label}}}"),
            ShapeKind::Circle => format!("{id}(({label}))"),
            ShapeKind::DataStore => format!("{id}[({label})]"),
            ShapeKind::Cloud => format!("{id}){label}("),
            _ => format!("{id}[{label}]"),
        }
    };

    let needs_definition = |shape: &Shape, id: &str| -> bool {
        shape.kind != ShapeKind::Rectangle || shape.label != id
    };

    let mut defined: HashSet<ShapeId> = HashSet::new();
    let mut token_for = |shape: &Shape| -> String {
        let id = ids.get(&shape.id).cloned().unwrap_or_default();
        if needs_definition(shape, &id) && defined.insert(shape.id) {
            definition(shape, &id)
        } else {
            id
        }
    };

    let connected: HashSet<ShapeId> = connections
        .iter()
        .flat_map(|conn| [conn.from, conn.to])
        .collect();

    for conn in connections {
        let Some(from) = shapes.iter().find(|shape| shape.id == conn.from) else {
            continue;
        };
        let Some(to) = shapes.iter().find(|shape| shape.id == conn.to) else {
            continue;
        };

        let arrow = match (
            conn.start_arrow != ArrowStyle::None,
            conn.end_arrow != ArrowStyle::None,
        ) {
            (true, true) => "<-->",
            (false, true) => "-->",
            (true, false) => "<--",
            (false, false) => "---",
        };
        let label = conn
            .label
            .as_deref()
            .filter(|label| !label.is_empty())
            .map(|label| format!("|{label}|"))
            .unwrap_or_default();

        let from_token = token_for(from);
        let to_token = token_for(to);
        output.push_str(&format!("    {from_token} {arrow}{label} {to_token}\n"));
    }

    for shape in shapes {
        if !connected.contains(&shape.id) {
            let id = ids.get(&shape.id).cloned().unwrap_or_default();
            output.push_str(&format!("    {}\n", definition(shape, &id)));
        }
    }

    output
}
