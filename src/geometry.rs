//! Hit-testing, multi-edge routing, resize handles, and marquee selection.
//!
//! Everything here is a pure read of the active scope: routing is recomputed
//! from shape centers on every query, so hit tests and rendering always agree.

use crate::model::{Connection, Shape, ShapeId};
use crate::{
    BIDIRECTIONAL_BASE_OFFSET, CONNECTION_HIT_THRESHOLD, HANDLE_GRAB_RADIUS, MIN_SHAPE_SIZE,
    PARALLEL_SPREAD, Point, Rect,
};

/// The rendered line of a connection, trimmed to both shape borders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

/// Topmost shape under the point. Later-created shapes draw above earlier
/// ones, so the scan runs back to front.
pub fn shape_at(shapes: &[Shape], point: Point) -> Option<&Shape> {
    shapes.iter().rev().find(|shape| shape.rect().contains(point))
}

/// Connection whose rendered segment passes within the hit threshold of the
/// point. Later-created connections win ties.
pub fn connection_at<'a>(
    shapes: &[Shape],
    connections: &'a [Connection],
    point: Point,
) -> Option<&'a Connection> {
    connections.iter().rev().find(|conn| {
        connection_route(shapes, connections, conn)
            .map(|segment| distance_to_segment(point, segment.from, segment.to) < CONNECTION_HIT_THRESHOLD)
            .unwrap_or(false)
    })
}

/// Computes the rendered segment for one connection, applying the multi-edge
/// perpendicular offset and clipping both ends to the shape borders.
///
/// Connections sharing an unordered shape pair are fanned out: when the
/// reverse direction also exists, the direction whose first connection was
/// created earlier takes the positive side at `BIDIRECTIONAL_BASE_OFFSET` and
/// the other direction the negative side, extra parallels stepping outward by
/// `PARALLEL_SPREAD`. A direction group on its own is centered symmetrically
/// around the direct line instead. Creation order comes from `Connection::seq`.
pub fn connection_route(
    shapes: &[Shape],
    connections: &[Connection],
    conn: &Connection,
) -> Option<Segment> {
    let from = shapes.iter().find(|shape| shape.id == conn.from)?;
    let to = shapes.iter().find(|shape| shape.id == conn.to)?;

    let mut same: Vec<&Connection> = connections
        .iter()
        .filter(|other| other.from == conn.from && other.to == conn.to)
        .collect();
    same.sort_by_key(|other| other.seq);

    let reverse_first = connections
        .iter()
        .filter(|other| other.from == conn.to && other.to == conn.from)
        .map(|other| other.seq)
        .min();

    let position = same
        .iter()
        .position(|other| other.seq == conn.seq)
        .unwrap_or(0);

    let from_center = from.center();
    let to_center = to.center();

    let (offset, reference) = match reverse_first {
        Some(reverse_seq) => {
            let own_first = same.first().map(|other| other.seq).unwrap_or(conn.seq);
            let sign = if own_first < reverse_seq { 1.0 } else { -1.0 };
            let offset = (BIDIRECTIONAL_BASE_OFFSET + position as f32 * PARALLEL_SPREAD) * sign;
            // Both directions measure the perpendicular against the
            // earlier-created direction so their offsets share an axis.
            let reference = if own_first < reverse_seq {
                (to_center.x - from_center.x, to_center.y - from_center.y)
            } else {
                (from_center.x - to_center.x, from_center.y - to_center.y)
            };
            (offset, reference)
        }
        None => {
            let offset = if same.len() > 1 {
                (position as f32 - (same.len() as f32 - 1.0) / 2.0) * PARALLEL_SPREAD
            } else {
                0.0
            };
            (
                offset,
                (to_center.x - from_center.x, to_center.y - from_center.y),
            )
        }
    };

    let (dx, dy) = reference;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist == 0.0 {
        return Some(Segment {
            from: from_center,
            to: to_center,
        });
    }

    let perp_x = -dy / dist;
    let perp_y = dx / dist;

    let from_offset = Point::new(
        from_center.x + perp_x * offset,
        from_center.y + perp_y * offset,
    );
    let to_offset = Point::new(to_center.x + perp_x * offset, to_center.y + perp_y * offset);

    Some(Segment {
        from: edge_intersection(from, from_offset, to_offset),
        to: edge_intersection(to, to_offset, from_offset),
    })
}

/// Where a ray from the (possibly offset) center toward `target` leaves the
/// shape's bounding rectangle. Selecting the side by comparing the ray angle
/// to the half-diagonal angle keeps the exit point on the border for any
/// aspect ratio.
pub fn edge_intersection(shape: &Shape, center: Point, target: Point) -> Point {
    let dx = target.x - center.x;
    let dy = target.y - center.y;
    if dx.abs() < 1e-3 && dy.abs() < 1e-3 {
        return center;
    }

    let angle = dy.atan2(dx);
    let half_w = shape.width / 2.0;
    let half_h = shape.height / 2.0;
    let edge_angle = half_h.atan2(half_w);
    let abs_angle = angle.abs();

    if abs_angle < edge_angle {
        Point::new(center.x + half_w, center.y + half_w * angle.tan())
    } else if abs_angle > std::f32::consts::PI - edge_angle {
        Point::new(center.x - half_w, center.y - half_w * angle.tan())
    } else if angle > 0.0 {
        Point::new(center.x + half_h / angle.tan(), center.y + half_h)
    } else {
        Point::new(center.x - half_h / angle.tan(), center.y - half_h)
    }
}

pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f32 {
    let ap_x = point.x - a.x;
    let ap_y = point.y - a.y;
    let ab_x = b.x - a.x;
    let ab_y = b.y - a.y;

    let len_sq = ab_x * ab_x + ab_y * ab_y;
    let t = if len_sq == 0.0 {
        -1.0
    } else {
        (ap_x * ab_x + ap_y * ab_y) / len_sq
    };

    let nearest = if t < 0.0 {
        a
    } else if t > 1.0 {
        b
    } else {
        Point::new(a.x + t * ab_x, a.y + t * ab_y)
    };

    point.distance_to(nearest)
}

/// The eight resize handles of a selected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::NorthWest,
        Handle::North,
        Handle::NorthEast,
        Handle::East,
        Handle::SouthEast,
        Handle::South,
        Handle::SouthWest,
        Handle::West,
    ];

    pub fn position(&self, shape: &Shape) -> Point {
        let mid_x = shape.x + shape.width / 2.0;
        let mid_y = shape.y + shape.height / 2.0;
        let right = shape.x + shape.width;
        let bottom = shape.y + shape.height;
        match self {
            Handle::NorthWest => Point::new(shape.x, shape.y),
            Handle::North => Point::new(mid_x, shape.y),
            Handle::NorthEast => Point::new(right, shape.y),
            Handle::East => Point::new(right, mid_y),
            Handle::SouthEast => Point::new(right, bottom),
            Handle::South => Point::new(mid_x, bottom),
            Handle::SouthWest => Point::new(shape.x, bottom),
            Handle::West => Point::new(shape.x, mid_y),
        }
    }
}

pub fn handle_at(shape: &Shape, point: Point) -> Option<Handle> {
    Handle::ALL
        .into_iter()
        .find(|handle| handle.position(shape).distance_to(point) < HANDLE_GRAB_RADIUS)
}

/// Applies a handle drag. Corner handles move two edges, side handles one;
/// every edge clamps so neither dimension drops below `MIN_SHAPE_SIZE`.
pub fn resize(shape: &mut Shape, handle: Handle, to: Point) {
    let right = shape.x + shape.width;
    let bottom = shape.y + shape.height;

    let move_left = |shape: &mut Shape| {
        let x = to.x.min(right - MIN_SHAPE_SIZE);
        shape.x = x;
        shape.width = right - x;
    };
    let move_top = |shape: &mut Shape| {
        let y = to.y.min(bottom - MIN_SHAPE_SIZE);
        shape.y = y;
        shape.height = bottom - y;
    };
    let move_right = |shape: &mut Shape| {
        shape.width = (to.x - shape.x).max(MIN_SHAPE_SIZE);
    };
    let move_bottom = |shape: &mut Shape| {
        shape.height = (to.y - shape.y).max(MIN_SHAPE_SIZE);
    };

    match handle {
        Handle::NorthWest => {
            move_left(shape);
            move_top(shape);
        }
        Handle::North => move_top(shape),
        Handle::NorthEast => {
            move_right(shape);
            move_top(shape);
        }
        Handle::East => move_right(shape),
        Handle::SouthEast => {
            move_right(shape);
            move_bottom(shape);
        }
        Handle::South => move_bottom(shape),
        Handle::SouthWest => {
            move_left(shape);
            move_bottom(shape);
        }
        Handle::West => move_left(shape),
    }
}

/// Marquee selection: shapes whose bounding box intersects the normalized
/// rectangle and connections whose rendered segment touches it.
pub fn marquee_select(
    shapes: &[Shape],
    connections: &[Connection],
    a: Point,
    b: Point,
) -> (Vec<ShapeId>, Vec<u64>) {
    let rect = Rect::from_corners(a, b);

    let selected_shapes = shapes
        .iter()
        .filter(|shape| shape.rect().intersects(&rect))
        .map(|shape| shape.id)
        .collect();

    let selected_connections = connections
        .iter()
        .filter(|conn| {
            connection_route(shapes, connections, conn)
                .map(|segment| segment_intersects_rect(segment, rect))
                .unwrap_or(false)
        })
        .map(|conn| conn.seq)
        .collect();

    (selected_shapes, selected_connections)
}

fn segment_intersects_rect(segment: Segment, rect: Rect) -> bool {
    if rect.contains(segment.from) || rect.contains(segment.to) {
        return true;
    }

    let corners = [
        Point::new(rect.min_x, rect.min_y),
        Point::new(rect.max_x, rect.min_y),
        Point::new(rect.max_x, rect.max_y),
        Point::new(rect.min_x, rect.max_y),
    ];
    let edges = [
        (corners[0], corners[1]),
        (corners[1], corners[2]),
        (corners[2], corners[3]),
        (corners[3], corners[0]),
    ];
    edges
        .iter()
        .any(|(p, q)| segments_intersect(segment.from, segment.to, *p, *q))
}

fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let denom = (a1.x - a2.x) * (b1.y - b2.y) - (a1.y - a2.y) * (b1.x - b2.x);
    if denom.abs() < 1e-4 {
        return false;
    }

    let t = ((a1.x - b1.x) * (b1.y - b2.y) - (a1.y - b1.y) * (b1.x - b2.x)) / denom;
    let u = -((a1.x - a2.x) * (a1.y - b1.y) - (a1.y - a2.y) * (a1.x - b1.x)) / denom;

    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArrowStyle, LineStyle, ShapeKind};

    fn shape_at_pos(x: f32, y: f32) -> Shape {
        let mut shape = Shape::new(ShapeKind::Rectangle, x, y);
        shape.width = 100.0;
        shape.height = 60.0;
        shape
    }

    fn conn(from: &Shape, to: &Shape, seq: u64) -> Connection {
        Connection {
            from: from.id,
            to: to.id,
            seq,
            label: None,
            note: None,
            start_arrow: ArrowStyle::None,
            end_arrow: ArrowStyle::Arrow,
            line_style: LineStyle::Solid,
        }
    }

    #[test]
    fn topmost_shape_wins_the_hit_test() {
        let lower = shape_at_pos(0.0, 0.0);
        let upper = shape_at_pos(50.0, 20.0);
        let shapes = vec![lower.clone(), upper.clone()];

        let hit = shape_at(&shapes, Point::new(60.0, 30.0)).unwrap();
        assert_eq!(hit.id, upper.id);

        let only_lower = shape_at(&shapes, Point::new(10.0, 10.0)).unwrap();
        assert_eq!(only_lower.id, lower.id);

        assert!(shape_at(&shapes, Point::new(500.0, 500.0)).is_none());
    }

    #[test]
    fn bidirectional_pair_gets_opposite_sign_offsets() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let forward = conn(&a, &b, 0);
        let backward = conn(&b, &a, 1);
        let connections = vec![forward.clone(), backward.clone()];

        let fwd = connection_route(&shapes, &connections, &forward).unwrap();
        let bwd = connection_route(&shapes, &connections, &backward).unwrap();

        // Horizontal pair: the perpendicular is vertical, so the offsets show
        // up as opposite displacements from the shared center height of 30.
        let center_y = 30.0;
        assert!((fwd.from.y - (center_y + BIDIRECTIONAL_BASE_OFFSET)).abs() < 0.5);
        assert!((bwd.from.y - (center_y - BIDIRECTIONAL_BASE_OFFSET)).abs() < 0.5);
        assert!((fwd.from.y - center_y) * (bwd.from.y - center_y) < 0.0);
    }

    #[test]
    fn offset_sides_survive_list_reordering() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let forward = conn(&a, &b, 0);
        let backward = conn(&b, &a, 1);

        let ordered = vec![forward.clone(), backward.clone()];
        let shuffled = vec![backward.clone(), forward.clone()];

        let before = connection_route(&shapes, &ordered, &forward).unwrap();
        let after = connection_route(&shapes, &shuffled, &forward).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn parallel_connections_center_around_the_direct_line() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let first = conn(&a, &b, 0);
        let second = conn(&a, &b, 1);
        let connections = vec![first.clone(), second.clone()];

        let one = connection_route(&shapes, &connections, &first).unwrap();
        let two = connection_route(&shapes, &connections, &second).unwrap();

        let center_y = 30.0;
        let half = PARALLEL_SPREAD / 2.0;
        assert!((one.from.y - (center_y - half)).abs() < 0.5);
        assert!((two.from.y - (center_y + half)).abs() < 0.5);
    }

    #[test]
    fn routes_terminate_on_shape_borders() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let only = conn(&a, &b, 0);
        let connections = vec![only.clone()];

        let segment = connection_route(&shapes, &connections, &only).unwrap();
        // Right border of `a` is x = 100, left border of `b` is x = 300.
        assert!((segment.from.x - 100.0).abs() < 0.5);
        assert!((segment.to.x - 300.0).abs() < 0.5);
    }

    #[test]
    fn edge_intersection_tracks_aspect_ratio() {
        let mut wide = shape_at_pos(0.0, 0.0);
        wide.width = 200.0;
        wide.height = 40.0;
        let center = wide.center();

        let east = edge_intersection(&wide, center, Point::new(500.0, 20.0));
        assert!((east.x - 200.0).abs() < 0.5);

        let south = edge_intersection(&wide, center, Point::new(100.0, 500.0));
        assert!((south.y - 40.0).abs() < 0.5);
    }

    #[test]
    fn connection_hit_respects_the_threshold() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let only = conn(&a, &b, 0);
        let connections = vec![only];

        // The line runs along y = 30 between the borders.
        assert!(connection_at(&shapes, &connections, Point::new(200.0, 36.0)).is_some());
        assert!(connection_at(&shapes, &connections, Point::new(200.0, 39.5)).is_none());
    }

    #[test]
    fn later_connection_wins_overlapping_hits() {
        // Two shape pairs stacked on the same coordinates produce two
        // coincident rendered segments.
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let c = shape_at_pos(0.0, 0.0);
        let d = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        let connections = vec![conn(&a, &b, 0), conn(&c, &d, 1)];

        let hit = connection_at(&shapes, &connections, Point::new(200.0, 30.0)).unwrap();
        assert_eq!(hit.seq, 1);
    }

    #[test]
    fn resize_enforces_the_minimum_floor() {
        let mut shape = shape_at_pos(0.0, 0.0);
        resize(&mut shape, Handle::SouthEast, Point::new(5.0, 5.0));
        assert_eq!(shape.width, MIN_SHAPE_SIZE);
        assert_eq!(shape.height, MIN_SHAPE_SIZE);

        let mut shape = shape_at_pos(0.0, 0.0);
        resize(&mut shape, Handle::West, Point::new(400.0, 0.0));
        assert_eq!(shape.width, MIN_SHAPE_SIZE);
        assert_eq!(shape.x, 100.0 - MIN_SHAPE_SIZE);
    }

    #[test]
    fn corner_resize_moves_two_edges_and_side_resize_one() {
        let mut shape = shape_at_pos(100.0, 100.0);
        resize(&mut shape, Handle::NorthWest, Point::new(80.0, 90.0));
        assert_eq!(shape.x, 80.0);
        assert_eq!(shape.y, 90.0);
        assert_eq!(shape.width, 120.0);
        assert_eq!(shape.height, 70.0);

        let mut shape = shape_at_pos(100.0, 100.0);
        resize(&mut shape, Handle::East, Point::new(260.0, 500.0));
        assert_eq!(shape.width, 160.0);
        assert_eq!(shape.height, 60.0);
    }

    #[test]
    fn handle_grab_radius_is_honored() {
        let shape = shape_at_pos(0.0, 0.0);
        assert_eq!(
            handle_at(&shape, Point::new(2.0, 2.0)),
            Some(Handle::NorthWest)
        );
        assert_eq!(
            handle_at(&shape, Point::new(50.0, 61.0)),
            Some(Handle::South)
        );
        assert_eq!(handle_at(&shape, Point::new(20.0, 20.0)), None);
    }

    #[test]
    fn marquee_selects_intersecting_shapes_and_crossed_connections() {
        let a = shape_at_pos(0.0, 0.0);
        let b = shape_at_pos(300.0, 0.0);
        let shapes = vec![a.clone(), b.clone()];
        let only = conn(&a, &b, 0);
        let connections = vec![only];

        // Drag from bottom-right to top-left: fully contains `a`, crosses the
        // segment, stops short of `b`.
        let (hit_shapes, hit_conns) =
            marquee_select(&shapes, &connections, Point::new(150.0, 80.0), Point::new(-10.0, -10.0));
        assert_eq!(hit_shapes, vec![a.id]);
        assert_eq!(hit_conns, vec![0]);

        // A marquee off to the side selects nothing.
        let (none_shapes, none_conns) =
            marquee_select(&shapes, &connections, Point::new(0.0, 200.0), Point::new(50.0, 300.0));
        assert!(none_shapes.is_empty());
        assert!(none_conns.is_empty());
    }
}
