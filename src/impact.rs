//! Upstream/downstream reachability over the active scope's connections.

use std::collections::HashSet;

use crate::model::{Connection, ShapeId};

/// Result of one analysis run. The two sets exclude the targets themselves
/// and may overlap when cycles connect both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactReport {
    /// Shapes reachable by walking connections backward from any target.
    pub upstream: Vec<ShapeId>,
    /// Shapes reachable by walking connections forward from any target.
    pub downstream: Vec<ShapeId>,
    pub per_target: Vec<TargetImpact>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetImpact {
    pub target: ShapeId,
    pub upstream_count: usize,
    pub downstream_count: usize,
}

/// Pure query: walks the connection list in both directions from the target
/// set. Cycle-safe via visited sets; terminates on any graph.
pub fn analyze(connections: &[Connection], targets: &[ShapeId]) -> ImpactReport {
    let target_set: HashSet<ShapeId> = targets.iter().copied().collect();

    let mut upstream = Vec::new();
    let mut downstream = Vec::new();
    let mut visited_up = HashSet::new();
    let mut visited_down = HashSet::new();

    for &target in targets {
        walk(
            connections,
            target,
            &target_set,
            &mut visited_up,
            &mut upstream,
            true,
        );
        walk(
            connections,
            target,
            &target_set,
            &mut visited_down,
            &mut downstream,
            false,
        );
    }

    let per_target = targets
        .iter()
        .map(|&target| {
            let mut up = Vec::new();
            let mut down = Vec::new();
            walk(
                connections,
                target,
                &target_set,
                &mut HashSet::new(),
                &mut up,
                true,
            );
            walk(
                connections,
                target,
                &target_set,
                &mut HashSet::new(),
                &mut down,
                false,
            );
            TargetImpact {
                target,
                upstream_count: up.len(),
                downstream_count: down.len(),
            }
        })
        .collect();

    ImpactReport {
        upstream,
        downstream,
        per_target,
    }
}

/// Worklist traversal in one direction. `backward` follows target <- source;
/// forward follows source -> target. Targets are never collected.
fn walk(
    connections: &[Connection],
    start: ShapeId,
    targets: &HashSet<ShapeId>,
    visited: &mut HashSet<ShapeId>,
    out: &mut Vec<ShapeId>,
    backward: bool,
) {
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for conn in connections {
            let next = if backward {
                (conn.to == current).then_some(conn.from)
            } else {
                (conn.from == current).then_some(conn.to)
            };
            let Some(next) = next else { continue };
            if targets.contains(&next) {
                continue;
            }
            if !out.contains(&next) {
                out.push(next);
            }
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArrowStyle, LineStyle, Shape, ShapeKind};

    fn ids(count: usize) -> Vec<ShapeId> {
        (0..count)
            .map(|_| Shape::new(ShapeKind::Rectangle, 0.0, 0.0).id)
            .collect()
    }

    fn connect(from: ShapeId, to: ShapeId, seq: u64) -> Connection {
        Connection {
            from,
            to,
            seq,
            label: None,
            note: None,
            start_arrow: ArrowStyle::None,
            end_arrow: ArrowStyle::Arrow,
            line_style: LineStyle::Solid,
        }
    }

    #[test]
    fn cycle_terminates_and_excludes_the_target() {
        let nodes = ids(3);
        let (a, b, c) = (nodes[0], nodes[1], nodes[2]);
        let connections = vec![connect(a, b, 0), connect(b, c, 1), connect(c, a, 2)];

        let report = analyze(&connections, &[b]);

        assert!(!report.upstream.is_empty());
        assert!(!report.downstream.is_empty());
        assert!(!report.upstream.contains(&b));
        assert!(!report.downstream.contains(&b));
        // On a full cycle the two sets coincide.
        let up: HashSet<_> = report.upstream.iter().collect();
        let down: HashSet<_> = report.downstream.iter().collect();
        assert_eq!(up, down);
    }

    #[test]
    fn chain_splits_cleanly_into_upstream_and_downstream() {
        let nodes = ids(4);
        let (a, b, c, d) = (nodes[0], nodes[1], nodes[2], nodes[3]);
        let connections = vec![connect(a, b, 0), connect(b, c, 1), connect(c, d, 2)];

        let report = analyze(&connections, &[b]);

        assert_eq!(report.upstream, vec![a]);
        assert_eq!(report.downstream, vec![c, d]);
    }

    #[test]
    fn multiple_targets_accumulate_without_counting_each_other() {
        let nodes = ids(4);
        let (a, b, c, d) = (nodes[0], nodes[1], nodes[2], nodes[3]);
        let connections = vec![connect(a, b, 0), connect(b, c, 1), connect(c, d, 2)];

        let report = analyze(&connections, &[b, c]);

        assert_eq!(report.upstream, vec![a]);
        assert_eq!(report.downstream, vec![d]);
        assert_eq!(report.per_target.len(), 2);
        let for_b = &report.per_target[0];
        assert_eq!(for_b.target, b);
        assert_eq!(for_b.upstream_count, 1);
        // Downstream of b stops at c (a target), so d is unreachable from b.
        assert_eq!(for_b.downstream_count, 0);
    }

    #[test]
    fn empty_targets_produce_an_empty_report() {
        let nodes = ids(2);
        let connections = vec![connect(nodes[0], nodes[1], 0)];
        let report = analyze(&connections, &[]);
        assert!(report.upstream.is_empty());
        assert!(report.downstream.is_empty());
        assert!(report.per_target.is_empty());
    }
}
