//! Layered left-to-right layout of one diagram scope.
//!
//! Phases:
//! 1. DFS over the scope graph; back edges (loops introduced by `next`)
//!    are ignored for ranking
//! 2. longest-path ranking over the remaining DAG
//! 3. barycenter ordering within ranks, alternating down and up sweeps
//! 4. coordinates: one column per rank, nodes stacked and centred vertically
//! 5. orthogonal waypoints, with backward edges routed below the scope
//!
//! Boundary events are not ranked; they sit on the bottom edge of their host
//! and their edges rank as if they left the host.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{DfsEvent, EdgeRef, depth_first_search};
use stepflow_types::config::LayoutConfig;
use stepflow_types::diagram::{Bounds, DiagramMeta, Point};
use stepflow_types::node::NodeId;
use stepflow_types::tree::NodeTree;

/// Gap between boundary events, and between the last one and its host's edge.
const BOUNDARY_INSET: f64 = 10.0;

/// Positions for every element and edge of one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeLayout {
    pub bounds: HashMap<NodeId, Bounds>,
    pub waypoints: HashMap<(NodeId, NodeId), Vec<Point>>,
    pub ranks: HashMap<NodeId, usize>,
}

pub fn layout_scope(tree: &NodeTree, scope: NodeId, config: &LayoutConfig) -> ScopeLayout {
    let members: Vec<(NodeId, &DiagramMeta)> = tree
        .children(scope)
        .iter()
        .filter_map(|c| tree.get(*c).diagram_meta.as_ref().map(|m| (*c, m)))
        .collect();
    let metas: HashMap<NodeId, &DiagramMeta> = members.iter().copied().collect();

    // 1. scope graph
    let mut graph = DiGraph::<NodeId, ()>::new();
    let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();
    for (id, meta) in &members {
        if meta.attached_to.is_none() {
            index.insert(*id, graph.add_node(*id));
        }
    }
    for (id, meta) in &members {
        let source = meta.attached_to.unwrap_or(*id);
        for target in &meta.edges {
            if let (Some(&s), Some(&t)) = (index.get(&source), index.get(target)) {
                graph.update_edge(s, t, ());
            }
        }
    }

    let mut back_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    depth_first_search(&graph, graph.node_indices(), |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.insert((u, v));
        }
    });

    // 2. longest-path ranks
    let mut dag = DiGraph::<(), ()>::with_capacity(graph.node_count(), graph.edge_count());
    for _ in graph.node_indices() {
        dag.add_node(());
    }
    for edge in graph.edge_references() {
        let (s, t) = (edge.source(), edge.target());
        if s != t && !back_edges.contains(&(s, t)) {
            dag.add_edge(s, t, ());
        }
    }
    let order = toposort(&dag, None).unwrap_or_else(|_| dag.node_indices().collect());
    let mut rank = vec![0usize; dag.node_count()];
    for &n in &order {
        for succ in dag.neighbors(n) {
            rank[succ.index()] = rank[succ.index()].max(rank[n.index()] + 1);
        }
    }

    // 3. ordering
    let layer_count = rank.iter().max().map_or(0, |m| m + 1);
    let mut layers: Vec<Vec<NodeIndex>> = vec![Vec::new(); layer_count];
    for n in graph.node_indices() {
        layers[rank[n.index()]].push(n);
    }
    for _ in 0..config.ordering_sweeps {
        for li in 1..layers.len() {
            reorder(&mut layers, li, li - 1, &dag, Direction::Incoming);
        }
        for li in (0..layers.len().saturating_sub(1)).rev() {
            reorder(&mut layers, li, li + 1, &dag, Direction::Outgoing);
        }
    }

    // 4. coordinates
    let size = |n: NodeIndex| {
        metas
            .get(&graph[n])
            .map(|m| (m.width, m.height))
            .unwrap_or((config.node_width, config.node_height))
    };
    let column_widths: Vec<f64> = layers
        .iter()
        .map(|l| l.iter().map(|n| size(*n).0).fold(0.0, f64::max))
        .collect();
    let column_heights: Vec<f64> = layers
        .iter()
        .map(|l| {
            let total: f64 = l.iter().map(|n| size(*n).1).sum();
            total + config.node_separation * l.len().saturating_sub(1) as f64
        })
        .collect();
    let tallest = column_heights.iter().copied().fold(0.0, f64::max);

    let mut layout = ScopeLayout::default();
    let mut x = config.margin;
    for (li, layer) in layers.iter().enumerate() {
        let mut y = config.margin + (tallest - column_heights[li]) / 2.0;
        for &n in layer {
            let (width, height) = size(n);
            layout.bounds.insert(
                graph[n],
                Bounds {
                    x: x + (column_widths[li] - width) / 2.0,
                    y,
                    width,
                    height,
                },
            );
            layout.ranks.insert(graph[n], li);
            y += height + config.node_separation;
        }
        x += column_widths[li] + config.rank_separation;
    }

    let mut attached: HashMap<NodeId, Vec<(NodeId, &DiagramMeta)>> = HashMap::new();
    for (id, meta) in &members {
        if let Some(host) = meta.attached_to {
            attached.entry(host).or_default().push((*id, *meta));
        }
    }
    for (host, events) in &attached {
        let Some(hb) = layout.bounds.get(host).copied() else {
            continue;
        };
        let widths: Vec<f64> = events.iter().map(|(_, m)| m.width).collect();
        for ((id, meta), x) in events.iter().zip(boundary_offsets(&hb, &widths)) {
            layout.bounds.insert(
                *id,
                Bounds {
                    x,
                    y: hb.bottom() - meta.height / 2.0,
                    width: meta.width,
                    height: meta.height,
                },
            );
        }
    }

    // 5. waypoints
    let floor = layout
        .bounds
        .values()
        .map(Bounds::bottom)
        .fold(config.margin, f64::max)
        + config.node_separation / 2.0;
    for (id, meta) in &members {
        let Some(sb) = layout.bounds.get(id).copied() else {
            continue;
        };
        for target in &meta.edges {
            let Some(tb) = layout.bounds.get(target).copied() else {
                continue;
            };
            let points = if meta.attached_to.is_some() {
                boundary_route(&sb, &tb, floor)
            } else if tb.x >= sb.right() {
                forward_route(&sb, &tb, config.rank_separation)
            } else {
                below_route(&sb, &tb, floor)
            };
            layout.waypoints.insert((*id, *target), points);
        }
    }

    layout
}

/// Left edges of the boundary events on `host`, placed right to left from the
/// host's right edge. Events that do not fit under the host run left to right
/// from its left edge instead, past its right edge if needed.
fn boundary_offsets(host: &Bounds, widths: &[f64]) -> Vec<f64> {
    let span: f64 = widths.iter().map(|w| w + BOUNDARY_INSET).sum();
    if span <= host.width {
        let mut x = host.right();
        widths
            .iter()
            .map(|w| {
                x -= w + BOUNDARY_INSET;
                x
            })
            .collect()
    } else {
        let mut x = host.x + BOUNDARY_INSET;
        widths
            .iter()
            .map(|w| {
                let left = x;
                x += w + BOUNDARY_INSET;
                left
            })
            .collect()
    }
}

/// Reorder `layers[li]` by the mean position of neighbours in `layers[reference]`.
/// Nodes without such neighbours keep their current position as score.
fn reorder(
    layers: &mut [Vec<NodeIndex>],
    li: usize,
    reference: usize,
    dag: &DiGraph<(), ()>,
    direction: Direction,
) {
    let positions: HashMap<NodeIndex, f64> = layers[reference]
        .iter()
        .enumerate()
        .map(|(i, n)| (*n, i as f64))
        .collect();
    let mut scored: Vec<(NodeIndex, f64)> = layers[li]
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let found: Vec<f64> = dag
                .neighbors_directed(*n, direction)
                .filter_map(|m| positions.get(&m).copied())
                .collect();
            let score = if found.is_empty() {
                i as f64
            } else {
                found.iter().sum::<f64>() / found.len() as f64
            };
            (*n, score)
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    layers[li] = scored.into_iter().map(|(n, _)| n).collect();
}

fn forward_route(source: &Bounds, target: &Bounds, rank_separation: f64) -> Vec<Point> {
    let start = Point {
        x: source.right(),
        y: source.center_y(),
    };
    let end = Point {
        x: target.x,
        y: target.center_y(),
    };
    if (start.y - end.y).abs() < f64::EPSILON {
        return vec![start, end];
    }
    let bend = (target.x - rank_separation / 2.0).max(source.right());
    vec![
        start,
        Point { x: bend, y: start.y },
        Point { x: bend, y: end.y },
        end,
    ]
}

fn below_route(source: &Bounds, target: &Bounds, floor: f64) -> Vec<Point> {
    vec![
        Point {
            x: source.center_x(),
            y: source.bottom(),
        },
        Point {
            x: source.center_x(),
            y: floor,
        },
        Point {
            x: target.center_x(),
            y: floor,
        },
        Point {
            x: target.center_x(),
            y: target.bottom(),
        },
    ]
}

fn boundary_route(source: &Bounds, target: &Bounds, floor: f64) -> Vec<Point> {
    if target.x <= source.center_x() {
        return below_route(source, target, floor);
    }
    vec![
        Point {
            x: source.center_x(),
            y: source.bottom(),
        },
        Point {
            x: source.center_x(),
            y: target.center_y(),
        },
        Point {
            x: target.x,
            y: target.center_y(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepflow_types::diagram::ElementKind;
    use stepflow_types::node::{Node, NodeKind};

    fn scope_with(edges: &[(usize, usize)], count: usize) -> (NodeTree, NodeId, Vec<NodeId>) {
        let mut tree = NodeTree::new();
        let flow = tree.add_child(tree.root(), Node::new(NodeKind::Flow, "main", json!([])));
        let ids: Vec<NodeId> = (0..count)
            .map(|i| tree.add_child(flow, Node::new(NodeKind::Assign, format!("n{i}"), json!({}))))
            .collect();
        for &id in &ids {
            tree.get_mut(id).diagram_meta = Some(DiagramMeta::new(ElementKind::Task, 120.0, 80.0));
        }
        for &(s, t) in edges {
            if let Some(meta) = tree.get_mut(ids[s]).diagram_meta.as_mut() {
                meta.add_edge(ids[t]);
            }
        }
        (tree, flow, ids)
    }

    #[test]
    fn test_chain_ranks_left_to_right() {
        let (tree, flow, ids) = scope_with(&[(0, 1), (1, 2)], 3);
        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        let xs: Vec<f64> = ids.iter().map(|id| layout.bounds[id].x).collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2]);
        assert_eq!(layout.bounds[&ids[0]].x, 50.0);
        assert_eq!(layout.bounds[&ids[0]].y, 50.0);
    }

    #[test]
    fn test_back_edge_does_not_break_ranking() {
        let (tree, flow, ids) = scope_with(&[(0, 1), (1, 2), (2, 0)], 3);
        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        assert_eq!(layout.ranks[&ids[0]], 0);
        assert_eq!(layout.ranks[&ids[2]], 2);
        // The back edge is routed below the row.
        let route = &layout.waypoints[&(ids[2], ids[0])];
        assert!(route.iter().any(|p| p.y > layout.bounds[&ids[0]].bottom()));
    }

    #[test]
    fn test_fan_out_does_not_overlap() {
        let (tree, flow, ids) = scope_with(&[(0, 1), (0, 2), (0, 3), (1, 4), (2, 4), (3, 4)], 5);
        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert!(!layout.bounds[a].overlaps(&layout.bounds[b]), "{a} overlaps {b}");
            }
        }
        assert_eq!(layout.ranks[&ids[4]], 2);
    }

    #[test]
    fn test_boundary_events_spread_along_host() {
        let (mut tree, flow, ids) = scope_with(&[(0, 1)], 2);
        let host = ids[0];
        let mut events = Vec::new();
        for i in 0..4 {
            let id = tree.add_child(flow, Node::new(NodeKind::Except, format!("except_{i}"), json!({})));
            let mut meta = DiagramMeta::new(ElementKind::BoundaryEvent, 36.0, 36.0);
            meta.attached_to = Some(host);
            meta.add_edge(ids[1]);
            tree.get_mut(id).diagram_meta = Some(meta);
            events.push(id);
        }

        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        let hb = layout.bounds[&host];
        for (i, a) in events.iter().enumerate() {
            assert_eq!(layout.bounds[a].center_y(), hb.bottom());
            for b in &events[i + 1..] {
                assert!(!layout.bounds[a].overlaps(&layout.bounds[b]), "{a} overlaps {b}");
            }
        }
        assert!(!layout.ranks.contains_key(&events[0]));
    }

    #[test]
    fn test_single_boundary_event_sits_inside_host_edge() {
        let (mut tree, flow, ids) = scope_with(&[], 1);
        let id = tree.add_child(flow, Node::new(NodeKind::Except, "except", json!({})));
        let mut meta = DiagramMeta::new(ElementKind::BoundaryEvent, 36.0, 36.0);
        meta.attached_to = Some(ids[0]);
        tree.get_mut(id).diagram_meta = Some(meta);

        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        let hb = layout.bounds[&ids[0]];
        let eb = layout.bounds[&id];
        assert_eq!(eb.x, hb.right() - 36.0 - BOUNDARY_INSET);
        assert!(eb.x >= hb.x);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let (tree, flow, _) = scope_with(&[(0, 1), (0, 2), (2, 3), (1, 3)], 4);
        let config = LayoutConfig::default();
        assert_eq!(layout_scope(&tree, flow, &config), layout_scope(&tree, flow, &config));
    }

    #[test]
    fn test_forward_edge_waypoints_anchor_on_sides() {
        let (tree, flow, ids) = scope_with(&[(0, 1)], 2);
        let layout = layout_scope(&tree, flow, &LayoutConfig::default());
        let route = &layout.waypoints[&(ids[0], ids[1])];
        assert_eq!(route.first().unwrap().x, layout.bounds[&ids[0]].right());
        assert_eq!(route.last().unwrap().x, layout.bounds[&ids[1]].x);
    }
}
