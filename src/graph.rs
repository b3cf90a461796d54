//! Labelled directed graph of stations and transfer links.
//!
//! Vertices are workstations, arcs are physical transport links, and both
//! carry a stochastic time model. Routing works on expected values; the
//! dispatcher additionally reweights incoming arcs of a station whenever a
//! tray commits to executing there, so later route queries see the
//! anticipated congestion.

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{error, warn};

use crate::config::GraphConfig;
use crate::error::{MesError, MesResult};
use crate::timedist::TimeDist;

/// Station identifier as used on the wire and in configuration.
pub type StationId = u32;

/// A workstation (graph vertex).
#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub buffer_capacity: u8,
    pub service_time: TimeDist,
}

/// A transfer link (directed arc) between two stations.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub tail: StationId,
    pub head: StationId,
    pub transfer_time: TimeDist,
}

/// Direction of a congestion adjustment. `Inflate` is applied when a station
/// commits to executing a process; the paired `Deflate` reverses it once the
/// process completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustSign {
    Inflate,
    Deflate,
}

impl AdjustSign {
    fn factor(self) -> f64 {
        match self {
            AdjustSign::Inflate => 1.0,
            AdjustSign::Deflate => -1.0,
        }
    }
}

/// The station network.
///
/// Backed by a petgraph `DiGraph` plus an id -> node-index map for O(1)
/// lookup by station id.
pub struct StationGraph {
    graph: DiGraph<Station, Transfer>,
    index: HashMap<StationId, NodeIndex>,
}

impl StationGraph {
    /// Build the graph from the parsed graph document. Duplicate station
    /// ids, arcs referencing unknown stations, and duplicate arcs are
    /// configuration errors.
    pub fn from_config(cfg: &GraphConfig) -> MesResult<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for v in &cfg.vertices {
            if index.contains_key(&v.id) {
                return Err(MesError::Config(format!("duplicate station id {}", v.id)));
            }
            let node = graph.add_node(Station {
                id: v.id,
                name: v.name.clone(),
                buffer_capacity: v.buffer_capacity,
                service_time: v.service_time_distribution.clone(),
            });
            index.insert(v.id, node);
        }
        for a in &cfg.arcs {
            let tail = *index
                .get(&a.tail)
                .ok_or_else(|| MesError::Config(format!("arc tail {} is not a station", a.tail)))?;
            let head = *index
                .get(&a.head)
                .ok_or_else(|| MesError::Config(format!("arc head {} is not a station", a.head)))?;
            if graph.find_edge(tail, head).is_some() {
                return Err(MesError::Config(format!(
                    "duplicate arc {} -> {}",
                    a.tail, a.head
                )));
            }
            graph.add_edge(
                tail,
                head,
                Transfer {
                    tail: a.tail,
                    head: a.head,
                    transfer_time: a.transfer_time_distribution.clone(),
                },
            );
        }
        Ok(Self { graph, index })
    }

    /// Number of stations.
    pub fn station_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Look up a station by id.
    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.index.get(&id).map(|&n| &self.graph[n])
    }

    /// Service-time distribution of a station.
    pub fn station_dist(&self, id: StationId) -> Option<&TimeDist> {
        self.station(id).map(|s| &s.service_time)
    }

    /// Replace the service-time distribution of a station.
    pub fn set_station_dist(&mut self, id: StationId, dist: TimeDist) -> MesResult<()> {
        let node = *self.index.get(&id).ok_or(MesError::UnknownStation(id))?;
        self.graph[node].service_time = dist;
        Ok(())
    }

    /// Look up the arc `tail -> head`.
    pub fn transfer(&self, tail: StationId, head: StationId) -> Option<&Transfer> {
        let (&t, &h) = (self.index.get(&tail)?, self.index.get(&head)?);
        self.graph.find_edge(t, h).map(|e| &self.graph[e])
    }

    /// Transfer-time distribution of the arc `tail -> head`.
    pub fn transfer_dist(&self, tail: StationId, head: StationId) -> Option<&TimeDist> {
        self.transfer(tail, head).map(|t| &t.transfer_time)
    }

    /// Replace the transfer-time distribution of the arc `tail -> head`.
    pub fn set_transfer_dist(
        &mut self,
        tail: StationId,
        head: StationId,
        dist: TimeDist,
    ) -> MesResult<()> {
        let t = *self.index.get(&tail).ok_or(MesError::UnknownStation(tail))?;
        let h = *self.index.get(&head).ok_or(MesError::UnknownStation(head))?;
        let edge = self
            .graph
            .find_edge(t, h)
            .ok_or(MesError::UnknownTransfer(tail, head))?;
        self.graph[edge].transfer_time = dist;
        Ok(())
    }

    fn neighbours(&self, id: StationId, dir: Direction) -> Vec<StationId> {
        let Some(&node) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<StationId> = self
            .graph
            .neighbors_directed(node, dir)
            .map(|n| self.graph[n].id)
            .collect();
        out.sort_unstable();
        out
    }

    /// Station ids reachable over one outgoing arc, ordered by id.
    pub fn outgoing_neighbours(&self, id: StationId) -> Vec<StationId> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Station ids with an arc into `id`, ordered by id.
    pub fn incoming_neighbours(&self, id: StationId) -> Vec<StationId> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Fold the service time of `station_id` into the arc `tail -> head`.
    ///
    /// Normal distributions only: the arc becomes
    /// N(mu_a + sign * mu_v, sqrt(sigma_a^2 + sign * sigma_v^2)). Any other
    /// distribution on either side skips the adjustment with an error log.
    /// The signed variance term makes a paired inflate/deflate restore the
    /// arc exactly; an unpaired deflate can drive the inner expression
    /// negative, which is clamped at zero and logged.
    pub fn adjust_transfer_by_station(
        &mut self,
        tail: StationId,
        head: StationId,
        station_id: StationId,
        sign: AdjustSign,
    ) {
        let (Some(&t), Some(&h), Some(&v)) = (
            self.index.get(&tail),
            self.index.get(&head),
            self.index.get(&station_id),
        ) else {
            error!("arc adjustment failed: unknown station among {tail}, {head}, {station_id}");
            return;
        };
        let Some(edge) = self.graph.find_edge(t, h) else {
            error!("arc adjustment failed: no arc {tail} -> {head}");
            return;
        };
        let TimeDist::Normal(mu_a, sigma_a) = self.graph[edge].transfer_time else {
            error!("arc {tail} -> {head} is not normal, skipping adjustment");
            return;
        };
        let TimeDist::Normal(mu_v, sigma_v) = self.graph[v].service_time else {
            error!("station {station_id} service time is not normal, skipping adjustment");
            return;
        };
        let factor = sign.factor();
        let mut variance = sigma_a * sigma_a + factor * sigma_v * sigma_v;
        if variance < 0.0 {
            warn!("unpaired deflate on arc {tail} -> {head}: variance clamped to zero");
            variance = 0.0;
        }
        self.graph[edge].transfer_time = TimeDist::Normal(mu_a + factor * mu_v, variance.sqrt());
    }

    /// Fold the service time of `station_id` into every arc that enters it.
    /// The only congestion signal the dispatcher emits.
    pub fn adjust_incoming_by_station(&mut self, station_id: StationId, sign: AdjustSign) {
        let incoming = self.incoming_neighbours(station_id);
        if incoming.is_empty() {
            warn!("station {station_id} has no incoming arcs, nothing to adjust");
            return;
        }
        for tail in incoming {
            self.adjust_transfer_by_station(tail, station_id, station_id, sign);
        }
    }

    /// Shortest path from `src` to `dst` over expected transfer times.
    ///
    /// Returns the vertex sequence (inclusive of both ends) and the expected
    /// length. `src == dst` yields `([src], 0.0)`. `None` when either id is
    /// unknown or `dst` is unreachable.
    pub fn shortest_path(&self, src: StationId, dst: StationId) -> Option<(Vec<StationId>, f64)> {
        let (&s, &d) = (self.index.get(&src)?, self.index.get(&dst)?);
        let (length, path) = astar(
            &self.graph,
            s,
            |n| n == d,
            |e| e.weight().transfer_time.expected(),
            |_| 0.0,
        )?;
        Some((path.into_iter().map(|n| self.graph[n].id).collect(), length))
    }

    /// Render the network as a Graphviz document.
    ///
    /// One box node per station (id, name, buffer capacity, service time
    /// summary), one edge per arc (endpoints, transfer time summary).
    /// Convert with `dot -Tpng system_graph.dot -o system_graph.png`.
    pub fn to_dot(&self) -> String {
        fn fmt_params(params: &[f64]) -> String {
            params
                .iter()
                .map(|p| format!("{p:.1}"))
                .collect::<Vec<_>>()
                .join(", ")
        }

        let mut out = String::from("digraph G {\n");
        for node in self.graph.node_indices() {
            let s = &self.graph[node];
            let mut label = format!("S{}", s.id);
            if !s.name.is_empty() {
                let _ = write!(label, ": {}", s.name);
            }
            let _ = write!(
                label,
                "\\nmax capacity: {}\\ns{}: {} ({})",
                s.buffer_capacity,
                s.id,
                s.service_time.kind_str(),
                fmt_params(&s.service_time.params())
            );
            let _ = writeln!(
                out,
                "    {} [shape=box, style=filled, fillcolor=lightyellow, color=black, penwidth=1, label=\"{label}\"];",
                s.id
            );
        }
        for edge in self.graph.edge_indices() {
            let t = &self.graph[edge];
            let _ = writeln!(
                out,
                "    {} -> {} [color=black, penwidth=1, arrowsize=1.0, label=\" t{},{}: {} ({})\"];",
                t.tail,
                t.head,
                t.tail,
                t.head,
                t.transfer_time.kind_str(),
                fmt_params(&t.transfer_time.params())
            );
        }
        out.push_str("}\n");
        out
    }

    /// Write the Graphviz document to `path`.
    pub fn write_dot(&self, path: &Path) -> MesResult<()> {
        std::fs::write(path, self.to_dot())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArcConfig, VertexConfig};

    fn vertex(id: StationId, dist: TimeDist) -> VertexConfig {
        VertexConfig {
            id,
            name: format!("st{id}"),
            buffer_capacity: 2,
            service_time_distribution: dist,
        }
    }

    fn arc(tail: StationId, head: StationId, dist: TimeDist) -> ArcConfig {
        ArcConfig {
            tail,
            head,
            transfer_time_distribution: dist,
        }
    }

    /// 1 -> 2 -> 3 chain plus a costly 1 -> 3 shortcut.
    fn chain_with_shortcut() -> StationGraph {
        let cfg = GraphConfig {
            vertices: vec![
                vertex(1, TimeDist::Normal(2.0, 0.5)),
                vertex(2, TimeDist::Normal(3.0, 0.5)),
                vertex(3, TimeDist::Normal(4.0, 0.5)),
            ],
            arcs: vec![
                arc(1, 2, TimeDist::Normal(5.0, 1.0)),
                arc(2, 3, TimeDist::Normal(5.0, 1.0)),
                arc(1, 3, TimeDist::Normal(20.0, 1.0)),
            ],
        };
        StationGraph::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_lookup_and_neighbours() {
        let g = chain_with_shortcut();
        assert_eq!(g.station_count(), 3);
        assert_eq!(g.station(2).unwrap().name, "st2");
        assert!(g.station(9).is_none());
        assert_eq!(g.outgoing_neighbours(1), vec![2, 3]);
        assert_eq!(g.incoming_neighbours(3), vec![1, 2]);
        assert!(g.outgoing_neighbours(3).is_empty());
        assert!(g.transfer(1, 2).is_some());
        assert!(g.transfer(2, 1).is_none());
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let cfg = GraphConfig {
            vertices: vec![
                vertex(1, TimeDist::Constant(0.0)),
                vertex(1, TimeDist::Constant(0.0)),
            ],
            arcs: vec![],
        };
        assert!(matches!(
            StationGraph::from_config(&cfg),
            Err(MesError::Config(_))
        ));
    }

    #[test]
    fn test_arc_to_unknown_station_rejected() {
        let cfg = GraphConfig {
            vertices: vec![vertex(1, TimeDist::Constant(0.0))],
            arcs: vec![arc(1, 2, TimeDist::Constant(1.0))],
        };
        assert!(matches!(
            StationGraph::from_config(&cfg),
            Err(MesError::Config(_))
        ));
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut g = chain_with_shortcut();
        g.set_station_dist(1, TimeDist::Constant(7.0)).unwrap();
        assert_eq!(g.station_dist(1), Some(&TimeDist::Constant(7.0)));
        g.set_transfer_dist(1, 2, TimeDist::Exponential(0.5)).unwrap();
        assert_eq!(g.transfer_dist(1, 2), Some(&TimeDist::Exponential(0.5)));
        assert!(matches!(
            g.set_station_dist(9, TimeDist::Constant(1.0)),
            Err(MesError::UnknownStation(9))
        ));
        assert!(matches!(
            g.set_transfer_dist(2, 1, TimeDist::Constant(1.0)),
            Err(MesError::UnknownTransfer(2, 1))
        ));
    }

    #[test]
    fn test_shortest_path_prefers_cheap_chain() {
        let g = chain_with_shortcut();
        let (path, len) = g.shortest_path(1, 3).unwrap();
        assert_eq!(path, vec![1, 2, 3]);
        assert!((len - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_path_same_vertex() {
        let g = chain_with_shortcut();
        let (path, len) = g.shortest_path(2, 2).unwrap();
        assert_eq!(path, vec![2]);
        assert_eq!(len, 0.0);
    }

    #[test]
    fn test_shortest_path_unreachable() {
        let g = chain_with_shortcut();
        assert!(g.shortest_path(3, 1).is_none());
        assert!(g.shortest_path(1, 99).is_none());
    }

    #[test]
    fn test_shortest_path_idempotent() {
        let g = chain_with_shortcut();
        let first = g.shortest_path(1, 3).unwrap();
        let second = g.shortest_path(1, 3).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_adjust_inflates_mean_and_reroutes() {
        let mut g = chain_with_shortcut();
        // committing to station 2 should make the chain through it pricier
        g.adjust_incoming_by_station(2, AdjustSign::Inflate);
        let TimeDist::Normal(mu, _) = *g.transfer_dist(1, 2).unwrap() else {
            panic!("arc no longer normal");
        };
        assert!((mu - 8.0).abs() < 1e-9); // 5 + 3
    }

    #[test]
    fn test_paired_adjustment_restores_parameters() {
        let mut g = chain_with_shortcut();
        let before: Vec<TimeDist> = vec![
            g.transfer_dist(1, 2).unwrap().clone(),
            g.transfer_dist(2, 3).unwrap().clone(),
            g.transfer_dist(1, 3).unwrap().clone(),
        ];
        g.adjust_incoming_by_station(3, AdjustSign::Inflate);
        g.adjust_incoming_by_station(3, AdjustSign::Deflate);
        let after = vec![
            g.transfer_dist(1, 2).unwrap().clone(),
            g.transfer_dist(2, 3).unwrap().clone(),
            g.transfer_dist(1, 3).unwrap().clone(),
        ];
        for (b, a) in before.iter().zip(&after) {
            let (TimeDist::Normal(mb, sb), TimeDist::Normal(ma, sa)) = (b, a) else {
                panic!("arc no longer normal");
            };
            assert!((mb - ma).abs() < 1e-9);
            assert!((sb - sa).abs() < 1e-9);
        }
    }

    #[test]
    fn test_adjust_skips_non_normal_arcs() {
        let mut g = chain_with_shortcut();
        g.set_transfer_dist(1, 2, TimeDist::Constant(5.0)).unwrap();
        g.adjust_incoming_by_station(2, AdjustSign::Inflate);
        assert_eq!(g.transfer_dist(1, 2), Some(&TimeDist::Constant(5.0)));
    }

    #[test]
    fn test_adjust_no_incoming_is_noop() {
        let mut g = chain_with_shortcut();
        // station 1 has no incoming arcs
        g.adjust_incoming_by_station(1, AdjustSign::Inflate);
        let TimeDist::Normal(mu, _) = *g.transfer_dist(1, 2).unwrap() else {
            panic!("arc no longer normal");
        };
        assert_eq!(mu, 5.0);
    }

    #[test]
    fn test_dot_export_mentions_everything() {
        let g = chain_with_shortcut();
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("S1: st1"));
        assert!(dot.contains("max capacity: 2"));
        assert!(dot.contains("normal (5.0, 1.0)"));
        assert!(dot.contains("1 -> 2"));
        assert!(dot.contains(" t2,3: normal"));
    }
}
