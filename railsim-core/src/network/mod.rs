//! Directed multigraph of track links with shortest-path expansion,
//! cumulative path lengths, and position interpolation.
//!
//! Nodes, links, and signals live in arenas and reference each other by
//! dense index, so occupancy sets and adjacency lists carry no ownership.

pub mod link;
pub mod node;
pub mod signal;
pub mod signal_group;

pub use link::{Link, LinkDirections, LinkIdx};
pub use node::{Node, NodeIdx};
pub use signal::{Signal, SignalIdx};
pub use signal_group::SignalGroupController;

use crate::imports::*;
use crate::input::{LinkRecord, NodeRecord};
use crate::train::TrainIdx;

/// The track network: node/link/signal arenas plus the user-id lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub signals: Vec<Signal>,
    user_node_index: HashMap<i64, NodeIdx>,
}

/// Aggregate catenary and length statistics for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub catenary_link_fraction: f64,
    pub catenary_consumed: si::Energy,
    pub catenary_regenerated: si::Energy,
    pub total_link_length: si::Length,
    pub catenary_link_length: si::Length,
}

impl Network {
    /// Build the network from input records, applying scale factors,
    /// validating geometry, and generating signals.
    pub fn new(
        node_records: Vec<NodeRecord>,
        link_records: Vec<LinkRecord>,
    ) -> Result<Self, SimError> {
        let mut nodes = Vec::with_capacity(node_records.len());
        let mut user_node_index = HashMap::with_capacity(node_records.len());
        for (i, record) in node_records.iter().enumerate() {
            let idx = NodeIdx::new(i as u32);
            if user_node_index.insert(record.user_id, idx).is_some() {
                return Err(SimError::InvalidGeometry(format!(
                    "duplicate node id {}",
                    record.user_id
                )));
            }
            nodes.push(Node {
                idx,
                user_id: record.user_id,
                coord: record.scaled_coord(),
                desc: record.desc.clone(),
                is_terminal: record.is_terminal,
                dwell_time: record.terminal_dwell_time_s * uc::S,
                links_to: BTreeMap::new(),
                signals: Vec::new(),
            });
        }

        let mut links = Vec::with_capacity(link_records.len());
        for (i, record) in link_records.iter().enumerate() {
            let idx = LinkIdx::new(i as u32);
            let from = *user_node_index.get(&record.from_node).ok_or_else(|| {
                SimError::InvalidGeometry(format!(
                    "link {} references unknown node {}",
                    record.user_id, record.from_node
                ))
            })?;
            let to = *user_node_index.get(&record.to_node).ok_or_else(|| {
                SimError::InvalidGeometry(format!(
                    "link {} references unknown node {}",
                    record.user_id, record.to_node
                ))
            })?;
            let length = record.length_m * record.length_scale * uc::M;
            if length <= si::Length::ZERO {
                return Err(SimError::InvalidGeometry(format!(
                    "link {} has non-positive length",
                    record.user_id
                )));
            }
            let directions = match record.directions {
                1 => LinkDirections::OneWay,
                2 => LinkDirections::TwoWay,
                other => {
                    return Err(SimError::InvalidGeometry(format!(
                        "link {} has invalid directions {other}",
                        record.user_id
                    )))
                }
            };
            let free_flow_speed = record.free_flow_speed_mps * record.speed_scale * uc::MPS;
            if free_flow_speed <= si::Velocity::ZERO {
                return Err(SimError::InvalidGeometry(format!(
                    "link {} has non-positive free-flow speed",
                    record.user_id
                )));
            }

            let intermediate_points: Vec<Coord> = record
                .intermediate_points
                .iter()
                .map(|&(x, y)| Coord::new(x * record.length_scale, y * record.length_scale))
                .collect();
            // canonical along-polyline measure: the user length when the
            // link is a straight segment, the summed point distances
            // otherwise
            let simulator_length = if intermediate_points.is_empty() {
                length
            } else {
                let mut pts = Vec::with_capacity(intermediate_points.len() + 2);
                pts.push(nodes[from.idx()].coord);
                pts.extend(intermediate_points.iter().copied());
                pts.push(nodes[to.idx()].coord);
                pts.windows(2).map(|w| w[0].distance_to(w[1])).sum::<f64>() * uc::M
            };

            // empty signal placement defaults to both ends for two-way
            // links, the to-node for one-way
            let signals_at_nodes = if record.signals_at_nodes.is_empty() {
                match directions {
                    LinkDirections::TwoWay => vec![record.from_node, record.to_node],
                    LinkDirections::OneWay => vec![record.to_node],
                }
            } else {
                record.signals_at_nodes.clone()
            };

            links.push(Link {
                idx,
                user_id: record.user_id,
                from,
                to,
                length,
                free_flow_speed,
                directions,
                grade: record.grade,
                curvature: record.curvature,
                speed_variation: record.speed_variation,
                has_catenary: record.has_catenary,
                signal_id: record.signal_id,
                signals_at_nodes,
                region: record.region.clone(),
                intermediate_points,
                simulator_length,
                cost: Link::compute_cost(length, free_flow_speed, directions),
                current_trains: BTreeSet::new(),
                catenary_consumed: si::Energy::ZERO,
                catenary_regenerated: si::Energy::ZERO,
            });

            // adjacency; two-way links appear under both endpoints
            nodes[from.idx()].links_to.entry(to).or_default().push(idx);
            if directions == LinkDirections::TwoWay {
                nodes[to.idx()].links_to.entry(from).or_default().push(idx);
            }
        }

        let mut network = Self {
            nodes,
            links,
            signals: Vec::new(),
            user_node_index,
        };
        network.generate_signals();
        Ok(network)
    }

    /// Create signals from the links' membership ids and placement lists,
    /// and mark depots.
    fn generate_signals(&mut self) {
        for link_i in 0..self.links.len() {
            let link = &self.links[link_i];
            if link.signal_id == 10001 {
                let to = link.to;
                self.nodes[to.idx()].is_terminal = true;
                continue;
            }
            if link.signal_id == 0 {
                continue;
            }
            let (from, to) = (link.from, link.to);
            let (from_user, to_user) = (
                self.nodes[from.idx()].user_id,
                self.nodes[to.idx()].user_id,
            );
            let placements = link.signals_at_nodes.clone();
            let group_id = link.signal_id;
            let link_idx = link.idx;
            for end_user_id in placements {
                // a signal at an end node governs the movement arriving
                // there from the opposite end
                let (prev, at) = if end_user_id == to_user {
                    (from, to)
                } else if end_user_id == from_user {
                    (to, from)
                } else {
                    continue;
                };
                let idx = SignalIdx::new(self.signals.len() as u32);
                self.signals
                    .push(Signal::new(idx, group_id, link_idx, prev, at));
                self.nodes[at.idx()].signals.push(idx);
            }
        }
    }

    // ------------------------------------------------------------------
    // lookups
    // ------------------------------------------------------------------

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.idx()]
    }

    pub fn link(&self, idx: LinkIdx) -> &Link {
        &self.links[idx.idx()]
    }

    pub fn link_mut(&mut self, idx: LinkIdx) -> &mut Link {
        &mut self.links[idx.idx()]
    }

    pub fn signal(&self, idx: SignalIdx) -> &Signal {
        &self.signals[idx.idx()]
    }

    pub fn signal_mut(&mut self, idx: SignalIdx) -> &mut Signal {
        &mut self.signals[idx.idx()]
    }

    pub fn node_by_user_id(&self, user_id: i64) -> Option<NodeIdx> {
        self.user_node_index.get(&user_id).copied()
    }

    /// All links connecting `a` and `b`, both directions combined.
    pub fn links_between(&self, a: NodeIdx, b: NodeIdx) -> &[LinkIdx] {
        self.nodes[a.idx()]
            .links_to
            .get(&b)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Concrete link for a path step: the one currently containing the
    /// train when several run in parallel, otherwise the cheapest.
    pub fn link_between(
        &self,
        a: NodeIdx,
        b: NodeIdx,
        train: Option<TrainIdx>,
    ) -> Result<LinkIdx, SimError> {
        let candidates = self.links_between(a, b);
        match candidates {
            [] => Err(SimError::PathNotFound {
                from: self.nodes[a.idx()].user_id,
                to: self.nodes[b.idx()].user_id,
            }),
            [only] => Ok(*only),
            _ => {
                if let Some(train) = train {
                    if let Some(&occupied) = candidates
                        .iter()
                        .find(|&&l| self.links[l.idx()].current_trains.contains(&train))
                    {
                        return Ok(occupied);
                    }
                }
                Ok(*candidates
                    .iter()
                    .min_by(|&&x, &&y| {
                        self.links[x.idx()]
                            .cost
                            .total_cmp(&self.links[y.idx()].cost)
                    })
                    .unwrap())
            }
        }
    }

    // ------------------------------------------------------------------
    // shortest path
    // ------------------------------------------------------------------

    /// Min-length path by unvisited-minimum relaxation over link lengths,
    /// breaking distance ties toward the lowest node index.
    pub fn shortest_path(&self, from: NodeIdx, to: NodeIdx) -> Option<(Vec<NodeIdx>, si::Length)> {
        let n = self.nodes.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<NodeIdx>> = vec![None; n];
        let mut visited = vec![false; n];
        dist[from.idx()] = 0.0;

        while !visited[to.idx()] {
            let mut current: Option<usize> = None;
            let mut best = f64::INFINITY;
            for i in 0..n {
                if !visited[i] && dist[i] < best {
                    best = dist[i];
                    current = Some(i);
                }
            }
            let Some(current) = current else { break };
            visited[current] = true;
            for (&neighbor, parallel) in &self.nodes[current].links_to {
                let step = parallel
                    .iter()
                    .map(|l| self.links[l.idx()].length.get::<si::meter>())
                    .fold(f64::INFINITY, f64::min);
                let candidate = dist[current] + step;
                if candidate < dist[neighbor.idx()] {
                    dist[neighbor.idx()] = candidate;
                    prev[neighbor.idx()] = Some(NodeIdx::new(current as u32));
                }
            }
        }

        if dist[to.idx()].is_infinite() {
            return None;
        }
        let mut path = vec![to];
        while let Some(p) = prev[path.last().unwrap().idx()] {
            path.push(p);
        }
        path.reverse();
        if path[0] != from {
            return None;
        }
        Some((path, dist[to.idx()] * uc::M))
    }

    /// Expand a possibly-sparse user path into a fully connected node
    /// sequence: each consecutive pair is replaced by a min-length path
    /// between the two nodes. Re-expanding an expanded path is the
    /// identity.
    pub fn expand_user_path(&self, user_path: &[i64]) -> Result<Vec<NodeIdx>, SimError> {
        let resolve = |id: i64| {
            self.node_by_user_id(id)
                .ok_or(SimError::PathNotFound { from: id, to: id })
        };
        let mut expanded: Vec<NodeIdx> = Vec::with_capacity(user_path.len());
        for &user_id in user_path {
            let next = resolve(user_id)?;
            let Some(&last) = expanded.last() else {
                expanded.push(next);
                continue;
            };
            if last == next {
                continue;
            }
            let (sub_path, _) =
                self.shortest_path(last, next)
                    .ok_or_else(|| SimError::PathNotFound {
                        from: self.nodes[last.idx()].user_id,
                        to: user_id,
                    })?;
            expanded.extend(sub_path.into_iter().skip(1));
        }
        if expanded.len() < 2 {
            return Err(SimError::PathNotFound {
                from: user_path.first().copied().unwrap_or(0),
                to: user_path.last().copied().unwrap_or(0),
            });
        }
        Ok(expanded)
    }

    // ------------------------------------------------------------------
    // path geometry
    // ------------------------------------------------------------------

    /// Cumulative distance from the path start to each path node.
    pub fn cumulative_lengths(
        &self,
        path: &[NodeIdx],
        train: Option<TrainIdx>,
    ) -> Result<Vec<si::Length>, SimError> {
        let mut cum = Vec::with_capacity(path.len());
        cum.push(si::Length::ZERO);
        for pair in path.windows(2) {
            let link = self.link_between(pair[0], pair[1], train)?;
            cum.push(*cum.last().unwrap() + self.links[link.idx()].length);
        }
        Ok(cum)
    }

    /// Position of the first path node at or beyond `travelled`, scanning
    /// from `hint`. Returns the path length when `travelled` is beyond the
    /// end.
    pub fn next_node_pos(cum: &[si::Length], hint: usize, travelled: si::Length) -> usize {
        for (i, &c) in cum.iter().enumerate().skip(hint) {
            if c > travelled {
                return i;
            }
        }
        cum.len()
    }

    /// Position of the last path node passed at `travelled`.
    pub fn prev_node_pos(cum: &[si::Length], hint: usize, travelled: si::Length) -> usize {
        Self::next_node_pos(cum, hint, travelled).saturating_sub(1).min(cum.len() - 1)
    }

    /// The link spanning `travelled`, returned with the path position of
    /// its entry node.
    pub fn link_on_path(
        &self,
        path: &[NodeIdx],
        cum: &[si::Length],
        travelled: si::Length,
        train: Option<TrainIdx>,
        hint: usize,
    ) -> Result<(LinkIdx, usize), SimError> {
        let next = Self::next_node_pos(cum, hint.min(path.len() - 1), travelled)
            .min(path.len() - 1)
            .max(1);
        let entry = next - 1;
        let link = self.link_between(path[entry], path[next], train)?;
        Ok((link, entry))
    }

    /// Planar position of a train head at `travelled` along its path.
    pub fn position_on_path(
        &self,
        path: &[NodeIdx],
        cum: &[si::Length],
        travelled: si::Length,
        train: Option<TrainIdx>,
    ) -> Result<Coord, SimError> {
        if travelled <= si::Length::ZERO {
            return Ok(self.nodes[path[0].idx()].coord);
        }
        if travelled >= *cum.last().unwrap() {
            return Ok(self.nodes[path.last().unwrap().idx()].coord);
        }
        let (link_idx, entry) = self.link_on_path(path, cum, travelled, train, 0)?;
        let link = &self.links[link_idx.idx()];
        let on_link = travelled - cum[entry];
        // convert the cumulative (user-length) measure into the canonical
        // along-polyline measure
        let on_link_sim = on_link / link.length * link.simulator_length;
        let forward = path[entry] == link.from;
        Ok(link.position_on_link(
            self.nodes[link.from.idx()].coord,
            self.nodes[link.to.idx()].coord,
            on_link_sim,
            forward,
        ))
    }

    /// Remaining distance from `travelled` to the path node at `node_pos`.
    pub fn distance_to_path_node(
        cum: &[si::Length],
        node_pos: usize,
        travelled: si::Length,
    ) -> si::Length {
        cum[node_pos] - travelled
    }

    /// Distance along the path between two node positions.
    pub fn distance_between_path_nodes(
        cum: &[si::Length],
        a_pos: usize,
        b_pos: usize,
    ) -> si::Length {
        (cum[b_pos.max(a_pos)] - cum[b_pos.min(a_pos)]).abs()
    }

    /// A sub-path is a conflict zone when every consecutive pair of its
    /// nodes is connected by a single link only (both directions
    /// combined), forcing mutually exclusive occupancy.
    pub fn is_conflict_zone(&self, path: &[NodeIdx], a_pos: usize, b_pos: usize) -> bool {
        let (lo, hi) = (a_pos.min(b_pos), a_pos.max(b_pos));
        if lo == hi {
            return false;
        }
        for pair in path[lo..=hi].windows(2) {
            if self.links_between(pair[0], pair[1]).len() > 1 {
                return false;
            }
        }
        true
    }

    /// Aggregate catenary statistics over all links.
    pub fn stats(&self) -> NetworkStats {
        let mut consumed = si::Energy::ZERO;
        let mut regenerated = si::Energy::ZERO;
        let mut total_len = si::Length::ZERO;
        let mut catenary_len = si::Length::ZERO;
        let mut catenary_links = 0usize;
        for link in &self.links {
            total_len += link.length;
            if link.has_catenary {
                catenary_links += 1;
                catenary_len += link.length;
                consumed += link.catenary_consumed;
                regenerated += link.catenary_regenerated;
            }
        }
        NetworkStats {
            catenary_link_fraction: if self.links.is_empty() {
                0.0
            } else {
                catenary_links as f64 / self.links.len() as f64
            },
            catenary_consumed: consumed,
            catenary_regenerated: regenerated,
            total_link_length: total_len,
            catenary_link_length: catenary_len,
        }
    }
}

impl Init for Network {}
impl SerdeAPI for Network {}
