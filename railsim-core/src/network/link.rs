use crate::imports::*;
use crate::network::node::NodeIdx;
use crate::train::TrainIdx;

/// Dense index of a link within the network arena.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LinkIdx(u32);

impl LinkIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn idx(&self) -> usize {
        self.0.idx()
    }
}

impl std::hash::Hash for LinkIdx {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u32(self.0);
    }
}
impl nohash_hasher::IsEnabled for LinkIdx {}

impl fmt::Display for LinkIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directionality of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkDirections {
    /// Traversable from -> to only.
    OneWay,
    /// Traversable both ways.
    TwoWay,
}

/// A track segment between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub idx: LinkIdx,
    /// Stable id from the input data.
    pub user_id: i64,
    pub from: NodeIdx,
    pub to: NodeIdx,
    /// Scaled user length. Invariant: positive.
    pub length: si::Length,
    pub free_flow_speed: si::Velocity,
    pub directions: LinkDirections,
    /// Signed grade when entered at [Self::from]; the reverse direction
    /// sees the negation, so the two directional grades sum to zero.
    pub grade: f64,
    /// Unsigned curvature.
    pub curvature: f64,
    /// Random speed variation factor from the input record.
    pub speed_variation: f64,
    pub has_catenary: bool,
    /// Traffic-signal membership id; 0 = none, 10001 marks the to-node as
    /// a depot.
    pub signal_id: i64,
    /// User node ids at which signals apply.
    pub signals_at_nodes: Vec<i64>,
    pub region: String,
    /// Intermediate polyline points between the end nodes.
    pub intermediate_points: Vec<Coord>,
    /// Along-polyline length; equals [Self::length] when there are no
    /// intermediate points. Canonical measure for positions on the link.
    pub simulator_length: si::Length,
    /// Traversal cost used only to rank parallel links.
    pub cost: f64,
    /// Trains currently occupying this link.
    pub current_trains: BTreeSet<TrainIdx>,
    /// Energy drawn from this link's catenary.
    pub catenary_consumed: si::Energy,
    /// Energy fed back into this link's catenary.
    pub catenary_regenerated: si::Energy,
}

impl Link {
    /// Signed grade as seen when entering the link at `entry`.
    pub fn grade_from(&self, entry: NodeIdx) -> f64 {
        if entry == self.from {
            self.grade
        } else {
            -self.grade
        }
    }

    /// Other endpoint of the link.
    pub fn opposite(&self, node: NodeIdx) -> NodeIdx {
        if node == self.from {
            self.to
        } else {
            self.from
        }
    }

    pub fn connects(&self, a: NodeIdx, b: NodeIdx) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// Cost used to pick among parallel links: travel time for one-way
    /// links, squared for two-way.
    pub fn compute_cost(length: si::Length, speed: si::Velocity, directions: LinkDirections) -> f64 {
        let t = (length / speed).get::<si::second>();
        match directions {
            LinkDirections::OneWay => t,
            LinkDirections::TwoWay => t * t,
        }
    }

    /// Polyline vertices ordered from `entry`, including both end nodes.
    fn polyline(&self, from_coord: Coord, to_coord: Coord, forward: bool) -> Vec<Coord> {
        let mut points = Vec::with_capacity(self.intermediate_points.len() + 2);
        points.push(from_coord);
        points.extend(self.intermediate_points.iter().copied());
        points.push(to_coord);
        if !forward {
            points.reverse();
        }
        points
    }

    /// Position reached after walking `travelled` along this link from the
    /// given entry end. Interpolates the polyline; the along-link measure
    /// is [Self::simulator_length]. Distances beyond the link clamp to the
    /// far node.
    pub fn position_on_link(
        &self,
        from_coord: Coord,
        to_coord: Coord,
        travelled: si::Length,
        forward: bool,
    ) -> Coord {
        let points = self.polyline(from_coord, to_coord, forward);
        let sim_len = self.simulator_length.get::<si::meter>();
        let far = *points.last().unwrap();
        if sim_len <= 0.0 {
            return far;
        }
        // walk in the polyline's own metric, scaled to the canonical length
        let polyline_len: f64 = points.windows(2).map(|w| w[0].distance_to(w[1])).sum();
        if polyline_len <= 0.0 {
            return far;
        }
        let target = travelled.get::<si::meter>() / sim_len * polyline_len;
        if target <= 0.0 {
            return points[0];
        }
        if target >= polyline_len {
            return far;
        }

        // cumulative distance at the end of each segment
        let mut cum = Vec::with_capacity(points.len() - 1);
        let mut acc = 0.0;
        for w in points.windows(2) {
            acc += w[0].distance_to(w[1]);
            cum.push(acc);
        }
        let seg = cum.partition_point(|&c| c < target);
        let seg_start = if seg == 0 { 0.0 } else { cum[seg - 1] };
        let seg_len = cum[seg] - seg_start;
        let t = if seg_len > 0.0 {
            (target - seg_start) / seg_len
        } else {
            1.0
        };
        points[seg].lerp(points[seg + 1], t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_link() -> Link {
        Link {
            idx: LinkIdx::new(0),
            user_id: 1,
            from: NodeIdx::new(0),
            to: NodeIdx::new(1),
            length: 100.0 * uc::M,
            free_flow_speed: 20.0 * uc::MPS,
            directions: LinkDirections::OneWay,
            grade: 0.01,
            curvature: 0.0,
            speed_variation: 0.0,
            has_catenary: false,
            signal_id: 0,
            signals_at_nodes: vec![],
            region: String::new(),
            intermediate_points: vec![],
            simulator_length: 100.0 * uc::M,
            cost: 5.0,
            current_trains: BTreeSet::new(),
            catenary_consumed: si::Energy::ZERO,
            catenary_regenerated: si::Energy::ZERO,
        }
    }

    #[test]
    fn grade_is_antisymmetric() {
        let link = straight_link();
        assert!(almost_eq(link.grade_from(NodeIdx::new(0)), 0.01, None));
        assert!(almost_eq(link.grade_from(NodeIdx::new(1)), -0.01, None));
        assert!(almost_eq(
            link.grade_from(NodeIdx::new(0)) + link.grade_from(NodeIdx::new(1)),
            0.0,
            None
        ));
    }

    #[test]
    fn position_interpolates_straight_link() {
        let link = straight_link();
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(100.0, 0.0);
        let p = link.position_on_link(a, b, 25.0 * uc::M, true);
        assert!(almost_eq(p.x, 25.0, None));
        // walking from the far end reverses the parameterisation
        let p = link.position_on_link(a, b, 25.0 * uc::M, false);
        assert!(almost_eq(p.x, 75.0, None));
    }

    #[test]
    fn position_walks_polyline_segments() {
        let mut link = straight_link();
        link.intermediate_points = vec![Coord::new(50.0, 0.0)];
        link.simulator_length = 100.0 * uc::M;
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(50.0, 50.0);
        // halfway lands exactly on the intermediate point
        let p = link.position_on_link(a, b, 50.0 * uc::M, true);
        assert!(almost_eq(p.x, 50.0, None));
        assert!(almost_eq(p.y, 0.0, None));
        // three quarters is halfway up the second segment
        let p = link.position_on_link(a, b, 75.0 * uc::M, true);
        assert!(almost_eq(p.x, 50.0, None));
        assert!(almost_eq(p.y, 25.0, None));
    }

    #[test]
    fn position_clamps_beyond_the_link() {
        let link = straight_link();
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(100.0, 0.0);
        let p = link.position_on_link(a, b, 150.0 * uc::M, true);
        assert!(almost_eq(p.x, 100.0, None));
    }

    #[test]
    fn two_way_cost_is_squared() {
        let one = Link::compute_cost(100.0 * uc::M, 20.0 * uc::MPS, LinkDirections::OneWay);
        let two = Link::compute_cost(100.0 * uc::M, 20.0 * uc::MPS, LinkDirections::TwoWay);
        assert!(almost_eq(one, 5.0, None));
        assert!(almost_eq(two, 25.0, None));
    }
}
