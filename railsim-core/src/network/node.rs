use crate::imports::*;
use crate::network::link::LinkIdx;
use crate::network::signal::SignalIdx;

/// Dense index of a node within the network arena.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeIdx(u32);

impl NodeIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn idx(&self) -> usize {
        self.0.idx()
    }
}

impl std::hash::Hash for NodeIdx {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u32(self.0);
    }
}
impl nohash_hasher::IsEnabled for NodeIdx {}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A graph vertex: a junction, terminal, or geometry point of the network.
/// Immutable after network construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub idx: NodeIdx,
    /// Stable id from the input data.
    pub user_id: i64,
    /// Planar position after scaling.
    pub coord: Coord,
    pub desc: String,
    /// Terminal/depot flag; trains dwell and may stop here.
    pub is_terminal: bool,
    /// Dwell time at a terminal.
    pub dwell_time: si::Time,
    /// Outbound adjacency: neighbor -> parallel links, in input order.
    pub links_to: BTreeMap<NodeIdx, Vec<LinkIdx>>,
    /// Signals standing at this node.
    pub signals: Vec<SignalIdx>,
}

impl Node {
    pub fn neighbors(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.links_to.keys().copied()
    }
}
