use crate::imports::*;
use crate::network::link::LinkIdx;
use crate::network::node::NodeIdx;

/// Dense index of a signal within the network arena.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SignalIdx(u32);

impl SignalIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn idx(&self) -> usize {
        self.0.idx()
    }
}

impl std::hash::Hash for SignalIdx {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u32(self.0);
    }
}
impl nohash_hasher::IsEnabled for SignalIdx {}

impl fmt::Display for SignalIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A block signal standing at [Self::node], governing movements arriving
/// over [Self::link] from [Self::prev_node].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub idx: SignalIdx,
    /// Membership id shared by signals of the same interlocking.
    pub user_group_id: i64,
    pub link: LinkIdx,
    /// Node the movement comes from.
    pub prev_node: NodeIdx,
    /// Node the signal stands at.
    pub node: NodeIdx,
    /// Current aspect.
    pub is_green: bool,
    /// Distance at which an approaching train starts requesting passage.
    pub proximity_to_activate: si::Length,
}

impl Signal {
    pub fn new(
        idx: SignalIdx,
        user_group_id: i64,
        link: LinkIdx,
        prev_node: NodeIdx,
        node: NodeIdx,
    ) -> Self {
        Self {
            idx,
            user_group_id,
            link,
            prev_node,
            node,
            is_green: true,
            proximity_to_activate: si::Length::ZERO,
        }
    }

    /// Whether this signal governs the oriented movement `prev -> at`.
    pub fn governs(&self, prev: NodeIdx, at: NodeIdx) -> bool {
        self.prev_node == prev && self.node == at
    }
}
