//! Convenient re-exports of the types most users need.

pub use crate::consist::locomotive::powertrain::{
    Battery, DischargeOutcome, FuelKind, FuelTank, PowerMethod, PowerType, RechargeSource,
};
pub use crate::consist::{Car, CarConfig, CarKind, Locomotive, LocomotiveConfig, RailVehicle};
pub use crate::error::SimError;
pub use crate::input::{CarSpec, LinkRecord, LocomotiveSpec, NodeRecord, TrainRecord};
pub use crate::network::{
    Link, LinkIdx, Network, NetworkStats, Node, NodeIdx, Signal, SignalGroupController, SignalIdx,
};
pub use crate::sim::{
    event_channel, EventSender, SimConfig, SimControl, SimEvent, Simulator, TrajectoryRow,
    TrajectoryWriter,
};
pub use crate::si;
pub use crate::traits::{Init, SerdeAPI};
pub use crate::train::{
    CriticalPoint, HoldCurrentThrottle, LookaheadCell, PolicyInput, ThrottlePolicy, Train,
    TrainIdx, TrainStateRecord, TrainStats,
};
pub use crate::uc;
pub use crate::utils::Coord;
pub use uom::ConstZero;
