//! Energy sources and the pure energy-flow model shared by locomotives and
//! tender cars.

pub mod battery;
pub mod energy;
pub mod tank;

pub use battery::{Battery, DischargeOutcome, RechargeSource};
pub use energy::{EfficiencyRange, FuelKind, FuelSpec, PowerMethod, PowerType, PowerTypeSpec};
pub use tank::FuelTank;
