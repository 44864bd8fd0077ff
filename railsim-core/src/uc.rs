//! Unit constants for ergonomic construction of uom quantities,
//! e.g. `5.0 * uc::M` is five meters.

use crate::si;
use std::marker::PhantomData;

/// 1 meter
pub const M: si::Length = si::Length {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 meter per second
pub const MPS: si::Velocity = si::Velocity {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 meter per second squared
pub const MPS2: si::Acceleration = si::Acceleration {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 meter per second cubed
pub const MPS3: si::Jerk = si::Jerk {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 kilogram
pub const KG: si::Mass = si::Mass {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 metric ton
pub const TON: si::Mass = si::Mass {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0e3,
};

/// 1 newton
pub const N: si::Force = si::Force {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 watt
pub const W: si::Power = si::Power {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 kilowatt
pub const KW: si::Power = si::Power {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0e3,
};

/// 1 joule
pub const J: si::Energy = si::Energy {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 kilowatt-hour
pub const KWH: si::Energy = si::Energy {
    dimension: PhantomData,
    units: PhantomData,
    value: 3.6e6,
};

/// 1 second
pub const S: si::Time = si::Time {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 hour
pub const HR: si::Time = si::Time {
    dimension: PhantomData,
    units: PhantomData,
    value: 3600.0,
};

/// 1 (dimensionless)
pub const R: si::Ratio = si::Ratio {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 liter
pub const L: si::Volume = si::Volume {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0e-3,
};

/// 1 square meter
pub const M2: si::Area = si::Area {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0,
};

/// 1 kilogram per liter
pub const KG_PER_L: si::MassDensity = si::MassDensity {
    dimension: PhantomData,
    units: PhantomData,
    value: 1.0e3,
};

/// Gravitational acceleration at the rail head
pub const ACC_GRAV: si::Acceleration = si::Acceleration {
    dimension: PhantomData,
    units: PhantomData,
    value: 9.8066,
};

/// Speed of sound in air, used for brake-propagation delay along a train
pub const SPEED_OF_SOUND: si::Velocity = si::Velocity {
    dimension: PhantomData,
    units: PhantomData,
    value: 343.0,
};
