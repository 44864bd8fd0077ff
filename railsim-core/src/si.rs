//! Import uom si system and add unit constants.
//! Zero values should be created using standard uom syntax after importing
//! the prelude or `crate::imports::*`

pub use uom::si::f64::{
    Acceleration, Area, Energy, Force, Jerk, Length, Mass, MassDensity, Power, Ratio, Time,
    Velocity, Volume,
};

pub use uom::si::acceleration::meter_per_second_squared;
pub use uom::si::area::{square_foot, square_meter};
pub use uom::si::energy::{joule, kilowatt_hour, watt_hour};
pub use uom::si::force::newton;
pub use uom::si::jerk::meter_per_second_cubed;
pub use uom::si::length::{kilometer, meter};
pub use uom::si::mass::kilogram;
pub use uom::si::mass_density::kilogram_per_cubic_meter;
pub use uom::si::power::{kilowatt, watt};
pub use uom::si::ratio::ratio;
pub use uom::si::time::{hour, second};
pub use uom::si::velocity::{kilometer_per_hour, meter_per_second, mile_per_hour};
pub use uom::si::volume::liter;
