//! Vehicles (locomotives and cars) and their arrangement into a consist.

pub mod car;
pub mod locomotive;
pub mod vehicle;

pub use car::{tender_kind_for, Car, CarConfig, CarKind};
pub use locomotive::{EnergyFlow, Locomotive, LocomotiveConfig};
pub use vehicle::{davis_resistance, EnergyLedger, RailVehicle};

use crate::imports::*;

/// Ordered consist with index lists back into the arranged vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    /// Vehicles in their physical order, tip first.
    pub vehicles: Vec<RailVehicle>,
    /// Positions of locomotives within [Self::vehicles], head to tail.
    pub loco_positions: Vec<usize>,
    /// Positions of cars within [Self::vehicles], head to tail.
    pub car_positions: Vec<usize>,
}

/// Place locomotives and cars along the train, driven only by the counts:
/// a single group of locomotives up front for short consists, a head/tail
/// split for up to six locomotives, and three locomotive groups
/// interleaving two car halves beyond that.
pub fn arrange_vehicles(
    locomotives: Vec<Locomotive>,
    cars: Vec<Car>,
) -> anyhow::Result<Arrangement> {
    let n_locos = locomotives.len();
    let n_cars = cars.len();
    ensure!(n_locos > 0, "a train must have at least one locomotive");

    // group sizes per the arrangement rule
    let layout: Vec<(usize, usize)> = if n_locos == 1 || n_cars == 0 {
        vec![(n_locos, n_cars)]
    } else if (2..7).contains(&n_locos) || n_cars < 2 {
        let tail = n_locos / 2;
        let head = n_locos - tail;
        vec![(head, n_cars), (tail, 0)]
    } else {
        let group = n_locos / 3;
        let head = n_locos - 2 * group;
        let car_half = n_cars / 2;
        let first_cars = n_cars - car_half;
        vec![(head, first_cars), (group, car_half), (n_locos - head - group, 0)]
    };

    let mut locomotives = locomotives.into_iter();
    let mut cars = cars.into_iter();
    let mut vehicles: Vec<RailVehicle> = Vec::with_capacity(n_locos + n_cars);
    let mut loco_positions = Vec::with_capacity(n_locos);
    let mut car_positions = Vec::with_capacity(n_cars);
    for (locos_in_group, cars_after) in layout {
        for _ in 0..locos_in_group {
            loco_positions.push(vehicles.len());
            vehicles.push(locomotives.next().unwrap().into());
        }
        for _ in 0..cars_after {
            car_positions.push(vehicles.len());
            vehicles.push(cars.next().unwrap().into());
        }
    }

    Ok(Arrangement {
        vehicles,
        loco_positions,
        car_positions,
    })
}

impl Arrangement {
    /// Distance from the train tip to each vehicle's mass centroid:
    /// cumulative length up to and including the vehicle, minus half its
    /// own length.
    pub fn centroids(&self) -> Vec<si::Length> {
        let mut cum = si::Length::ZERO;
        self.vehicles
            .iter()
            .map(|v| {
                cum += v.length();
                cum - v.length() / 2.0
            })
            .collect()
    }

    pub fn total_length(&self) -> si::Length {
        self.vehicles.iter().map(|v| v.length()).sum()
    }

    pub fn total_mass(&self) -> si::Mass {
        self.vehicles.iter().map(|v| v.mass()).sum()
    }
}
