use crate::consist::car::Car;
use crate::consist::locomotive::powertrain::{Battery, FuelTank};
use crate::consist::locomotive::Locomotive;
use crate::imports::*;
use derive_more::{From, IsVariant, TryInto};

/// Per-step energy and emissions accounting for one vehicle, reset by the
/// owning train at the start of each tick. Covers every source the vehicle
/// touched during the step, so a hybrid's fuel and battery contributions
/// both land here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyLedger {
    /// Energy drawn from this vehicle's sources this step.
    pub consumed: si::Energy,
    /// Regenerated energy stored into this vehicle this step.
    pub regenerated: si::Energy,
    /// CO2 emitted by fuel burnt this step.
    pub co2: si::Mass,
}

impl EnergyLedger {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Resistance of one rail vehicle, Davis-style. The fit is in US units
/// (mph, short tons, square feet) and the result converts to newtons.
pub fn davis_resistance(
    speed: si::Velocity,
    mass: si::Mass,
    axles: u32,
    drag_coef: f64,
    frontal_area: si::Area,
    grade: f64,
    curvature: f64,
) -> si::Force {
    let v = speed.get::<si::mile_per_hour>();
    let m_short_tons = mass.get::<si::kilogram>() * 1.10231e-3;
    let area_sqft = frontal_area.get::<si::square_foot>();
    let unit_res = 1.5
        + 18.0 * f64::from(axles) / m_short_tons
        + 0.03 * v
        + area_sqft * drag_coef * v.powi(2) / m_short_tons;
    let total = unit_res * m_short_tons
        + 20.0 * m_short_tons * grade
        + curvature.abs() * 20.0 * 0.04 * m_short_tons;
    total * 4.44822 * uc::N
}

/// One vehicle of a train: either a car (cargo or tender) or a locomotive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From, IsVariant, TryInto)]
pub enum RailVehicle {
    Car(Car),
    Locomotive(Box<Locomotive>),
}

impl From<Locomotive> for RailVehicle {
    fn from(value: Locomotive) -> Self {
        Self::Locomotive(Box::new(value))
    }
}

impl RailVehicle {
    pub fn length(&self) -> si::Length {
        match self {
            RailVehicle::Car(car) => car.length,
            RailVehicle::Locomotive(loco) => loco.length,
        }
    }

    pub fn mass(&self) -> si::Mass {
        match self {
            RailVehicle::Car(car) => car.mass,
            RailVehicle::Locomotive(loco) => loco.mass,
        }
    }

    /// Resistance at the given speed using the grade and curvature sampled
    /// at this vehicle's centroid.
    pub fn resistance(&self, speed: si::Velocity) -> si::Force {
        match self {
            RailVehicle::Car(car) => davis_resistance(
                speed,
                car.mass,
                car.axles,
                car.drag_coef,
                car.frontal_area,
                car.track_grade,
                car.track_curvature,
            ),
            RailVehicle::Locomotive(loco) => davis_resistance(
                speed,
                loco.mass,
                loco.axles,
                loco.drag_coef,
                loco.frontal_area,
                loco.track_grade,
                loco.track_curvature,
            ),
        }
    }

    pub fn set_track_geometry(&mut self, grade: f64, curvature: f64) {
        match self {
            RailVehicle::Car(car) => {
                car.track_grade = grade;
                car.track_curvature = curvature;
            }
            RailVehicle::Locomotive(loco) => {
                loco.track_grade = grade;
                loco.track_curvature = curvature;
            }
        }
    }

    pub fn ledger(&self) -> &EnergyLedger {
        match self {
            RailVehicle::Car(car) => &car.ledger,
            RailVehicle::Locomotive(loco) => &loco.ledger,
        }
    }

    pub fn reset_step_ledger(&mut self) {
        match self {
            RailVehicle::Car(car) => car.ledger.reset(),
            RailVehicle::Locomotive(loco) => loco.ledger.reset(),
        }
    }

    pub fn battery(&self) -> Option<&Battery> {
        match self {
            RailVehicle::Car(car) => car.battery.as_ref(),
            RailVehicle::Locomotive(loco) => loco.battery.as_ref(),
        }
    }

    pub fn tank(&self) -> Option<&FuelTank> {
        match self {
            RailVehicle::Car(car) => car.tank.as_ref(),
            RailVehicle::Locomotive(loco) => loco.tank.as_ref(),
        }
    }

    pub fn as_locomotive(&self) -> Option<&Locomotive> {
        match self {
            RailVehicle::Locomotive(loco) => Some(loco),
            RailVehicle::Car(_) => None,
        }
    }

    pub fn as_locomotive_mut(&mut self) -> Option<&mut Locomotive> {
        match self {
            RailVehicle::Locomotive(loco) => Some(loco),
            RailVehicle::Car(_) => None,
        }
    }

    pub fn as_car(&self) -> Option<&Car> {
        match self {
            RailVehicle::Car(car) => Some(car),
            RailVehicle::Locomotive(_) => None,
        }
    }

    pub fn as_car_mut(&mut self) -> Option<&mut Car> {
        match self {
            RailVehicle::Car(car) => Some(car),
            RailVehicle::Locomotive(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resistance_grows_with_speed_and_grade() {
        let flat = davis_resistance(
            10.0 * uc::MPS,
            90.0 * uc::TON,
            4,
            0.0055,
            10.0 * uc::M2,
            0.0,
            0.0,
        );
        let fast = davis_resistance(
            25.0 * uc::MPS,
            90.0 * uc::TON,
            4,
            0.0055,
            10.0 * uc::M2,
            0.0,
            0.0,
        );
        let climbing = davis_resistance(
            10.0 * uc::MPS,
            90.0 * uc::TON,
            4,
            0.0055,
            10.0 * uc::M2,
            0.02,
            0.0,
        );
        assert!(fast > flat);
        assert!(climbing > flat);
    }

    #[test]
    fn grade_term_matches_hand_computation() {
        let mass = 100.0 * uc::TON;
        let base = davis_resistance(si::Velocity::ZERO, mass, 4, 0.0, 0.01 * uc::M2, 0.0, 0.0);
        let graded = davis_resistance(si::Velocity::ZERO, mass, 4, 0.0, 0.01 * uc::M2, 0.01, 0.0);
        let m_short = 100.0 * 1.10231;
        let expected = 20.0 * m_short * 0.01 * 4.44822;
        assert!(almost_eq(
            (graded - base).get::<si::newton>(),
            expected,
            Some(1e-6)
        ));
    }
}
