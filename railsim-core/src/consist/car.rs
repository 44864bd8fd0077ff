use crate::consist::locomotive::powertrain::{Battery, FuelKind, FuelTank, PowerType};
use crate::consist::locomotive::EnergyFlow;
use crate::consist::vehicle::EnergyLedger;
use crate::imports::*;

/// Rail-car variants: plain cargo or one of the tender technologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CarKind {
    Cargo,
    DieselTender,
    BatteryTender,
    HydrogenFuelCellTender,
    BiodieselTender,
}

impl CarKind {
    /// Fuel chemistry carried by this car, if any.
    pub fn fuel(&self) -> Option<FuelKind> {
        match self {
            CarKind::DieselTender => Some(FuelKind::Diesel),
            CarKind::BiodieselTender => Some(FuelKind::Biodiesel),
            CarKind::HydrogenFuelCellTender => Some(FuelKind::Hydrogen),
            CarKind::Cargo | CarKind::BatteryTender => None,
        }
    }

    pub fn is_rechargeable(&self) -> bool {
        matches!(self, CarKind::BatteryTender)
    }

    pub fn is_tender(&self) -> bool {
        !matches!(self, CarKind::Cargo)
    }

    fn default_tank_liters(&self) -> f64 {
        match self {
            CarKind::HydrogenFuelCellTender => 63584.048,
            _ => 87064.471,
        }
    }
}

/// Tender technology that can feed a locomotive of the given power type.
pub fn tender_kind_for(power_type: PowerType) -> CarKind {
    match power_type {
        PowerType::Diesel | PowerType::DieselElectric | PowerType::DieselHybrid => {
            CarKind::DieselTender
        }
        PowerType::Electric => CarKind::BatteryTender,
        PowerType::Biodiesel | PowerType::BiodieselHybrid => CarKind::BiodieselTender,
        PowerType::HydrogenHybrid => CarKind::HydrogenFuelCellTender,
    }
}

fn default_car_axles() -> u32 {
    4
}
fn default_car_length_m() -> f64 {
    18.0
}

/// Builder input for [Car]; external units (tons, liters) convert on build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarConfig {
    pub kind: CarKind,
    pub gross_mass_tons: f64,
    pub empty_mass_tons: f64,
    pub drag_coef: f64,
    pub frontal_area_sqm: f64,
    #[serde(default = "default_car_length_m")]
    pub length_m: f64,
    #[serde(default = "default_car_axles")]
    pub axles: u32,
    #[serde(default)]
    pub battery_max_kwh: Option<f64>,
    #[serde(default)]
    pub battery_initial_soc: Option<f64>,
    #[serde(default)]
    pub tank_max_liters: Option<f64>,
    #[serde(default)]
    pub tank_initial_fill: Option<f64>,
}

impl Init for CarConfig {}
impl SerdeAPI for CarConfig {}

/// A rail car. Rechargeable variants carry a [Battery], fuel tenders a
/// [FuelTank], cargo neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub kind: CarKind,
    pub length: si::Length,
    pub drag_coef: f64,
    pub frontal_area: si::Area,
    /// Current gross mass; decreases as fuel drains, never below
    /// [Self::empty_mass].
    pub mass: si::Mass,
    pub empty_mass: si::Mass,
    pub axles: u32,
    pub battery: Option<Battery>,
    pub tank: Option<FuelTank>,
    #[serde(default)]
    pub ledger: EnergyLedger,
    #[serde(default)]
    pub track_grade: f64,
    #[serde(default)]
    pub track_curvature: f64,
}

impl Car {
    pub fn build(config: CarConfig) -> anyhow::Result<Self> {
        ensure!(
            config.empty_mass_tons > 0.0,
            "car empty mass must be positive"
        );
        let empty = config.empty_mass_tons * uc::TON;
        let mut mass = (config.gross_mass_tons * uc::TON).max(empty);

        let battery = if config.kind.is_rechargeable() {
            Some(Battery::new(
                config.battery_max_kwh.unwrap_or(10_000.0) * uc::KWH,
                config.battery_initial_soc.unwrap_or(0.9),
                0.9,
                2.0,
                0.9,
                0.5,
            )?)
        } else {
            None
        };

        let tank = match config.kind.fuel() {
            Some(fuel) => {
                let cap = config
                    .tank_max_liters
                    .unwrap_or_else(|| config.kind.default_tank_liters());
                let tank = FuelTank::new(cap * uc::L, config.tank_initial_fill.unwrap_or(0.9), 0.9)?;
                // a tender's payload is its fuel
                mass = empty + tank.initial_capacity() * fuel.spec().density;
                Some(tank)
            }
            None => None,
        };

        Ok(Self {
            kind: config.kind,
            length: config.length_m * uc::M,
            drag_coef: config.drag_coef,
            frontal_area: config.frontal_area_sqm * uc::M2,
            mass,
            empty_mass: empty,
            axles: config.axles,
            battery,
            tank,
            ledger: EnergyLedger::default(),
            track_grade: 0.0,
            track_curvature: 0.0,
        })
    }

    /// Weight of carried commodities; zero for anything but cargo cars.
    pub fn cargo_net_mass(&self) -> si::Mass {
        if self.kind == CarKind::Cargo {
            self.mass - self.empty_mass
        } else {
            si::Mass::ZERO
        }
    }

    /// Whether this tender still holds anything to draw from.
    pub fn has_reserves(&self) -> bool {
        self.battery
            .as_ref()
            .is_some_and(|b| b.current_charge() > si::Energy::ZERO)
            || self
                .tank
                .as_ref()
                .is_some_and(|t| t.current_capacity() > si::Volume::ZERO)
    }

    fn consume_fuel_of_kind(&mut self, fuel: FuelKind, energy: si::Energy) -> (bool, si::Energy) {
        let liters = fuel.liters_from_energy(energy);
        let Some(tank) = self.tank.as_mut() else {
            return (false, energy);
        };
        if !tank.consume(liters) {
            return (false, energy);
        }
        self.ledger.consumed += energy;
        self.ledger.co2 += fuel.emissions(liters);
        self.mass = (self.mass - liters * fuel.spec().density).max(self.empty_mass);
        (true, si::Energy::ZERO)
    }

    fn consume_electricity(
        &mut self,
        dt: si::Time,
        energy: si::Energy,
        has_catenary: bool,
    ) -> EnergyFlow {
        if has_catenary {
            self.ledger.consumed += energy;
            return EnergyFlow {
                satisfied: true,
                residual: si::Energy::ZERO,
                catenary_drawn: energy,
            };
        }
        let Some(battery) = self.battery.as_mut() else {
            return EnergyFlow {
                satisfied: false,
                residual: energy,
                catenary_drawn: si::Energy::ZERO,
            };
        };
        let outcome = battery.try_discharge(dt, energy);
        let shortfall = outcome.shortfall(energy);
        if outcome.delivered_any() {
            self.ledger.consumed += energy - shortfall;
            EnergyFlow {
                satisfied: true,
                residual: shortfall,
                catenary_drawn: si::Energy::ZERO,
            }
        } else {
            EnergyFlow {
                satisfied: false,
                residual: energy,
                catenary_drawn: si::Energy::ZERO,
            }
        }
    }

    /// Route a locomotive's residual demand through this tender.
    pub fn consume_energy(
        &mut self,
        dt: si::Time,
        energy: si::Energy,
        has_catenary: bool,
    ) -> EnergyFlow {
        if energy <= si::Energy::ZERO {
            return EnergyFlow {
                satisfied: false,
                residual: energy,
                catenary_drawn: si::Energy::ZERO,
            };
        }
        match self.kind {
            CarKind::DieselTender | CarKind::BiodieselTender | CarKind::HydrogenFuelCellTender => {
                let (ok, rest) = self.consume_fuel_of_kind(self.kind.fuel().unwrap(), energy);
                EnergyFlow {
                    satisfied: ok,
                    residual: rest,
                    catenary_drawn: si::Energy::ZERO,
                }
            }
            CarKind::BatteryTender => self.consume_electricity(dt, energy, has_catenary),
            CarKind::Cargo => EnergyFlow {
                satisfied: false,
                residual: energy,
                catenary_drawn: si::Energy::ZERO,
            },
        }
    }

    /// Accept regenerated energy into the battery; returns the leftover.
    pub fn refill_battery(&mut self, dt: si::Time, energy: si::Energy) -> si::Energy {
        let offered = energy.abs();
        let stored = match self.battery.as_mut() {
            Some(battery) => {
                battery.try_recharge(dt, offered, crate::consist::locomotive::powertrain::RechargeSource::Regenerated)
            }
            None => si::Energy::ZERO,
        };
        self.ledger.regenerated += stored;
        offered - stored
    }

    /// Upper bound on the energy this car can supply in one step.
    pub fn max_provided_energy(&self, dt: si::Time, has_catenary: bool) -> si::Energy {
        if self.kind.is_rechargeable() {
            if has_catenary {
                return f64::INFINITY * uc::J;
            }
            return self
                .battery
                .as_ref()
                .map(|b| b.max_discharge(dt))
                .unwrap_or(si::Energy::ZERO);
        }
        if self.kind.fuel().is_some() {
            if self.tank.as_ref().is_none_or(|t| !t.has_fuel()) {
                return si::Energy::ZERO;
            }
            return f64::INFINITY * uc::J;
        }
        si::Energy::ZERO
    }

    pub fn battery_soc(&self) -> f64 {
        self.battery.as_ref().map(|b| b.soc()).unwrap_or(0.0)
    }

    pub fn tank_state_of_capacity(&self) -> f64 {
        self.tank
            .as_ref()
            .map(|t| t.state_of_capacity())
            .unwrap_or(0.0)
    }
}

impl Init for Car {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tender(kind: CarKind) -> Car {
        Car::build(CarConfig {
            kind,
            gross_mass_tons: 120.0,
            empty_mass_tons: 30.0,
            drag_coef: 0.0055,
            frontal_area_sqm: 9.0,
            length_m: 18.0,
            axles: 4,
            battery_max_kwh: None,
            battery_initial_soc: None,
            tank_max_liters: None,
            tank_initial_fill: None,
        })
        .unwrap()
    }

    #[test]
    fn sources_match_kind() {
        assert!(tender(CarKind::Cargo).battery.is_none());
        assert!(tender(CarKind::Cargo).tank.is_none());
        assert!(tender(CarKind::BatteryTender).battery.is_some());
        assert!(tender(CarKind::DieselTender).tank.is_some());
        assert!(tender(CarKind::DieselTender).battery.is_none());
    }

    #[test]
    fn fuel_tender_mass_accounts_for_fuel_load() {
        let car = tender(CarKind::DieselTender);
        // 87064.471 l at 0.9 fill and 0.85 kg/l on a 30 t shell
        let expected_kg = 30_000.0 + 87_064.471 * 0.9 * 0.85;
        assert!(almost_eq(car.mass.get::<si::kilogram>(), expected_kg, Some(1e-3)));
    }

    #[test]
    fn cargo_rejects_energy_draw() {
        let mut car = tender(CarKind::Cargo);
        let flow = car.consume_energy(1.0 * uc::S, 1.0 * uc::KWH, false);
        assert!(!flow.satisfied);
        assert!(almost_eq(flow.residual.get::<si::kilowatt_hour>(), 1.0, None));
    }

    #[test]
    fn battery_tender_supplies_and_recharges() {
        let mut car = tender(CarKind::BatteryTender);
        let flow = car.consume_energy(360.0 * uc::S, 100.0 * uc::KWH, false);
        assert!(flow.satisfied);
        let leftover = car.refill_battery(360.0 * uc::S, -50.0 * uc::KWH);
        assert!(leftover < 50.0 * uc::KWH);
    }

    #[test]
    fn tender_kinds_cover_all_power_types() {
        assert_eq!(tender_kind_for(PowerType::Diesel), CarKind::DieselTender);
        assert_eq!(tender_kind_for(PowerType::Electric), CarKind::BatteryTender);
        assert_eq!(
            tender_kind_for(PowerType::HydrogenHybrid),
            CarKind::HydrogenFuelCellTender
        );
        assert_eq!(
            tender_kind_for(PowerType::BiodieselHybrid),
            CarKind::BiodieselTender
        );
    }
}
