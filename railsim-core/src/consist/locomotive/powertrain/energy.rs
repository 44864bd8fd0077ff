//! Pure energy-flow model: drive-line efficiencies, generator curves, fuel
//! conversion factors, and the per-power-type constant tables.
//!
//! Efficiency curves are empirical fits; they take and return raw `f64`
//! with the units named at the call boundary.

use crate::imports::*;
use std::marker::PhantomData;

/// Locomotive power-plant technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PowerType {
    Diesel,
    Electric,
    Biodiesel,
    DieselElectric,
    DieselHybrid,
    HydrogenHybrid,
    BiodieselHybrid,
}

/// How a hybrid's generator and battery are coupled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerMethod {
    #[default]
    Series,
    Parallel,
}

/// Fuel chemistry burnt by a locomotive or carried by a tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelKind {
    Diesel,
    Biodiesel,
    Hydrogen,
}

/// Per-fuel constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelSpec {
    /// Liters burnt per kWh drawn from the tank.
    pub liters_per_kwh: f64,
    /// Fuel density, for mass bookkeeping as the tank drains.
    pub density: si::MassDensity,
    /// CO2 emitted per liter burnt, in grams.
    pub co2_grams_per_liter: f64,
}

const fn density_kg_per_liter(value: f64) -> si::MassDensity {
    si::MassDensity {
        dimension: PhantomData,
        units: PhantomData,
        value: value * 1.0e3,
    }
}

const DIESEL_FUEL: FuelSpec = FuelSpec {
    liters_per_kwh: 0.1005,
    density: density_kg_per_liter(0.85),
    co2_grams_per_liter: 2559.5,
};

const BIODIESEL_FUEL: FuelSpec = FuelSpec {
    liters_per_kwh: 67.0 / 620.0,
    density: density_kg_per_liter(0.88),
    co2_grams_per_liter: 2226.7,
};

const HYDROGEN_FUEL: FuelSpec = FuelSpec {
    liters_per_kwh: 0.002995,
    density: density_kg_per_liter(0.099836),
    co2_grams_per_liter: 0.0,
};

impl FuelKind {
    pub const fn spec(&self) -> &'static FuelSpec {
        match self {
            FuelKind::Diesel => &DIESEL_FUEL,
            FuelKind::Biodiesel => &BIODIESEL_FUEL,
            FuelKind::Hydrogen => &HYDROGEN_FUEL,
        }
    }

    /// Convert an energy draw at the tank into liters of this fuel.
    pub fn liters_from_energy(&self, energy: si::Energy) -> si::Volume {
        energy.get::<si::kilowatt_hour>() * self.spec().liters_per_kwh * uc::L
    }

    /// CO2 mass emitted by burning `liters` of this fuel.
    pub fn emissions(&self, liters: si::Volume) -> si::Mass {
        liters.get::<si::liter>() * self.spec().co2_grams_per_liter * 1.0e-3 * uc::KG
    }
}

/// Generator operating band inside which fuel conversion is most
/// efficient; `center` is the sweet spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficiencyRange {
    pub low: f64,
    pub high: f64,
    pub center: f64,
}

impl EfficiencyRange {
    pub fn contains(&self, power_portion: f64) -> bool {
        power_portion > self.low && power_portion < self.high
    }
}

/// Per-power-type constants, table-driven rather than dispatched through a
/// type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerTypeSpec {
    /// Fuel burnt, if any. `None` only for [PowerType::Electric].
    pub fuel: Option<FuelKind>,
    /// Whether the technology carries a rechargeable battery.
    pub rechargeable: bool,
    /// Whether the battery is the only on-board source.
    pub battery_only: bool,
    /// Whether both a generator and a battery participate in routing.
    pub hybrid: bool,
    /// Derating applied to rated power for this technology.
    pub power_reduction: f64,
    /// Default battery capacity in kWh when the input record leaves it
    /// unset; zero means no battery.
    pub default_battery_kwh: f64,
    /// Default tank capacity in liters when unset; zero means no tank.
    pub default_tank_liters: f64,
    /// Default recharge hysteresis bounds (lower, upper).
    pub recharge_soc_bounds: (f64, f64),
}

const DIESEL_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: Some(FuelKind::Diesel),
    rechargeable: false,
    battery_only: false,
    hybrid: false,
    power_reduction: 1.0,
    default_battery_kwh: 0.0,
    default_tank_liters: 20065.0,
    recharge_soc_bounds: (0.55, 0.65),
};

const ELECTRIC_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: None,
    rechargeable: true,
    battery_only: true,
    hybrid: false,
    power_reduction: 1.0,
    default_battery_kwh: 5000.0,
    default_tank_liters: 0.0,
    recharge_soc_bounds: (0.55, 0.65),
};

const BIODIESEL_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: Some(FuelKind::Biodiesel),
    ..DIESEL_SPEC
};

const DIESEL_HYBRID_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: Some(FuelKind::Diesel),
    rechargeable: true,
    battery_only: false,
    hybrid: true,
    power_reduction: 0.8,
    default_battery_kwh: 4000.0,
    default_tank_liters: 20065.0,
    recharge_soc_bounds: (0.55, 0.65),
};

const HYDROGEN_HYBRID_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: Some(FuelKind::Hydrogen),
    power_reduction: 0.5,
    ..DIESEL_HYBRID_SPEC
};

const BIODIESEL_HYBRID_SPEC: PowerTypeSpec = PowerTypeSpec {
    fuel: Some(FuelKind::Biodiesel),
    ..DIESEL_HYBRID_SPEC
};

impl PowerType {
    pub const fn spec(&self) -> &'static PowerTypeSpec {
        match self {
            PowerType::Diesel | PowerType::DieselElectric => &DIESEL_SPEC,
            PowerType::Electric => &ELECTRIC_SPEC,
            PowerType::Biodiesel => &BIODIESEL_SPEC,
            PowerType::DieselHybrid => &DIESEL_HYBRID_SPEC,
            PowerType::HydrogenHybrid => &HYDROGEN_HYBRID_SPEC,
            PowerType::BiodieselHybrid => &BIODIESEL_HYBRID_SPEC,
        }
    }

    pub fn fuel(&self) -> Option<FuelKind> {
        self.spec().fuel
    }

    /// Generator operating band of peak conversion efficiency.
    pub fn max_efficiency_range(&self) -> EfficiencyRange {
        match self {
            PowerType::DieselHybrid | PowerType::BiodieselHybrid => EfficiencyRange {
                low: 0.7,
                high: 0.9,
                center: 0.8,
            },
            PowerType::HydrogenHybrid => EfficiencyRange {
                low: 0.0,
                high: 0.5,
                center: 0.0,
            },
            _ => EfficiencyRange {
                low: 0.0,
                high: 1.0,
                center: 1.0,
            },
        }
    }
}

/// Wheel <-> DC-bus efficiency as a function of train speed; a cubic fit
/// below 58.2 km/h, constant 0.9 above.
pub fn wheel_to_dc_bus_eff(speed: si::Velocity) -> f64 {
    let v = speed.get::<si::kilometer_per_hour>();
    if v <= 58.2 {
        0.2 + 0.0261 * v - 0.0003 * v.powi(2) + 0.000001 * v.powi(3)
    } else {
        0.9
    }
}

/// Generator (engine or fuel cell) conversion efficiency at the given
/// used-power fraction. Non-generating technologies return 1.0.
pub fn generator_eff(power_type: PowerType, power_portion: f64) -> f64 {
    match power_type {
        PowerType::DieselHybrid | PowerType::BiodieselHybrid => {
            -0.24 * power_portion.powi(2) + 0.3859 * power_portion + 0.29
        }
        PowerType::HydrogenHybrid => {
            -0.0937 * power_portion.powi(2) + 0.002 * power_portion + 0.5609
        }
        _ => 1.0,
    }
}

/// One-way battery conversion efficiency; technologies without a battery
/// return 1.0.
pub fn battery_eff(power_type: PowerType) -> f64 {
    if power_type.spec().rechargeable {
        0.965
    } else {
        1.0
    }
}

/// DC-bus <-> energy-source efficiency for the given technology at the
/// given used-power fraction. Series hybrids pay the battery round trip on
/// top of the generator curve.
pub fn dc_bus_to_source_eff(
    power_portion: f64,
    power_type: PowerType,
    hybrid_method: PowerMethod,
) -> f64 {
    match power_type {
        PowerType::Diesel | PowerType::Biodiesel | PowerType::DieselElectric => {
            -0.24 * power_portion.powi(2) + 0.3859 * power_portion + 0.29
        }
        PowerType::Electric => 0.965,
        PowerType::DieselHybrid | PowerType::BiodieselHybrid | PowerType::HydrogenHybrid => {
            let mut eff = generator_eff(power_type, power_portion);
            if hybrid_method == PowerMethod::Series {
                let bat = battery_eff(power_type);
                eff *= bat * bat;
            }
            eff
        }
    }
}

/// Full drive-line efficiency, wheel to energy source.
pub fn drive_line_eff(
    speed: si::Velocity,
    power_portion: f64,
    power_type: PowerType,
    hybrid_method: PowerMethod,
) -> f64 {
    wheel_to_dc_bus_eff(speed) * dc_bus_to_source_eff(power_portion, power_type, hybrid_method)
}

/// Generator power share available for battery recharge, looked up from
/// SOC deciles.
pub fn recharge_power_share(soc: f64) -> f64 {
    const SHARE: [f64; 8] = [1.0, 1.0, 0.8, 0.6, 0.4, 0.2, 0.1, 0.0];
    let idx = ((soc * 10.0).ceil().max(0.0) as usize).min(SHARE.len() - 1);
    SHARE[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_eff_is_continuous_at_breakpoint() {
        let below = wheel_to_dc_bus_eff(58.1 / 3.6 * uc::MPS);
        let above = wheel_to_dc_bus_eff(58.3 / 3.6 * uc::MPS);
        assert!((below - above).abs() < 0.01, "{below} vs {above}");
        assert!(almost_eq(wheel_to_dc_bus_eff(20.0 * uc::MPS), 0.9, None));
    }

    #[test]
    fn diesel_bus_eff_peaks_near_rated_power() {
        let low = dc_bus_to_source_eff(0.1, PowerType::Diesel, PowerMethod::Series);
        let high = dc_bus_to_source_eff(0.8, PowerType::Diesel, PowerMethod::Series);
        assert!(high > low);
        assert!(almost_eq(low, -0.24 * 0.01 + 0.3859 * 0.1 + 0.29, None));
    }

    #[test]
    fn series_hybrid_pays_battery_round_trip() {
        let gen = generator_eff(PowerType::DieselHybrid, 0.8);
        let series = dc_bus_to_source_eff(0.8, PowerType::DieselHybrid, PowerMethod::Series);
        let parallel = dc_bus_to_source_eff(0.8, PowerType::DieselHybrid, PowerMethod::Parallel);
        assert!(almost_eq(series, gen * 0.965 * 0.965, None));
        assert!(almost_eq(parallel, gen, None));
    }

    #[test]
    fn efficiency_ranges_match_technology() {
        assert!(PowerType::DieselHybrid.max_efficiency_range().contains(0.8));
        assert!(!PowerType::DieselHybrid.max_efficiency_range().contains(0.5));
        assert!(PowerType::HydrogenHybrid.max_efficiency_range().contains(0.2));
    }

    #[test]
    fn recharge_share_decreases_with_soc() {
        assert!(almost_eq(recharge_power_share(0.0), 1.0, None));
        assert!(almost_eq(recharge_power_share(0.25), 0.8, None));
        assert!(almost_eq(recharge_power_share(0.95), 0.0, None));
        assert!(almost_eq(recharge_power_share(2.0), 0.0, None));
    }

    #[test]
    fn fuel_conversion_round_numbers() {
        let liters = FuelKind::Diesel.liters_from_energy(100.0 * uc::KWH);
        assert!(almost_eq(liters.get::<si::liter>(), 10.05, None));
        let co2 = FuelKind::Diesel.emissions(1.0 * uc::L);
        assert!(almost_eq(co2.get::<si::kilogram>(), 2.5595, None));
        assert!(almost_eq(FuelKind::Hydrogen.emissions(5.0 * uc::L).value, 0.0, None));
    }
}
