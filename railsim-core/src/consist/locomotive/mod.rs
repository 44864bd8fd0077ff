//! Locomotive model: discrete throttle, tractive force, and per-step energy
//! accounting across the on-board sources.

pub mod powertrain;

use crate::consist::vehicle::EnergyLedger;
use crate::imports::*;
use powertrain::energy::{
    self, battery_eff, generator_eff, recharge_power_share, wheel_to_dc_bus_eff,
};
use powertrain::{Battery, FuelKind, FuelTank, PowerMethod, PowerType, RechargeSource};

/// Default locomotive empty mass in metric tons, clamped to the gross mass
/// when the gross is lighter.
const DEFAULT_EMPTY_MASS_TONS: f64 = 180.0;
/// Default rated speed in m/s.
const DEFAULT_MAX_SPEED_MPS: f64 = 100.0 / 3.0;
/// Regeneration decay constant in the recovered-fraction law
/// `1 / exp(gamma / |a|)`.
const REGEN_GAMMA: f64 = 0.65;

fn default_transmission_eff() -> f64 {
    0.965
}
fn default_length_m() -> f64 {
    23.0
}
fn default_axles() -> u32 {
    6
}
fn default_notch_count() -> u32 {
    8
}
fn default_battery_c_rate() -> f64 {
    2.0
}
fn default_max_speed() -> f64 {
    DEFAULT_MAX_SPEED_MPS
}

/// Builder input for [Locomotive]; external units (kW, tons, liters) are
/// converted on build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocomotiveConfig {
    pub power_type: PowerType,
    pub max_power_kw: f64,
    pub gross_mass_tons: f64,
    pub drag_coef: f64,
    pub frontal_area_sqm: f64,
    #[serde(default = "default_transmission_eff")]
    pub transmission_eff: f64,
    #[serde(default = "default_length_m")]
    pub length_m: f64,
    #[serde(default = "default_axles")]
    pub axles: u32,
    #[serde(default = "default_notch_count")]
    pub notch_count: u32,
    /// Highest notch the driver may select; 0 means unrestricted.
    #[serde(default)]
    pub max_notch: u32,
    #[serde(default)]
    pub aux_power_kw: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed_mps: f64,
    /// Battery capacity override; per-technology default when `None`.
    #[serde(default)]
    pub battery_max_kwh: Option<f64>,
    #[serde(default)]
    pub battery_initial_soc: Option<f64>,
    #[serde(default = "default_battery_c_rate")]
    pub battery_c_rate: f64,
    /// Tank capacity override; per-technology default when `None`.
    #[serde(default)]
    pub tank_max_liters: Option<f64>,
    #[serde(default)]
    pub tank_initial_fill: Option<f64>,
    #[serde(default)]
    pub hybrid_method: Option<PowerMethod>,
}

impl Init for LocomotiveConfig {}
impl SerdeAPI for LocomotiveConfig {}

/// A single locomotive, one of the seven power technologies.
///
/// Battery is present iff the technology is rechargeable (electric or
/// hybrid); tank is present iff the technology burns fuel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locomotive {
    pub power_type: PowerType,
    pub hybrid_method: PowerMethod,
    /// Rated power.
    pub max_power: si::Power,
    pub transmission_eff: f64,
    pub length: si::Length,
    pub drag_coef: f64,
    pub frontal_area: si::Area,
    /// Current gross mass; decreases as fuel burns, never below
    /// [Self::empty_mass].
    pub mass: si::Mass,
    pub empty_mass: si::Mass,
    pub axles: u32,
    /// Rated speed used by the throttle sigmoid.
    pub max_speed: si::Velocity,
    /// Number of notches `Nmax`.
    pub notch_count: u32,
    /// Highest selectable notch.
    pub max_notch: u32,
    pub aux_power: si::Power,
    /// Current notch; 0 is idle.
    pub current_notch: u32,
    /// Throttle level per notch, `(n / Nmax)^2`.
    throttle_levels: Vec<f64>,
    /// Run-time power restriction for this step; 1.0 unless derated.
    pub power_reduction: f64,
    /// Tractive force computed for the current step.
    pub max_tractive_force: si::Force,
    /// Fraction of rated power demanded this step.
    pub used_power_portion: f64,
    /// Cleared permanently when no source can satisfy a step's share.
    pub is_on: bool,
    pub battery: Option<Battery>,
    pub tank: Option<FuelTank>,
    /// Per-step energy accounting, reset by the owning train each tick.
    #[serde(default)]
    pub ledger: EnergyLedger,
    /// Grade sampled at this vehicle's centroid, signed along travel.
    #[serde(default)]
    pub track_grade: f64,
    /// Unsigned curvature sampled at this vehicle's centroid.
    #[serde(default)]
    pub track_curvature: f64,
}

/// Result of a step's energy draw against one locomotive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyFlow {
    /// Whether any source accepted the draw.
    pub satisfied: bool,
    /// Positive: demand the sources could not meet. Negative: regenerated
    /// energy the battery could not store.
    pub residual: si::Energy,
    /// Energy taken from the catenary this step.
    pub catenary_drawn: si::Energy,
}

impl EnergyFlow {
    fn ok() -> Self {
        Self {
            satisfied: true,
            residual: si::Energy::ZERO,
            catenary_drawn: si::Energy::ZERO,
        }
    }

    fn unmet(residual: si::Energy) -> Self {
        Self {
            satisfied: false,
            residual,
            catenary_drawn: si::Energy::ZERO,
        }
    }
}

impl Locomotive {
    pub fn build(config: LocomotiveConfig) -> anyhow::Result<Self> {
        let spec = config.power_type.spec();
        ensure!(
            config.max_power_kw > 0.0,
            "{}\nlocomotive max power must be positive",
            format_dbg!()
        );
        ensure!(
            config.notch_count > 0,
            "{}\nlocomotive must have at least one notch",
            format_dbg!()
        );

        let gross = config.gross_mass_tons * uc::TON;
        let empty = (DEFAULT_EMPTY_MASS_TONS * uc::TON).min(gross);

        let battery = if spec.rechargeable {
            let cap_kwh = config.battery_max_kwh.unwrap_or(spec.default_battery_kwh);
            let soc = config.battery_initial_soc.unwrap_or(0.6);
            let (lo, hi) = spec.recharge_soc_bounds;
            Some(Battery::new(
                cap_kwh * uc::KWH,
                soc,
                0.9,
                config.battery_c_rate,
                hi,
                lo,
            )?)
        } else {
            None
        };

        let tank = if spec.fuel.is_some() {
            let cap = config.tank_max_liters.unwrap_or(spec.default_tank_liters);
            let fill = config.tank_initial_fill.unwrap_or(0.9);
            Some(FuelTank::new(cap * uc::L, fill, 0.8)?)
        } else {
            None
        };

        // account for the fuel load when the given gross mass cannot cover it
        let mass = match (&tank, spec.fuel) {
            (Some(tank), Some(fuel)) => {
                let fuel_mass = tank.initial_capacity() * fuel.spec().density;
                if gross - empty < fuel_mass {
                    empty + fuel_mass
                } else {
                    gross
                }
            }
            _ => gross,
        };

        let notch_count = config.notch_count;
        let max_notch = if config.max_notch == 0 || config.max_notch > notch_count {
            notch_count
        } else {
            config.max_notch
        };
        let throttle_levels = (1..=notch_count)
            .map(|n| (n as f64 / notch_count as f64).powi(2))
            .collect();

        let hybrid_method = if spec.hybrid {
            config.hybrid_method.unwrap_or_default()
        } else {
            PowerMethod::Series
        };

        Ok(Self {
            power_type: config.power_type,
            hybrid_method,
            max_power: config.max_power_kw * uc::KW,
            transmission_eff: config.transmission_eff,
            length: config.length_m * uc::M,
            drag_coef: config.drag_coef,
            frontal_area: config.frontal_area_sqm * uc::M2,
            mass,
            empty_mass: empty,
            axles: config.axles,
            max_speed: config.max_speed_mps * uc::MPS,
            notch_count,
            max_notch,
            aux_power: config.aux_power_kw * uc::KW,
            current_notch: 0,
            throttle_levels,
            power_reduction: 1.0,
            max_tractive_force: si::Force::ZERO,
            used_power_portion: 0.0,
            is_on: true,
            battery,
            tank,
            ledger: EnergyLedger::default(),
            track_grade: 0.0,
            track_curvature: 0.0,
        })
    }

    // ------------------------------------------------------------------
    // throttle
    // ------------------------------------------------------------------

    /// Continuous throttle target from the speed sigmoid, clipped to
    /// [0, 1].
    pub fn hyperbolic_throttle_coef(&self, speed: si::Velocity) -> f64 {
        let dv = (speed / self.max_speed).get::<si::ratio>();
        let lambda = 1.0 / (1.0 + (-7.82605 * (dv - 0.42606)).exp());
        lambda.clamp(0.0, 1.0)
    }

    /// Discretise the continuous target onto the notch grid; returns the
    /// 1-based notch and its throttle level, honoring [Self::max_notch].
    pub fn discretized_throttle(&self, speed: si::Velocity) -> (u32, f64) {
        let lambda = self.hyperbolic_throttle_coef(speed);
        let mut notch = 1u32;
        let mut best = f64::INFINITY;
        for (i, level) in self.throttle_levels.iter().enumerate() {
            let diff = (lambda - level).abs();
            if diff < best {
                best = diff;
                notch = i as u32 + 1;
            }
        }
        if notch > self.max_notch {
            notch = self.max_notch;
        }
        (notch, self.throttle_levels[(notch - 1).idx()])
    }

    /// Effective throttle: the discrete level, optionally capped by the
    /// policy's optimum when optimization is on.
    pub fn throttle_level(&self, speed: si::Velocity, optimize: bool, optimum: f64) -> f64 {
        let discrete = self.discretized_throttle(speed).1;
        if optimize {
            let optimum = if optimum < 0.0 {
                self.throttle_levels.last().copied().unwrap_or(1.0)
            } else {
                optimum
            };
            discrete.min(optimum)
        } else {
            discrete
        }
    }

    /// Track the notch the driver is holding; idle when stopped or off.
    pub fn update_notch(&mut self, speed: si::Velocity) {
        self.current_notch = if speed == si::Velocity::ZERO || !self.is_on {
            0
        } else {
            self.discretized_throttle(speed).0
        };
    }

    /// Derate power for this step, restricted to the next lower notch at
    /// most.
    pub fn reduce_power(&mut self, reduction_factor: f64) {
        let lower_notch_level = if self.current_notch >= 2 {
            self.throttle_levels[(self.current_notch - 2).idx()]
        } else {
            0.0
        };
        self.power_reduction = reduction_factor.max(lower_notch_level);
    }

    pub fn reset_power_restriction(&mut self) {
        self.power_reduction = 1.0;
    }

    // ------------------------------------------------------------------
    // forces and power
    // ------------------------------------------------------------------

    /// Tractive force at the wheel: adhesion-limited at rest, power-limited
    /// otherwise. Stores the result in [Self::max_tractive_force].
    pub fn tractive_force(
        &mut self,
        friction_coef: f64,
        speed: si::Velocity,
        optimize: bool,
        optimum_throttle: f64,
    ) -> si::Force {
        if !self.is_on {
            return si::Force::ZERO;
        }
        let adhesion = friction_coef * self.mass * uc::ACC_GRAV;
        let force = if speed == si::Velocity::ZERO {
            adhesion
        } else {
            let power_limited: si::Force = self.power_reduction
                * self.transmission_eff
                * self.throttle_level(speed, optimize, optimum_throttle)
                * self.power_type.spec().power_reduction
                * self.max_power
                / speed;
            power_limited.min(adhesion)
        };
        self.max_tractive_force = force;
        force
    }

    /// Power demanded at the wheel for this locomotive's equal share of
    /// train weight and resistance; negative when decelerating downhill.
    pub fn shared_virtual_tractive_power(
        &self,
        speed: si::Velocity,
        acceleration: si::Acceleration,
        shared_mass: si::Mass,
        shared_resistance: si::Force,
    ) -> si::Power {
        if !self.is_on {
            return si::Power::ZERO;
        }
        (shared_mass * acceleration + shared_resistance) * speed
    }

    /// Fraction of rated power in use; capped at 1 because the demand spikes
    /// at the start of a deceleration.
    pub fn used_power_portion_at(&self, virtual_power: si::Power) -> f64 {
        (virtual_power / self.max_power).get::<si::ratio>().min(1.0)
    }

    /// Recovered fraction of braking power, `1 / exp(gamma / |a|)`. Falls
    /// back to a virtual deceleration when the actual one is zero. Zero for
    /// technologies that cannot store regeneration.
    pub fn regenerative_efficiency(
        &self,
        virtual_power: si::Power,
        acceleration: si::Acceleration,
        speed: si::Velocity,
    ) -> f64 {
        if !self.power_type.spec().rechargeable {
            return 0.0;
        }
        let a = acceleration.get::<si::meter_per_second_squared>();
        if a != 0.0 {
            return 1.0 / (REGEN_GAMMA / a.abs()).exp();
        }
        if speed > si::Velocity::ZERO {
            let virtual_acc: si::Acceleration = virtual_power / (speed * self.mass);
            let va = virtual_acc.get::<si::meter_per_second_squared>();
            if va != 0.0 {
                return 1.0 / (REGEN_GAMMA / va.abs()).exp();
            }
        }
        0.0
    }

    /// Step energy demand at the energy source. Positive demand is divided
    /// by the drive-line efficiency; regenerated energy is scaled by the
    /// recovered fraction and multiplied by it.
    pub fn energy_consumption(
        &self,
        virtual_power: si::Power,
        acceleration: si::Acceleration,
        speed: si::Velocity,
        dt: si::Time,
    ) -> si::Energy {
        if !self.is_on {
            return si::Energy::ZERO;
        }
        let portion = self.used_power_portion_at(virtual_power);
        if virtual_power == si::Power::ZERO {
            self.aux_power * dt
        } else if virtual_power > si::Power::ZERO {
            let eff =
                energy::drive_line_eff(speed, portion, self.power_type, self.hybrid_method);
            (virtual_power + self.aux_power) * dt / eff
        } else {
            let regen_eff = self.regenerative_efficiency(virtual_power, acceleration, speed);
            let eff = energy::drive_line_eff(
                speed,
                portion.abs(),
                self.power_type,
                self.hybrid_method,
            );
            (virtual_power * regen_eff + self.aux_power) * dt * eff
        }
    }

    // ------------------------------------------------------------------
    // sources
    // ------------------------------------------------------------------

    /// Burn `energy` worth of `fuel` from the tank (all or nothing),
    /// reducing the locomotive's mass by the fuel burnt.
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

    /// Draw `energy` electrically: unlimited from a catenary when present,
    /// otherwise from the battery.
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
            return EnergyFlow::unmet(energy);
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
            EnergyFlow::unmet(energy)
        }
    }

    /// Max energy the generator can divert into the battery this step,
    /// limited by the recharge schedule and the unused power headroom.
    fn max_recharge_energy(
        &self,
        dt: si::Time,
        speed: si::Velocity,
        virtual_power: si::Power,
    ) -> si::Energy {
        let soc = self.battery.as_ref().map(|b| b.soc()).unwrap_or(0.0);
        let generator_share = recharge_power_share(soc);
        let used = self.used_power_portion_at(virtual_power);
        let feasible = (1.0 - used).min(generator_share).max(0.0);
        self.max_tractive_force * speed * dt * feasible
    }

    /// Divert generator output into the battery at the highest admissible
    /// flow, burning the corresponding fuel.
    fn recharge_battery_by_max_flow(
        &mut self,
        dt: si::Time,
        speed: si::Velocity,
        power_portion: f64,
        virtual_power: si::Power,
    ) {
        let Some(fuel) = self.power_type.fuel() else {
            return;
        };
        let Some(required) = self.battery.as_ref().map(|b| b.max_recharge(dt)) else {
            return;
        };
        let recharge = self
            .max_recharge_energy(dt, speed, virtual_power)
            .min(required)
            .max(si::Energy::ZERO);
        if recharge <= si::Energy::ZERO {
            return;
        }
        // the stored energy passes through the generator and the battery
        let fuel_energy = recharge
            / (generator_eff(self.power_type, power_portion) * battery_eff(self.power_type));
        if self.consume_fuel_of_kind(fuel, fuel_energy).0 {
            self.ledger.consumed -= recharge;
            if let Some(battery) = self.battery.as_mut() {
                battery.try_recharge(dt, recharge, RechargeSource::FromEngine);
            }
        }
    }

    /// Hybrid routing: draw from the source whose operating point is more
    /// efficient first, fall back to the other for the residual, and divert
    /// generator headroom into the battery while the recharge latch is set.
    fn consume_from_hybrid(
        &mut self,
        dt: si::Time,
        speed: si::Velocity,
        power_portion: f64,
        energy_kwh: si::Energy,
        virtual_power: si::Power,
        has_catenary: bool,
    ) -> EnergyFlow {
        let Some(fuel) = self.power_type.fuel() else {
            return EnergyFlow::unmet(energy_kwh);
        };
        let range = self.power_type.max_efficiency_range();
        let bat_eff = battery_eff(self.power_type);
        let gen_eff = generator_eff(self.power_type, power_portion);

        let mut flow = if range.contains(power_portion) {
            // generator is in its sweet spot: fuel first
            let (ok, rest) = self.consume_fuel_of_kind(fuel, energy_kwh * (bat_eff / gen_eff));
            if ok {
                if self.battery.as_mut().is_some_and(|b| b.is_rechargeable()) {
                    self.recharge_battery_by_max_flow(dt, speed, power_portion, virtual_power);
                }
                EnergyFlow::ok()
            } else if self.battery.as_mut().is_some_and(|b| b.is_drainable(rest)) {
                self.consume_electricity(dt, rest * gen_eff, has_catenary)
            } else {
                EnergyFlow::unmet(rest)
            }
        } else {
            // outside the sweet spot: battery first, generator for the rest
            let battery_flow = self.consume_electricity(dt, energy_kwh, has_catenary);
            if battery_flow.residual > si::Energy::ZERO {
                let fuel_energy = battery_flow.residual * (bat_eff / gen_eff);
                let (ok, rest) = self.consume_fuel_of_kind(fuel, fuel_energy);
                EnergyFlow {
                    satisfied: ok || battery_flow.satisfied,
                    residual: rest,
                    catenary_drawn: battery_flow.catenary_drawn,
                }
            } else {
                EnergyFlow {
                    satisfied: true,
                    residual: si::Energy::ZERO,
                    catenary_drawn: battery_flow.catenary_drawn,
                }
            }
        };

        if self
            .battery
            .as_mut()
            .is_some_and(|b| b.update_recharge_latch())
        {
            self.recharge_battery_by_max_flow(dt, speed, power_portion, virtual_power);
        }
        if !flow.satisfied && flow.residual == si::Energy::ZERO {
            flow.residual = energy_kwh;
        }
        flow
    }

    /// Accept regenerated energy into the battery; returns the leftover the
    /// store could not take.
    pub fn refill_battery(&mut self, dt: si::Time, energy: si::Energy) -> si::Energy {
        let offered = energy.abs();
        let stored = match self.battery.as_mut() {
            Some(battery) => battery.try_recharge(dt, offered, RechargeSource::Regenerated),
            None => si::Energy::ZERO,
        };
        self.ledger.regenerated += stored;
        offered - stored
    }

    /// Route the step's energy demand (or regeneration, when negative)
    /// through this locomotive's sources.
    pub fn consume_energy(
        &mut self,
        dt: si::Time,
        speed: si::Velocity,
        energy: si::Energy,
        virtual_power: si::Power,
        has_catenary: bool,
    ) -> EnergyFlow {
        if energy > si::Energy::ZERO {
            let portion = self.used_power_portion_at(virtual_power);
            self.used_power_portion = portion;
            match self.power_type {
                PowerType::Diesel | PowerType::DieselElectric => {
                    let (ok, rest) = self.consume_fuel_of_kind(FuelKind::Diesel, energy);
                    if ok {
                        EnergyFlow::ok()
                    } else {
                        EnergyFlow::unmet(rest)
                    }
                }
                PowerType::Biodiesel => {
                    let (ok, rest) = self.consume_fuel_of_kind(FuelKind::Biodiesel, energy);
                    if ok {
                        EnergyFlow::ok()
                    } else {
                        EnergyFlow::unmet(rest)
                    }
                }
                PowerType::Electric => self.consume_electricity(dt, energy, has_catenary),
                PowerType::DieselHybrid
                | PowerType::HydrogenHybrid
                | PowerType::BiodieselHybrid => self.consume_from_hybrid(
                    dt,
                    speed,
                    portion,
                    energy,
                    virtual_power,
                    has_catenary,
                ),
            }
        } else if energy < si::Energy::ZERO {
            let rest = self.refill_battery(dt, energy);
            if rest == si::Energy::ZERO {
                EnergyFlow::ok()
            } else {
                // negative residual: regeneration looking for another store
                EnergyFlow {
                    satisfied: false,
                    residual: -rest,
                    catenary_drawn: si::Energy::ZERO,
                }
            }
        } else {
            EnergyFlow::ok()
        }
    }

    /// Upper bound on the energy this locomotive's own sources can supply
    /// in one step. Infinite for fuel technologies with fuel remaining and
    /// for electric locomotives under a catenary.
    pub fn max_provided_energy(&mut self, dt: si::Time, has_catenary: bool) -> si::Energy {
        let spec = self.power_type.spec();
        if spec.battery_only {
            if has_catenary {
                return f64::INFINITY * uc::J;
            }
            return match self.battery.as_ref() {
                Some(battery) if battery.has_charge() => battery.max_discharge(dt),
                _ => si::Energy::ZERO,
            };
        }
        if spec.hybrid {
            let battery_ok = self.battery.as_ref().is_some_and(|b| b.has_charge());
            let tank_ok = self.tank.as_ref().is_some_and(|t| t.has_fuel());
            if !battery_ok && !tank_ok {
                return si::Energy::ZERO;
            }
        } else if self.tank.as_ref().is_none_or(|t| !t.has_fuel()) {
            return si::Energy::ZERO;
        }
        f64::INFINITY * uc::J
    }

    // ------------------------------------------------------------------
    // status
    // ------------------------------------------------------------------

    pub fn battery_soc(&self) -> f64 {
        self.battery.as_ref().map(|b| b.soc()).unwrap_or(0.0)
    }

    pub fn tank_state_of_capacity(&self) -> f64 {
        self.tank
            .as_ref()
            .map(|t| t.state_of_capacity())
            .unwrap_or(0.0)
    }

    /// Speed -> drive-line observation point for external reporting.
    pub fn wheel_to_bus_eff(&self, speed: si::Velocity) -> f64 {
        wheel_to_dc_bus_eff(speed)
    }
}

impl Init for Locomotive {}

#[cfg(test)]
mod tests {
    use super::*;

    fn diesel_config() -> LocomotiveConfig {
        LocomotiveConfig {
            power_type: PowerType::Diesel,
            max_power_kw: 3000.0,
            gross_mass_tons: 180.0,
            drag_coef: 0.0055,
            frontal_area_sqm: 105.6,
            transmission_eff: 0.965,
            length_m: 23.0,
            axles: 6,
            notch_count: 8,
            max_notch: 0,
            aux_power_kw: 0.0,
            max_speed_mps: DEFAULT_MAX_SPEED_MPS,
            battery_max_kwh: None,
            battery_initial_soc: None,
            battery_c_rate: 2.0,
            tank_max_liters: None,
            tank_initial_fill: None,
            hybrid_method: None,
        }
    }

    fn hybrid_config() -> LocomotiveConfig {
        LocomotiveConfig {
            power_type: PowerType::DieselHybrid,
            ..diesel_config()
        }
    }

    #[test]
    fn sources_match_technology() {
        let diesel = Locomotive::build(diesel_config()).unwrap();
        assert!(diesel.battery.is_none());
        assert!(diesel.tank.is_some());

        let electric = Locomotive::build(LocomotiveConfig {
            power_type: PowerType::Electric,
            ..diesel_config()
        })
        .unwrap();
        assert!(electric.battery.is_some());
        assert!(electric.tank.is_none());

        let hybrid = Locomotive::build(hybrid_config()).unwrap();
        assert!(hybrid.battery.is_some());
        assert!(hybrid.tank.is_some());
    }

    #[test]
    fn throttle_discretisation_tracks_sigmoid() {
        let loco = Locomotive::build(diesel_config()).unwrap();
        // at rest the sigmoid sits near idle, so notch 1 wins
        let (notch, level) = loco.discretized_throttle(si::Velocity::ZERO);
        assert_eq!(notch, 1);
        assert!(almost_eq(level, (1.0f64 / 8.0).powi(2), None));
        // near rated speed the target saturates to the top notch
        let (notch, level) = loco.discretized_throttle(loco.max_speed);
        assert_eq!(notch, 8);
        assert!(almost_eq(level, 1.0, None));
    }

    #[test]
    fn max_notch_caps_throttle() {
        let loco = Locomotive::build(LocomotiveConfig {
            max_notch: 3,
            ..diesel_config()
        })
        .unwrap();
        let (notch, level) = loco.discretized_throttle(loco.max_speed);
        assert_eq!(notch, 3);
        assert!(almost_eq(level, (3.0f64 / 8.0).powi(2), None));
    }

    #[test]
    fn tractive_force_is_adhesion_limited_at_rest() {
        let mut loco = Locomotive::build(diesel_config()).unwrap();
        let force = loco.tractive_force(0.2, si::Velocity::ZERO, false, -1.0);
        let expected = 0.2 * loco.mass * uc::ACC_GRAV;
        assert!(almost_eq(
            force.get::<si::newton>(),
            expected.get::<si::newton>(),
            None
        ));
    }

    #[test]
    fn tractive_force_is_power_limited_at_speed() {
        let mut loco = Locomotive::build(diesel_config()).unwrap();
        let speed = 20.0 * uc::MPS;
        let force = loco.tractive_force(0.2, speed, false, -1.0);
        let throttle = loco.throttle_level(speed, false, -1.0);
        let expected = 0.965 * throttle * 3000.0e3 / 20.0;
        assert!(almost_eq(force.get::<si::newton>(), expected, Some(1e-6)));
    }

    #[test]
    fn fuel_burn_reduces_mass_but_not_below_empty() {
        let mut loco = Locomotive::build(diesel_config()).unwrap();
        let before = loco.mass;
        let (ok, rest) = loco.consume_fuel_of_kind(FuelKind::Diesel, 1000.0 * uc::KWH);
        assert!(ok);
        assert_eq!(rest, si::Energy::ZERO);
        assert!(loco.mass < before);
        assert!(loco.mass >= loco.empty_mass);
    }

    #[test]
    fn electric_draw_fails_without_charge_or_catenary() {
        let mut loco = Locomotive::build(LocomotiveConfig {
            power_type: PowerType::Electric,
            battery_initial_soc: Some(0.02),
            ..diesel_config()
        })
        .unwrap();
        let flow = loco.consume_energy(
            1.0 * uc::S,
            10.0 * uc::MPS,
            10.0 * uc::KWH,
            1000.0 * uc::KW,
            false,
        );
        assert!(!flow.satisfied);
        assert!(almost_eq(
            flow.residual.get::<si::kilowatt_hour>(),
            10.0,
            None
        ));
        // under a catenary the same draw is unlimited
        let flow = loco.consume_energy(
            1.0 * uc::S,
            10.0 * uc::MPS,
            10.0 * uc::KWH,
            1000.0 * uc::KW,
            true,
        );
        assert!(flow.satisfied);
        assert!(almost_eq(
            flow.catenary_drawn.get::<si::kilowatt_hour>(),
            10.0,
            None
        ));
    }

    #[test]
    fn regeneration_charges_hybrid_battery() {
        let mut loco = Locomotive::build(hybrid_config()).unwrap();
        let before = loco.battery.as_ref().unwrap().current_charge();
        let flow = loco.consume_energy(
            1.0 * uc::S,
            15.0 * uc::MPS,
            -0.5 * uc::KWH,
            -500.0 * uc::KW,
            false,
        );
        assert!(flow.satisfied);
        let after = loco.battery.as_ref().unwrap().current_charge();
        assert!(after > before);
        assert!(loco.ledger.regenerated > si::Energy::ZERO);
    }

    #[test]
    fn regen_efficiency_zero_for_non_rechargeable() {
        let loco = Locomotive::build(diesel_config()).unwrap();
        assert_eq!(
            loco.regenerative_efficiency(-500.0 * uc::KW, -1.0 * uc::MPS2, 10.0 * uc::MPS),
            0.0
        );
        let hybrid = Locomotive::build(hybrid_config()).unwrap();
        let eff = hybrid.regenerative_efficiency(-500.0 * uc::KW, -1.0 * uc::MPS2, 10.0 * uc::MPS);
        assert!(almost_eq(eff, 1.0 / (0.65f64).exp(), None));
    }
}
