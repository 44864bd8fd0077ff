//! A train: ordered vehicles on a path, longitudinal dynamics state, and
//! per-trip statistics.

pub mod dynamics;
pub mod optimizer;

pub use dynamics::CriticalPoint;
pub use optimizer::{HoldCurrentThrottle, LookaheadCell, PolicyInput, ThrottlePolicy};

use crate::consist::locomotive::powertrain::{FuelKind, PowerType};
use crate::consist::{arrange_vehicles, tender_kind_for, Car, CarKind, Locomotive, RailVehicle};
use crate::imports::*;
use crate::input::TrainRecord;
use crate::network::{LinkIdx, Network, NodeIdx};

/// Dense index of a train within the simulator, assigned in input order;
/// ticks iterate trains in ascending index.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrainIdx(u32);

impl TrainIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn idx(&self) -> usize {
        self.0.idx()
    }
}

impl std::hash::Hash for TrainIdx {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u32(self.0);
    }
}
impl nohash_hasher::IsEnabled for TrainIdx {}

impl fmt::Display for TrainIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimum gap held behind a leading train.
pub const MIN_FOLLOWING_GAP: si::Length = si::Length {
    dimension: std::marker::PhantomData,
    units: std::marker::PhantomData,
    value: 2.0,
};

/// Cumulative per-trip statistics.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainStats {
    pub trip_time: si::Time,
    /// Net energy of the last step (consumed minus regenerated).
    pub step_net_energy: si::Energy,
    pub cum_net_energy: si::Energy,
    pub total_consumed: si::Energy,
    pub total_regenerated: si::Energy,
    pub total_co2: si::Mass,
    /// Sum of the per-step used tractive power values.
    pub cum_used_tractive_power: si::Power,
    /// Delay of the last step against the current link speed.
    pub delay_time: si::Time,
    pub cum_delay_time: si::Time,
    /// Delay of the last step against all spanned links' speeds.
    pub max_delay_time: si::Time,
    pub cum_max_delay_time: si::Time,
    /// Stop measure of the last step.
    pub stops: f64,
    pub cum_stops: f64,
    pub average_speed: si::Velocity,
    pub average_acceleration: si::Acceleration,
    /// Net energy per region crossed.
    pub regional_net_energy: BTreeMap<String, si::Energy>,
}

/// Snapshot of a train's totals and kinematics, emitted on completion and
/// on request. Plain numbers in external units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainStateRecord {
    pub train_user_id: String,
    pub total_length_m: f64,
    pub total_mass_tons: f64,
    pub travelled_distance_m: f64,
    pub trip_time_s: f64,
    pub loaded: bool,
    pub is_on: bool,
    pub out_of_energy: bool,
    pub reached_destination: bool,
    pub total_energy_consumed_kwh: f64,
    pub total_energy_regenerated_kwh: f64,
    pub net_energy_consumed_kwh: f64,
    pub total_co2_emitted_kg: f64,
    pub cum_delay_time_s: f64,
    pub cum_max_delay_time_s: f64,
    pub cum_stops: f64,
    pub fuel_consumed_liters: BTreeMap<String, f64>,
    pub current_speed_mps: f64,
    pub current_acceleration_mps2: f64,
    pub current_tractive_force_n: f64,
    pub current_resistance_n: f64,
    pub current_used_tractive_power_kw: f64,
    pub average_tenders_battery_soc: f64,
    pub average_tenders_tank_state: f64,
}

/// A freight train: an arranged consist, a path through the network, and
/// the motion/energy state advanced by the simulator each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub idx: TrainIdx,
    pub user_id: String,
    /// Node ids as supplied by the user, possibly sparse.
    pub user_path: Vec<i64>,
    /// Expanded node path; filled at simulator setup.
    pub path: Vec<NodeIdx>,
    pub start_time: si::Time,
    /// Vehicles in physical order, tip first.
    pub vehicles: Vec<RailVehicle>,
    loco_positions: Vec<usize>,
    car_positions: Vec<usize>,
    /// Distance from the tip to each vehicle's centroid.
    pub centroids: Vec<si::Length>,
    pub total_length: si::Length,
    /// Static mass used by the dynamics; per-vehicle masses still drop as
    /// fuel burns and feed the resistance model.
    pub total_mass: si::Mass,
    pub friction_coef: f64,
    /// Desired service deceleration.
    pub d_des: si::Acceleration,
    pub reaction_time: si::Time,
    /// Perception-reaction time plus brake-propagation delay.
    pub t_s: si::Time,
    pub max_jerk: si::Jerk,
    pub optimize: bool,

    pub speed: si::Velocity,
    pub prev_speed: si::Velocity,
    pub accel: si::Acceleration,
    pub prev_accel: si::Acceleration,
    pub travelled: si::Length,
    pub total_path_length: si::Length,
    pub cum_lengths: Vec<si::Length>,
    pub coord: Coord,
    /// Head and tail positions in the plane.
    pub head_tail: [Coord; 2],
    pub current_links: Vec<LinkIdx>,
    pub previous_links: Vec<LinkIdx>,
    /// Link spanned by each vehicle, parallel to [Self::vehicles].
    host_links: Vec<LinkIdx>,
    /// Path position of the node most recently passed by the head.
    pub head_prev_pos: usize,
    /// Path position of the node most recently passed by the tail.
    pub tail_prev_pos: usize,
    pub loaded: bool,
    pub reached_destination: bool,
    pub out_of_energy: bool,
    pub is_on: bool,

    /// Total resistance from the last dynamics evaluation.
    pub resistance_force: si::Force,
    /// Total tractive force from the last dynamics evaluation.
    pub tractive_force: si::Force,
    pub used_tractive_power: si::Power,
    /// Per-active-locomotive virtual power of the current step.
    used_power_list: Vec<si::Power>,
    no_power_warnings: u32,

    /// Throttle cap chosen by the optimization policy.
    pub optimum_throttle: f64,
    /// Remaining planned throttle levels.
    pub throttle_schedule: VecDeque<f64>,

    /// Signed grade per link, memoized in this train's direction of
    /// travel.
    grade_by_link: HashMap<LinkIdx, f64>,

    pub stats: TrainStats,
    /// Non-fatal conditions raised this tick, drained by the simulator.
    #[serde(skip)]
    pub warnings: Vec<SimError>,
}

impl Train {
    /// Build a train from its input record: construct and arrange the
    /// vehicles and derive the composition totals.
    pub fn from_record(idx: TrainIdx, record: &TrainRecord) -> anyhow::Result<Self> {
        let mut locomotives = Vec::new();
        for spec in &record.locomotives {
            for _ in 0..spec.count {
                locomotives.push(Locomotive::build(spec.config.clone())?);
            }
        }
        let mut cars = Vec::new();
        for spec in &record.cars {
            for _ in 0..spec.count {
                cars.push(Car::build(spec.config.clone())?);
            }
        }
        let arrangement = arrange_vehicles(locomotives, cars)?;
        let total_length = arrangement.total_length();
        let total_mass = arrangement.total_mass();
        let centroids = arrangement.centroids();
        let reaction_time = record.reaction_time_s * uc::S;
        let t_s = reaction_time + total_length / uc::SPEED_OF_SOUND;
        let n_vehicles = arrangement.vehicles.len();

        Ok(Self {
            idx,
            user_id: record.user_id.clone(),
            user_path: record.path.clone(),
            path: Vec::new(),
            start_time: record.start_time_s * uc::S,
            vehicles: arrangement.vehicles,
            loco_positions: arrangement.loco_positions,
            car_positions: arrangement.car_positions,
            centroids,
            total_length,
            total_mass,
            friction_coef: record.friction_coef,
            d_des: record.desired_deceleration * uc::MPS2,
            reaction_time,
            t_s,
            max_jerk: record.max_jerk * uc::MPS3,
            optimize: record.optimize,
            speed: si::Velocity::ZERO,
            prev_speed: si::Velocity::ZERO,
            accel: si::Acceleration::ZERO,
            prev_accel: si::Acceleration::ZERO,
            travelled: si::Length::ZERO,
            total_path_length: si::Length::ZERO,
            cum_lengths: Vec::new(),
            coord: Coord::default(),
            head_tail: [Coord::default(); 2],
            current_links: Vec::new(),
            previous_links: Vec::new(),
            host_links: vec![LinkIdx::default(); n_vehicles],
            head_prev_pos: 0,
            tail_prev_pos: 0,
            loaded: false,
            reached_destination: false,
            out_of_energy: false,
            is_on: true,
            resistance_force: si::Force::ZERO,
            tractive_force: si::Force::ZERO,
            used_tractive_power: si::Power::ZERO,
            used_power_list: Vec::new(),
            no_power_warnings: 0,
            optimum_throttle: 1.0,
            throttle_schedule: VecDeque::new(),
            grade_by_link: HashMap::new(),
            stats: TrainStats::default(),
            warnings: Vec::new(),
        })
    }

    pub fn n_locomotives(&self) -> usize {
        self.loco_positions.len()
    }

    pub fn n_cars(&self) -> usize {
        self.car_positions.len()
    }

    pub fn n_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    pub fn loco_positions(&self) -> &[usize] {
        &self.loco_positions
    }

    pub fn car_positions(&self) -> &[usize] {
        &self.car_positions
    }

    /// Positions of locomotives still running. Marks the train out of
    /// energy when none remain.
    pub fn active_loco_positions(&mut self) -> Vec<usize> {
        let active: Vec<usize> = self
            .loco_positions
            .iter()
            .copied()
            .filter(|&p| self.vehicles[p].as_locomotive().is_some_and(|l| l.is_on))
            .collect();
        if active.is_empty() {
            if !self.out_of_energy {
                self.warnings.push(SimError::OutOfEnergy {
                    train: self.user_id.clone(),
                });
            }
            self.out_of_energy = true;
        }
        active
    }

    pub fn first_locomotive(&self) -> &Locomotive {
        self.vehicles[self.loco_positions[0]].as_locomotive().unwrap()
    }

    /// Adopt the expanded path and its cumulative lengths.
    pub fn set_path(&mut self, path: Vec<NodeIdx>, cum_lengths: Vec<si::Length>) {
        self.total_path_length = *cum_lengths.last().unwrap();
        self.path = path;
        self.cum_lengths = cum_lengths;
    }

    /// Adopt the per-vehicle spanned links for this tick.
    pub fn set_current_links(&mut self, per_vehicle: &[LinkIdx]) {
        self.current_links.clear();
        for &link in per_vehicle {
            if !self.current_links.contains(&link) {
                self.current_links.push(link);
            }
        }
        for (i, host) in self.host_links.iter_mut().enumerate() {
            *host = per_vehicle[i.min(per_vehicle.len() - 1)];
        }
        for link in &self.current_links {
            if !self.previous_links.contains(link) {
                self.previous_links.push(*link);
            }
        }
    }

    pub fn first_link(&self) -> Option<LinkIdx> {
        self.current_links.first().copied()
    }

    pub fn host_link(&self, vehicle_pos: usize) -> LinkIdx {
        self.host_links[vehicle_pos]
    }

    /// Signed grade of `link` in this train's direction of travel,
    /// memoized on first sight.
    pub fn directional_grade(&mut self, net: &Network, link: LinkIdx, entry: NodeIdx) -> f64 {
        *self
            .grade_by_link
            .entry(link)
            .or_insert_with(|| net.link(link).grade_from(entry))
    }

    /// Apply sampled geometry to every vehicle.
    pub fn update_grades_curvatures(
        &mut self,
        grades: &[f64],
        curvatures: &[f64],
    ) -> Result<(), SimError> {
        if grades.len() != self.vehicles.len() || curvatures.len() != self.vehicles.len() {
            return Err(SimError::InvalidGeometry(format!(
                "train {}: geometry samples do not match vehicle count",
                self.user_id
            )));
        }
        for (i, vehicle) in self.vehicles.iter_mut().enumerate() {
            vehicle.set_track_geometry(grades[i], curvatures[i]);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // forces
    // ------------------------------------------------------------------

    /// Sum of all vehicles' resistances at `speed`; stored for the energy
    /// phase.
    pub fn total_resistance(&mut self, speed: si::Velocity) -> si::Force {
        let total = self
            .vehicles
            .iter()
            .map(|v| v.resistance(speed))
            .sum::<si::Force>();
        self.resistance_force = total;
        total
    }

    /// Sum of the locomotives' tractive forces at `speed`; stored for the
    /// energy phase.
    pub fn total_tractive_force(
        &mut self,
        speed: si::Velocity,
        optimize: bool,
        optimum_throttle: f64,
    ) -> si::Force {
        let friction = self.friction_coef;
        let mut total = si::Force::ZERO;
        for &p in &self.loco_positions {
            if let Some(loco) = self.vehicles[p].as_locomotive_mut() {
                total += loco.tractive_force(friction, speed, optimize, optimum_throttle);
            }
        }
        self.tractive_force = total;
        total
    }

    /// Derate every running locomotive for this step.
    pub fn reduce_power(&mut self, reduction_factor: f64) {
        for &p in &self.loco_positions {
            if let Some(loco) = self.vehicles[p].as_locomotive_mut() {
                if loco.is_on {
                    loco.reduce_power(reduction_factor);
                }
            }
        }
    }

    pub fn reset_power_restriction(&mut self) {
        for &p in &self.loco_positions {
            if let Some(loco) = self.vehicles[p].as_locomotive_mut() {
                loco.reset_power_restriction();
            }
        }
    }

    pub fn update_notches(&mut self) {
        let speed = self.speed;
        for &p in &self.loco_positions {
            if let Some(loco) = self.vehicles[p].as_locomotive_mut() {
                loco.update_notch(speed);
            }
        }
    }

    /// Per-locomotive virtual tractive power for an equal share of train
    /// weight and resistance; also stores the list and its total for the
    /// energy phase.
    pub fn tractive_power(
        &mut self,
        speed: si::Velocity,
        acceleration: si::Acceleration,
        resistance: si::Force,
    ) -> (Vec<si::Power>, si::Power) {
        if speed == si::Velocity::ZERO && acceleration == si::Acceleration::ZERO {
            self.used_power_list.clear();
            self.used_tractive_power = si::Power::ZERO;
            return (Vec::new(), si::Power::ZERO);
        }
        let active = self.active_loco_positions();
        if active.is_empty() {
            self.used_power_list.clear();
            self.used_tractive_power = si::Power::ZERO;
            return (Vec::new(), si::Power::ZERO);
        }
        let share_mass = self.total_mass / active.len() as f64;
        let share_resistance = resistance / active.len() as f64;
        let mut list = Vec::with_capacity(active.len());
        for &p in &active {
            let loco = self.vehicles[p].as_locomotive().unwrap();
            list.push(loco.shared_virtual_tractive_power(
                speed,
                acceleration,
                share_mass,
                share_resistance,
            ));
        }
        let total: si::Power = list.iter().copied().sum();
        self.used_power_list = list.clone();
        self.used_tractive_power = total;
        (list, total)
    }

    /// Step energy demand across all running locomotives at the given
    /// per-locomotive powers.
    pub fn total_energy_consumption(
        &mut self,
        dt: si::Time,
        speed: si::Velocity,
        used_powers: &[si::Power],
    ) -> si::Energy {
        if used_powers.is_empty() {
            return si::Energy::ZERO;
        }
        let acceleration = self.accel;
        let active = self.active_loco_positions();
        let mut energy = si::Energy::ZERO;
        for (&p, &power) in active.iter().zip(used_powers.iter()) {
            let loco = self.vehicles[p].as_locomotive().unwrap();
            energy += loco.energy_consumption(power, acceleration, speed, dt);
        }
        energy
    }

    /// Max energy all sources (locomotives plus matching tenders) can
    /// supply this step.
    pub fn max_provided_energy(&mut self, dt: si::Time, net: &Network) -> si::Energy {
        let active = self.active_loco_positions();
        let mut total = si::Energy::ZERO;
        let mut tender_kinds: BTreeSet<CarKind> = BTreeSet::new();
        for &p in &active {
            let has_catenary = net.link(self.host_links[p]).has_catenary;
            let loco = self.vehicles[p].as_locomotive_mut().unwrap();
            tender_kinds.insert(tender_kind_for(loco.power_type));
            total += loco.max_provided_energy(dt, has_catenary);
        }
        for &p in &self.car_positions {
            let has_catenary = net.link(self.host_links[p]).has_catenary;
            let car = self.vehicles[p].as_car().unwrap();
            if tender_kinds.contains(&car.kind) {
                total += car.max_provided_energy(dt, has_catenary);
            }
        }
        total
    }

    // ------------------------------------------------------------------
    // energy accounting
    // ------------------------------------------------------------------

    /// Account the step's energy across the powertrain: each running
    /// locomotive draws its share, residual demand spreads over matching
    /// tenders, and unstored regeneration feeds car batteries or the
    /// catenary. Returns false when every locomotive has shut down.
    pub fn consume_energy(&mut self, dt: si::Time, net: &mut Network) -> bool {
        for vehicle in &mut self.vehicles {
            vehicle.reset_step_ledger();
        }
        if !self.is_on {
            return false;
        }
        if self.used_power_list.is_empty() {
            return true;
        }
        let avg_speed = (self.speed + self.prev_speed) / 2.0;
        let active = self.active_loco_positions();
        let used_powers = self.used_power_list.clone();

        for (&p, &power) in active.iter().zip(used_powers.iter()) {
            let host = self.host_links[p];
            let has_catenary = net.link(host).has_catenary;
            let (energy, flow, power_type) = {
                let acceleration = self.accel;
                let speed = self.speed;
                let loco = self.vehicles[p].as_locomotive_mut().unwrap();
                if !loco.is_on {
                    continue;
                }
                let energy = loco.energy_consumption(power, acceleration, avg_speed, dt);
                let flow = loco.consume_energy(dt, speed, energy, power, has_catenary);
                (energy, flow, loco.power_type)
            };
            if flow.catenary_drawn > si::Energy::ZERO {
                net.link_mut(host).catenary_consumed += flow.catenary_drawn;
            }
            if flow.residual > si::Energy::ZERO {
                let (any_consumed, _) =
                    self.consume_tenders_energy(dt, flow.residual, power_type, net);
                if !any_consumed && flow.residual == energy {
                    // nothing on the train can feed this locomotive
                    self.vehicles[p].as_locomotive_mut().unwrap().is_on = false;
                }
            } else if flow.residual < si::Energy::ZERO {
                self.recharge_cars_batteries(dt, flow.residual, p, net);
            }
        }

        let all_off = self
            .loco_positions
            .iter()
            .all(|&p| !self.vehicles[p].as_locomotive().unwrap().is_on);
        !all_off
    }

    /// Spread residual demand equally over the active tenders of the
    /// matching fuel technology.
    fn consume_tenders_energy(
        &mut self,
        dt: si::Time,
        energy: si::Energy,
        power_type: PowerType,
        net: &mut Network,
    ) -> (bool, si::Energy) {
        let kind = tender_kind_for(power_type);
        let matching: Vec<usize> = self
            .car_positions
            .iter()
            .copied()
            .filter(|&p| self.vehicles[p].as_car().is_some_and(|c| c.kind == kind))
            .collect();
        let active: Vec<usize> = matching
            .iter()
            .copied()
            .filter(|&p| self.vehicles[p].as_car().unwrap().has_reserves())
            .collect();
        if active.is_empty() {
            return (false, energy);
        }
        let share = energy / active.len() as f64;
        let mut not_consumed = si::Energy::ZERO;
        for p in active {
            let host = self.host_links[p];
            let has_catenary = net.link(host).has_catenary;
            let car = self.vehicles[p].as_car_mut().unwrap();
            let flow = car.consume_energy(dt, share, has_catenary);
            if flow.catenary_drawn > si::Energy::ZERO {
                net.link_mut(host).catenary_consumed += flow.catenary_drawn;
            }
            not_consumed += flow.residual.max(si::Energy::ZERO);
        }
        (not_consumed < energy, not_consumed)
    }

    /// Push regenerated energy the locomotive could not store into the
    /// train's battery tenders, overflowing to the catenary when present.
    fn recharge_cars_batteries(
        &mut self,
        dt: si::Time,
        energy: si::Energy,
        loco_pos: usize,
        net: &mut Network,
    ) {
        let battery_cars: Vec<usize> = self
            .car_positions
            .iter()
            .copied()
            .filter(|&p| {
                self.vehicles[p]
                    .as_car()
                    .is_some_and(|c| c.kind == CarKind::BatteryTender)
            })
            .collect();
        if battery_cars.is_empty() {
            self.feed_catenary(energy.abs(), loco_pos, net);
            return;
        }
        let share = energy.abs() / battery_cars.len() as f64;
        for p in battery_cars {
            let leftover = self.vehicles[p].as_car_mut().unwrap().refill_battery(dt, share);
            if leftover > si::Energy::ZERO {
                self.feed_catenary(leftover, loco_pos, net);
            }
        }
    }

    /// Dump regenerated energy into the catenary of the vehicle's link, if
    /// it has one; otherwise the energy dissipates.
    fn feed_catenary(&mut self, energy: si::Energy, vehicle_pos: usize, net: &mut Network) {
        let host = self.host_links[vehicle_pos];
        if !net.link(host).has_catenary {
            return;
        }
        net.link_mut(host).catenary_regenerated += energy;
        if let Some(loco) = self.vehicles[vehicle_pos].as_locomotive_mut() {
            loco.ledger.regenerated += energy;
        }
    }

    // ------------------------------------------------------------------
    // statistics
    // ------------------------------------------------------------------

    /// Accumulate the step's statistics after the energy phase.
    pub fn update_stats(
        &mut self,
        dt: si::Time,
        span_free_speeds: &[si::Velocity],
        current_free_speed: si::Velocity,
        region: &str,
    ) {
        let mut consumed = si::Energy::ZERO;
        let mut regenerated = si::Energy::ZERO;
        let mut co2 = si::Mass::ZERO;
        for vehicle in &self.vehicles {
            let ledger = vehicle.ledger();
            consumed += ledger.consumed;
            regenerated += ledger.regenerated.abs();
            co2 += ledger.co2;
        }
        let step_net = consumed - regenerated;
        self.stats.step_net_energy = step_net;
        self.stats.cum_net_energy += step_net;
        self.stats.total_consumed += consumed;
        self.stats.total_regenerated += regenerated;
        self.stats.total_co2 += co2;
        *self
            .stats
            .regional_net_energy
            .entry(region.to_string())
            .or_default() += step_net;

        self.stats.cum_used_tractive_power += self.used_tractive_power;
        self.stats.trip_time += dt;

        let n_vehicles = self.vehicles.len() as f64;
        let speed_ratio = |uf: si::Velocity| (self.speed / uf).get::<si::ratio>();
        self.stats.delay_time = (1.0 - speed_ratio(current_free_speed)) * dt;
        self.stats.cum_delay_time += self.stats.delay_time;
        let max_delay: si::Time = span_free_speeds
            .iter()
            .map(|&uf| (1.0 - speed_ratio(uf)) * dt)
            .sum();
        self.stats.max_delay_time = max_delay / n_vehicles;
        self.stats.cum_max_delay_time += self.stats.max_delay_time;

        self.stats.stops = if self.prev_speed > self.speed {
            span_free_speeds
                .iter()
                .map(|&uf| ((self.prev_speed - self.speed) / uf).get::<si::ratio>())
                .sum::<f64>()
                / n_vehicles
        } else {
            0.0
        };
        self.stats.cum_stops += self.stats.stops;

        let n = (self.stats.trip_time / dt).get::<si::ratio>().max(1.0);
        self.stats.average_speed =
            self.stats.average_speed * ((n - 1.0) / n) + self.speed / n;
        self.stats.average_acceleration =
            self.stats.average_acceleration * ((n - 1.0) / n) + self.accel / n;
    }

    /// Fuel consumed so far, liters per fuel kind.
    pub fn consumed_fuel(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for vehicle in &self.vehicles {
            let (kind, tank) = match vehicle {
                RailVehicle::Locomotive(loco) => (loco.power_type.fuel(), loco.tank.as_ref()),
                RailVehicle::Car(car) => (car.kind.fuel(), car.tank.as_ref()),
            };
            if let (Some(kind), Some(tank)) = (kind, tank) {
                let name = match kind {
                    FuelKind::Diesel => "diesel",
                    FuelKind::Biodiesel => "biodiesel",
                    FuelKind::Hydrogen => "hydrogen",
                };
                *totals.entry(name.to_string()).or_default() +=
                    tank.cum_consumed.get::<si::liter>();
            }
        }
        totals
    }

    pub fn battery_energy_consumed(&self) -> si::Energy {
        self.vehicles
            .iter()
            .filter_map(|v| v.battery())
            .map(|b| b.cum_consumed)
            .sum()
    }

    pub fn battery_energy_regenerated(&self) -> si::Energy {
        self.vehicles
            .iter()
            .filter_map(|v| v.battery())
            .map(|b| b.cum_regenerated)
            .sum()
    }

    pub fn cargo_net_mass(&self) -> si::Mass {
        self.car_positions
            .iter()
            .filter_map(|&p| self.vehicles[p].as_car())
            .map(|c| c.cargo_net_mass())
            .sum()
    }

    fn average_over_tenders(&self, f: impl Fn(&Car) -> Option<f64>) -> f64 {
        let values: Vec<f64> = self
            .car_positions
            .iter()
            .filter_map(|&p| self.vehicles[p].as_car())
            .filter_map(f)
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Snapshot of totals and kinematics for emission.
    pub fn state_record(&self) -> TrainStateRecord {
        TrainStateRecord {
            train_user_id: self.user_id.clone(),
            total_length_m: self.total_length.get::<si::meter>(),
            total_mass_tons: self.total_mass.get::<si::kilogram>() / 1.0e3,
            travelled_distance_m: self.travelled.get::<si::meter>(),
            trip_time_s: self.stats.trip_time.get::<si::second>(),
            loaded: self.loaded,
            is_on: self.is_on,
            out_of_energy: self.out_of_energy,
            reached_destination: self.reached_destination,
            total_energy_consumed_kwh: self.stats.total_consumed.get::<si::kilowatt_hour>(),
            total_energy_regenerated_kwh: self
                .stats
                .total_regenerated
                .get::<si::kilowatt_hour>(),
            net_energy_consumed_kwh: self.stats.cum_net_energy.get::<si::kilowatt_hour>(),
            total_co2_emitted_kg: self.stats.total_co2.get::<si::kilogram>(),
            cum_delay_time_s: self.stats.cum_delay_time.get::<si::second>(),
            cum_max_delay_time_s: self.stats.cum_max_delay_time.get::<si::second>(),
            cum_stops: self.stats.cum_stops,
            fuel_consumed_liters: self.consumed_fuel(),
            current_speed_mps: self.speed.get::<si::meter_per_second>(),
            current_acceleration_mps2: self.accel.get::<si::meter_per_second_squared>(),
            current_tractive_force_n: self.tractive_force.get::<si::newton>(),
            current_resistance_n: self.resistance_force.get::<si::newton>(),
            current_used_tractive_power_kw: self.used_tractive_power.get::<si::kilowatt>(),
            average_tenders_battery_soc: self.average_over_tenders(|c| {
                c.kind.is_rechargeable().then(|| c.battery_soc())
            }),
            average_tenders_tank_state: self.average_over_tenders(|c| {
                c.kind.fuel().map(|_| c.tank_state_of_capacity())
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consist::{CarConfig, LocomotiveConfig};
    use crate::input::{CarSpec, LocomotiveSpec};

    pub(crate) fn diesel_train_record() -> TrainRecord {
        TrainRecord {
            user_id: "t1".into(),
            path: vec![0, 1],
            start_time_s: 0.0,
            friction_coef: 0.2,
            locomotives: vec![LocomotiveSpec {
                count: 1,
                config: LocomotiveConfig {
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
                    max_speed_mps: 100.0 / 3.0,
                    battery_max_kwh: None,
                    battery_initial_soc: None,
                    battery_c_rate: 2.0,
                    tank_max_liters: None,
                    tank_initial_fill: None,
                    hybrid_method: None,
                },
            }],
            cars: vec![CarSpec {
                count: 2,
                config: CarConfig {
                    kind: CarKind::Cargo,
                    gross_mass_tons: 100.0,
                    empty_mass_tons: 25.0,
                    drag_coef: 0.0055,
                    frontal_area_sqm: 9.0,
                    length_m: 15.0,
                    axles: 4,
                    battery_max_kwh: None,
                    battery_initial_soc: None,
                    tank_max_liters: None,
                    tank_initial_fill: None,
                },
            }],
            optimize: false,
            desired_deceleration: 0.2,
            reaction_time_s: 1.0,
            max_jerk: 2.0,
        }
    }

    #[test]
    fn composition_totals_follow_the_consist() {
        let train = Train::from_record(TrainIdx::new(0), &diesel_train_record()).unwrap();
        assert_eq!(train.n_locomotives(), 1);
        assert_eq!(train.n_cars(), 2);
        assert!(almost_eq(
            train.total_length.get::<si::meter>(),
            23.0 + 2.0 * 15.0,
            None
        ));
        // brake propagation delay rides on top of the reaction time
        let expected_ts = 1.0 + 53.0 / 343.0;
        assert!(almost_eq(
            train.t_s.get::<si::second>(),
            expected_ts,
            Some(1e-6)
        ));
    }

    #[test]
    fn single_locomotive_zero_cars_has_loco_length() {
        let mut record = diesel_train_record();
        record.cars.clear();
        let train = Train::from_record(TrainIdx::new(0), &record).unwrap();
        assert_eq!(train.n_vehicles(), 1);
        assert!(almost_eq(train.total_length.get::<si::meter>(), 23.0, None));
    }

    #[test]
    fn resistance_covers_all_vehicles() {
        let mut train = Train::from_record(TrainIdx::new(0), &diesel_train_record()).unwrap();
        let r = train.total_resistance(10.0 * uc::MPS);
        let per_vehicle: si::Force = train
            .vehicles
            .iter()
            .map(|v| v.resistance(10.0 * uc::MPS))
            .sum();
        assert!(almost_eq(
            r.get::<si::newton>(),
            per_vehicle.get::<si::newton>(),
            None
        ));
        assert!(r > si::Force::ZERO);
    }

    #[test]
    fn tractive_power_splits_equally_among_active_locos() {
        let mut record = diesel_train_record();
        record.locomotives[0].count = 2;
        let mut train = Train::from_record(TrainIdx::new(0), &record).unwrap();
        let resistance = train.total_resistance(10.0 * uc::MPS);
        let (list, total) = train.tractive_power(10.0 * uc::MPS, 0.5 * uc::MPS2, resistance);
        assert_eq!(list.len(), 2);
        assert!(almost_eq(
            list[0].get::<si::watt>(),
            list[1].get::<si::watt>(),
            None
        ));
        assert!(almost_eq(
            total.get::<si::watt>(),
            2.0 * list[0].get::<si::watt>(),
            None
        ));
    }
}
