//! The simulator: advances all trains tick by tick, assembles critical
//! points, accounts energy, and arbitrates signal groups.

pub mod control;
pub mod events;
pub mod trajectory;

pub use control::SimControl;
pub use events::{event_channel, EventSender, SimEvent};
pub use trajectory::{TrajectoryRow, TrajectoryWriter};

use crate::imports::*;
use crate::input::TrainRecord;
use crate::network::{Network, NetworkStats, NodeIdx, SignalGroupController, SignalIdx};
use crate::train::{
    CriticalPoint, HoldCurrentThrottle, LookaheadCell, PolicyInput, ThrottlePolicy, Train,
    TrainIdx, TrainStateRecord, MIN_FOLLOWING_GAP,
};
use std::io::Write;
use std::sync::Arc;

/// How far ahead, in path links, the throttle policy gets to look.
const POLICY_LOOKAHEAD_LINKS: usize = 10;

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub time_step_s: f64,
    /// Wall of simulated seconds after which the run stops unless
    /// [Self::run_endlessly] is set.
    pub end_time_s: f64,
    pub run_endlessly: bool,
    /// Interval between snapshot emissions; none disables them.
    pub plot_frequency_s: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            time_step_s: 1.0,
            end_time_s: 86_400.0,
            run_endlessly: false,
            plot_frequency_s: None,
        }
    }
}

/// Geometry sampled at each vehicle's centroid for one tick.
#[derive(Debug, Default)]
struct SpannedLinks {
    curvatures: Vec<f64>,
    grades: Vec<f64>,
    free_speeds: Vec<si::Velocity>,
    links: Vec<crate::network::LinkIdx>,
}

/// Discrete-time simulator owning the network, the trains, and one signal
/// group controller per coalesced junction group. Within a tick all
/// updates run sequentially in ascending train order.
pub struct Simulator {
    pub network: Network,
    pub trains: Vec<Train>,
    policies: Vec<Box<dyn ThrottlePolicy>>,
    pub time: si::Time,
    time_step: si::Time,
    end_time: si::Time,
    run_endlessly: bool,
    plot_frequency: Option<si::Time>,
    signal_groups: Vec<SignalGroupController>,
    node_group: HashMap<NodeIdx, usize>,
    control: Arc<SimControl>,
    events: Option<EventSender>,
    trajectory: Option<TrajectoryWriter<Box<dyn Write + Send>>>,
    progress_percent: u8,
}

impl Simulator {
    /// Build a simulator: construct trains, expand their paths, and set up
    /// the signal group controllers. Fails fast on unexpandable paths and
    /// invalid geometry.
    pub fn new(
        network: Network,
        records: &[TrainRecord],
        config: SimConfig,
    ) -> Result<Self, SimError> {
        let mut trains = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let train = Train::from_record(TrainIdx::new(i as u32), record)
                .map_err(|e| SimError::InvalidGeometry(format!("train {}: {e}", record.user_id)))?;
            trains.push(train);
        }
        let policies = trains
            .iter()
            .map(|_| Box::new(HoldCurrentThrottle) as Box<dyn ThrottlePolicy>)
            .collect();
        let mut sim = Self {
            network,
            trains,
            policies,
            time: si::Time::ZERO,
            time_step: config.time_step_s * uc::S,
            end_time: config.end_time_s * uc::S,
            run_endlessly: config.run_endlessly,
            plot_frequency: config.plot_frequency_s.map(|f| f * uc::S),
            signal_groups: Vec::new(),
            node_group: HashMap::new(),
            control: Arc::new(SimControl::new()),
            events: None,
            trajectory: None,
            progress_percent: 0,
        };
        sim.setup()?;
        Ok(sim)
    }

    fn setup(&mut self) -> Result<(), SimError> {
        for ti in 0..self.trains.len() {
            let t_idx = self.trains[ti].idx;
            let path = self.network.expand_user_path(&self.trains[ti].user_path)?;
            let cum = self.network.cumulative_lengths(&path, Some(t_idx))?;
            self.trains[ti].set_path(path, cum);
        }
        self.define_signal_groups();
        self.calculate_signal_proximities();
        Ok(())
    }

    pub fn control(&self) -> Arc<SimControl> {
        Arc::clone(&self.control)
    }

    pub fn time_step(&self) -> si::Time {
        self.time_step
    }

    pub fn set_event_sender(&mut self, sender: EventSender) {
        self.events = Some(sender);
    }

    pub fn set_trajectory_writer(&mut self, writer: TrajectoryWriter<Box<dyn Write + Send>>) {
        self.trajectory = Some(writer);
    }

    /// Install a throttle-planning policy for one train.
    pub fn set_policy(&mut self, train: usize, policy: Box<dyn ThrottlePolicy>) {
        self.policies[train] = policy;
    }

    pub fn signal_groups(&self) -> &[SignalGroupController] {
        &self.signal_groups
    }

    fn emit(&self, event: SimEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    // ------------------------------------------------------------------
    // setup: signal grouping
    // ------------------------------------------------------------------

    /// For every ordered pair of trains, walk their common signalled nodes
    /// and merge consecutive ones closer than a train length or joined by
    /// a conflict zone; then coalesce overlapping sets across pairs into
    /// one controller each.
    fn define_signal_groups(&mut self) {
        let mut raw_groups: Vec<BTreeSet<NodeIdx>> = Vec::new();
        for i in 0..self.trains.len() {
            for j in 0..self.trains.len() {
                if i == j {
                    continue;
                }
                let t1 = &self.trains[i];
                let t2 = &self.trains[j];
                let commons: Vec<NodeIdx> = t1
                    .path
                    .iter()
                    .copied()
                    .filter(|n| {
                        t2.path.contains(n) && !self.network.node(*n).signals.is_empty()
                    })
                    .collect();
                if commons.is_empty() {
                    continue;
                }
                if commons.len() == 1 {
                    raw_groups.push(BTreeSet::from([commons[0]]));
                    continue;
                }
                let mut current = BTreeSet::from([commons[0]]);
                for pair in commons.windows(2) {
                    let a_pos = t1.path.iter().position(|&n| n == pair[0]).unwrap();
                    let b_pos = t1.path.iter().position(|&n| n == pair[1]).unwrap();
                    let d = Network::distance_between_path_nodes(&t1.cum_lengths, a_pos, b_pos);
                    if d < t1.total_length
                        || self.network.is_conflict_zone(&t1.path, a_pos, b_pos)
                    {
                        current.insert(pair[0]);
                        current.insert(pair[1]);
                    } else {
                        raw_groups.push(std::mem::take(&mut current));
                        current.insert(pair[1]);
                    }
                }
                raw_groups.push(current);
            }
        }

        let unified = coalesce_overlapping(raw_groups);
        for nodes in unified {
            let mut signals: Vec<SignalIdx> = Vec::new();
            for &node in &nodes {
                for &s in &self.network.node(node).signals {
                    if !signals.contains(&s) {
                        signals.push(s);
                    }
                }
            }
            let controller = SignalGroupController::new(nodes.clone(), signals, self.time_step);
            let group_idx = self.signal_groups.len();
            self.signal_groups.push(controller);
            for node in nodes {
                self.node_group.insert(node, group_idx);
            }
        }
    }

    /// Activation distance per signal: the longest safe gap any train
    /// using that signal would need at the link's free-flow speed.
    fn calculate_signal_proximities(&mut self) {
        for s in 0..self.network.signals.len() {
            let (node, prev_node, link) = {
                let sig = &self.network.signals[s];
                (sig.node, sig.prev_node, sig.link)
            };
            let link_speed = self.network.link(link).free_flow_speed;
            let mut activation = self.network.signals[s].proximity_to_activate;
            for train in &self.trains {
                if train.path.contains(&node) && train.path.contains(&prev_node) {
                    activation =
                        activation.max(train.safe_gap(MIN_FOLLOWING_GAP, train.speed, link_speed, true));
                }
            }
            self.network.signals[s].proximity_to_activate = activation;
        }
    }

    // ------------------------------------------------------------------
    // the loop
    // ------------------------------------------------------------------

    /// Every train has either completed its trip or lost all traction.
    pub fn all_trains_done(&self) -> bool {
        self.trains
            .iter()
            .all(|t| t.reached_destination || t.out_of_energy)
    }

    /// Run until all trains are done, the end time passes, or the operator
    /// cancels. Returns the per-train completion records.
    pub fn run(&mut self) -> Result<Vec<TrainStateRecord>, SimError> {
        while self.time <= self.end_time || self.run_endlessly {
            self.control.wait_if_paused();
            if self.control.is_cancelled() {
                break;
            }
            if self.all_trains_done() {
                break;
            }
            self.step()?;
        }
        if let Some(trajectory) = &mut self.trajectory {
            let _ = trajectory.flush();
        }
        let records: Vec<TrainStateRecord> =
            self.trains.iter().map(|t| t.state_record()).collect();
        self.emit(SimEvent::Finished {
            time: self.time,
            records: records.clone(),
            network: self.network.stats(),
        });
        Ok(records)
    }

    /// One tick: drive every unfinished train, arbitrate signals, detect
    /// collisions, and advance the clock.
    pub fn step(&mut self) -> Result<(), SimError> {
        for ti in 0..self.trains.len() {
            if self.trains[ti].reached_destination {
                continue;
            }
            self.refresh_throttle_plan(ti);
            self.play_train_one_step(ti)?;
            self.forward_warnings(ti);
        }

        self.emit_snapshot_if_due();
        self.run_signals_for_trains();
        self.report_progress();
        self.check_collisions();

        // fast-forward an idle clock to the next departure
        if !self
            .trains
            .iter()
            .any(|t| t.loaded && !t.reached_destination)
        {
            let next_start = self
                .trains
                .iter()
                .filter(|t| !t.loaded && !t.reached_destination)
                .map(|t| t.start_time.value)
                .fold(f64::INFINITY, f64::min);
            if next_start.is_finite() && next_start > self.time.value {
                self.time = next_start * uc::S;
            }
        }

        self.time += self.time_step;
        Ok(())
    }

    fn forward_warnings(&mut self, ti: usize) {
        let warnings: Vec<SimError> = self.trains[ti].warnings.drain(..).collect();
        for error in warnings {
            self.emit(SimEvent::Warning {
                time: self.time,
                error,
            });
        }
    }

    /// Ask the policy for a fresh throttle schedule when the old one has
    /// drained.
    fn refresh_throttle_plan(&mut self, ti: usize) {
        if !self.trains[ti].optimize || !self.trains[ti].throttle_schedule.is_empty() {
            return;
        }
        let train = &self.trains[ti];
        if !train.loaded {
            return;
        }
        let input = PolicyInput {
            speed: train.speed,
            acceleration: train.accel,
            current_throttle: train.first_locomotive().discretized_throttle(train.speed).1,
            distance_to_end: train.total_path_length - train.travelled,
        };
        let mut lookahead = Vec::new();
        let start = train.head_prev_pos;
        for pair_start in start..train.path.len().saturating_sub(1) {
            if lookahead.len() >= POLICY_LOOKAHEAD_LINKS {
                break;
            }
            let Ok(link) = self.network.link_between(
                train.path[pair_start],
                train.path[pair_start + 1],
                Some(train.idx),
            ) else {
                break;
            };
            let link_ref = self.network.link(link);
            lookahead.push(LookaheadCell {
                grade: link_ref.grade_from(train.path[pair_start]),
                curvature: link_ref.curvature,
                free_flow_speed: link_ref.free_flow_speed,
            });
        }
        let schedule = self.policies[ti].plan(&input, &lookahead);
        self.trains[ti].throttle_schedule = schedule.into();
    }

    // ------------------------------------------------------------------
    // per-train tick
    // ------------------------------------------------------------------

    fn play_train_one_step(&mut self, ti: usize) -> Result<(), SimError> {
        let t_idx = self.trains[ti].idx;
        let dt = self.time_step;

        if self.time >= self.trains[ti].start_time && !self.trains[ti].loaded {
            // a second train on the same origin waits until the earlier
            // one has cleared a full train length
            if !self.departure_blocked(ti) {
                self.load_train(ti)?;
            }
        }
        if !self.trains[ti].loaded || self.trains[ti].start_time > self.time {
            return Ok(());
        }

        let span = {
            let Simulator {
                network, trains, ..
            } = self;
            spanned_links(network, &mut trains[ti], t_idx)?
        };
        let head_link = {
            let train = &self.trains[ti];
            self.network
                .link_on_path(&train.path, &train.cum_lengths, train.travelled, Some(t_idx), 0)?
                .0
        };
        let current_link_speed = self.network.link(head_link).free_flow_speed;
        self.trains[ti].set_current_links(&span.links);
        let span_min_speed = span
            .free_speeds
            .iter()
            .copied()
            .fold(current_link_speed, si::Velocity::min);
        let current_free_speed = span_min_speed;

        // advance the memoized head/tail path positions
        {
            let train = &mut self.trains[ti];
            train.head_prev_pos =
                Network::prev_node_pos(&train.cum_lengths, train.head_prev_pos, train.travelled);
            let tail_travelled = (train.travelled - train.total_length).max(si::Length::ZERO);
            train.tail_prev_pos = Network::prev_node_pos(
                &train.cum_lengths,
                train.tail_prev_pos.min(train.head_prev_pos),
                tail_travelled,
            );
        }

        // critical points: lower-speed segments, the nearest train, and
        // the next stopping node
        let (stop_pos, stop_is_signal) = self.next_stopping_node(ti);
        let mut critical_points = Vec::new();
        for (pos, speed) in self.lower_speed_nodes(ti, stop_pos) {
            let train = &self.trains[ti];
            critical_points.push(CriticalPoint {
                gap: Network::distance_to_path_node(&train.cum_lengths, pos, train.travelled),
                is_leading_train: false,
                leader_speed: speed,
            });
        }
        if let Some((gap, leader_speed)) = self.ahead_train_gap(ti) {
            critical_points.push(CriticalPoint {
                gap,
                is_leading_train: true,
                leader_speed,
            });
        }
        let stop_gap = {
            let train = &self.trains[ti];
            Network::distance_to_path_node(&train.cum_lengths, stop_pos, train.travelled)
        };
        critical_points.push(CriticalPoint::stop_at(stop_gap));

        // a red signal within one step of a decelerating or stopped train
        // snaps it to a halt; a numerically-stalled train with nothing
        // else ahead gets nudged over the remaining gap
        let mut skip_move = false;
        {
            let train = &mut self.trains[ti];
            let rounded =
                |v: si::Velocity| (v.get::<si::meter_per_second>() * 1000.0).round() == 0.0;
            if stop_is_signal {
                if (train.accel < si::Acceleration::ZERO && stop_gap <= train.speed * dt)
                    || (train.speed == si::Velocity::ZERO && stop_gap <= 1.0 * uc::M)
                {
                    train.immediate_stop();
                    skip_move = true;
                }
            } else if critical_points.len() == 1
                && train.accel < si::Acceleration::ZERO
                && rounded(train.prev_speed)
                && rounded(train.speed)
            {
                train.kick_forward(stop_gap);
            }
        }

        if !skip_move {
            self.trains[ti].update_grades_curvatures(&span.grades, &span.curvatures)?;
            self.trains[ti].reset_power_restriction();
            self.derate_for_available_energy(ti, dt, current_free_speed, &critical_points);
            self.trains[ti].move_train(dt, current_free_speed, &critical_points);
        }

        let newly_reached = {
            let train = &mut self.trains[ti];
            if !train.reached_destination
                && train.travelled >= train.total_path_length - 1.0e-4 * uc::M
            {
                train.travelled = train.total_path_length;
                train.reached_destination = true;
            }
            train.reached_destination
        };

        if !newly_reached {
            let Simulator {
                network, trains, ..
            } = self;
            let train = &mut trains[ti];
            train.coord =
                network.position_on_path(&train.path, &train.cum_lengths, train.travelled, Some(t_idx))?;
            let tail_travelled = (train.travelled - train.total_length).max(si::Length::ZERO);
            let tail =
                network.position_on_path(&train.path, &train.cum_lengths, tail_travelled, Some(t_idx))?;
            train.head_tail = [train.coord, tail];
        }

        // energy accounting and statistics for the step
        {
            let Simulator {
                network, trains, ..
            } = self;
            let train = &mut trains[ti];
            let region = train
                .first_link()
                .map(|l| network.link(l).region.clone())
                .unwrap_or_default();
            let resistance = train.resistance_force;
            let speed = train.speed;
            let accel = train.accel;
            train.tractive_power(speed, accel, resistance);
            let still_on = train.consume_energy(dt, network);
            train.is_on = still_on;
            train.update_stats(dt, &span.free_speeds, current_free_speed, &region);
        }

        if !newly_reached {
            // re-span the links after the move and refresh occupancy
            let span_after = {
                let Simulator {
                    network, trains, ..
                } = self;
                spanned_links(network, &mut trains[ti], t_idx)?
            };
            self.trains[ti].set_current_links(&span_after.links);
            self.update_occupancy(ti);
        } else {
            self.release_occupancy(ti);
            let record = self.trains[ti].state_record();
            self.emit(SimEvent::TrainCompleted {
                time: self.time,
                record,
            });
        }

        self.write_trajectory_row(ti, current_free_speed, &span);
        Ok(())
    }

    /// When the step's estimated demand exceeds what the sources can
    /// supply, derate the locomotives by the supply ratio for this step.
    fn derate_for_available_energy(
        &mut self,
        ti: usize,
        dt: si::Time,
        free_speed: si::Velocity,
        critical_points: &[CriticalPoint],
    ) {
        let Simulator {
            network, trains, ..
        } = self;
        let train = &mut trains[ti];
        let step_accel = train.step_acceleration(dt, free_speed, critical_points);
        let step_speed = (train.speed + step_accel * dt)
            .max(si::Velocity::ZERO)
            .min(free_speed);
        let resistance = train.resistance_force;
        let (powers, _) = train.tractive_power(step_speed, step_accel, resistance);
        let step_energy = train.total_energy_consumption(dt, step_speed, &powers);
        let available = train.max_provided_energy(dt, network);
        if step_energy > available && step_energy > si::Energy::ZERO {
            let ratio = (available / step_energy).get::<si::ratio>().clamp(0.0, 1.0);
            train.reduce_power(ratio);
        }
    }

    fn departure_blocked(&self, ti: usize) -> bool {
        let origin = self.trains[ti].path[0];
        self.trains.iter().enumerate().any(|(j, other)| {
            j != ti
                && other.loaded
                && !other.reached_destination
                && other.path[0] == origin
                && other.travelled <= other.total_length
        })
    }

    fn load_train(&mut self, ti: usize) -> Result<(), SimError> {
        let t_idx = self.trains[ti].idx;
        let (path, cum) = {
            let train = &self.trains[ti];
            let path = train.path.clone();
            let cum = self.network.cumulative_lengths(&path, Some(t_idx))?;
            (path, cum)
        };
        let first_link = self.network.link_between(path[0], path[1], Some(t_idx))?;
        {
            let train = &mut self.trains[ti];
            train.set_path(path, cum);
            train.loaded = true;
            train.coord = self.network.node(train.path[0]).coord;
            train.head_tail = [train.coord; 2];
            train.head_prev_pos = 0;
            train.tail_prev_pos = 0;
            train.set_current_links(&[first_link]);
        }
        self.update_occupancy(ti);
        Ok(())
    }

    fn update_occupancy(&mut self, ti: usize) {
        let t_idx = self.trains[ti].idx;
        let previous = self.trains[ti].previous_links.clone();
        for link in previous {
            self.network.link_mut(link).current_trains.remove(&t_idx);
        }
        let current = self.trains[ti].current_links.clone();
        for link in current {
            self.network.link_mut(link).current_trains.insert(t_idx);
        }
    }

    fn release_occupancy(&mut self, ti: usize) {
        let t_idx = self.trains[ti].idx;
        let previous = self.trains[ti].previous_links.clone();
        for link in previous {
            self.network.link_mut(link).current_trains.remove(&t_idx);
        }
    }

    // ------------------------------------------------------------------
    // critical-point helpers
    // ------------------------------------------------------------------

    /// Path position of the next stop: the first terminal ahead, or the
    /// first red signal governing this train's movement. Defaults to the
    /// destination.
    fn next_stopping_node(&self, ti: usize) -> (usize, bool) {
        let train = &self.trains[ti];
        for i in (train.head_prev_pos + 1)..train.path.len() {
            let node = self.network.node(train.path[i]);
            if node.is_terminal {
                return (i, false);
            }
            if !node.signals.is_empty() {
                for &s in &node.signals {
                    let signal = self.network.signal(s);
                    if signal.governs(train.path[i - 1], train.path[i]) {
                        if !signal.is_green {
                            return (i, true);
                        }
                        break;
                    }
                }
            }
        }
        (train.path.len() - 1, false)
    }

    /// Path nodes before the next stop whose outbound link is slower than
    /// their inbound link, with the lower speed.
    fn lower_speed_nodes(&self, ti: usize, stop_pos: usize) -> Vec<(usize, si::Velocity)> {
        let train = &self.trains[ti];
        let mut out = Vec::new();
        for i in (train.head_prev_pos + 1)..train.path.len() {
            if i == stop_pos || i + 1 >= train.path.len() {
                break;
            }
            let Ok(inbound) =
                self.network
                    .link_between(train.path[i - 1], train.path[i], Some(train.idx))
            else {
                continue;
            };
            let Ok(outbound) =
                self.network
                    .link_between(train.path[i], train.path[i + 1], Some(train.idx))
            else {
                continue;
            };
            let outbound_speed = self.network.link(outbound).free_flow_speed;
            if outbound_speed < self.network.link(inbound).free_flow_speed {
                out.push((i, outbound_speed));
            }
        }
        out
    }

    /// Nearest other loaded train, as the minimum planar distance from
    /// this train's head to the other's head or tail.
    fn ahead_train_gap(&self, ti: usize) -> Option<(si::Length, si::Velocity)> {
        let me = &self.trains[ti];
        let mut best: Option<(f64, si::Velocity)> = None;
        for (j, other) in self.trains.iter().enumerate() {
            if j == ti || !other.loaded || other.reached_destination {
                continue;
            }
            let d = me
                .coord
                .distance_to(other.head_tail[0])
                .min(me.coord.distance_to(other.head_tail[1]));
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, other.speed));
            }
        }
        best.map(|(d, speed)| (d * uc::M, speed))
    }

    // ------------------------------------------------------------------
    // signal arbitration
    // ------------------------------------------------------------------

    /// Per-tick arbitration: all signals start green, then every loaded
    /// train requests passage at the next signal ahead of its head and
    /// tail; the controllers' red feedback turns signals off.
    fn run_signals_for_trains(&mut self) {
        for signal in &mut self.network.signals {
            signal.is_green = true;
        }
        let now = self.time;
        for ti in 0..self.trains.len() {
            if !self.trains[ti].loaded || self.trains[ti].reached_destination {
                continue;
            }
            let head_distance = self.trains[ti].travelled;
            let front = self.closest_signal(ti, head_distance);
            let tail_distance = self.trains[ti].travelled - self.trains[ti].total_length;
            let back = if tail_distance > si::Length::ZERO {
                self.closest_signal(ti, tail_distance)
            } else {
                None
            };
            if front.is_none() && back.is_none() {
                continue;
            }

            let mut front_group = None;
            if let Some((signal, node_pos)) = front {
                front_group =
                    self.process_pass_request(ti, signal, node_pos, head_distance, now, None);
            }
            if let Some((signal, node_pos)) = back {
                self.process_pass_request(ti, signal, node_pos, tail_distance, now, front_group);
            }
        }
    }

    /// Route one end's pass request through the signal's group controller.
    /// Returns the group index handled, for deduplication between the two
    /// train ends.
    fn process_pass_request(
        &mut self,
        ti: usize,
        signal: SignalIdx,
        node_pos: usize,
        from_distance: si::Length,
        now: si::Time,
        skip_group: Option<usize>,
    ) -> Option<usize> {
        let t_idx = self.trains[ti].idx;
        let node = self.network.signal(signal).node;
        let &group_idx = self.node_group.get(&node)?;
        if skip_group == Some(group_idx) {
            return Some(group_idx);
        }
        let distance = {
            let train = &self.trains[ti];
            Network::distance_to_path_node(&train.cum_lengths, node_pos, from_distance)
        };
        let Simulator {
            network,
            trains,
            signal_groups,
            ..
        } = self;
        let group = &mut signal_groups[group_idx];
        group.clear_timeouts(now);
        if distance <= network.signal(signal).proximity_to_activate {
            group.add_train(t_idx, now);
        }
        let same_direction = signals_in_train_direction(network, &trains[ti], &group.signals);
        group.request_pass(t_idx, now, &same_direction);
        let (_, red) = group.get_feedback();
        for s in red {
            network.signal_mut(s).is_green = false;
        }
        Some(group_idx)
    }

    /// First signal ahead of `from_distance` that governs this train's
    /// direction of travel, with the path position of its node.
    fn closest_signal(&self, ti: usize, from_distance: si::Length) -> Option<(SignalIdx, usize)> {
        let train = &self.trains[ti];
        let start = Network::prev_node_pos(&train.cum_lengths, 0, from_distance) + 1;
        for i in start..train.path.len() {
            for &s in &self.network.node(train.path[i]).signals {
                if self
                    .network
                    .signal(s)
                    .governs(train.path[i - 1], train.path[i])
                {
                    return Some((s, i));
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // collisions, snapshots, progress
    // ------------------------------------------------------------------

    /// Report every pair of loaded trains whose head-tail segments
    /// intersect while sharing a link. The run continues; the operator
    /// decides whether to cancel.
    fn check_collisions(&mut self) {
        for i in 0..self.trains.len() {
            for j in (i + 1)..self.trains.len() {
                let (a, b) = (&self.trains[i], &self.trains[j]);
                if !a.loaded
                    || !b.loaded
                    || a.reached_destination
                    || b.reached_destination
                    || self.time <= a.start_time
                    || self.time <= b.start_time
                {
                    continue;
                }
                let geometry_hit = utils::segments_intersect(
                    a.head_tail[0],
                    a.head_tail[1],
                    b.head_tail[0],
                    b.head_tail[1],
                );
                let share_link = a
                    .current_links
                    .iter()
                    .any(|l| b.current_links.contains(l));
                if geometry_hit && share_link {
                    log::warn!("trains {} and {} collided", a.user_id, b.user_id);
                    self.emit(SimEvent::Collision {
                        time: self.time,
                        first: a.user_id.clone(),
                        second: b.user_id.clone(),
                    });
                }
            }
        }
    }

    fn emit_snapshot_if_due(&self) {
        let Some(frequency) = self.plot_frequency else {
            return;
        };
        if self.time.value.rem_euclid(frequency.value) >= self.time_step.value {
            return;
        }
        let positions: Vec<(String, [Coord; 2])> = self
            .trains
            .iter()
            .filter(|t| t.loaded)
            .map(|t| (t.user_id.clone(), t.head_tail))
            .collect();
        self.emit(SimEvent::TrainsSnapshot {
            time: self.time,
            positions,
        });
    }

    fn report_progress(&mut self) {
        let total: f64 = self
            .trains
            .iter()
            .map(|t| t.total_path_length.value)
            .sum();
        if total <= 0.0 {
            return;
        }
        let travelled: f64 = self.trains.iter().map(|t| t.travelled.value).sum();
        let percent = ((travelled / total) * 100.0).clamp(0.0, 100.0) as u8;
        if percent != self.progress_percent {
            self.progress_percent = percent;
            self.emit(SimEvent::Progress { percent });
        }
    }

    fn write_trajectory_row(
        &mut self,
        ti: usize,
        current_free_speed: si::Velocity,
        span: &SpannedLinks,
    ) {
        let Some(writer) = &mut self.trajectory else {
            return;
        };
        let train = &self.trains[ti];
        let row = TrajectoryRow {
            train_id: train.user_id.clone(),
            time_s: self.time.get::<si::second>(),
            travelled_distance_m: train.travelled.get::<si::meter>(),
            acceleration_mps2: train.accel.get::<si::meter_per_second_squared>(),
            speed_mps: train.speed.get::<si::meter_per_second>(),
            link_max_speed_mps: current_free_speed.get::<si::meter_per_second>(),
            energy_consumption_kwh: train.stats.step_net_energy.get::<si::kilowatt_hour>(),
            max_delay_time_s: train.stats.max_delay_time.get::<si::second>(),
            delay_time_s: train.stats.delay_time.get::<si::second>(),
            stops: train.stats.stops,
            tractive_force_n: train.tractive_force.get::<si::newton>(),
            resistance_n: train.resistance_force.get::<si::newton>(),
            used_tractive_power_kw: train.used_tractive_power.get::<si::kilowatt>(),
            grade_at_tip: span.grades.first().copied().unwrap_or(0.0),
            curvature_at_tip: span.curvatures.first().copied().unwrap_or(0.0),
            first_loco_notch: train.first_locomotive().current_notch,
            optimization_enabled: train.optimize,
        };
        if let Err(e) = writer.write_row(&row) {
            log::warn!("trajectory write failed: {e}");
        }
    }
}

/// Geometry at each vehicle's centroid: the link it sits on, with the
/// grade signed along the train's direction of travel.
fn spanned_links(
    network: &Network,
    train: &mut Train,
    t_idx: TrainIdx,
) -> Result<SpannedLinks, SimError> {
    let mut span = SpannedLinks::default();
    for i in 0..train.vehicles.len() {
        let distance = (train.travelled - train.centroids[i])
            .max(si::Length::ZERO)
            .min(train.total_path_length);
        let (link, entry_pos) =
            network.link_on_path(&train.path, &train.cum_lengths, distance, Some(t_idx), 0)?;
        let entry = train.path[entry_pos];
        let grade = train.directional_grade(network, link, entry);
        let link_ref = network.link(link);
        span.curvatures.push(link_ref.curvature);
        span.grades.push(grade);
        span.free_speeds.push(link_ref.free_flow_speed);
        span.links.push(link);
    }
    Ok(span)
}

/// Signals of a group lying in the train's own direction of travel: both
/// of the signal's nodes are on the path, with the signal node downstream
/// of its previous node.
fn signals_in_train_direction(
    network: &Network,
    train: &Train,
    group_signals: &[SignalIdx],
) -> Vec<SignalIdx> {
    group_signals
        .iter()
        .copied()
        .filter(|&s| {
            let signal = network.signal(s);
            let at = train.path.iter().position(|&n| n == signal.node);
            let prev = train.path.iter().position(|&n| n == signal.prev_node);
            matches!((at, prev), (Some(at), Some(prev)) if at > prev)
        })
        .collect()
}

/// Union-coalesce overlapping node sets to a fixed point; each surviving
/// set becomes one controller.
fn coalesce_overlapping(mut sets: Vec<BTreeSet<NodeIdx>>) -> Vec<BTreeSet<NodeIdx>> {
    let mut changed = true;
    while changed {
        changed = false;
        'outer: for i in 0..sets.len() {
            if sets[i].is_empty() {
                continue;
            }
            for j in (i + 1)..sets.len() {
                if sets[j].is_empty() {
                    continue;
                }
                if !sets[i].is_disjoint(&sets[j]) {
                    let merged = std::mem::take(&mut sets[j]);
                    sets[i].extend(merged);
                    changed = true;
                    continue 'outer;
                }
            }
        }
    }
    sets.retain(|s| !s.is_empty());
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_merges_transitive_overlaps() {
        let a = BTreeSet::from([NodeIdx::new(1), NodeIdx::new(2)]);
        let b = BTreeSet::from([NodeIdx::new(2), NodeIdx::new(3)]);
        let c = BTreeSet::from([NodeIdx::new(3), NodeIdx::new(4)]);
        let d = BTreeSet::from([NodeIdx::new(9)]);
        let out = coalesce_overlapping(vec![a, b, c, d.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 4);
        assert_eq!(out[1], d);
    }
}
