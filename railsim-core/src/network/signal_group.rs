use crate::imports::*;
use crate::network::node::NodeIdx;
use crate::network::signal::SignalIdx;
use crate::train::TrainIdx;

/// Arbitrates mutually-exclusive passage through a group of junctions that
/// must be coordinated as a single unit.
///
/// Trains queue in arrival order; only the FIFO head may open its
/// direction. A stale head is dropped after a fixed timeout so a stopped or
/// rerouted train cannot starve the rest of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalGroupController {
    /// Junction nodes coordinated by this controller.
    pub nodes: BTreeSet<NodeIdx>,
    /// Signals on links incident to the member nodes.
    pub signals: Vec<SignalIdx>,
    /// Per-signal admitted movement; false means the signal must show red
    /// while any train is queued.
    movements: BTreeMap<SignalIdx, bool>,
    /// Waiting trains with their arrival (or last sync) times.
    waiting: VecDeque<(TrainIdx, si::Time)>,
    /// Last time the head train synced the controller.
    last_sync: si::Time,
    /// Queue timeout, five simulation steps.
    timeout: si::Time,
    /// Simulator time at which stale entries were last purged.
    cleared_at: si::Time,
}

impl SignalGroupController {
    pub fn new(
        nodes: BTreeSet<NodeIdx>,
        signals: Vec<SignalIdx>,
        time_step: si::Time,
    ) -> Self {
        let movements = signals.iter().map(|&s| (s, false)).collect();
        Self {
            nodes,
            signals,
            movements,
            waiting: VecDeque::new(),
            last_sync: -10.0 * uc::S,
            timeout: 5.0 * time_step,
            cleared_at: si::Time::ZERO,
        }
    }

    pub fn timeout(&self) -> si::Time {
        self.timeout
    }

    pub fn waiting_trains(&self) -> impl Iterator<Item = TrainIdx> + '_ {
        self.waiting.iter().map(|(t, _)| *t)
    }

    pub fn has_waiting_trains(&self) -> bool {
        !self.waiting.is_empty()
    }

    /// Queue a train, keeping at most one entry per train.
    pub fn add_train(&mut self, train: TrainIdx, now: si::Time) {
        if !self.waiting.iter().any(|(t, _)| *t == train) {
            self.waiting.push_back((train, now));
        }
    }

    fn clear_movements(&mut self) {
        for open in self.movements.values_mut() {
            *open = false;
        }
    }

    /// Handle a pass request from `train` standing at one of the group's
    /// signals.
    ///
    /// The FIFO head syncs the controller and opens exactly the signals
    /// lying in its own direction of travel. A non-head train waits unless
    /// the head has been silent past the timeout, in which case the head is
    /// dropped and all movements close, giving the next train its chance on
    /// the following tick.
    pub fn request_pass(
        &mut self,
        train: TrainIdx,
        now: si::Time,
        signals_in_train_direction: &[SignalIdx],
    ) {
        if self.waiting.is_empty() {
            return;
        }
        if !self.waiting.iter().any(|(t, _)| *t == train) {
            return;
        }
        if self.waiting.front().map(|(t, _)| *t) == Some(train) {
            self.last_sync = now;
            for entry in self.waiting.iter_mut() {
                entry.1 = now;
            }
            self.clear_movements();
            for signal in signals_in_train_direction {
                if let Some(open) = self.movements.get_mut(signal) {
                    *open = true;
                }
            }
        } else if now - self.last_sync > self.timeout {
            let dropped = self.waiting.pop_front();
            if let Some((stale, _)) = dropped {
                log::warn!(
                    "signal group dropped stale head train {stale:?} after timeout"
                );
            }
            self.last_sync = now;
            self.clear_movements();
        }
    }

    /// Partition the member signals into (green, red). With nothing queued
    /// every signal is green.
    pub fn get_feedback(&self) -> (Vec<SignalIdx>, Vec<SignalIdx>) {
        if self.waiting.is_empty() {
            return (self.movements.keys().copied().collect(), Vec::new());
        }
        let mut green = Vec::new();
        let mut red = Vec::new();
        for (&signal, &open) in &self.movements {
            if open {
                green.push(signal);
            } else {
                red.push(signal);
            }
        }
        (green, red)
    }

    /// Drop queue entries whose age exceeds the timeout, at most once per
    /// simulator time.
    pub fn clear_timeouts(&mut self, now: si::Time) {
        if self.cleared_at == now {
            return;
        }
        let timeout = self.timeout;
        self.waiting.retain(|&(train, since)| {
            let keep = now - since <= timeout;
            if !keep {
                log::warn!("signal group timed out waiting train {train:?}");
            }
            keep
        });
        self.cleared_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SignalGroupController {
        let nodes = BTreeSet::from([NodeIdx::new(1)]);
        let signals = vec![SignalIdx::new(0), SignalIdx::new(1)];
        SignalGroupController::new(nodes, signals, 1.0 * uc::S)
    }

    #[test]
    fn all_green_when_nothing_is_queued() {
        let c = controller();
        let (green, red) = c.get_feedback();
        assert_eq!(green.len(), 2);
        assert!(red.is_empty());
    }

    #[test]
    fn head_opens_only_its_direction() {
        let mut c = controller();
        let t0 = TrainIdx::new(0);
        let t1 = TrainIdx::new(1);
        c.add_train(t0, 0.0 * uc::S);
        c.add_train(t1, 1.0 * uc::S);
        c.request_pass(t0, 2.0 * uc::S, &[SignalIdx::new(0)]);
        let (green, red) = c.get_feedback();
        assert_eq!(green, vec![SignalIdx::new(0)]);
        assert_eq!(red, vec![SignalIdx::new(1)]);
    }

    #[test]
    fn non_head_waits_until_timeout_drops_the_head() {
        let mut c = controller();
        let t0 = TrainIdx::new(0);
        let t1 = TrainIdx::new(1);
        c.add_train(t0, 0.0 * uc::S);
        c.add_train(t1, 0.0 * uc::S);
        c.request_pass(t0, 1.0 * uc::S, &[SignalIdx::new(0)]);
        // a non-head request inside the timeout changes nothing
        c.request_pass(t1, 2.0 * uc::S, &[SignalIdx::new(1)]);
        let (green, _) = c.get_feedback();
        assert_eq!(green, vec![SignalIdx::new(0)]);
        // past the timeout the head is dropped and movements close
        c.request_pass(t1, 7.1 * uc::S, &[SignalIdx::new(1)]);
        assert_eq!(c.waiting_trains().next(), Some(t1));
        let (green, red) = c.get_feedback();
        assert!(green.is_empty());
        assert_eq!(red.len(), 2);
        // next tick the new head gets its direction
        c.request_pass(t1, 8.1 * uc::S, &[SignalIdx::new(1)]);
        let (green, _) = c.get_feedback();
        assert_eq!(green, vec![SignalIdx::new(1)]);
    }

    #[test]
    fn duplicate_adds_are_ignored() {
        let mut c = controller();
        let t0 = TrainIdx::new(0);
        c.add_train(t0, 0.0 * uc::S);
        c.add_train(t0, 5.0 * uc::S);
        assert_eq!(c.waiting_trains().count(), 1);
    }

    #[test]
    fn stale_entries_age_out_once_per_time(){
        let mut c = controller();
        let t0 = TrainIdx::new(0);
        c.add_train(t0, 0.0 * uc::S);
        c.clear_timeouts(10.0 * uc::S);
        assert!(!c.has_waiting_trains());
    }
}
