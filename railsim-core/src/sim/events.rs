//! Side-channel emissions from the simulator. Events never alter simulator
//! state and may be dropped by a slow or absent consumer.

use crate::imports::*;
use crate::network::NetworkStats;
use crate::train::TrainStateRecord;
use std::sync::mpsc;

/// Everything the simulator publishes while running.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Fleet progress toward the summed path lengths, in percent.
    Progress { percent: u8 },
    /// Head/tail positions of every loaded train.
    TrainsSnapshot {
        time: si::Time,
        positions: Vec<(String, [Coord; 2])>,
    },
    /// A train reached its destination.
    TrainCompleted {
        time: si::Time,
        record: TrainStateRecord,
    },
    /// Two trains' segments intersected while sharing a link.
    Collision {
        time: si::Time,
        first: String,
        second: String,
    },
    /// A non-fatal condition was recovered locally.
    Warning { time: si::Time, error: SimError },
    /// The run ended: per-train records plus network totals.
    Finished {
        time: si::Time,
        records: Vec<TrainStateRecord>,
        network: NetworkStats,
    },
}

/// Sender half of the event channel; send failures are ignored because
/// emissions are advisory.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::Sender<SimEvent>);

impl EventSender {
    pub fn send(&self, event: SimEvent) {
        let _ = self.0.send(event);
    }
}

/// Create the event channel for one simulator.
pub fn event_channel() -> (EventSender, mpsc::Receiver<SimEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSender(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receiver_does_not_poison_the_sender() {
        let (tx, rx) = event_channel();
        drop(rx);
        tx.send(SimEvent::Progress { percent: 50 });
    }
}
