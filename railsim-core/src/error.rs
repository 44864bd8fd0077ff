use thiserror::Error;

/// Error kinds surfaced at the simulator boundary.
///
/// Only [SimError::PathNotFound] and [SimError::InvalidGeometry] abort a
/// simulation; the remaining kinds are recovered locally and reported
/// through the event channel or the log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// A user-supplied path cannot be expanded into a connected link
    /// sequence. Fatal at startup.
    #[error("no path in the network between nodes {from} and {to}")]
    PathNotFound { from: i64, to: i64 },

    /// A link's length is non-positive or per-vehicle geometry does not
    /// match the vehicle count. Fatal at startup.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Every locomotive of a train has been turned off. The train coasts
    /// and the simulation continues.
    #[error("train {train} is out of energy")]
    OutOfEnergy { train: String },

    /// The jerk limit would be exceeded after all smoothing. The
    /// jerk-limited value is still used.
    #[error("train {train} exceeded the jerk limit ({jerk} m/s^3)")]
    SuddenAcceleration { train: String, jerk: f64 },

    /// Resistance stayed above maximum tractive force at low speed.
    #[error("train {train} resistance exceeds tractive force at {at_meters} m")]
    ResistanceExceedsTraction { train: String, at_meters: f64 },

    /// Two trains' segments intersect while sharing a link.
    #[error("trains {first} and {second} collided")]
    Collision { first: String, second: String },

    /// A waiting train exceeded the signal-group FIFO timeout. Handled by
    /// the controller dropping the entry.
    #[error("train {train} starved in a signal-group queue")]
    SignalStarvation { train: String },

    /// Post-deserialization fixup failed.
    #[error("init failed: {0}")]
    InitError(String),

    /// Serialization or deserialization failed.
    #[error("serde failed: {0}")]
    SerdeError(String),
}

impl SimError {
    /// Whether this error must abort the simulation rather than being
    /// recovered locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::PathNotFound { .. } | SimError::InvalidGeometry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_startup_errors_are_fatal() {
        assert!(SimError::PathNotFound { from: 1, to: 2 }.is_fatal());
        assert!(SimError::InvalidGeometry("len".into()).is_fatal());
        assert!(!SimError::OutOfEnergy {
            train: "t1".into()
        }
        .is_fatal());
        assert!(!SimError::Collision {
            first: "a".into(),
            second: "b".into()
        }
        .is_fatal());
    }
}
