//! Pluggable throttle-planning policy.
//!
//! The simulator periodically asks the policy for a schedule of throttle
//! levels over a lookahead horizon; the train then caps its discrete
//! throttle by the planned level each step. The core ships only the seam
//! and a trivial hold-current policy; search-based planners implement
//! [ThrottlePolicy] externally.

use crate::imports::*;

/// Train state handed to the policy at planning time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyInput {
    pub speed: si::Velocity,
    pub acceleration: si::Acceleration,
    /// Discrete throttle level the train is currently driving with.
    pub current_throttle: f64,
    /// Remaining distance to the end of the path.
    pub distance_to_end: si::Length,
}

/// Track conditions for one future tick of the lookahead horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookaheadCell {
    pub grade: f64,
    pub curvature: f64,
    pub free_flow_speed: si::Velocity,
}

/// A throttle planner. Implementations return one throttle level per
/// future tick; an empty result leaves the current throttle in place.
pub trait ThrottlePolicy: Send {
    fn plan(&mut self, input: &PolicyInput, lookahead: &[LookaheadCell]) -> Vec<f64>;
}

/// The identity policy: keep driving at the currently-selected discrete
/// throttle.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldCurrentThrottle;

impl ThrottlePolicy for HoldCurrentThrottle {
    fn plan(&mut self, input: &PolicyInput, _lookahead: &[LookaheadCell]) -> Vec<f64> {
        vec![input.current_throttle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_policy_returns_the_current_throttle() {
        let mut policy = HoldCurrentThrottle;
        let input = PolicyInput {
            speed: 10.0 * uc::MPS,
            acceleration: si::Acceleration::ZERO,
            current_throttle: 0.5625,
            distance_to_end: 1000.0 * uc::M,
        };
        let plan = policy.plan(&input, &[]);
        assert_eq!(plan, vec![0.5625]);
    }
}
