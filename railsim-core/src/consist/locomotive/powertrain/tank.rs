use crate::imports::*;

/// Bounded liquid/gaseous fuel store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelTank {
    /// Total capacity.
    max_capacity: si::Volume,
    /// Fuel currently held. Invariant: `0 <= current <= max_capacity`.
    current: si::Volume,
    /// Fill at construction, kept for reporting.
    initial: si::Volume,
    /// Depth of discharge in (0, 1]; draws are refused once the fill ratio
    /// reaches `1 - dod`.
    dod: f64,
    /// Cumulative fuel drawn.
    pub cum_consumed: si::Volume,
}

impl FuelTank {
    pub fn new(max_capacity: si::Volume, initial_fill: f64, dod: f64) -> anyhow::Result<Self> {
        ensure!(
            dod > 0.0 && dod <= 1.0,
            "tank depth of discharge must be in (0, 1], got {dod}"
        );
        ensure!(
            max_capacity >= si::Volume::ZERO,
            "tank capacity must be non-negative"
        );
        let initial = max_capacity * initial_fill.clamp(0.0, 1.0);
        Ok(Self {
            max_capacity,
            current: initial,
            initial,
            dod,
            cum_consumed: si::Volume::ZERO,
        })
    }

    pub fn max_capacity(&self) -> si::Volume {
        self.max_capacity
    }

    pub fn current_capacity(&self) -> si::Volume {
        self.current
    }

    pub fn initial_capacity(&self) -> si::Volume {
        self.initial
    }

    /// Fill ratio in [0, 1].
    pub fn state_of_capacity(&self) -> f64 {
        if self.max_capacity > si::Volume::ZERO {
            (self.current / self.max_capacity).get::<si::ratio>()
        } else {
            0.0
        }
    }

    pub fn has_fuel(&self) -> bool {
        self.state_of_capacity() > 1.0 - self.dod
    }

    /// Whether `amount` can be drawn without crossing the DoD floor.
    pub fn is_drainable(&self, amount: si::Volume) -> bool {
        amount <= self.current && self.has_fuel()
    }

    /// Draw `amount`; returns false (and leaves the tank untouched) when
    /// the draw is not admissible.
    pub fn consume(&mut self, amount: si::Volume) -> bool {
        if !self.is_drainable(amount) {
            return false;
        }
        self.current -= amount;
        self.cum_consumed += amount;
        true
    }
}

impl Init for FuelTank {}
