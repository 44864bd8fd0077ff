use crate::imports::*;

/// Where recharge energy comes from; determines which cumulative counter
/// the accepted energy lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RechargeSource {
    /// Recovered braking energy.
    Regenerated,
    /// Diverted generator output on a hybrid locomotive.
    FromEngine,
}

/// Outcome of a discharge request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DischargeOutcome {
    /// The full request was delivered.
    Accepted,
    /// The per-step C-rate cap bound the delivery.
    Partial {
        delivered: si::Energy,
        shortfall: si::Energy,
    },
    /// SOC is at or below the depth-of-discharge floor, or the request
    /// exceeds the stored charge; nothing was delivered.
    Refused,
}

impl DischargeOutcome {
    /// Energy the caller still has to source elsewhere.
    pub fn shortfall(&self, requested: si::Energy) -> si::Energy {
        match self {
            DischargeOutcome::Accepted => si::Energy::ZERO,
            DischargeOutcome::Partial { shortfall, .. } => *shortfall,
            DischargeOutcome::Refused => requested,
        }
    }

    pub fn delivered_any(&self) -> bool {
        !matches!(self, DischargeOutcome::Refused)
    }
}

/// Bounded energy store with charge/discharge C-rate limits and an SOC
/// recharge hysteresis window.
///
/// Sign convention on the net counter: consumption positive, so discharging
/// increments [Self::cum_consumed] and [Self::cum_net] while recharging
/// decrements [Self::cum_net].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    /// Total energy capacity.
    max_capacity: si::Energy,
    /// Energy currently stored. Invariant: `0 <= current <= max_capacity`.
    current: si::Energy,
    /// Stored charge at construction, kept for reporting.
    initial: si::Energy,
    /// Depth of discharge in (0, 1]; discharge is refused at
    /// `SOC <= 1 - dod`.
    dod: f64,
    /// Discharge C-rate in 1/h.
    discharge_c_rate: f64,
    /// Recharge C-rate in 1/h; half the discharge rate by default.
    recharge_c_rate: f64,
    /// SOC above which recharge requests are refused.
    soc_upper_bound: f64,
    /// SOC at or below which the recharge-enable latch sets.
    soc_lower_bound: f64,
    /// Hysteresis latch: set when SOC crosses the lower bound, cleared at
    /// the upper bound.
    recharge_enabled: bool,
    /// Cumulative energy drawn from the store.
    pub cum_consumed: si::Energy,
    /// Cumulative regenerated energy accepted.
    pub cum_regenerated: si::Energy,
    /// Cumulative net consumption (consumed minus all recharge).
    pub cum_net: si::Energy,
}

impl Battery {
    /// Build a battery at `initial_soc`, with recharge bounds clamped into
    /// the feasible SOC band `[1 - dod, dod]` and ordered.
    pub fn new(
        max_capacity: si::Energy,
        initial_soc: f64,
        dod: f64,
        discharge_c_rate: f64,
        soc_upper_bound: f64,
        soc_lower_bound: f64,
    ) -> anyhow::Result<Self> {
        ensure!(
            dod > 0.0 && dod <= 1.0,
            "{}\ndepth of discharge must be in (0, 1], got {dod}",
            format_dbg!()
        );
        ensure!(
            max_capacity >= si::Energy::ZERO,
            "{}\nbattery capacity must be non-negative",
            format_dbg!()
        );
        let clamp = |soc: f64| soc.clamp(1.0 - dod, dod);
        let lower = clamp(soc_lower_bound);
        let upper = clamp(soc_upper_bound).max(lower);
        let initial = max_capacity * initial_soc.clamp(0.0, 1.0);
        Ok(Self {
            max_capacity,
            current: initial,
            initial,
            dod,
            discharge_c_rate,
            recharge_c_rate: 0.5 * discharge_c_rate,
            soc_upper_bound: upper,
            soc_lower_bound: lower,
            recharge_enabled: false,
            cum_consumed: si::Energy::ZERO,
            cum_regenerated: si::Energy::ZERO,
            cum_net: si::Energy::ZERO,
        })
    }

    pub fn max_capacity(&self) -> si::Energy {
        self.max_capacity
    }

    pub fn current_charge(&self) -> si::Energy {
        self.current
    }

    pub fn initial_charge(&self) -> si::Energy {
        self.initial
    }

    pub fn soc(&self) -> f64 {
        if self.max_capacity > si::Energy::ZERO {
            (self.current / self.max_capacity).get::<si::ratio>()
        } else {
            0.0
        }
    }

    /// Override the recharge C-rate, e.g. for packs whose charge path is
    /// not symmetric with discharge.
    pub fn set_recharge_c_rate(&mut self, c_rate: f64) {
        self.recharge_c_rate = c_rate;
    }

    /// Max energy deliverable in one step of length `dt`.
    pub fn max_discharge(&self, dt: si::Time) -> si::Energy {
        self.max_capacity * self.discharge_c_rate * (dt / (1.0 * uc::HR))
    }

    /// Max energy acceptable in one step of length `dt`.
    pub fn max_recharge(&self, dt: si::Time) -> si::Energy {
        self.max_capacity * self.recharge_c_rate * (dt / (1.0 * uc::HR))
    }

    /// Whether the store still holds usable charge above the DoD floor.
    pub fn has_charge(&self) -> bool {
        self.soc() > 1.0 - self.dod
    }

    /// Whether `requested` can be drawn without crossing the DoD floor.
    /// Also updates the recharge-enable latch.
    pub fn is_drainable(&mut self, requested: si::Energy) -> bool {
        self.update_recharge_latch();
        requested <= self.current && self.has_charge()
    }

    /// Whether recharge is currently admissible (SOC below the upper
    /// bound). Also updates the recharge-enable latch.
    pub fn is_rechargeable(&mut self) -> bool {
        self.update_recharge_latch();
        self.soc() <= self.soc_upper_bound
    }

    /// Hysteresis: sets the latch when SOC falls to the lower bound and
    /// clears it when SOC reaches the upper bound. Returns the latch.
    pub fn update_recharge_latch(&mut self) -> bool {
        let soc = self.soc();
        if soc >= self.soc_upper_bound {
            self.recharge_enabled = false;
        } else if soc <= self.soc_lower_bound {
            self.recharge_enabled = true;
        }
        self.recharge_enabled
    }

    pub fn recharge_needed(&self) -> bool {
        self.recharge_enabled
    }

    /// Draw `requested` from the store, bounded by the per-step C-rate cap.
    pub fn try_discharge(&mut self, dt: si::Time, requested: si::Energy) -> DischargeOutcome {
        if !self.is_drainable(requested) {
            return DischargeOutcome::Refused;
        }
        let cap = self.max_discharge(dt);
        let delivered = requested.min(cap);
        self.current -= delivered;
        self.cum_consumed += delivered;
        self.cum_net += delivered;
        if requested > cap {
            DischargeOutcome::Partial {
                delivered,
                shortfall: requested - cap,
            }
        } else {
            DischargeOutcome::Accepted
        }
    }

    /// Offer `offered` to the store; returns the energy actually accepted,
    /// bounded by the recharge C-rate cap and refused entirely above the
    /// upper SOC bound.
    pub fn try_recharge(
        &mut self,
        dt: si::Time,
        offered: si::Energy,
        source: RechargeSource,
    ) -> si::Energy {
        if !self.is_rechargeable() {
            return si::Energy::ZERO;
        }
        let accepted = offered
            .min(self.max_recharge(dt))
            .min(self.max_capacity - self.current);
        self.current += accepted;
        self.cum_net -= accepted;
        match source {
            RechargeSource::Regenerated => self.cum_regenerated += accepted,
            RechargeSource::FromEngine => self.cum_consumed -= accepted,
        }
        accepted
    }
}

impl Init for Battery {}
