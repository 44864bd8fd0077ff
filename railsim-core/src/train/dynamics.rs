//! Longitudinal dynamics: a car-following acceleration law evaluated
//! against every critical point ahead, with bounded jerk.

use super::{Train, MIN_FOLLOWING_GAP};
use crate::imports::*;

/// A point ahead of a train that bounds its future speed: a lower-speed
/// segment start, a stopping node, a red signal, or the tail of a leading
/// train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalPoint {
    /// Distance from the train head to the point.
    pub gap: si::Length,
    /// Whether the point is the tail of a leading train, which widens the
    /// minimum gap.
    pub is_leading_train: bool,
    /// Speed at the point; zero for a stop.
    pub leader_speed: si::Velocity,
}

impl CriticalPoint {
    pub fn stop_at(gap: si::Length) -> Self {
        Self {
            gap,
            is_leading_train: false,
            leader_speed: si::Velocity::ZERO,
        }
    }
}

const TIME_FLOOR: si::Time = si::Time {
    dimension: std::marker::PhantomData,
    units: std::marker::PhantomData,
    value: 1.0e-4,
};

const SPEED_FLOOR: si::Velocity = si::Velocity {
    dimension: std::marker::PhantomData,
    units: std::marker::PhantomData,
    value: 1.0e-4,
};

const GAP_FLOOR: si::Length = si::Length {
    dimension: std::marker::PhantomData,
    units: std::marker::PhantomData,
    value: 1.0e-4,
};

impl Train {
    /// Lookahead distance inside which a critical point starts governing
    /// the train: `initial + T_s u + u^2 / (2 d_des)`, at the current speed
    /// or, for `estimate`, at the free-flow speed.
    pub fn safe_gap(
        &self,
        initial_gap: si::Length,
        speed: si::Velocity,
        free_flow: si::Velocity,
        estimate: bool,
    ) -> si::Length {
        let u = if estimate { free_flow } else { speed };
        initial_gap + self.t_s * u + u.powi(typenum::P2::new()) / (2.0 * self.d_des)
    }

    /// Net acceleration the powertrain can produce at `speed`.
    pub fn accel_upper_bound(
        &mut self,
        speed: si::Velocity,
        optimize: bool,
        optimum_throttle: f64,
    ) -> si::Acceleration {
        let traction = self.total_tractive_force(speed, optimize, optimum_throttle);
        let resistance = self.total_resistance(speed);
        (traction - resistance) / self.total_mass
    }

    /// The car-following law for a single critical point.
    pub fn accelerate(
        &mut self,
        gap: si::Length,
        min_gap: si::Length,
        speed: si::Velocity,
        leader_speed: si::Velocity,
        free_flow: si::Velocity,
        dt: si::Time,
        optimize: bool,
        throttle: f64,
    ) -> si::Acceleration {
        let a_max = self.accel_upper_bound(speed, optimize, throttle);
        let mu_g = self.friction_coef * uc::ACC_GRAV;

        // outside the lookahead: run free
        if gap > self.safe_gap(min_gap, speed, free_flow, false) && a_max > si::Acceleration::ZERO
        {
            if speed < free_flow {
                return a_max;
            }
            if almost_eq(
                speed.get::<si::meter_per_second>(),
                free_flow.get::<si::meter_per_second>(),
                None,
            ) {
                return si::Acceleration::ZERO;
            }
        }

        let t_s = self.t_s.max(TIME_FLOOR);
        // comfortable speed for the next step, clamped to the achievable
        // band
        let mut u_hat = ((gap - min_gap) / t_s).min(free_flow);
        if u_hat < speed {
            u_hat = u_hat.max(speed - mu_g * dt);
        } else if u_hat > speed && u_hat < free_flow {
            u_hat = u_hat.min(speed + a_max * dt);
        }

        let ttc_raw = ((gap - min_gap) / (speed - leader_speed).max(SPEED_FLOOR))
            .min(100.0 * uc::S);
        let ttc = if ttc_raw > si::Time::ZERO {
            ttc_raw
        } else {
            TIME_FLOOR
        };
        let a_ttc = ((u_hat - speed) / ttc).max(-mu_g);
        let a_comfort = ((u_hat - speed) / t_s).min(a_max);
        let beta = if a_ttc > si::Acceleration::ZERO {
            1.0
        } else {
            0.0
        };
        let a_mix = beta * a_comfort + (1.0 - beta) * a_ttc;
        let a_leader = ((leader_speed - speed) / t_s).min(a_max).max(-mu_g);
        let beta2 = 1.0;
        let a1 = beta2 * a_mix + (1.0 - beta2) * a_leader;

        // squared-speed-difference closure toward a slower leader
        let gamma = if speed > leader_speed { 1.0 } else { 0.0 };
        let du2 = speed.powi(typenum::P2::new()) - leader_speed.powi(typenum::P2::new());
        let a2 = (du2.powi(typenum::P2::new())
            / (4.0 * self.d_des)
            / (gap - min_gap).max(GAP_FLOOR).powi(typenum::P2::new()))
        .min(mu_g);

        a1 * (1.0 - gamma) - gamma * a2
    }

    /// Minimum acceleration over all critical points, jerk-limited.
    pub fn step_acceleration(
        &mut self,
        dt: si::Time,
        free_flow: si::Velocity,
        critical_points: &[CriticalPoint],
    ) -> si::Acceleration {
        if self.optimize {
            if let Some(&front) = self.throttle_schedule.front() {
                self.optimum_throttle = front;
            }
            if self.throttle_schedule.len() > 1 {
                self.throttle_schedule.pop_front();
            }
        }

        let speed = self.speed;
        let throttle = self.optimum_throttle;
        let optimize = self.optimize;
        let mut accelerations = Vec::with_capacity(critical_points.len());
        for cp in critical_points {
            let min_gap = if cp.is_leading_train {
                MIN_FOLLOWING_GAP
            } else {
                si::Length::ZERO
            };
            accelerations.push(self.accelerate(
                cp.gap,
                min_gap,
                speed,
                cp.leader_speed,
                free_flow,
                dt,
                optimize,
                throttle,
            ));
        }
        let (arg_min, &raw) = accelerations
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.value.total_cmp(&b.value))
            .expect("at least one critical point per step");
        // re-evaluate the governing point so the stored forces match the
        // chosen acceleration
        if accelerations.len() > 1 {
            let cp = critical_points[arg_min];
            let min_gap = if cp.is_leading_train {
                MIN_FOLLOWING_GAP
            } else {
                si::Length::ZERO
            };
            self.accelerate(
                cp.gap,
                min_gap,
                speed,
                cp.leader_speed,
                free_flow,
                dt,
                optimize,
                throttle,
            );
        }

        if raw < si::Acceleration::ZERO
            && self.speed <= 0.001 * uc::MPS
            && critical_points.last().is_some_and(|cp| cp.gap > 50.0 * uc::M)
            && self.no_power_warnings < 5
        {
            self.no_power_warnings += 1;
            log::warn!(
                "train {} resistance exceeds tractive force at {:.1} m",
                self.user_id,
                self.travelled.get::<si::meter>()
            );
            self.warnings.push(SimError::ResistanceExceedsTraction {
                train: self.user_id.clone(),
                at_meters: self.travelled.get::<si::meter>(),
            });
        }

        // bound the change in acceleration by the jerk limit
        let max_delta = self.max_jerk * dt;
        let delta = (raw - self.prev_accel).max(-max_delta).min(max_delta);
        let mut limited = self.prev_accel + delta;
        if (self.speed.get::<si::meter_per_second>() * 1000.0).round() == 0.0
            && limited < si::Acceleration::ZERO
        {
            limited = si::Acceleration::ZERO;
        }
        limited
    }

    /// Advance the train by one step against the critical points ahead.
    /// Returns true when the destination was reached this step.
    pub fn move_train(
        &mut self,
        dt: si::Time,
        free_flow: si::Velocity,
        critical_points: &[CriticalPoint],
    ) -> bool {
        self.prev_accel = self.accel;
        let accel = self.step_acceleration(dt, free_flow, critical_points);
        self.accel = accel;
        self.prev_speed = self.speed;
        self.speed = (self.prev_speed + accel * dt)
            .max(si::Velocity::ZERO)
            .min(free_flow);
        // effective acceleration after the speed clamp
        self.accel = (self.speed - self.prev_speed) / dt;
        self.check_sudden_acceleration(dt);
        self.travelled += self.speed * dt;
        self.update_notches();

        if self.travelled >= self.total_path_length - GAP_FLOOR {
            self.travelled = self.total_path_length;
            self.reached_destination = true;
        }
        self.reached_destination
    }

    fn check_sudden_acceleration(&mut self, dt: si::Time) {
        let jerk = ((self.accel - self.prev_accel) / dt).abs();
        if jerk > self.max_jerk * 1.000001 {
            log::warn!(
                "train {} exceeded the jerk limit: {:.3} m/s^3",
                self.user_id,
                jerk.get::<si::meter_per_second_cubed>()
            );
            self.warnings.push(SimError::SuddenAcceleration {
                train: self.user_id.clone(),
                jerk: jerk.get::<si::meter_per_second_cubed>(),
            });
        }
    }

    /// Hard stop at a red signal the train has essentially reached.
    pub fn immediate_stop(&mut self) {
        self.prev_accel = self.accel;
        self.prev_speed = self.speed;
        self.speed = si::Velocity::ZERO;
        self.accel = si::Acceleration::ZERO;
        self.update_notches();
    }

    /// Nudge a numerically-stalled train over the remaining gap.
    pub fn kick_forward(&mut self, distance: si::Length) {
        self.prev_accel = si::Acceleration::ZERO;
        self.accel = si::Acceleration::ZERO;
        self.prev_speed = si::Velocity::ZERO;
        self.speed = si::Velocity::ZERO;
        self.travelled += distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::tests::diesel_train_record;
    use crate::train::{Train, TrainIdx};

    fn train() -> Train {
        let mut t = Train::from_record(TrainIdx::new(0), &diesel_train_record()).unwrap();
        t.total_path_length = 10_000.0 * uc::M;
        t
    }

    fn far_stop() -> Vec<CriticalPoint> {
        vec![CriticalPoint::stop_at(9_000.0 * uc::M)]
    }

    #[test]
    fn free_run_accelerates_at_the_upper_bound() {
        let mut t = train();
        let a = t.accelerate(
            9_000.0 * uc::M,
            si::Length::ZERO,
            5.0 * uc::MPS,
            si::Velocity::ZERO,
            20.0 * uc::MPS,
            1.0 * uc::S,
            false,
            1.0,
        );
        let expected = t.accel_upper_bound(5.0 * uc::MPS, false, 1.0);
        assert!(almost_eq(a.value, expected.value, None));
        assert!(a > si::Acceleration::ZERO);
    }

    #[test]
    fn at_free_flow_speed_the_train_holds() {
        let mut t = train();
        let a = t.accelerate(
            9_000.0 * uc::M,
            si::Length::ZERO,
            20.0 * uc::MPS,
            si::Velocity::ZERO,
            20.0 * uc::MPS,
            1.0 * uc::S,
            false,
            1.0,
        );
        assert!(almost_eq(a.value, 0.0, None));
    }

    #[test]
    fn closing_on_a_stop_brakes() {
        let mut t = train();
        // inside the braking envelope for 20 m/s at d_des = 0.2
        let a = t.accelerate(
            500.0 * uc::M,
            si::Length::ZERO,
            20.0 * uc::MPS,
            si::Velocity::ZERO,
            20.0 * uc::MPS,
            1.0 * uc::S,
            false,
            1.0,
        );
        assert!(a < si::Acceleration::ZERO);
    }

    #[test]
    fn jerk_limit_bounds_acceleration_change() {
        let mut t = train();
        t.speed = 10.0 * uc::MPS;
        t.prev_accel = si::Acceleration::ZERO;
        t.accel = si::Acceleration::ZERO;
        let dt = 1.0 * uc::S;
        t.move_train(dt, 20.0 * uc::MPS, &far_stop());
        assert!(
            ((t.accel - t.prev_accel) / dt).abs() <= t.max_jerk * 1.000001,
            "jerk invariant violated"
        );
    }

    #[test]
    fn speed_never_goes_negative_or_past_free_flow() {
        let mut t = train();
        t.speed = 0.5 * uc::MPS;
        t.prev_accel = -2.0 * uc::MPS2;
        t.accel = -2.0 * uc::MPS2;
        t.move_train(1.0 * uc::S, 20.0 * uc::MPS, &[CriticalPoint::stop_at(1.0 * uc::M)]);
        assert!(t.speed >= si::Velocity::ZERO);
        for _ in 0..60 {
            t.move_train(1.0 * uc::S, 20.0 * uc::MPS, &far_stop());
            assert!(t.speed <= 20.0 * uc::MPS + SPEED_FLOOR);
        }
    }

    #[test]
    fn terminal_clamps_travelled_distance() {
        let mut t = train();
        t.total_path_length = 30.0 * uc::M;
        t.speed = 20.0 * uc::MPS;
        t.travelled = 20.0 * uc::M;
        let reached = t.move_train(1.0 * uc::S, 20.0 * uc::MPS, &far_stop());
        assert!(reached);
        assert!(almost_eq(t.travelled.get::<si::meter>(), 30.0, None));
    }

    #[test]
    fn kick_forward_resolves_numerical_stall() {
        let mut t = train();
        t.travelled = 100.0 * uc::M;
        t.kick_forward(5.0 * uc::M);
        assert!(almost_eq(t.travelled.get::<si::meter>(), 105.0, None));
        assert_eq!(t.speed, si::Velocity::ZERO);
    }
}
