//! Damped spring driving chart animations.
//!
//! Integration follows the Rebound/Origami model: tension and friction are
//! given in Origami units, converted to physical constants, and the state is
//! stepped with fourth-order Runge-Kutta at a fixed 1 ms solver step. Frames
//! longer than 64 ms are truncated so a stalled page does not make the
//! spring jump.

use std::time::Duration;

const SOLVER_TIMESTEP_SEC: f64 = 0.001;
const MAX_DELTA_TIME_SEC: f64 = 0.064;
const REST_SPEED_THRESHOLD: f64 = 0.001;
const REST_DISPLACEMENT_THRESHOLD: f64 = 0.001;

/// Physical spring constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringConfig {
    pub tension: f64,
    pub friction: f64,
}

impl SpringConfig {
    /// Convert Origami tension/friction to physical constants.
    pub fn from_origami(tension: f64, friction: f64) -> Self {
        let tension = if tension == 0.0 {
            0.0
        } else {
            (tension - 30.0) * 3.62 + 194.0
        };
        let friction = if friction == 0.0 {
            0.0
        } else {
            (friction - 8.0) * 3.0 + 25.0
        };
        Self { tension, friction }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PhysicsState {
    position: f64,
    velocity: f64,
}

/// A one-dimensional spring with optional overshoot clamping.
#[derive(Debug, Clone)]
pub struct Spring {
    config: SpringConfig,
    overshoot_clamping: bool,
    current: PhysicsState,
    previous: PhysicsState,
    temp: PhysicsState,
    start_value: f64,
    end_value: f64,
    time_accumulator: f64,
    was_at_rest: bool,
}

impl Spring {
    pub fn new(config: SpringConfig, overshoot_clamping: bool) -> Self {
        Self {
            config,
            overshoot_clamping,
            current: PhysicsState::default(),
            previous: PhysicsState::default(),
            temp: PhysicsState::default(),
            start_value: 0.0,
            end_value: 0.0,
            time_accumulator: 0.0,
            was_at_rest: true,
        }
    }

    pub fn current_value(&self) -> f64 {
        self.current.position
    }

    pub fn end_value(&self) -> f64 {
        self.end_value
    }

    /// Jump to `value` and stop.
    pub fn set_current_value(&mut self, value: f64) {
        self.start_value = value;
        self.end_value = value;
        self.current = PhysicsState {
            position: value,
            velocity: 0.0,
        };
        self.was_at_rest = true;
    }

    /// Retarget the spring. Velocity is preserved.
    pub fn set_end_value(&mut self, value: f64) {
        if self.end_value == value && self.is_at_rest() {
            return;
        }
        self.start_value = self.current.position;
        self.end_value = value;
        self.was_at_rest = false;
    }

    pub fn is_at_rest(&self) -> bool {
        self.current.velocity.abs() < REST_SPEED_THRESHOLD
            && ((self.end_value - self.current.position).abs() <= REST_DISPLACEMENT_THRESHOLD
                || self.config.tension == 0.0)
    }

    fn is_overshooting(&self) -> bool {
        self.config.tension > 0.0
            && ((self.start_value < self.end_value && self.current.position > self.end_value)
                || (self.start_value > self.end_value && self.current.position < self.end_value))
    }

    /// Step the simulation by `elapsed`. Returns `true` while still moving.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        let mut at_rest = self.is_at_rest();
        if at_rest && self.was_at_rest {
            return false;
        }

        self.time_accumulator += elapsed.as_secs_f64().min(MAX_DELTA_TIME_SEC);

        let SpringConfig { tension, friction } = self.config;
        let end = self.end_value;
        let mut position = self.current.position;
        let mut velocity = self.current.velocity;
        let mut temp_position = self.temp.position;
        let mut temp_velocity = self.temp.velocity;
        let accel = |pos: f64, vel: f64| tension * (end - pos) - friction * vel;
        let step = SOLVER_TIMESTEP_SEC;

        while self.time_accumulator >= step {
            self.time_accumulator -= step;
            if self.time_accumulator < step {
                self.previous = PhysicsState { position, velocity };
            }

            let a_velocity = velocity;
            let a_accel = accel(temp_position, velocity);

            temp_position = position + a_velocity * step * 0.5;
            temp_velocity = velocity + a_accel * step * 0.5;
            let b_velocity = temp_velocity;
            let b_accel = accel(temp_position, temp_velocity);

            temp_position = position + b_velocity * step * 0.5;
            temp_velocity = velocity + b_accel * step * 0.5;
            let c_velocity = temp_velocity;
            let c_accel = accel(temp_position, temp_velocity);

            temp_position = position + c_velocity * step;
            temp_velocity = velocity + c_accel * step;
            let d_velocity = temp_velocity;
            let d_accel = accel(temp_position, temp_velocity);

            let dxdt = (a_velocity + 2.0 * (b_velocity + c_velocity) + d_velocity) / 6.0;
            let dvdt = (a_accel + 2.0 * (b_accel + c_accel) + d_accel) / 6.0;

            position += dxdt * step;
            velocity += dvdt * step;
        }

        self.temp = PhysicsState {
            position: temp_position,
            velocity: temp_velocity,
        };
        self.current = PhysicsState { position, velocity };

        if self.time_accumulator > 0.0 {
            let alpha = self.time_accumulator / step;
            self.current.position =
                self.current.position * alpha + self.previous.position * (1.0 - alpha);
            self.current.velocity =
                self.current.velocity * alpha + self.previous.velocity * (1.0 - alpha);
        }

        if self.is_at_rest() || (self.overshoot_clamping && self.is_overshooting()) {
            if tension > 0.0 {
                self.start_value = self.end_value;
                self.current.position = self.end_value;
            } else {
                self.end_value = self.current.position;
                self.start_value = self.end_value;
            }
            self.current.velocity = 0.0;
            at_rest = true;
        } else {
            at_rest = false;
        }

        self.was_at_rest = at_rest;
        !at_rest
    }
}
