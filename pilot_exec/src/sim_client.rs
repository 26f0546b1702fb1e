//! # Simulation Client
//!
//! The SimClient stands in for a real aircraft during development and scripted runs. It
//! integrates the commanded velocities at a fixed telemetry period, publishes a [`FlightData`]
//! sample on every step, and executes the autonomous navigation commands by steering towards the
//! requested target and raising the [`Completer`] once it is reached.
//!
//! The simulated odometry frame matches a real aircraft: Z is positive downwards, and autonomous
//! XY targets are offsets from the home reference captured by [`Flight::set_home`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, tick, Receiver, Sender, TrySendError};
use log::{debug, info, trace};
use parking_lot::Mutex;
use serde::Deserialize;

use comms_if::eqpt::flight::{FlightData, MnvrCmd};
use util::maths::{ang_dist_deg, rem_euclid, rotate_z, V3D};

use crate::{
    flight_client::{Completer, Completion, Flight, FlightClientError},
    shutdown::Shutdown,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of telemetry samples buffered for the consumer before new ones are dropped.
const TELEMETRY_BUFFER: usize = 16;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulated aircraft.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Period between telemetry samples.
    pub telemetry_period_s: f64,

    /// Translational speed at 100% demand.
    pub speed_units_s: f64,

    /// Yaw rate at 100% demand.
    pub yaw_rate_deg_s: f64,

    /// Altitude reached on take off.
    pub takeoff_alt: f64,

    /// Altitude units per unit of the autonomous height command.
    pub height_scale: f64,

    /// Distance at which an autonomous target counts as reached.
    pub position_tol: f64,

    /// Yaw error at which an autonomous turn counts as complete.
    pub yaw_tol_deg: f64,

    /// Battery drain while flying.
    pub battery_drain_pct_s: f64,

    pub battery_low_pct: f64,
    pub battery_critical_pct: f64,

    pub light_strength: u8,
}

/// Simulated aircraft.
pub struct SimClient {
    state: Mutex<SimState>,
    params: SimParams,
}

/// Physical state of the simulated aircraft.
struct SimState {
    /// Position in the odometry frame, Z down.
    position: V3D,

    yaw_deg: f64,

    flying: bool,

    home: V3D,

    battery_pct: f64,

    /// Body frame velocity demand, X forward, Y left, Z up, as fractions of the maximum.
    vel_demand: V3D,

    /// Yaw rate demand as a fraction of the maximum, positive to the left.
    yaw_demand: f64,

    auto: Option<AutoTarget>,
}

/// An autonomous manoeuvre in progress.
struct AutoTarget {
    goal: AutoGoal,
    completer: Completer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutoGoal {
    /// Target XY in the odometry frame.
    Xy(f64, f64),

    Yaw(f64),

    /// Target Z in the odometry frame.
    Z(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            telemetry_period_s: 0.05,
            speed_units_s: 50.0,
            yaw_rate_deg_s: 90.0,
            takeoff_alt: 20.0,
            height_scale: 10.0,
            position_tol: 1.0,
            yaw_tol_deg: 1.0,
            battery_drain_pct_s: 0.05,
            battery_low_pct: 20.0,
            battery_critical_pct: 10.0,
            light_strength: 100,
        }
    }
}

impl SimState {
    fn new() -> Self {
        Self {
            position: V3D::zeros(),
            yaw_deg: 0.0,
            flying: false,
            home: V3D::zeros(),
            battery_pct: 100.0,
            vel_demand: V3D::zeros(),
            yaw_demand: 0.0,
            auto: None,
        }
    }

    /// Advance the simulation by `dt` seconds.
    fn step(&mut self, dt: f64, params: &SimParams) {
        if !self.flying {
            return;
        }

        self.battery_pct = (self.battery_pct - params.battery_drain_pct_s * dt).max(0.0);

        // Autonomous manoeuvres override the manual demands
        if self.auto.is_some() {
            self.step_auto(dt, params);
            return;
        }

        // Body frame to odometry frame, Z flips between the two
        let heading = rotate_z(&V3D::x(), self.yaw_deg);
        let left = rotate_z(&heading, 90.0);
        let vel = (heading * self.vel_demand.x + left * self.vel_demand.y) * params.speed_units_s
            - V3D::z() * self.vel_demand.z * params.speed_units_s;

        self.position += vel * dt;
        self.position.z = self.position.z.min(0.0);
        self.set_yaw(self.yaw_deg + self.yaw_demand * params.yaw_rate_deg_s * dt);
    }

    fn step_auto(&mut self, dt: f64, params: &SimParams) {
        let goal = match self.auto {
            Some(ref a) => a.goal,
            None => return,
        };

        let reached = match goal {
            AutoGoal::Xy(x, y) => {
                let err = V3D::new(x - self.position.x, y - self.position.y, 0.0);
                let max_step = params.speed_units_s * dt;
                if err.norm() <= max_step.max(params.position_tol) {
                    self.position.x = x;
                    self.position.y = y;
                    true
                } else {
                    self.position += err.normalize() * max_step;
                    false
                }
            }
            AutoGoal::Yaw(yaw) => {
                let err = ang_dist_deg(self.yaw_deg, yaw);
                let max_step = params.yaw_rate_deg_s * dt;
                if err.abs() <= max_step.max(params.yaw_tol_deg) {
                    self.set_yaw(yaw);
                    true
                } else {
                    self.set_yaw(self.yaw_deg + max_step * err.signum());
                    false
                }
            }
            AutoGoal::Z(z) => {
                let err = z - self.position.z;
                let max_step = params.speed_units_s * dt;
                if err.abs() <= max_step.max(params.position_tol) {
                    self.position.z = z;
                    true
                } else {
                    self.position.z += max_step * err.signum();
                    false
                }
            }
        };

        if reached {
            debug!("Autonomous manoeuvre {:?} complete", goal);
            if let Some(a) = self.auto.take() {
                a.completer.complete();
            }
        }
    }

    /// Keep the yaw in `[-180, 180)`.
    fn set_yaw(&mut self, yaw_deg: f64) {
        self.yaw_deg = rem_euclid(yaw_deg + 180.0, 360.0) - 180.0;
    }

    fn flight_data(&self, params: &SimParams) -> FlightData {
        FlightData {
            position_x: self.position.x as f32,
            position_y: self.position.y as f32,
            position_z: self.position.z as f32,
            yaw_deg: self.yaw_deg.round() as i16,
            battery_pct: self.battery_pct.round() as i8,
            light_strength: params.light_strength,
            battery_low: self.battery_pct < params.battery_low_pct,
            battery_critical: self.battery_pct < params.battery_critical_pct,
            down_visual_state: false,
            error_state: false,
        }
    }

    /// Drop all demands. Any pending autonomous manoeuvre is abandoned.
    fn hover(&mut self) {
        self.vel_demand = V3D::zeros();
        self.yaw_demand = 0.0;
        self.auto = None;
    }
}

impl SimClient {
    /// Create a new simulated aircraft, sitting landed at the origin.
    pub fn new(params: SimParams) -> Self {
        Self {
            state: Mutex::new(SimState::new()),
            params,
        }
    }

    /// Start the simulation.
    ///
    /// Returns the client, the telemetry stream, and the handle of the background thread. The
    /// thread stops once shutdown is requested or the telemetry receiver is dropped.
    pub fn start(
        params: SimParams,
        shutdown: Shutdown,
    ) -> (Arc<Self>, Receiver<FlightData>, JoinHandle<()>) {
        let client = Arc::new(Self::new(params));
        let (tx, rx) = bounded(TELEMETRY_BUFFER);

        let client_clone = client.clone();
        let jh = thread::spawn(move || bg_thread(client_clone, tx, shutdown));

        (client, rx, jh)
    }

    /// Advance the simulation by one telemetry period and return the new sample.
    pub fn step(&self) -> FlightData {
        let mut state = self.state.lock();
        state.step(self.params.telemetry_period_s, &self.params);
        state.flight_data(&self.params)
    }

    fn start_auto(&self, goal: AutoGoal) -> Result<Completion, FlightClientError> {
        let mut state = self.state.lock();

        if !state.flying {
            return Err(FlightClientError::NotFlying);
        }
        if state.auto.is_some() {
            return Err(FlightClientError::Busy);
        }

        let (completer, completion) = Completion::pair();
        state.vel_demand = V3D::zeros();
        state.yaw_demand = 0.0;
        state.auto = Some(AutoTarget { goal, completer });

        debug!("Starting autonomous manoeuvre {:?}", goal);

        Ok(completion)
    }
}

impl Flight for SimClient {
    fn mnvr(&self, cmd: MnvrCmd) -> Result<(), FlightClientError> {
        let mut state = self.state.lock();

        match cmd {
            MnvrCmd::TakeOff => {
                if !state.flying {
                    state.flying = true;
                    state.position.z = -self.params.takeoff_alt;
                }
                return Ok(());
            }
            MnvrCmd::Land => {
                state.hover();
                state.flying = false;
                state.position.z = 0.0;
                return Ok(());
            }
            _ => (),
        }

        if !state.flying {
            return Err(FlightClientError::NotFlying);
        }

        let pct = |p: u8| p.min(100) as f64 / 100.0;

        match cmd {
            MnvrCmd::Forward(p) => state.vel_demand.x = pct(p),
            MnvrCmd::Backward(p) => state.vel_demand.x = -pct(p),
            MnvrCmd::Left(p) => state.vel_demand.y = pct(p),
            MnvrCmd::Right(p) => state.vel_demand.y = -pct(p),
            MnvrCmd::Up(p) => state.vel_demand.z = pct(p),
            MnvrCmd::Down(p) => state.vel_demand.z = -pct(p),
            MnvrCmd::TurnLeft(p) => state.yaw_demand = pct(p),
            MnvrCmd::TurnRight(p) => state.yaw_demand = -pct(p),
            MnvrCmd::Hover | MnvrCmd::TakeOff | MnvrCmd::Land => state.hover(),
        }

        Ok(())
    }

    fn set_home(&self) -> Result<(), FlightClientError> {
        let mut state = self.state.lock();
        state.home = state.position;
        debug!("Simulated home set to {:?}", state.home);
        Ok(())
    }

    fn flight_data(&self) -> FlightData {
        self.state.lock().flight_data(&self.params)
    }

    fn auto_fly_to_xy(&self, x: f32, y: f32) -> Result<Completion, FlightClientError> {
        let home = self.state.lock().home;
        self.start_auto(AutoGoal::Xy(home.x + x as f64, home.y + y as f64))
    }

    fn auto_turn_to_yaw(&self, yaw_deg: i16) -> Result<Completion, FlightClientError> {
        self.start_auto(AutoGoal::Yaw(yaw_deg as f64))
    }

    fn auto_fly_to_height(&self, height: i16) -> Result<Completion, FlightClientError> {
        self.start_auto(AutoGoal::Z(-(height as f64) * self.params.height_scale))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, steps the simulation and publishes telemetry.
fn bg_thread(client: Arc<SimClient>, tx: Sender<FlightData>, shutdown: Shutdown) {
    info!("Simulation started");

    let ticker = tick(Duration::from_secs_f64(client.params.telemetry_period_s));

    while !shutdown.is_requested() {
        if ticker.recv().is_err() {
            break;
        }

        match tx.try_send(client.step()) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => trace!("Telemetry buffer full, sample dropped"),
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    info!("Simulation stopped");
}
