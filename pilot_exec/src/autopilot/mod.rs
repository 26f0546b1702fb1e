//! # Autopilot module
//!
//! Flies the aircraft back to a target point with a chain of three autonomous manoeuvres, each
//! started only once the previous one has completed:
//!
//! - `PendingXy` - fly to the target's XY offset from home.
//! - `PendingYaw` - turn to the home yaw.
//! - `PendingZ` - climb or descend to the target's height.
//!
//! A chain starts from `Idle` and ends in `Done`, or in `Failed` if a manoeuvre could not be
//! issued or did not complete. Failures are logged and abandon the rest of the chain, there is no
//! retry. Only one chain may be in progress at a time and a chain cannot be cancelled once
//! started.
//!
//! Progress is reported to the operator as `log` messages on the console channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::{self, Display},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use comms_if::{msg::Message, net::MsgChannel};
use util::maths::V3D;

use crate::flight_client::{Completion, CompletionError, Flight, FlightClientError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the autopilot.
#[derive(Debug, Clone, Deserialize)]
pub struct AutopilotParams {
    /// Divisor converting a map Z coordinate into the aircraft's height units.
    pub height_divisor: f64,

    /// Longest time to wait for any one manoeuvre to complete. Waits forever if not set.
    pub phase_timeout_s: Option<f64>,
}

/// The operator designated home pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Home {
    pub location: V3D,
    pub yaw_deg: i16,
}

/// The autopilot, which runs return chains in a background thread.
pub struct Autopilot {
    flight: Arc<dyn Flight>,
    console: Arc<dyn MsgChannel>,
    params: AutopilotParams,
    state: Arc<Mutex<AutopilotState>>,
}

/// One running chain.
struct Chain {
    flight: Arc<dyn Flight>,
    console: Arc<dyn MsgChannel>,
    params: AutopilotParams,
    target: V3D,
    home: Home,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Observable state of the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutopilotState {
    Idle,
    PendingXy,
    PendingYaw,
    PendingZ,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum AutopilotError {
    #[error("An autopilot chain is already in progress ({0})")]
    ChainActive(AutopilotState),

    #[error("Could not issue the {0} manoeuvre: {1}")]
    IssueFailed(&'static str, FlightClientError),

    #[error("The {0} manoeuvre did not complete: {1}")]
    NotCompleted(&'static str, CompletionError),
}

/// A chain state along with the completion it's waiting on.
enum Step {
    PendingXy(Completion),
    PendingYaw(Completion),
    PendingZ(Completion),
    Done,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for AutopilotParams {
    fn default() -> Self {
        Self {
            height_divisor: 10.0,
            phase_timeout_s: None,
        }
    }
}

impl Default for Home {
    fn default() -> Self {
        Self {
            location: V3D::zeros(),
            yaw_deg: 0,
        }
    }
}

impl AutopilotState {
    /// True while a chain is waiting on a manoeuvre.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AutopilotState::PendingXy | AutopilotState::PendingYaw | AutopilotState::PendingZ
        )
    }
}

impl Display for AutopilotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutopilotState::Idle => write!(f, "AutopilotState::Idle"),
            AutopilotState::PendingXy => write!(f, "AutopilotState::PendingXy"),
            AutopilotState::PendingYaw => write!(f, "AutopilotState::PendingYaw"),
            AutopilotState::PendingZ => write!(f, "AutopilotState::PendingZ"),
            AutopilotState::Done => write!(f, "AutopilotState::Done"),
            AutopilotState::Failed => write!(f, "AutopilotState::Failed"),
        }
    }
}

impl Autopilot {
    pub fn new(
        flight: Arc<dyn Flight>,
        console: Arc<dyn MsgChannel>,
        params: AutopilotParams,
    ) -> Self {
        Self {
            flight,
            console,
            params,
            state: Arc::new(Mutex::new(AutopilotState::Idle)),
        }
    }

    /// Current state of the most recent chain.
    pub fn state(&self) -> AutopilotState {
        *self.state.lock()
    }

    /// Start a chain flying to `target`, relative to `home`.
    ///
    /// The first manoeuvre is issued before returning, the rest of the chain runs in a background
    /// thread whose handle is returned. The handle yields the final state of the chain.
    pub fn fly_to(
        &self,
        target: V3D,
        home: Home,
    ) -> Result<JoinHandle<AutopilotState>, AutopilotError> {
        let chain = Chain {
            flight: self.flight.clone(),
            console: self.console.clone(),
            params: self.params.clone(),
            target,
            home,
        };

        // Hold the state while the first manoeuvre is issued so that two chains can't start at once
        let first = {
            let mut state = self.state.lock();

            if state.is_active() {
                warn!("Autopilot request rejected, {} is in progress", *state);
                return Err(AutopilotError::ChainActive(*state));
            }

            *state = AutopilotState::PendingXy;
            info!("Autopilot state change to: {}", *state);

            match chain.issue_xy() {
                Ok(c) => Step::PendingXy(c),
                Err(e) => {
                    error!("Autopilot chain failed: {}", e);
                    *state = AutopilotState::Failed;
                    return Err(e);
                }
            }
        };

        let state = self.state.clone();
        Ok(thread::spawn(move || chain.run(first, &state)))
    }
}

impl Chain {
    /// Drive the chain to completion.
    fn run(self, mut step: Step, state: &Mutex<AutopilotState>) -> AutopilotState {
        loop {
            step = match step {
                Step::Done => return AutopilotState::Done,
                s => match self.step(s, state) {
                    Ok(next) => next,
                    // Errors end the chain, it is not retried
                    Err(e) => {
                        error!("Autopilot chain failed: {}", e);
                        *state.lock() = AutopilotState::Failed;
                        return AutopilotState::Failed;
                    }
                },
            };
        }
    }

    /// Wait for the pending manoeuvre, then publish the next state and issue its manoeuvre.
    fn step(&self, step: Step, state: &Mutex<AutopilotState>) -> Result<Step, AutopilotError> {
        match step {
            Step::PendingXy(c) => {
                self.wait(c, "XY")?;
                publish(state, AutopilotState::PendingYaw);

                self.report("Autoflight to XY done, Going home Yaw");
                self.flight
                    .auto_turn_to_yaw(self.home.yaw_deg)
                    .map(Step::PendingYaw)
                    .map_err(|e| AutopilotError::IssueFailed("Yaw", e))
            }
            Step::PendingYaw(c) => {
                self.wait(c, "Yaw")?;
                publish(state, AutopilotState::PendingZ);

                let height = (self.target.z / self.params.height_divisor) as i16;

                self.report("Autoflight to home Yaw done, Going home Z");
                self.flight
                    .auto_fly_to_height(height)
                    .map(Step::PendingZ)
                    .map_err(|e| AutopilotError::IssueFailed("Z", e))
            }
            Step::PendingZ(c) => {
                self.wait(c, "Z")?;
                publish(state, AutopilotState::Done);

                self.report("Autoflight to Z done");
                Ok(Step::Done)
            }
            Step::Done => Ok(Step::Done),
        }
    }

    /// Issue the first manoeuvre of the chain.
    fn issue_xy(&self) -> Result<Completion, AutopilotError> {
        let offset = self.target - self.home.location;

        self.report("Going home XY");
        self.flight
            .auto_fly_to_xy(offset.x as f32, offset.y as f32)
            .map_err(|e| AutopilotError::IssueFailed("XY", e))
    }

    fn wait(&self, completion: Completion, phase: &'static str) -> Result<(), AutopilotError> {
        let timeout = self.params.phase_timeout_s.map(Duration::from_secs_f64);

        completion
            .wait(timeout)
            .map_err(|e| AutopilotError::NotCompleted(phase, e))
    }

    /// Report progress to the log and the operator.
    fn report(&self, status: &str) {
        info!("{}", status);

        if let Err(e) = self.console.send(Message::log(status)) {
            warn!("Could not send autopilot status to the console: {}", e);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Set the state a chain is in.
///
/// The state is published before the phase's manoeuvre is issued, so observers never see the
/// previous phase while the next one is starting.
fn publish(state: &Mutex<AutopilotState>, new_state: AutopilotState) {
    *state.lock() = new_state;
    info!("Autopilot state change to: {}", new_state);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flight_client::mock::{FlightCall, MockFlight};
    use comms_if::{
        eqpt::flight::{FlightData, MnvrCmd},
        net::LocalChannel,
    };
    use std::time::Instant;

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn setup(params: AutopilotParams) -> (Arc<MockFlight>, LocalChannel, Autopilot) {
        let flight = Arc::new(MockFlight::default());
        let (ours, theirs) = LocalChannel::pair();
        let autopilot = Autopilot::new(flight.clone(), Arc::new(ours), params);

        (flight, theirs, autopilot)
    }

    fn logs(console: &LocalChannel) -> Vec<String> {
        console
            .drain()
            .into_iter()
            .map(|m| m.content_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_return_chain() {
        let (flight, console, autopilot) = setup(AutopilotParams::default());

        let jh = autopilot
            .fly_to(V3D::new(100.0, 0.0, 0.0), Home::default())
            .unwrap();

        assert_eq!(flight.calls(), vec![FlightCall::FlyToXy(100.0, 0.0)]);
        assert_eq!(autopilot.state(), AutopilotState::PendingXy);

        // Nothing more is issued until XY completes
        thread::sleep(Duration::from_millis(50));
        assert_eq!(flight.calls().len(), 1);

        assert!(flight.complete_next());
        assert!(wait_for(|| flight.calls().len() == 2));
        assert_eq!(flight.calls()[1], FlightCall::TurnToYaw(0));
        assert!(wait_for(|| autopilot.state() == AutopilotState::PendingYaw));

        assert!(flight.complete_next());
        assert!(wait_for(|| flight.calls().len() == 3));
        assert_eq!(flight.calls()[2], FlightCall::FlyToHeight(0));

        assert!(flight.complete_next());
        assert_eq!(jh.join().unwrap(), AutopilotState::Done);
        assert_eq!(autopilot.state(), AutopilotState::Done);

        assert_eq!(
            logs(&console),
            vec![
                "Going home XY",
                "Autoflight to XY done, Going home Yaw",
                "Autoflight to home Yaw done, Going home Z",
                "Autoflight to Z done",
            ]
        );
    }

    #[test]
    fn test_offset_from_home() {
        let (flight, _console, autopilot) = setup(AutopilotParams::default());

        let home = Home {
            location: V3D::new(10.0, 20.0, 5.0),
            yaw_deg: 45,
        };
        let jh = autopilot.fly_to(V3D::new(15.0, 10.0, 30.0), home).unwrap();

        for issued in 1..=3 {
            assert!(wait_for(|| flight.calls().len() == issued));
            assert!(flight.complete_next());
        }
        assert_eq!(jh.join().unwrap(), AutopilotState::Done);

        assert_eq!(
            flight.calls(),
            vec![
                FlightCall::FlyToXy(5.0, -10.0),
                FlightCall::TurnToYaw(45),
                FlightCall::FlyToHeight(3),
            ]
        );
    }

    /// Holds the yaw manoeuvre back until released, so the state can be read while it's issued.
    struct GatedFlight {
        inner: Arc<MockFlight>,
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl Flight for GatedFlight {
        fn mnvr(&self, cmd: MnvrCmd) -> Result<(), FlightClientError> {
            self.inner.mnvr(cmd)
        }

        fn set_home(&self) -> Result<(), FlightClientError> {
            self.inner.set_home()
        }

        fn flight_data(&self) -> FlightData {
            self.inner.flight_data()
        }

        fn auto_fly_to_xy(&self, x: f32, y: f32) -> Result<Completion, FlightClientError> {
            self.inner.auto_fly_to_xy(x, y)
        }

        fn auto_turn_to_yaw(&self, yaw_deg: i16) -> Result<Completion, FlightClientError> {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            self.inner.auto_turn_to_yaw(yaw_deg)
        }

        fn auto_fly_to_height(&self, height: i16) -> Result<Completion, FlightClientError> {
            self.inner.auto_fly_to_height(height)
        }
    }

    #[test]
    fn test_state_published_before_issue() {
        let inner = Arc::new(MockFlight::default());
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let flight = Arc::new(GatedFlight {
            inner: inner.clone(),
            entered: entered_tx,
            release: release_rx,
        });
        let (ours, _theirs) = LocalChannel::pair();
        let autopilot = Autopilot::new(flight, Arc::new(ours), AutopilotParams::default());

        let jh = autopilot
            .fly_to(V3D::new(1.0, 0.0, 0.0), Home::default())
            .unwrap();
        assert!(inner.complete_next());

        // The yaw manoeuvre is being issued, the state already shows it
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(autopilot.state(), AutopilotState::PendingYaw);
        release_tx.send(()).unwrap();

        assert!(wait_for(|| inner.calls().len() == 2));
        assert!(inner.complete_next());
        assert!(wait_for(|| inner.calls().len() == 3));
        assert!(inner.complete_next());
        assert_eq!(jh.join().unwrap(), AutopilotState::Done);
    }

    #[test]
    fn test_single_active_chain() {
        let (flight, _console, autopilot) = setup(AutopilotParams::default());

        let jh = autopilot.fly_to(V3D::zeros(), Home::default()).unwrap();

        assert!(matches!(
            autopilot.fly_to(V3D::new(1.0, 1.0, 1.0), Home::default()),
            Err(AutopilotError::ChainActive(AutopilotState::PendingXy))
        ));
        assert_eq!(flight.calls().len(), 1);

        // Abandon the chain so the thread finishes
        flight.completers.lock().clear();
        assert_eq!(jh.join().unwrap(), AutopilotState::Failed);

        // A new chain may start once the last one has ended
        assert!(autopilot.fly_to(V3D::zeros(), Home::default()).is_ok());
        flight.completers.lock().clear();
    }

    #[test]
    fn test_issue_failure() {
        let (flight, console, autopilot) = setup(AutopilotParams::default());

        *flight.fail_next_auto.lock() = Some(FlightClientError::NotFlying);

        assert!(matches!(
            autopilot.fly_to(V3D::new(1.0, 0.0, 0.0), Home::default()),
            Err(AutopilotError::IssueFailed("XY", FlightClientError::NotFlying))
        ));
        assert_eq!(autopilot.state(), AutopilotState::Failed);
        assert!(flight.calls().is_empty());
        assert_eq!(logs(&console), vec!["Going home XY"]);
    }

    #[test]
    fn test_phase_timeout() {
        let (flight, _console, autopilot) = setup(AutopilotParams {
            height_divisor: 10.0,
            phase_timeout_s: Some(0.05),
        });

        let jh = autopilot.fly_to(V3D::zeros(), Home::default()).unwrap();

        assert_eq!(jh.join().unwrap(), AutopilotState::Failed);
        assert_eq!(autopilot.state(), AutopilotState::Failed);
        assert_eq!(flight.calls(), vec![FlightCall::FlyToXy(0.0, 0.0)]);
    }
}
