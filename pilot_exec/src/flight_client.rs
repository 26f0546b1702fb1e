//! # Flight client
//!
//! The [`Flight`] trait is everything the pilot needs from the aircraft: manual manoeuvres, the
//! latest telemetry sample, and the three autonomous navigation commands. Each autonomous command
//! hands back a [`Completion`], a one-shot signal raised by the aircraft when the manoeuvre has
//! finished.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use comms_if::eqpt::flight::{FlightData, MnvrCmd};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capabilities of the aircraft.
pub trait Flight: Send + Sync {
    /// Perform a manual manoeuvre.
    fn mnvr(&self, cmd: MnvrCmd) -> Result<(), FlightClientError>;

    /// Set the aircraft's own home reference to its current position.
    fn set_home(&self) -> Result<(), FlightClientError>;

    /// Most recent telemetry sample.
    fn flight_data(&self) -> FlightData;

    /// Fly to the given XY offset from the aircraft's home reference.
    fn auto_fly_to_xy(&self, x: f32, y: f32) -> Result<Completion, FlightClientError>;

    /// Turn to the given yaw angle in degrees.
    fn auto_turn_to_yaw(&self, yaw_deg: i16) -> Result<Completion, FlightClientError>;

    /// Climb or descend to the given height.
    fn auto_fly_to_height(&self, height: i16) -> Result<Completion, FlightClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Receiving half of a one-shot completion signal.
#[derive(Debug)]
pub struct Completion(Receiver<()>);

/// Sending half of a one-shot completion signal, held by whoever performs the manoeuvre.
#[derive(Debug)]
pub struct Completer(Sender<()>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlightClientError {
    #[error("The aircraft is not flying")]
    NotFlying,

    #[error("The aircraft is already performing an autonomous manoeuvre")]
    Busy,

    #[error("The aircraft rejected the command: {0}")]
    Rejected(String),

    #[error("The connection to the aircraft has been lost")]
    NotConnected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Timed out waiting for the manoeuvre to complete")]
    Timeout,

    #[error("The manoeuvre was abandoned before it completed")]
    Abandoned,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Completion {
    /// Create a new linked completer and completion.
    pub fn pair() -> (Completer, Completion) {
        let (tx, rx) = bounded(1);
        (Completer(tx), Completion(rx))
    }

    /// Block until the manoeuvre completes.
    ///
    /// With a timeout of `None` this waits indefinitely. If the completer is dropped without
    /// completing, [`CompletionError::Abandoned`] is returned.
    pub fn wait(self, timeout: Option<Duration>) -> Result<(), CompletionError> {
        match timeout {
            Some(t) => self.0.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => CompletionError::Timeout,
                RecvTimeoutError::Disconnected => CompletionError::Abandoned,
            }),
            None => self.0.recv().map_err(|_| CompletionError::Abandoned),
        }
    }
}

impl Completer {
    /// Signal that the manoeuvre has completed.
    pub fn complete(self) {
        // Nobody waiting is not an error
        self.0.send(()).ok();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted aircraft used to test the autopilot and command dispatch.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum FlightCall {
        Mnvr(MnvrCmd),
        SetHome,
        FlyToXy(f32, f32),
        TurnToYaw(i16),
        FlyToHeight(i16),
    }

    #[derive(Default)]
    pub(crate) struct MockFlight {
        pub calls: Mutex<Vec<FlightCall>>,
        pub completers: Mutex<Vec<Completer>>,
        pub flight_data: Mutex<FlightData>,
        pub fail_next_auto: Mutex<Option<FlightClientError>>,
    }

    impl MockFlight {
        pub fn calls(&self) -> Vec<FlightCall> {
            self.calls.lock().clone()
        }

        /// Complete the oldest outstanding autonomous manoeuvre. Returns false if there was none.
        pub fn complete_next(&self) -> bool {
            let mut completers = self.completers.lock();
            if completers.is_empty() {
                return false;
            }
            completers.remove(0).complete();
            true
        }

        fn auto(&self, call: FlightCall) -> Result<Completion, FlightClientError> {
            if let Some(e) = self.fail_next_auto.lock().take() {
                return Err(e);
            }

            self.calls.lock().push(call);
            let (completer, completion) = Completion::pair();
            self.completers.lock().push(completer);
            Ok(completion)
        }
    }

    impl Flight for MockFlight {
        fn mnvr(&self, cmd: MnvrCmd) -> Result<(), FlightClientError> {
            self.calls.lock().push(FlightCall::Mnvr(cmd));
            Ok(())
        }

        fn set_home(&self) -> Result<(), FlightClientError> {
            self.calls.lock().push(FlightCall::SetHome);
            Ok(())
        }

        fn flight_data(&self) -> FlightData {
            *self.flight_data.lock()
        }

        fn auto_fly_to_xy(&self, x: f32, y: f32) -> Result<Completion, FlightClientError> {
            self.auto(FlightCall::FlyToXy(x, y))
        }

        fn auto_turn_to_yaw(&self, yaw_deg: i16) -> Result<Completion, FlightClientError> {
            self.auto(FlightCall::TurnToYaw(yaw_deg))
        }

        fn auto_fly_to_height(&self, height: i16) -> Result<Completion, FlightClientError> {
            self.auto(FlightCall::FlyToHeight(height))
        }
    }
}
