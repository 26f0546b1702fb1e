//! # Navigation module
//!
//! Tracks the aircraft's position from its telemetry stream. Every sample fully replaces the
//! current [`Position`], there is no filtering or fusion. Readers always see a complete snapshot:
//! the new position is built before the lock is taken and the lock only guards the swap of the
//! shared pointer.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{fmt::Write, sync::Arc};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info};
use parking_lot::RwLock;

use comms_if::eqpt::flight::FlightData;
use util::maths::{rotate_z, V3D};

use crate::shutdown::{Shutdown, POLL_PERIOD};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The location and heading of the aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Location in the tracking frame, Z positive upwards.
    pub location: V3D,

    /// Unit vector in the direction the aircraft is facing.
    pub heading: V3D,
}

/// Position tracker.
#[derive(Debug, Default)]
pub struct Nav {
    current: RwLock<Arc<Position>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Position {
    fn default() -> Self {
        Self {
            location: V3D::zeros(),
            heading: V3D::x(),
        }
    }
}

impl Position {
    /// Build a position from a telemetry sample.
    ///
    /// The odometry Z axis points down, so it is negated.
    pub fn from_flight_data(fd: &FlightData) -> Self {
        Self {
            location: V3D::new(
                fd.position_x as f64,
                fd.position_y as f64,
                -(fd.position_z as f64),
            ),
            heading: rotate_z(&V3D::x(), fd.yaw_deg as f64),
        }
    }

    /// Heading angle about Z in whole degrees.
    pub fn yaw_deg(&self) -> i16 {
        self.heading.y.atan2(self.heading.x).to_degrees().round() as i16
    }

    /// Export the position as an arrow shaped mesh.
    ///
    /// Vertex 1 is the location, 2 the point one unit along the heading, and 3 and 4 the left and
    /// right barbs of the arrow.
    pub fn to_obj(&self) -> String {
        let tip = self.heading + self.location;
        let left = rotate_z(&self.heading, -135.0) + self.location;
        let right = rotate_z(&self.heading, 135.0) + self.location;

        let mut obj = String::from("mtllib pos.mtl\no Pos\n");

        for v in &[self.location, tip, left, right] {
            // Writing to a String cannot fail
            writeln!(obj, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z).ok();
        }

        obj.push_str("l 1 2\nl 2 3\nl 2 4\nl 4 1\nl 3 1\nf 2/1/2 4/1/4 1/1/1 3/1/3\n");

        obj
    }
}

impl Nav {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current position with one derived from the sample.
    pub fn on_sample(&self, fd: &FlightData) {
        let pos = Arc::new(Position::from_flight_data(fd));

        *self.current.write() = pos;
    }

    /// Latest position snapshot.
    pub fn current_pose(&self) -> Position {
        let pos = self.current.read().clone();
        *pos
    }

    /// Consume the telemetry stream until shutdown is requested or the stream ends.
    pub fn run(&self, samples: Receiver<FlightData>, shutdown: &Shutdown) {
        info!("Navigation started");

        while !shutdown.is_requested() {
            match samples.recv_timeout(POLL_PERIOD) {
                Ok(fd) => self.on_sample(&fd),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Telemetry stream closed");
                    break;
                }
            }
        }

        info!("Navigation stopped");
    }
}
