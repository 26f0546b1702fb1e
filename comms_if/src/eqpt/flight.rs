//! # Flight equipment interface
//!
//! Telemetry reported by the aircraft and the manual manoeuvres it can be commanded to perform.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One telemetry sample from the aircraft.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightData {
    /// Visual odometry position, in the aircraft's odometry frame. Z is positive downwards.
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,

    /// Yaw angle in degrees.
    pub yaw_deg: i16,

    /// Remaining battery charge in percent.
    pub battery_pct: i8,

    /// Light strength reported by the downwards vision sensor.
    pub light_strength: u8,

    pub battery_low: bool,
    pub battery_critical: bool,

    /// Set when the downwards vision system cannot hold position.
    pub down_visual_state: bool,

    pub error_state: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A manual manoeuvre.
///
/// Directional manoeuvres carry a speed as a percentage of the aircraft's maximum.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MnvrCmd {
    Forward(u8),
    Backward(u8),
    Left(u8),
    Right(u8),
    Up(u8),
    Down(u8),
    TurnLeft(u8),
    TurnRight(u8),

    /// Stop all motion and hold position.
    Hover,

    TakeOff,
    Land,
}
