//! # Pilot Executable Parameters
//!
//! This module provide parameters for the pilot executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{autopilot::AutopilotParams, map_sender::MapSenderParams, sim_client::SimParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PilotExecParams {
    /// Path of the fly map file, relative to the working directory
    pub map_path: String,

    /// Name given to a newly created fly map
    pub map_name: String,

    /// Material library given to a newly created fly map
    pub map_mtl_lib: String,

    /// If true the fly map is loaded from `map_path` on start up
    pub load_map_on_start: bool,

    /// Longest time the command loop waits for a console message
    pub cmd_poll_period_s: f64,

    /// Speed of manual manoeuvres, as a percentage of the maximum
    pub mnvr_speed_pct: u8,

    pub map_sender: MapSenderParams,

    pub autopilot: AutopilotParams,

    pub sim: SimParams,
}
