//! # Pilot library.
//!
//! This library allows other crates in the workspace, as well as the benches, to access items
//! defined inside the pilot crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Autopilot - sequences the three phase return manoeuvre
pub mod autopilot;

/// Command processor - executes operator commands against the aircraft and the fly map
pub mod cmd_processor;

/// Flight client - the capabilities of the aircraft
pub mod flight_client;

/// Fly map - the graph of marked checkpoints
pub mod fly_map;

/// Map sender - broadcasts the fly map and position to the console
pub mod map_sender;

/// Navigation module - tracks the aircraft's position from its telemetry
pub mod nav;

/// Parameters for the pilot executable
pub mod params;

/// Shutdown flag shared by the background threads
pub mod shutdown;

/// Simulation client - a simulated aircraft
pub mod sim_client;
