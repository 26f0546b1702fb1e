//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator command vocabulary
pub mod cmd;

/// Data and command definitions for equipment (the aircraft)
pub mod eqpt;

/// Tagged console messages
pub mod msg;

/// Network module
pub mod net;
