//! # Equipment Interface
//!
//! This module defines the interface structures exchanged with the aircraft.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod flight;
