//! Gazemole engine library — eye-tracker gaze processing and a dwell-time
//! whack-a-mole game.
//!
//! This library crate exposes the pipeline modules for embedding and
//! integration testing. The binary entry point lives in `main.rs`.

pub mod clock;
pub mod comm;
pub mod config;
pub mod game;
pub mod input_source;
pub mod logging;
pub mod plane;
pub mod session;
