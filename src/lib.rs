//! AquaFeed control core.
//!
//! Vision-guided feeder control: camera frames are turned into a surface
//! activity index, a five-state feeding cycle decides when the PI loop may
//! act, and the result drives a single PWM output.
//!
//! Exposes the pure-logic modules for integration testing and for the
//! `aquafeed` binary.  Hardware access is confined to `camera` and
//! `drivers`, behind the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod camera;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod features;
pub mod fsm;
pub mod fusion;
pub mod runner;
pub mod safety;
pub mod vision;

pub use error::{Error, Result};
