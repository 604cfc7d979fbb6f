//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no camera or
//! PWM hardware required.

mod adapter_tests;
mod frame_source_tests;
mod mock_hw;
mod runner_tests;
mod service_tests;
