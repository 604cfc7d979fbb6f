//! Feedback control: PI loop and output slew limiting.

pub mod pi;
pub mod slew;

pub use pi::{PiController, PiStatus};
pub use slew::SlewLimiter;
