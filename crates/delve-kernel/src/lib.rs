//! `delve-kernel` – control-layer primitives.
//!
//! The kernel does not know anything about the game.  It supplies the small
//! building blocks every task routine leans on.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock] with [`SystemClock`][clock::SystemClock]
//!   and the virtual [`ManualClock`][clock::ManualClock] used in tests.
//! - [`wait`] – [`wait_for`][wait::wait_for]: the bounded polling primitive
//!   every timeout guarantee is built on.
//! - [`stuck_detector`] – [`StuckDetector`][stuck_detector::StuckDetector]:
//!   flags a task whose position samples stopped changing, ignoring
//!   configured immobilising conditions.
//! - [`error_breaker`] – [`ErrorBreaker`][error_breaker::ErrorBreaker]:
//!   time-decayed consecutive-failure counter that halts scheduling once it
//!   trips.

pub mod clock;
pub mod error_breaker;
pub mod stuck_detector;
pub mod wait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error_breaker::{BreakerState, ErrorBreaker};
pub use stuck_detector::StuckDetector;
pub use wait::{PollSpec, wait_for, wait_with};
