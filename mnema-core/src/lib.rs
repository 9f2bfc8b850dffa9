//! Mnema Core - Simulation Harness for the Memory Substrate
//!
//! TigerStyle simulation-first plumbing shared by the engine and its tests.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! The substrate is built simulation-first:
//! 1. Every time-dependent rule (working-memory expiry, idle triggers) runs
//!    against an injectable clock
//! 2. All randomness flows through a seeded RNG
//! 3. Storage and planner failure paths are reachable through explicit fault
//!    injection
//!
//! # Usage
//!
//! ```rust
//! use mnema_core::sim::{SimClock, DeterministicRng};
//!
//! let clock = SimClock::new();
//! clock.advance_ms(1_000);
//! assert_eq!(clock.now_ms(), 1_000);
//!
//! let mut rng = DeterministicRng::new(42);
//! let _roll = rng.next_float();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod sim;

pub use constants::*;
pub use sim::{DeterministicRng, FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType, SimClock};
