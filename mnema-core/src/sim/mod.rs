//! Simulation harness: injectable clock, seeded RNG, fault injection.
//!
//! TigerStyle: build the test harness before the production code.

mod clock;
mod fault;
mod rng;

pub use clock::SimClock;
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use rng::DeterministicRng;
