//! Trace-driven, cycle-accurate simulator for shared-bus, snoop-based cache
//! coherence under the MESI (Illinois) and Dragon 4-state update protocols.
//!
//! Each core replays a memory-access trace against its private L1; the caches
//! coordinate over a single FCFS bus, and the driver interleaves the cores on
//! independent virtual clocks. A run is a pure function from (configuration,
//! traces) to a [`stats::Report`].

pub mod bus;
pub mod cache;
pub mod commons;
pub mod dragon;
pub mod error;
pub mod mesi;
pub mod protocol;
pub mod sim;
pub mod stats;
pub mod trace;

pub use commons::{Addr, Protocol, SystemSpec, NUM_CORES};
pub use error::{SimResult, SimulatorError};
pub use sim::Simulator;
pub use stats::Report;
pub use trace::{Instr, Instructions};
