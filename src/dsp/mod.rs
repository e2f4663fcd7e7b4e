//! Signal-processing stages
//!
//! The block pipeline runs crossover split, per-band dynamics, then the
//! mixer/output stage. All stages are deterministic given state and input.

mod dynamics;
mod filter;
mod mixer;

pub use dynamics::Dynamics;
pub use filter::{Crossover, CrossoverLayout};
pub use mixer::{recombine, soft_limit};
