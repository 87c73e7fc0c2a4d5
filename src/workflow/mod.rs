// src/workflow/mod.rs

//! 单次模拟运行的装配与控制

pub mod runner;
pub mod simulation;

pub use runner::SimulationRunner;
pub use simulation::{Simulation, SimulationBuilder};
