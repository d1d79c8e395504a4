//! Defense Experiment: a grid world for exercising the airflow controller.
//!
//! This crate implements an insect-defense simulation that:
//! - Plays the environment role for the controller (sensors, capture counts, actuation)
//! - Runs seeded, reproducible trials
//! - Collects per-tick metrics and cross-trial summaries

pub mod experiment;
pub mod grid;
pub mod results;
