//! Airflow Kernel: per-actuator tabular learning for airflow defense grids.
//!
//! Every controllable actuator (a vacuum or fan that pulls targets out of the
//! grid) gets a small discrete action set of direction × power tier plus an
//! off action. The kernel keeps a running-mean utility for each action in
//! every locally observed state, picks an action each decision tick, and
//! credits captures back to the action that produced them and to its
//! angular neighbors at the same tier.
//!
//! The world itself lives behind the [`Environment`] trait; the kernel only
//! reads snapshots and capture counters and writes actions back.

pub mod action;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod registry;
pub mod table;

pub use action::{Action, ActionCatalog, Direction, PowerLevel};
pub use config::{CaptureRewardConfig, CatalogConfig, ControllerConfig, ShapingConfig};
pub use controller::{Controller, TickResult};
pub use environment::{ActuatorId, Environment};
pub use error::ControlFault;
pub use registry::{StateRegistry, StateSnapshot};
pub use table::ActionValueTable;
