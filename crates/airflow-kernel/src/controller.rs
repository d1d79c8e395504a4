//! The decision loop: tick-driven reward bookkeeping and action selection.
//!
//! For every actuator, once per tick:
//! 1. Settle: an unchanged state is only reconsidered every `settle_ticks`
//! 2. Pending: an unchanged state with targets still nearby waits
//! 3. Capture: a rising capture counter credits the previous action and its
//!    two same-tier angular neighbors
//! 4. Shaping: off-while-idle, effort-while-pending, off-while-pending
//! 5. Selection: the current state's table picks the next action
//!
//! Rewards always go to the table of the state the previous action was taken
//! in; there is no bootstrapping from the resulting state.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

use crate::action::{Action, ActionCatalog};
use crate::config::ControllerConfig;
use crate::environment::{ActuatorId, Environment};
use crate::error::ControlFault;
use crate::registry::StateRegistry;
use crate::table::ActionValueTable;

/// Result of a single controller step.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TickResult {
    /// Step number, starting at 1
    pub tick: u64,
    /// Actuators that went through a full decision and got a new action
    pub evaluated: usize,
    /// Actuators left alone because their state is settled
    pub settling: usize,
    /// Actuators left alone because targets are still pending in an unchanged state
    pub pending: usize,
    /// Actuators with no sensor reading yet
    pub unobserved: usize,
    /// Captures credited this step
    pub captures: usize,
    /// Individual value-table updates applied
    pub reward_updates: usize,
    /// Faults logged and skipped
    pub faults: usize,
    /// Distinct states known after this step
    pub known_states: usize,
}

/// What the controller remembers about one actuator between ticks.
#[derive(Debug, Clone, Default)]
struct ActuatorMemory {
    /// Capture counter as of the last reward step (0 until the first one)
    capture_count: u64,
    /// Action chosen at the last reconsideration
    last_action: Option<Action>,
    /// Consecutive unchanged ticks since the last reconsideration
    idle_ticks: u32,
}

/// Tabular learning controller for every actuator in an [`Environment`].
///
/// Owns the action catalog, the state registry and the selection RNG. All
/// mutation happens inside [`Controller::step`], one actuator at a time.
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    catalog: ActionCatalog,
    registry: StateRegistry,
    memory: HashMap<ActuatorId, ActuatorMemory>,
    rng: ChaCha8Rng,
    seed: u64,
    ticks: u64,
}

impl Controller {
    /// Create a controller. A missing seed in the config is drawn at random.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;

        let catalog = ActionCatalog::from_config(&config.catalog);
        let registry = StateRegistry::new(&catalog);
        let seed = config.seed.unwrap_or_else(rand::random);

        info!(
            directions = catalog.directions(),
            actions = catalog.len(),
            seed = seed,
            "Controller ready"
        );

        Ok(Self {
            config,
            catalog,
            registry,
            memory: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// Seed the selection RNG was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Steps taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of actuators the controller currently remembers.
    pub fn tracked(&self) -> usize {
        self.memory.len()
    }

    pub fn last_action(&self, actuator: ActuatorId) -> Option<Action> {
        self.memory.get(&actuator).and_then(|m| m.last_action)
    }

    /// Record an action applied to the actuator outside the loop (a manual
    /// override, for instance) so the next reconsideration credits it.
    ///
    /// The action is checked against the catalog at that point, not here.
    pub fn record_action(&mut self, actuator: ActuatorId, action: Action) {
        self.memory.entry(actuator).or_default().last_action = Some(action);
    }

    /// Drop everything remembered about an actuator. Learned values are kept.
    pub fn forget(&mut self, actuator: ActuatorId) -> bool {
        self.memory.remove(&actuator).is_some()
    }

    /// Run one decision tick over every actuator the environment reports.
    ///
    /// `delta_ms` is the time since the previous call; it is only logged.
    /// A fault on one actuator skips the rest of that actuator's work for
    /// this tick and nothing else.
    pub fn step<E: Environment + ?Sized>(&mut self, env: &mut E, delta_ms: u64) -> TickResult {
        env.notify_performance_tick();
        self.ticks += 1;

        let mut result = TickResult {
            tick: self.ticks,
            ..Default::default()
        };

        let actuators = env.generators();
        for &actuator in &actuators {
            if let Err(fault) = self.step_actuator(env, actuator, &mut result) {
                result.faults += 1;
                error!(
                    actuator = %actuator,
                    error = %fault,
                    "Skipping actuator for this tick"
                );
            }
        }

        // Actuators the environment no longer reports have been removed
        let live: HashSet<ActuatorId> = actuators.into_iter().collect();
        let before = self.memory.len();
        self.memory.retain(|id, _| live.contains(id));
        if self.memory.len() < before {
            debug!(
                removed = before - self.memory.len(),
                "Dropped memory of removed actuators"
            );
        }

        result.known_states = self.registry.len();

        trace!(
            tick = self.ticks,
            delta_ms = delta_ms,
            evaluated = result.evaluated,
            settling = result.settling,
            pending = result.pending,
            captures = result.captures,
            known_states = result.known_states,
            "Tick complete"
        );

        result
    }

    fn step_actuator<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        actuator: ActuatorId,
        result: &mut TickResult,
    ) -> Result<(), ControlFault> {
        let changed = env.has_state_changed(actuator);
        let memory = self.memory.entry(actuator).or_default();

        if !changed {
            memory.idle_ticks += 1;
            if memory.idle_ticks < self.config.settle_ticks {
                trace!(actuator = %actuator, idle_ticks = memory.idle_ticks, "Settled");
                result.settling += 1;
                return Ok(());
            }
        }
        memory.idle_ticks = 0;

        let Some(current) = env.current_snapshot(actuator) else {
            trace!(actuator = %actuator, "No snapshot yet");
            result.unobserved += 1;
            return Ok(());
        };

        // State the previous action is credited to
        let reward_state = if changed {
            env.previous_snapshot(actuator)
                .unwrap_or_else(|| current.clone())
        } else if current.occupancy() > 0 {
            trace!(
                actuator = %actuator,
                occupancy = current.occupancy(),
                "Unchanged with targets pending"
            );
            result.pending += 1;
            return Ok(());
        } else {
            current.clone()
        };

        let verbose = env.is_selected(actuator);
        let live_captures = env.capture_count(actuator);
        let captured = live_captures > memory.capture_count;

        if let Some(last) = memory.last_action {
            let Some(slot) = self.catalog.slot_of(&last) else {
                memory.last_action = None;
                return Err(ControlFault::MissingPreviousActionSlot { slot: last.slot() });
            };

            let table = self.registry.table_mut(&reward_state);
            let idle = reward_state.occupancy() == 0;

            if captured {
                let base = self.config.capture_rewards.reward_for(last.magnitude());
                credit(table, &last, base, actuator, result);

                if let Some(neighbors) = self.catalog.neighbors(slot) {
                    let share = base * self.config.neighbor_reward_fraction;
                    for n in neighbors {
                        if let Some(neighbor) = self.catalog.get(n) {
                            credit(table, neighbor, share, actuator, result);
                        }
                    }
                }

                result.captures += 1;
                debug!(
                    actuator = %actuator,
                    action = %last,
                    reward = base,
                    captures = live_captures,
                    "Capture rewarded"
                );
            }
            memory.capture_count = live_captures;

            let shaping = &self.config.shaping;
            if idle && last.is_off() {
                credit(table, &last, shaping.idle_off_bonus, actuator, result);
            }
            if !idle && !captured {
                for action in self.catalog.directional() {
                    credit(table, action, shaping.pending_effort_bonus, actuator, result);
                }
            }
            if !idle && last.is_off() {
                credit(table, &last, shaping.pending_off_penalty, actuator, result);
            }

            if verbose {
                debug!(
                    actuator = %actuator,
                    state = %reward_state,
                    values = %table,
                    "Updated last state"
                );
            }
        }

        let previous = memory.last_action;
        let table = self.registry.table_mut(&current);
        let action = table.select_action(
            previous.as_ref(),
            self.config.explore_probability,
            &mut self.rng,
        );

        if verbose {
            debug!(
                actuator = %actuator,
                state = %current,
                values = %table,
                chosen = %action,
                "Selected action"
            );
        } else {
            trace!(actuator = %actuator, chosen = %action, "Selected action");
        }

        env.apply_action(actuator, &action);
        memory.last_action = Some(action);
        result.evaluated += 1;

        Ok(())
    }
}

/// Apply one reward, logging and counting a rejected update instead of failing.
fn credit(
    table: &mut ActionValueTable,
    action: &Action,
    value: f64,
    actuator: ActuatorId,
    result: &mut TickResult,
) {
    match table.reward_action(action, value) {
        Ok(()) => result.reward_updates += 1,
        Err(fault) => {
            result.faults += 1;
            error!(actuator = %actuator, error = %fault, "Reward discarded");
        }
    }
}
