//! The authoritative world and its fixed-step tick.
//!
//! [`World`] owns every creature and food orb. Nothing outside it holds a
//! reference across ticks: the network layer feeds it [`GameCommand`]s
//! between ticks and reads back a [`TickOutcome`] after each one.

use crate::collision::{self, DeathCause, WorldGrid};
use crate::entity::{self, Creature, FoodField};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{CreatureSnapshot, DeathNotice, GameConfig, StateDelta, Vec2};
use std::collections::BTreeMap;
use std::time::Duration;

/// Validated input destined for the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Join { id: u32, name: String },
    SetHeading { id: u32, angle: f32 },
    SetBoost { id: u32, boosting: bool },
    Disconnect { id: u32 },
}

/// What applying a [`GameCommand`] did to the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandEffect {
    Joined { id: u32, spawn: Vec2 },
    Applied,
    Removed,
    /// Unknown creature, duplicate join, or no effective change.
    Ignored,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub delta: StateDelta,
    /// One notice per creature that died this tick, already removed.
    pub deaths: Vec<DeathNotice>,
}

pub struct World {
    config: GameConfig,
    creatures: BTreeMap<u32, Creature>,
    food: FoodField,
    grid: WorldGrid,
    rng: StdRng,
    /// Simulation time, advanced by each tick's delta time.
    clock: Duration,
    tick: u64,
    players_dirty: bool,
    food_dirty: bool,
}

impl World {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Builds a world whose every random choice derives from `seed`.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, mut rng: StdRng) -> Self {
        let mut food = FoodField::new(config.max_food.max(config.target_food));
        for _ in 0..config.target_food {
            food.spawn_random(&config, &mut rng);
        }

        Self {
            grid: WorldGrid::new(config.world_size, config.cell_size),
            config,
            creatures: BTreeMap::new(),
            food,
            rng,
            clock: Duration::ZERO,
            tick: 0,
            players_dirty: false,
            food_dirty: true,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn creature(&self, id: u32) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    /// Live creatures in id order.
    pub fn creatures(&self) -> impl Iterator<Item = &Creature> + '_ {
        self.creatures.values()
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn food(&self) -> &FoodField {
        &self.food
    }

    pub fn is_playing(&self, id: u32) -> bool {
        self.creatures.contains_key(&id)
    }

    pub fn apply_command(&mut self, command: GameCommand) -> CommandEffect {
        match command {
            GameCommand::Join { id, name } => match self.join(id, name) {
                Some(spawn) => CommandEffect::Joined { id, spawn },
                None => CommandEffect::Ignored,
            },
            GameCommand::SetHeading { id, angle } => effect_of(self.set_heading(id, angle)),
            GameCommand::SetBoost { id, boosting } => effect_of(self.set_boost(id, boosting)),
            GameCommand::Disconnect { id } => {
                if self.remove_creature(id) {
                    CommandEffect::Removed
                } else {
                    CommandEffect::Ignored
                }
            }
        }
    }

    /// Spawns a creature for `id`. Returns its head position, or `None` if
    /// `id` already has a live creature.
    pub fn join(&mut self, id: u32, name: String) -> Option<Vec2> {
        if self.creatures.contains_key(&id) {
            return None;
        }

        let spawn = entity::choose_spawn_point(&self.config, &mut self.rng, self.creatures.values());
        let angle = entity::random_heading(&mut self.rng);
        let color = entity::random_creature_color(&mut self.rng);
        let creature = Creature::new(id, name, spawn, angle, color, &self.config, self.clock);

        info!(
            "Creature {} '{}' spawned at ({:.0}, {:.0})",
            id, creature.name, spawn.x, spawn.y
        );
        self.creatures.insert(id, creature);
        self.players_dirty = true;
        Some(spawn)
    }

    pub fn set_heading(&mut self, id: u32, angle: f32) -> bool {
        let min_delta = self.config.min_heading_delta;
        let changed = self
            .creatures
            .get_mut(&id)
            .map_or(false, |c| c.set_heading(angle, min_delta));
        self.players_dirty |= changed;
        changed
    }

    pub fn set_boost(&mut self, id: u32, boosting: bool) -> bool {
        let changed = self
            .creatures
            .get_mut(&id)
            .map_or(false, |c| c.set_boost(boosting));
        self.players_dirty |= changed;
        changed
    }

    /// Removes a creature without a death notice, scattering its remains.
    pub fn remove_creature(&mut self, id: u32) -> bool {
        let Some(creature) = self.creatures.remove(&id) else {
            return false;
        };
        let spawned =
            collision::scatter_remains(&creature, &mut self.food, &self.config, &mut self.rng);
        info!(
            "Creature {} removed (score {}, length {}, {} food dropped)",
            id,
            creature.score,
            creature.len(),
            spawned
        );
        self.food_dirty |= spawned > 0;
        self.players_dirty = true;
        true
    }

    /// Advances the world by one fixed step.
    ///
    /// `dt` advances the simulation clock that drives spawn immunity;
    /// movement itself is a fixed distance per tick. `timestamp` is stamped
    /// on the outbound delta.
    pub fn tick(&mut self, dt: Duration, timestamp: u64) -> TickOutcome {
        self.tick += 1;
        self.clock += dt;

        let mut dead: Vec<(u32, DeathCause)> = Vec::new();
        let moved = self.advance_creatures(&mut dead);

        collision::rebuild_grid(
            &mut self.grid,
            self.creatures
                .values()
                .filter(|c| !dead.iter().any(|(id, _)| *id == c.id)),
            &self.food,
        );

        let eaten = self.resolve_contacts(&moved, &mut dead);
        let deaths = self.bury(dead);
        self.replenish_food(eaten);

        TickOutcome {
            delta: self.take_delta(timestamp),
            deaths,
        }
    }

    /// Moves every creature one step and charges boost cost.
    /// Returns the ids that moved; boundary deaths go into `dead`.
    fn advance_creatures(&mut self, dead: &mut Vec<(u32, DeathCause)>) -> Vec<u32> {
        let immunity = self.config.spawn_immunity();
        let ws = self.config.world_size;
        let margin = self.config.boundary_margin;
        let boost_floor = self.config.initial_length + self.config.boost_min_extra_length;

        let mut moved = Vec::with_capacity(self.creatures.len());
        for creature in self.creatures.values_mut() {
            if creature.expire_invulnerability(self.clock, immunity) {
                debug!("Creature {} is now vulnerable", creature.id);
                self.players_dirty = true;
            }

            let Some(head) = creature.head() else {
                continue;
            };
            let step = Vec2::from_angle(creature.angle).scale(creature.speed(&self.config));
            let next = head.add(step);

            let outside = next.x < -margin
                || next.x > ws + margin
                || next.y < -margin
                || next.y > ws + margin;
            if outside {
                dead.push((creature.id, DeathCause::Boundary));
                continue;
            }

            creature.advance_to(next);
            creature.last_update = self.clock;

            if creature.boosting
                && creature.len() > boost_floor
                && self.rng.gen::<f32>() < self.config.boost_loss_probability
            {
                creature.shed_tail();
            }

            moved.push(creature.id);
            self.players_dirty = true;
        }
        moved
    }

    /// Runs feeding then contact checks for every creature that moved.
    /// Returns the number of orbs eaten.
    fn resolve_contacts(&mut self, moved: &[u32], dead: &mut Vec<(u32, DeathCause)>) -> usize {
        let mut eaten = 0;
        for id in moved {
            let Some(creature) = self.creatures.get_mut(id) else {
                continue;
            };

            eaten += collision::consume_food(creature, &self.grid, &mut self.food);

            if let Some(cause) = collision::find_lethal_contact(creature, &self.grid, &self.config)
            {
                dead.push((*id, cause));
            }
        }
        self.food_dirty |= eaten > 0;
        eaten
    }

    /// Removes the dead, scattering their remains, and returns their notices.
    fn bury(&mut self, dead: Vec<(u32, DeathCause)>) -> Vec<DeathNotice> {
        let mut notices = Vec::with_capacity(dead.len());
        for (id, cause) in dead {
            let Some(creature) = self.creatures.remove(&id) else {
                continue;
            };
            let spawned =
                collision::scatter_remains(&creature, &mut self.food, &self.config, &mut self.rng);
            info!(
                "Creature {} '{}' died ({:?}) with score {} and length {}",
                id,
                creature.name,
                cause,
                creature.score,
                creature.len()
            );

            notices.push(DeathNotice {
                player_id: id,
                score: creature.score,
                length: creature.len(),
            });
            self.food_dirty |= spawned > 0;
            self.players_dirty = true;
        }
        notices
    }

    /// Replaces eaten orbs, then tops the field up to its target.
    fn replenish_food(&mut self, eaten: usize) {
        for _ in 0..eaten {
            if self.food.len() >= self.config.max_food {
                break;
            }
            self.food.spawn_random(&self.config, &mut self.rng);
            self.food_dirty = true;
        }
        while self.food.len() < self.config.target_food {
            self.food.spawn_random(&self.config, &mut self.rng);
            self.food_dirty = true;
        }
    }

    fn take_delta(&mut self, timestamp: u64) -> StateDelta {
        let players = std::mem::take(&mut self.players_dirty).then(|| self.snapshots());
        let food = std::mem::take(&mut self.food_dirty).then(|| self.food.snapshots());
        StateDelta::new(timestamp, players, food)
    }

    pub fn snapshots(&self) -> BTreeMap<u32, CreatureSnapshot> {
        self.creatures
            .iter()
            .map(|(id, creature)| (*id, creature.snapshot()))
            .collect()
    }
}

fn effect_of(applied: bool) -> CommandEffect {
    if applied {
        CommandEffect::Applied
    } else {
        CommandEffect::Ignored
    }
}
