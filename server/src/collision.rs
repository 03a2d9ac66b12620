//! Feeding, contact deaths and death scattering.
//!
//! Every test here compares squared distances. Candidates come from the
//! per-tick [`WorldGrid`], which only narrows the search; the exact check is
//! always done against the candidate's recorded position.

use crate::entity::{Creature, FoodField};
use crate::spatial::SpatialGrid;
use rand::Rng;
use shared::{GameConfig, Vec2};

/// Cells searched around a head in each direction.
pub const NEIGHBOURHOOD: usize = 1;

/// One creature segment as filed in the grid for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentRef {
    pub owner: u32,
    pub index: usize,
    pub position: Vec2,
    pub radius: f32,
    pub owner_invulnerable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occupant {
    Segment(SegmentRef),
    Food { slot: usize },
}

pub type WorldGrid = SpatialGrid<Occupant>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Boundary,
    Collision { with: u32 },
    SelfCollision,
}

/// Files every segment of every listed creature and every live orb.
pub fn rebuild_grid<'a, I>(grid: &mut WorldGrid, creatures: I, food: &FoodField)
where
    I: Iterator<Item = &'a Creature>,
{
    let segments = creatures.flat_map(|creature| {
        creature
            .segments
            .iter()
            .enumerate()
            .map(move |(index, &position)| {
                let occupant = Occupant::Segment(SegmentRef {
                    owner: creature.id,
                    index,
                    position,
                    radius: creature.segment_radius(index),
                    owner_invulnerable: creature.invulnerable,
                });
                (position, occupant)
            })
    });
    let orbs = food
        .iter()
        .map(|(slot, orb)| (orb.position, Occupant::Food { slot }));

    grid.rebuild(segments.chain(orbs));
}

/// Eats every orb touching the creature's head. Each hit frees the orb,
/// adds its value to the score and marks the creature as growing.
///
/// Returns the number of orbs eaten.
pub fn consume_food(creature: &mut Creature, grid: &WorldGrid, food: &mut FoodField) -> usize {
    let Some(head) = creature.head() else {
        return 0;
    };

    let mut eaten = 0;
    for occupant in grid.query(head, NEIGHBOURHOOD) {
        let Occupant::Food { slot } = occupant else {
            continue;
        };
        // Already eaten by someone earlier this tick.
        let Some(orb) = food.get(slot) else {
            continue;
        };
        let reach = creature.head_radius + orb.radius();
        if head.distance_sq(orb.position) < reach * reach {
            if let Some(orb) = food.take(slot) {
                creature.score = creature.score.saturating_add(orb.value());
                creature.growing = true;
                eaten += 1;
            }
        }
    }
    eaten
}

/// Returns the first lethal contact for the creature's head, if any.
///
/// Own segments closer than `self_collision_exempt` to the head are ignored,
/// as is every segment of an invulnerable creature. An invulnerable creature
/// never dies from contact.
pub fn find_lethal_contact(
    creature: &Creature,
    grid: &WorldGrid,
    config: &GameConfig,
) -> Option<DeathCause> {
    if creature.invulnerable {
        return None;
    }
    let head = creature.head()?;

    grid.query(head, NEIGHBOURHOOD).find_map(|occupant| {
        let Occupant::Segment(segment) = occupant else {
            return None;
        };

        let own = segment.owner == creature.id;
        if own && segment.index < config.self_collision_exempt.max(1) {
            return None;
        }
        if !own && segment.owner_invulnerable {
            return None;
        }

        let reach = creature.head_radius + segment.radius - config.collision_tolerance;
        if reach <= 0.0 || head.distance_sq(segment.position) >= reach * reach {
            return None;
        }

        Some(if own {
            DeathCause::SelfCollision
        } else {
            DeathCause::Collision {
                with: segment.owner,
            }
        })
    })
}

/// Drops food along every second segment of a dead creature.
///
/// Stops at `max_food_per_death` orbs or when the field reaches
/// `max_food`. Returns the number of orbs spawned.
pub fn scatter_remains<R: Rng + ?Sized>(
    creature: &Creature,
    food: &mut FoodField,
    config: &GameConfig,
    rng: &mut R,
) -> usize {
    let spread = config.death_food_spread.max(0.0);
    let mut spawned = 0;

    for segment in creature
        .segments
        .iter()
        .step_by(2)
        .take(config.max_food_per_death)
    {
        if food.len() >= config.max_food {
            break;
        }
        let jitter = Vec2::new(
            rng.gen_range(-spread..=spread),
            rng.gen_range(-spread..=spread),
        );
        let size = config.food_size + rng.gen_range(0.0..=config.death_food_size_jitter.max(0.0));
        food.spawn(segment.add(jitter), size, creature.color, rng);
        spawned += 1;
    }
    spawned
}
