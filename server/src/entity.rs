//! Creatures, food orbs and the factories that create them.

use crate::utils::angle_delta;
use rand::Rng;
use shared::config::{CREATURE_PALETTE, FOOD_PALETTE};
use shared::{CreatureSnapshot, FoodSnapshot, GameConfig, Vec2};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::time::Duration;

/// A player-controlled body. Owned by the world and mutated only by the tick
/// or by validated commands applied between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Creature {
    pub id: u32,
    pub name: String,
    /// Head first. Never empty while the creature is registered.
    pub segments: VecDeque<Vec2>,
    /// Heading in radians.
    pub angle: f32,
    pub boosting: bool,
    pub score: u32,
    pub color: u32,
    pub head_radius: f32,
    pub body_radius: f32,
    /// Simulation time at spawn.
    pub created_at: Duration,
    /// Simulation time of the last advance.
    pub last_update: Duration,
    pub invulnerable: bool,
    /// Set by eating; the next advance appends instead of shifting.
    pub growing: bool,
}

impl Creature {
    /// Builds a creature whose body trails back from `head` against `angle`.
    pub fn new(
        id: u32,
        name: String,
        head: Vec2,
        angle: f32,
        color: u32,
        config: &GameConfig,
        now: Duration,
    ) -> Self {
        let back = Vec2::from_angle(angle).scale(-config.segment_spacing);
        let segments = (0..config.initial_length.max(1))
            .map(|i| head.add(back.scale(i as f32)))
            .collect();

        Self {
            id,
            name,
            segments,
            angle,
            boosting: false,
            score: 0,
            color,
            head_radius: config.head_radius,
            body_radius: config.body_radius,
            created_at: now,
            last_update: now,
            invulnerable: config.spawn_immunity_ms > 0,
            growing: false,
        }
    }

    pub fn head(&self) -> Option<Vec2> {
        self.segments.front().copied()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn speed(&self, config: &GameConfig) -> f32 {
        if self.boosting {
            config.boost_speed
        } else {
            config.base_speed
        }
    }

    /// Contact radius of the segment at `index`.
    pub fn segment_radius(&self, index: usize) -> f32 {
        if index == 0 {
            self.head_radius
        } else {
            self.body_radius
        }
    }

    /// Drops spawn protection once `immunity` has elapsed since creation.
    /// Returns true if the creature just became vulnerable.
    pub fn expire_invulnerability(&mut self, now: Duration, immunity: Duration) -> bool {
        if self.invulnerable && now.saturating_sub(self.created_at) >= immunity {
            self.invulnerable = false;
            return true;
        }
        false
    }

    /// Applies a new heading if it differs enough from the current one.
    pub fn set_heading(&mut self, angle: f32, min_delta: f32) -> bool {
        if !angle.is_finite() {
            return false;
        }
        if angle_delta(self.angle, angle).abs() <= min_delta {
            return false;
        }
        self.angle = angle;
        true
    }

    pub fn set_boost(&mut self, boosting: bool) -> bool {
        if self.boosting == boosting {
            return false;
        }
        self.boosting = boosting;
        true
    }

    /// Moves the head to `new_head`. Every other segment takes its
    /// predecessor's old position, or the body grows by one if `growing`.
    pub fn advance_to(&mut self, new_head: Vec2) {
        self.segments.push_front(new_head);
        if self.growing {
            self.growing = false;
        } else {
            self.segments.pop_back();
        }
    }

    /// Sheds one tail segment and one point of score. The head is never shed.
    pub fn shed_tail(&mut self) {
        if self.segments.len() > 1 {
            self.segments.pop_back();
        }
        self.score = self.score.saturating_sub(1);
    }

    pub fn snapshot(&self) -> CreatureSnapshot {
        CreatureSnapshot {
            id: self.id,
            name: self.name.clone(),
            segments: self.segments.iter().copied().collect(),
            segment_offset: 0,
            angle: self.angle,
            boosting: self.boosting,
            score: self.score,
            color: self.color,
            head_radius: self.head_radius,
            body_radius: self.body_radius,
            invulnerable: self.invulnerable,
        }
    }
}

/// Picks a spawn point, preferring one at least `spawn_safety_radius` from
/// every existing segment. Falls back to the last candidate tried.
pub fn choose_spawn_point<'a, R, I>(config: &GameConfig, rng: &mut R, creatures: I) -> Vec2
where
    R: Rng + ?Sized,
    I: Iterator<Item = &'a Creature> + Clone,
{
    let safe_sq = config.spawn_safety_radius * config.spawn_safety_radius;
    let (low, high) = spawn_range(config.world_size, config.spawn_margin);

    let mut candidate = Vec2::new(config.world_size / 2.0, config.world_size / 2.0);
    for _ in 0..config.spawn_attempts.max(1) {
        candidate = Vec2::new(rng.gen_range(low..=high), rng.gen_range(low..=high));
        let clear = creatures
            .clone()
            .flat_map(|c| c.segments.iter())
            .all(|segment| segment.distance_sq(candidate) >= safe_sq);
        if clear {
            break;
        }
    }
    candidate
}

pub fn random_heading<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(0.0..TAU)
}

pub fn random_creature_color<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    CREATURE_PALETTE[rng.gen_range(0..CREATURE_PALETTE.len())]
}

fn spawn_range(world_size: f32, margin: f32) -> (f32, f32) {
    let margin = margin.max(0.0).min((world_size / 2.0).max(0.0));
    (margin, world_size - margin)
}

/// A food orb. Its size is both its contact radius and its score value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Food {
    pub id: u64,
    pub position: Vec2,
    pub size: f32,
    pub color: u32,
}

impl Food {
    pub fn radius(&self) -> f32 {
        self.size
    }

    /// Score awarded for eating this orb.
    pub fn value(&self) -> u32 {
        self.size.max(0.0).floor() as u32
    }

    pub fn snapshot(&self) -> FoodSnapshot {
        FoodSnapshot {
            id: self.id,
            position: self.position,
            size: self.size,
            color: self.color,
        }
    }
}

/// Fixed-capacity slot array of food orbs with a free list.
///
/// Spawning and consuming are O(1). When every slot is taken a spawn
/// overwrites a random slot instead of failing.
#[derive(Debug, Clone)]
pub struct FoodField {
    slots: Vec<Option<Food>>,
    free: Vec<usize>,
    live: usize,
    next_id: u64,
}

impl FoodField {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            // Popped from the back, so slot 0 is handed out first.
            free: (0..capacity).rev().collect(),
            live: 0,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, slot: usize) -> Option<&Food> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Removes and returns the orb in `slot`, if any.
    pub fn take(&mut self, slot: usize) -> Option<Food> {
        let food = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.live -= 1;
        Some(food)
    }

    /// Places a new orb and returns its slot.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        position: Vec2,
        size: f32,
        color: u32,
        rng: &mut R,
    ) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.live += 1;
                slot
            }
            None => rng.gen_range(0..self.slots.len()),
        };

        let id = self.next_id;
        self.next_id += 1;
        self.slots[slot] = Some(Food {
            id,
            position,
            size,
            color,
        });
        slot
    }

    /// Spawns an ambient orb at a random spot away from the world edges.
    pub fn spawn_random<R: Rng + ?Sized>(&mut self, config: &GameConfig, rng: &mut R) -> usize {
        let (low, high) = spawn_range(config.world_size, config.food_edge_margin);
        let position = Vec2::new(rng.gen_range(low..=high), rng.gen_range(low..=high));
        let size = config.food_size + rng.gen_range(0.0..=config.food_size_jitter.max(0.0));
        let color = FOOD_PALETTE[rng.gen_range(0..FOOD_PALETTE.len())];
        self.spawn(position, size, color, rng)
    }

    /// Live orbs with their slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Food)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, food)| food.as_ref().map(|f| (slot, f)))
    }

    pub fn snapshots(&self) -> Vec<FoodSnapshot> {
        self.iter().map(|(_, food)| food.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_creature() -> Creature {
        Creature::new(
            1,
            "tester".to_string(),
            Vec2::new(500.0, 500.0),
            0.0,
            CREATURE_PALETTE[0],
            &GameConfig::default(),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_creature_initial_body_trails_behind_head() {
        let config = GameConfig::default();
        let creature = test_creature();

        assert_eq!(creature.len(), config.initial_length);
        assert_eq!(creature.head(), Some(Vec2::new(500.0, 500.0)));
        for (i, segment) in creature.segments.iter().enumerate() {
            assert_approx_eq!(segment.x, 500.0 - i as f32 * config.segment_spacing, 1e-3);
            assert_approx_eq!(segment.y, 500.0, 1e-3);
        }
        assert!(creature.invulnerable);
        assert_eq!(creature.score, 0);
    }

    #[test]
    fn test_advance_shifts_body() {
        let mut creature = test_creature();
        let before: Vec<Vec2> = creature.segments.iter().copied().collect();

        creature.advance_to(Vec2::new(503.0, 500.0));

        assert_eq!(creature.len(), before.len());
        assert_eq!(creature.segments[0], Vec2::new(503.0, 500.0));
        for i in 1..creature.len() {
            assert_eq!(creature.segments[i], before[i - 1]);
        }
    }

    #[test]
    fn test_advance_while_growing_appends() {
        let mut creature = test_creature();
        let before_len = creature.len();
        let old_tail = *creature.segments.back().unwrap();
        creature.growing = true;

        creature.advance_to(Vec2::new(503.0, 500.0));

        assert_eq!(creature.len(), before_len + 1);
        assert_eq!(*creature.segments.back().unwrap(), old_tail);
        assert!(!creature.growing);
    }

    #[test]
    fn test_set_heading_threshold() {
        let mut creature = test_creature();
        assert!(!creature.set_heading(0.005, 0.01));
        assert_eq!(creature.angle, 0.0);

        assert!(creature.set_heading(0.5, 0.01));
        assert_eq!(creature.angle, 0.5);

        assert!(!creature.set_heading(0.5, 0.01));
    }

    #[test]
    fn test_set_heading_wraps_around() {
        let mut creature = test_creature();
        creature.angle = TAU - 0.001;
        assert!(!creature.set_heading(0.001, 0.01));
    }

    #[test]
    fn test_set_heading_rejects_nan() {
        let mut creature = test_creature();
        assert!(!creature.set_heading(f32::NAN, 0.01));
        assert!(!creature.set_heading(f32::INFINITY, 0.01));
        assert_eq!(creature.angle, 0.0);
    }

    #[test]
    fn test_set_boost_only_on_change() {
        let mut creature = test_creature();
        assert!(!creature.set_boost(false));
        assert!(creature.set_boost(true));
        assert!(!creature.set_boost(true));
        assert!(creature.boosting);
    }

    #[test]
    fn test_shed_tail_floors_score() {
        let mut creature = test_creature();
        creature.shed_tail();
        assert_eq!(creature.score, 0);
        assert_eq!(creature.len(), 4);

        creature.segments.truncate(1);
        creature.shed_tail();
        assert_eq!(creature.len(), 1);
    }

    #[test]
    fn test_invulnerability_expires() {
        let mut creature = test_creature();
        let immunity = Duration::from_millis(3000);

        assert!(!creature.expire_invulnerability(Duration::from_millis(2999), immunity));
        assert!(creature.invulnerable);
        assert!(creature.expire_invulnerability(Duration::from_millis(3000), immunity));
        assert!(!creature.invulnerable);
        assert!(!creature.expire_invulnerability(Duration::from_millis(5000), immunity));
    }

    #[test]
    fn test_spawn_point_avoids_existing_creatures() {
        let config = GameConfig {
            world_size: 1000.0,
            spawn_margin: 100.0,
            ..GameConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let blocker = Creature::new(
            9,
            "blocker".to_string(),
            Vec2::new(500.0, 500.0),
            0.0,
            0,
            &config,
            Duration::ZERO,
        );
        let creatures = vec![blocker];

        for _ in 0..20 {
            let spot = choose_spawn_point(&config, &mut rng, creatures.iter());
            let safe_sq = config.spawn_safety_radius * config.spawn_safety_radius;
            assert!(creatures[0]
                .segments
                .iter()
                .all(|s| s.distance_sq(spot) >= safe_sq));
            assert!(spot.x >= 100.0 && spot.x <= 900.0);
            assert!(spot.y >= 100.0 && spot.y <= 900.0);
        }
    }

    #[test]
    fn test_spawn_point_falls_back_when_crowded() {
        let config = GameConfig {
            world_size: 500.0,
            spawn_margin: 200.0,
            spawn_safety_radius: 10_000.0,
            ..GameConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let crowd = vec![test_creature()];

        let spot = choose_spawn_point(&config, &mut rng, crowd.iter());
        assert!(spot.x >= 200.0 && spot.x <= 300.0);
    }

    #[test]
    fn test_food_field_spawn_and_take() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut field = FoodField::new(4);

        let a = field.spawn(Vec2::new(1.0, 1.0), 4.5, 0, &mut rng);
        let b = field.spawn(Vec2::new(2.0, 2.0), 6.9, 0, &mut rng);
        assert_eq!((a, b), (0, 1));
        assert_eq!(field.len(), 2);
        assert_eq!(field.get(b).unwrap().value(), 6);

        let taken = field.take(a).unwrap();
        assert_eq!(taken.position, Vec2::new(1.0, 1.0));
        assert!(field.take(a).is_none());
        assert_eq!(field.len(), 1);

        let c = field.spawn(Vec2::new(3.0, 3.0), 4.0, 0, &mut rng);
        assert_eq!(c, a);
        assert_ne!(field.get(c).unwrap().id, taken.id);
    }

    #[test]
    fn test_food_field_full_reuses_slot() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut field = FoodField::new(2);
        field.spawn(Vec2::default(), 4.0, 0, &mut rng);
        field.spawn(Vec2::default(), 4.0, 0, &mut rng);

        let slot = field.spawn(Vec2::new(9.0, 9.0), 4.0, 0, &mut rng);
        assert!(slot < 2);
        assert_eq!(field.len(), 2);
        assert_eq!(field.get(slot).unwrap().position, Vec2::new(9.0, 9.0));
    }

    #[test]
    fn test_random_food_respects_margin() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut field = FoodField::new(config.max_food);

        for _ in 0..500 {
            field.spawn_random(&config, &mut rng);
        }

        let low = config.food_edge_margin;
        let high = config.world_size - config.food_edge_margin;
        for (_, food) in field.iter() {
            assert!(food.position.x >= low && food.position.x <= high);
            assert!(food.position.y >= low && food.position.y <= high);
            assert!(food.size >= config.food_size);
            assert!(food.size <= config.food_size + config.food_size_jitter);
            assert!(FOOD_PALETTE.contains(&food.color));
        }
    }
}
