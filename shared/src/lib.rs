//! Types shared between the arena server and its clients: the wire protocol,
//! state snapshots and the tunable [`config::GameConfig`].

pub mod config;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use config::GameConfig;

/// Upper bound on the encoded size of one server datagram.
pub const MAX_DATAGRAM_SIZE: usize = 16 * 1024;

/// Worst-case bytes a `State` packet spends outside its entries.
const STATE_ENVELOPE_SIZE: usize = 64;
/// Encoded size of one body point.
const SEGMENT_SIZE: usize = 8;

/// Point or offset in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` radians.
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn scale(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }

    /// Squared euclidean distance. Collision code compares these directly.
    pub fn distance_sq(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Packets sent from a client to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientPacket {
    Join { name: Option<String> },
    SetHeading { angle: f32 },
    SetBoost { boosting: bool },
    Heartbeat,
    Leave,
}

/// Packets sent from the server to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerPacket {
    Joined {
        player_id: u32,
        world_size: f32,
        tick_rate: u32,
    },
    State(StateDelta),
    Died(DeathNotice),
    /// Non-fatal answer to a request the server would not honour.
    Rejected { reason: String },
    Disconnected { reason: String },
}

/// Everything a renderer needs to draw one creature.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreatureSnapshot {
    pub id: u32,
    pub name: String,
    /// Head first.
    pub segments: Vec<Vec2>,
    /// Index of `segments[0]` within the full body. Non-zero only when a
    /// long body was split across several parts of one delta.
    pub segment_offset: u32,
    pub angle: f32,
    pub boosting: bool,
    pub score: u32,
    pub color: u32,
    pub head_radius: f32,
    pub body_radius: f32,
    pub invulnerable: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FoodSnapshot {
    pub id: u64,
    pub position: Vec2,
    pub size: f32,
    pub color: u32,
}

/// Per-tick outbound state. Sections are `None` when unchanged that tick.
///
/// A tick's delta may be sent as several parts sharing one `timestamp`.
/// The full creature map is the union of `players` over all parts, and the
/// full food list is the concatenation of `food` in part order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateDelta {
    /// Server wall clock in milliseconds since the unix epoch.
    pub timestamp: u64,
    pub part: u16,
    pub parts: u16,
    pub players: Option<BTreeMap<u32, CreatureSnapshot>>,
    pub food: Option<Vec<FoodSnapshot>>,
}

impl StateDelta {
    /// A single-part delta.
    pub fn new(
        timestamp: u64,
        players: Option<BTreeMap<u32, CreatureSnapshot>>,
        food: Option<Vec<FoodSnapshot>>,
    ) -> Self {
        Self {
            timestamp,
            part: 0,
            parts: 1,
            players,
            food,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_none() && self.food.is_none()
    }

    /// Splits the delta into parts whose encoded `ServerPacket::State` stays
    /// within `limit` bytes. Bodies too long for one part are cut into
    /// pieces tagged with their `segment_offset`.
    ///
    /// An empty delta yields no parts.
    pub fn into_parts(self, limit: usize) -> Vec<StateDelta> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut builder = PartBuilder {
            timestamp: self.timestamp,
            room: limit.saturating_sub(STATE_ENVELOPE_SIZE).max(1),
            used: 0,
            players: self.players.as_ref().map(|_| BTreeMap::new()),
            food: self.food.as_ref().map(|_| Vec::new()),
            done: Vec::new(),
        };

        for snapshot in self.players.into_iter().flat_map(BTreeMap::into_values) {
            builder.push_creature(snapshot);
        }
        for orb in self.food.into_iter().flatten() {
            builder.push_food(orb);
        }
        builder.finish()
    }
}

fn encoded_len<T: Serialize>(value: &T) -> usize {
    bincode::serialized_size(value).map_or(0, |size| size as usize)
}

/// Map key plus snapshot.
fn creature_entry_len(snapshot: &CreatureSnapshot) -> usize {
    4 + encoded_len(snapshot)
}

struct PartBuilder {
    timestamp: u64,
    room: usize,
    used: usize,
    players: Option<BTreeMap<u32, CreatureSnapshot>>,
    food: Option<Vec<FoodSnapshot>>,
    done: Vec<StateDelta>,
}

impl PartBuilder {
    fn reserve(&mut self, size: usize) {
        if self.used > 0 && self.used + size > self.room {
            self.flush();
        }
        self.used += size;
    }

    fn flush(&mut self) {
        self.done.push(StateDelta::new(
            self.timestamp,
            self.players.take(),
            self.food.take(),
        ));
        self.used = 0;
    }

    fn insert_creature(&mut self, snapshot: CreatureSnapshot) {
        self.reserve(creature_entry_len(&snapshot));
        self.players
            .get_or_insert_with(BTreeMap::new)
            .insert(snapshot.id, snapshot);
    }

    fn push_creature(&mut self, mut snapshot: CreatureSnapshot) {
        if creature_entry_len(&snapshot) <= self.room {
            self.insert_creature(snapshot);
            return;
        }

        let segments = std::mem::take(&mut snapshot.segments);
        let header = creature_entry_len(&snapshot);
        let per_piece = (self.room.saturating_sub(header) / SEGMENT_SIZE).max(1);
        for (index, piece) in segments.chunks(per_piece).enumerate() {
            let offset = snapshot.segment_offset as usize + index * per_piece;
            self.insert_creature(CreatureSnapshot {
                segments: piece.to_vec(),
                segment_offset: offset.min(u32::MAX as usize) as u32,
                ..snapshot.clone()
            });
        }
    }

    fn push_food(&mut self, orb: FoodSnapshot) {
        self.reserve(encoded_len(&orb));
        self.food.get_or_insert_with(Vec::new).push(orb);
    }

    fn finish(mut self) -> Vec<StateDelta> {
        if self.used > 0 || self.done.is_empty() {
            self.flush();
        }
        let parts = self.done.len().min(u16::MAX as usize) as u16;
        for (index, delta) in self.done.iter_mut().enumerate() {
            delta.part = index.min(u16::MAX as usize) as u16;
            delta.parts = parts;
        }
        self.done
    }
}

/// Sent to a session whose creature just died.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct DeathNotice {
    pub player_id: u32,
    pub score: u32,
    pub length: usize,
}
