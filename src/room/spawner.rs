//! Timed enemy and weapon-drop spawning

use std::f64::consts::TAU;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::ws::protocol::{Enemy, WeaponDrop, WEAPON_TEXTURES};

use super::state::RoomState;

/// Spawn schedule and population caps
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub enemy_interval: Duration,
    /// Live enemies allowed before the spawner pauses
    pub max_enemies: usize,
    /// Enemy spawn points at the map edges (north, south, east, west)
    pub enemy_spawn_points: [(f64, f64); 4],
    pub weapon_interval: Duration,
    /// Weapon drops over the whole lifetime of a room
    pub max_weapon_drops: u32,
    /// Furthest a drop lands from the chosen player
    pub weapon_drop_radius: f64,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            enemy_interval: Duration::from_secs(6),
            max_enemies: 12,
            enemy_spawn_points: [
                (2048.0, 4048.0),
                (2048.0, 48.0),
                (4048.0, 2048.0),
                (48.0, 2048.0),
            ],
            weapon_interval: Duration::from_secs(15),
            max_weapon_drops: 12,
            weapon_drop_radius: 1000.0,
        }
    }
}

/// Which spawn timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnTick {
    Enemy,
    Weapon,
}

struct Timers {
    enemy: Interval,
    weapon: Interval,
}

/// Spawns enemies and weapon drops into a room on fixed intervals.
///
/// Owned by the room task. The timers only exist between `start()` and
/// `stop()`; while stopped `next_tick()` never resolves.
pub struct SpawnScheduler {
    config: SpawnConfig,
    rng: ChaCha8Rng,
    weapons_spawned: u32,
    timers: Option<Timers>,
}

impl SpawnScheduler {
    pub fn new(config: SpawnConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            weapons_spawned: 0,
            timers: None,
        }
    }

    /// Arm both timers. The first tick of each lands one full period from now.
    pub fn start(&mut self) {
        let now = Instant::now();

        let mut enemy = interval_at(now + self.config.enemy_interval, self.config.enemy_interval);
        enemy.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut weapon =
            interval_at(now + self.config.weapon_interval, self.config.weapon_interval);
        weapon.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.timers = Some(Timers { enemy, weapon });
    }

    pub fn stop(&mut self) {
        self.timers = None;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.timers.is_some()
    }

    #[cfg(test)]
    /// Drop spawns issued so far (counts towards the lifetime cap)
    pub fn weapons_spawned(&self) -> u32 {
        self.weapons_spawned
    }

    /// Wait for the next timer to fire
    pub async fn next_tick(&mut self) -> SpawnTick {
        match self.timers.as_mut() {
            Some(timers) => {
                tokio::select! {
                    _ = timers.enemy.tick() => SpawnTick::Enemy,
                    _ = timers.weapon.tick() => SpawnTick::Weapon,
                }
            }
            None => std::future::pending().await,
        }
    }

    /// Spawn an enemy at a random map edge unless the room is at its cap
    pub fn spawn_enemy(&mut self, state: &mut RoomState) -> Option<Enemy> {
        if state.enemy_count() >= self.config.max_enemies {
            return None;
        }

        let points = &self.config.enemy_spawn_points;
        let (x, y) = points[self.rng.gen_range(0..points.len())];
        let enemy = Enemy {
            x,
            y,
            id: Uuid::new_v4().to_string(),
        };

        state.add_enemy(enemy.clone());
        Some(enemy)
    }

    /// Drop a random weapon near a random positioned player.
    ///
    /// Skipped (without using up the lifetime cap) while nobody in the room
    /// has reported a position yet.
    pub fn spawn_weapon(&mut self, state: &mut RoomState) -> Option<WeaponDrop> {
        if self.weapons_spawned >= self.config.max_weapon_drops {
            return None;
        }

        let mut candidates: Vec<(Uuid, f64, f64)> = state
            .players
            .values()
            .filter_map(|p| Some((p.player_id, p.x?, p.y?)))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        // HashMap order is not stable; sort so a seeded rng replays the same choice
        candidates.sort_by_key(|(id, _, _)| *id);

        let texture = WEAPON_TEXTURES[self.rng.gen_range(0..WEAPON_TEXTURES.len())];
        let (_, origin_x, origin_y) = candidates[self.rng.gen_range(0..candidates.len())];
        let (x, y) = random_point_near(
            &mut self.rng,
            origin_x,
            origin_y,
            self.config.weapon_drop_radius,
        );

        let drop = WeaponDrop {
            x,
            y,
            texture: texture.to_string(),
            id: Uuid::new_v4().to_string(),
        };

        state.add_weapon(drop.clone());
        self.weapons_spawned += 1;
        Some(drop)
    }
}

/// Uniform angle in [0, 2π) and uniform distance in [0, max_distance]
pub fn random_point_near<R: Rng + ?Sized>(
    rng: &mut R,
    origin_x: f64,
    origin_y: f64,
    max_distance: f64,
) -> (f64, f64) {
    let angle = rng.gen_range(0.0..TAU);
    let distance = rng.gen_range(0.0..=max_distance);
    (
        origin_x + distance * angle.cos(),
        origin_y + distance * angle.sin(),
    )
}
