//! Authoritative in-memory state of a single room

use std::collections::HashMap;

use uuid::Uuid;

use crate::ws::protocol::{Enemy, FullGameState, GameState, Movement, Player, WeaponDrop};

/// Players, enemies and weapon drops of one room.
///
/// Every mutation that names a player, enemy or drop that is no longer
/// present is a no-op. Clients race removals against updates all the time.
#[derive(Debug, Default)]
pub struct RoomState {
    pub players: HashMap<Uuid, Player>,
    pub enemies: Vec<Enemy>,
    pub weapons: Vec<WeaponDrop>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or reset) the player owned by `conn_id`
    pub fn join(&mut self, conn_id: Uuid) -> &Player {
        self.players.insert(conn_id, Player::spawn(conn_id));
        &self.players[&conn_id]
    }

    pub fn leave(&mut self, conn_id: &Uuid) -> Option<Player> {
        self.players.remove(conn_id)
    }

    #[cfg(test)]
    pub fn player(&self, conn_id: &Uuid) -> Option<&Player> {
        self.players.get(conn_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn move_player(&mut self, conn_id: &Uuid, movement: Movement) -> Option<&Player> {
        let player = self.players.get_mut(conn_id)?;
        player.x = Some(movement.x);
        player.y = Some(movement.y);
        player.cursors = movement.cursors;
        if let Some(alive) = movement.alive {
            player.alive = alive;
        }
        Some(player)
    }

    pub fn update_cursors(
        &mut self,
        conn_id: &Uuid,
        cursors: serde_json::Value,
        facing: Option<String>,
    ) -> Option<&Player> {
        let player = self.players.get_mut(conn_id)?;
        player.cursors = Some(cursors);
        player.facing = facing;
        Some(player)
    }

    /// Swap the texture/id of the player's weapon, equipping one if needed
    pub fn equip_weapon(&mut self, conn_id: &Uuid, texture: String, id: String) -> Option<&Player> {
        let player = self.players.get_mut(conn_id)?;
        let weapon = player.weapon.get_or_insert_with(Default::default);
        weapon.texture = texture;
        weapon.id = id;
        Some(player)
    }

    /// Only players holding a weapon can rotate it
    pub fn rotate_weapon(&mut self, conn_id: &Uuid, angle: f64) -> Option<&Player> {
        let player = self.players.get_mut(conn_id)?;
        player.weapon.as_mut()?.angle = angle;
        Some(player)
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    pub fn add_enemy(&mut self, enemy: Enemy) {
        self.enemies.push(enemy);
    }

    /// Overwrite the position of a live enemy. Returns false if it is gone.
    pub fn move_enemy(&mut self, update: &Enemy) -> bool {
        match self.enemies.iter_mut().find(|e| e.id == update.id) {
            Some(enemy) => {
                enemy.x = update.x;
                enemy.y = update.y;
                true
            }
            None => false,
        }
    }

    pub fn kill_enemy(&mut self, enemy_id: &str) -> bool {
        let before = self.enemies.len();
        self.enemies.retain(|e| e.id != enemy_id);
        self.enemies.len() != before
    }

    pub fn add_weapon(&mut self, drop: WeaponDrop) {
        self.weapons.push(drop);
    }

    pub fn pick_weapon(&mut self, weapon_id: &str) -> bool {
        let before = self.weapons.len();
        self.weapons.retain(|w| w.id != weapon_id);
        self.weapons.len() != before
    }

    /// World state without players (sent on join)
    pub fn snapshot(&self) -> GameState {
        GameState {
            enemies: self.enemies.clone(),
            weapons: self.weapons.clone(),
        }
    }

    /// World state with the flattened player list
    pub fn full_snapshot(&self) -> FullGameState {
        FullGameState {
            state: self.snapshot(),
            players: self.players.values().cloned().collect(),
        }
    }
}
