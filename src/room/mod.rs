//! Rooms: isolated game sessions and their authoritative relay loop

pub mod manager;
pub mod spawner;
pub mod state;

pub use manager::{RoomLookup, RoomManager};

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{RoomMsg, ServerMsg};

use spawner::{SpawnConfig, SpawnScheduler, SpawnTick};
use state::RoomState;

/// Per-room tuning
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub spawn: SpawnConfig,
    /// Grace period after the last player leaves before the room is destroyed
    pub idle_teardown: Duration,
    /// Capacity of the room's broadcast channel
    pub channel_capacity: usize,
    /// Capacity of the room's input queue
    pub input_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            spawn: SpawnConfig::default(),
            idle_teardown: Duration::from_secs(120),
            channel_capacity: 1024,
            input_capacity: 256,
        }
    }
}

/// Who an outbound message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    AllExcept(Uuid),
    Only(Uuid),
}

/// A message on a room's broadcast channel
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn is_for(&self, conn_id: Uuid) -> bool {
        match self.audience {
            Audience::Everyone => true,
            Audience::AllExcept(sender) => sender != conn_id,
            Audience::Only(target) => target == conn_id,
        }
    }
}

/// Connection lifecycle and messages, as seen by the room
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Connected,
    Message(RoomMsg),
    Disconnected,
}

/// Input received from a connection on the room channel
#[derive(Debug, Clone)]
pub struct RoomInput {
    pub conn_id: Uuid,
    pub event: RoomEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Room {0} is closed")]
    RoomClosed(Uuid),
}

/// Lifecycle phase. A destroyed room has no task and no registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Created, nobody has joined yet. No teardown armed.
    Open,
    /// At least one player present
    Active,
    /// No players, teardown deadline armed
    IdlePending,
}

/// Handle to a running room, stored in the registry
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub name: String,
    pub passcode: String,
    /// Registration order, used to break lookup ties
    pub(crate) seq: u64,
    input_tx: mpsc::Sender<RoomInput>,
    channel: broadcast::Sender<Envelope>,
}

impl RoomHandle {
    /// Queue an event for the room task
    pub async fn send(&self, conn_id: Uuid, event: RoomEvent) -> Result<(), RoomError> {
        self.input_tx
            .send(RoomInput { conn_id, event })
            .await
            .map_err(|_| RoomError::RoomClosed(self.id))
    }

    /// Receive everything broadcast on the room channel from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.channel.subscribe()
    }
}

/// A game session. Owns its state and scheduler; runs as a single task.
pub struct Room {
    id: Uuid,
    name: String,
    config: RoomConfig,
    state: RoomState,
    scheduler: SpawnScheduler,
    channel: broadcast::Sender<Envelope>,
    idle_deadline: Option<Instant>,
}

impl Room {
    /// Create a room plus the handle used to reach it.
    ///
    /// Teardown is only armed once the last player leaves, so a room
    /// nobody has joined yet stays registered.
    pub fn new(
        id: Uuid,
        name: String,
        passcode: String,
        seq: u64,
        seed: u64,
        config: RoomConfig,
    ) -> (Self, RoomHandle, mpsc::Receiver<RoomInput>) {
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity);
        let (channel, _) = broadcast::channel(config.channel_capacity);

        let handle = RoomHandle {
            id,
            name: name.clone(),
            passcode,
            seq,
            input_tx,
            channel: channel.clone(),
        };

        let room = Self {
            id,
            name,
            scheduler: SpawnScheduler::new(config.spawn.clone(), seed),
            idle_deadline: None,
            config,
            state: RoomState::new(),
            channel,
        };

        (room, handle, input_rx)
    }

    #[cfg(test)]
    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn phase(&self) -> RoomPhase {
        if self.idle_deadline.is_some() {
            RoomPhase::IdlePending
        } else if self.state.player_count() > 0 {
            RoomPhase::Active
        } else {
            RoomPhase::Open
        }
    }

    /// Run the room until its idle teardown fires or every handle is gone
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<RoomInput>) {
        info!(room_id = %self.id, name = %self.name, "Room opened");
        self.scheduler.start();

        loop {
            let deadline = self.idle_deadline;

            tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => {
                        debug!(room_id = %self.id, "Room input closed");
                        break;
                    }
                },
                tick = self.scheduler.next_tick() => self.on_spawn_tick(tick),
                _ = idle_teardown(deadline) => {
                    info!(room_id = %self.id, "Room destroyed due to inactivity");
                    break;
                }
            }
        }

        self.scheduler.stop();
    }

    /// Apply one connection event
    pub fn handle_input(&mut self, input: RoomInput) {
        let RoomInput { conn_id, event } = input;
        match event {
            RoomEvent::Connected => {
                debug!(room_id = %self.id, conn_id = %conn_id, "Connection attached");
            }
            RoomEvent::Message(msg) => self.handle_message(conn_id, msg),
            RoomEvent::Disconnected => self.handle_disconnect(conn_id),
        }
    }

    fn handle_message(&mut self, conn_id: Uuid, msg: RoomMsg) {
        match msg {
            RoomMsg::Join => self.handle_join(conn_id),
            RoomMsg::UpdateEnemies(enemy) => {
                self.state.add_enemy(enemy.clone());
                self.broadcast_from(conn_id, ServerMsg::SpawnEnemy(enemy));
            }
            RoomMsg::EnemyMoving(enemy) => {
                self.state.move_enemy(&enemy);
            }
            RoomMsg::PlayerMovement(movement) => {
                if let Some(player) = self.state.move_player(&conn_id, movement).cloned() {
                    self.broadcast_from(conn_id, ServerMsg::PlayerMoved(player));
                }
            }
            RoomMsg::UpdateCursors { cursors, facing } => {
                let updated = self.state.update_cursors(&conn_id, cursors, facing).cloned();
                if let Some(player) = updated {
                    self.broadcast_from(conn_id, ServerMsg::UpdatedCursors(player));
                }
            }
            RoomMsg::NewWeapon { texture, id } => {
                if let Some(player) = self.state.equip_weapon(&conn_id, texture, id).cloned() {
                    self.broadcast_from(conn_id, ServerMsg::PickupWeapon(player));
                }
            }
            RoomMsg::WeaponRotation(angle) => {
                if let Some(player) = self.state.rotate_weapon(&conn_id, angle).cloned() {
                    self.broadcast_from(conn_id, ServerMsg::WeaponRotated(player));
                }
            }
            RoomMsg::GetGameState => {
                self.reply(conn_id, ServerMsg::ReceiveGameState(self.state.full_snapshot()));
            }
            RoomMsg::EnemyKilled(enemy_id) => {
                self.state.kill_enemy(&enemy_id);
            }
            RoomMsg::WeaponPicked(weapon_id) => {
                self.state.pick_weapon(&weapon_id);
            }
            RoomMsg::PlayerDead(player_id) => {
                self.broadcast_from(conn_id, ServerMsg::PlayerHasDied(player_id));
            }
            RoomMsg::PlayerAlived(player_id) => {
                self.broadcast_from(conn_id, ServerMsg::PlayerRespawned(player_id));
            }
        }
    }

    fn handle_join(&mut self, conn_id: Uuid) {
        let player = self.state.join(conn_id).clone();
        self.idle_deadline = None;

        info!(
            room_id = %self.id,
            conn_id = %conn_id,
            player_count = self.state.player_count(),
            "Player joined room"
        );

        self.broadcast_from(conn_id, ServerMsg::UserJoined("User has joined".to_string()));
        self.broadcast_from(conn_id, ServerMsg::NewPlayer(player));
        self.reply(conn_id, ServerMsg::SetState(self.state.snapshot()));
    }

    fn handle_disconnect(&mut self, conn_id: Uuid) {
        // Connections that never joined must not push the deadline back
        let left = self.state.leave(&conn_id).is_some();

        if left && self.state.player_count() == 0 {
            self.idle_deadline = Some(Instant::now() + self.config.idle_teardown);
            info!(
                room_id = %self.id,
                teardown_secs = self.config.idle_teardown.as_secs(),
                "Room empty, teardown armed"
            );
        }

        debug!(room_id = %self.id, conn_id = %conn_id, phase = ?self.phase(), "Connection left");

        self.broadcast_from(
            conn_id,
            ServerMsg::UserLeft {
                text: "User has left the game".to_string(),
                user_id: conn_id,
            },
        );
    }

    /// Run the spawn logic for a scheduler tick
    pub fn on_spawn_tick(&mut self, tick: SpawnTick) {
        match tick {
            SpawnTick::Enemy => {
                if let Some(enemy) = self.scheduler.spawn_enemy(&mut self.state) {
                    debug!(room_id = %self.id, enemy_id = %enemy.id, "Enemy spawned");
                    self.broadcast(ServerMsg::SpawnEnemy(enemy));
                }
            }
            SpawnTick::Weapon => {
                if let Some(drop) = self.scheduler.spawn_weapon(&mut self.state) {
                    debug!(
                        room_id = %self.id,
                        weapon_id = %drop.id,
                        texture = %drop.texture,
                        "Weapon dropped"
                    );
                    self.broadcast(ServerMsg::SpawnWeapon(drop));
                }
            }
        }
    }

    fn emit(&self, audience: Audience, msg: ServerMsg) {
        // No subscribers is fine, the message has nobody to reach
        let _ = self.channel.send(Envelope { audience, msg });
    }

    fn broadcast(&self, msg: ServerMsg) {
        self.emit(Audience::Everyone, msg);
    }

    fn broadcast_from(&self, conn_id: Uuid, msg: ServerMsg) {
        self.emit(Audience::AllExcept(conn_id), msg);
    }

    fn reply(&self, conn_id: Uuid, msg: ServerMsg) {
        self.emit(Audience::Only(conn_id), msg);
    }
}

async fn idle_teardown(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{Enemy, Movement};
    use serde_json::json;

    fn new_room() -> (Room, broadcast::Receiver<Envelope>) {
        let (room, handle, _input_rx) = Room::new(
            Uuid::new_v4(),
            "Alpha".to_string(),
            "1234".to_string(),
            0,
            7,
            RoomConfig::default(),
        );
        let rx = handle.subscribe();
        (room, rx)
    }

    fn send(room: &mut Room, conn_id: Uuid, msg: RoomMsg) {
        room.handle_input(RoomInput {
            conn_id,
            event: RoomEvent::Message(msg),
        });
    }

    fn disconnect(room: &mut Room, conn_id: Uuid) {
        room.handle_input(RoomInput {
            conn_id,
            event: RoomEvent::Disconnected,
        });
    }

    /// Everything delivered to `conn_id` so far
    fn inbox(rx: &mut broadcast::Receiver<Envelope>, conn_id: Uuid) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if envelope.is_for(conn_id) {
                msgs.push(envelope.msg);
            }
        }
        msgs
    }

    #[test]
    fn envelope_audiences() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = ServerMsg::RoomNotFound;

        let everyone = Envelope {
            audience: Audience::Everyone,
            msg: msg.clone(),
        };
        let others = Envelope {
            audience: Audience::AllExcept(a),
            msg: msg.clone(),
        };
        let only = Envelope {
            audience: Audience::Only(a),
            msg,
        };

        assert!(everyone.is_for(a) && everyone.is_for(b));
        assert!(!others.is_for(a) && others.is_for(b));
        assert!(only.is_for(a) && !only.is_for(b));
    }

    #[test]
    fn join_announces_player_and_replies_with_state() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        send(&mut room, a, RoomMsg::Join);
        let _ = rx.try_recv();
        let _ = rx.try_recv();
        let _ = rx.try_recv();
        send(&mut room, b, RoomMsg::Join);

        let envelopes: Vec<Envelope> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let delivered = |conn_id: Uuid| -> Vec<ServerMsg> {
            envelopes
                .iter()
                .filter(|e| e.is_for(conn_id))
                .map(|e| e.msg.clone())
                .collect()
        };
        let to_a = delivered(a);
        let to_b = delivered(b);

        let joined = room.state().player(&b).cloned().unwrap();
        assert_eq!(joined.player_id, b);
        assert_eq!(joined.weapon.as_ref().unwrap().texture, "weapon_pistol");
        assert_eq!(
            to_a,
            vec![
                ServerMsg::UserJoined("User has joined".to_string()),
                ServerMsg::NewPlayer(joined),
            ]
        );
        assert_eq!(to_b, vec![ServerMsg::SetState(room.state().snapshot())]);
    }

    #[test]
    fn join_cancels_idle_teardown() {
        let (mut room, _rx) = new_room();
        assert_eq!(room.phase(), RoomPhase::Open);

        let a = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        assert_eq!(room.phase(), RoomPhase::Active);

        disconnect(&mut room, a);
        assert_eq!(room.phase(), RoomPhase::IdlePending);
        assert!(room.state().players.is_empty());
    }

    #[test]
    fn unjoined_disconnect_leaves_teardown_alone() {
        let (mut room, _rx) = new_room();
        let stray = Uuid::new_v4();

        disconnect(&mut room, stray);
        assert_eq!(room.phase(), RoomPhase::Open);

        let a = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        disconnect(&mut room, a);
        let armed = room.idle_deadline;
        assert!(armed.is_some());

        room.handle_input(RoomInput {
            conn_id: stray,
            event: RoomEvent::Connected,
        });
        disconnect(&mut room, stray);
        assert_eq!(room.idle_deadline, armed);
    }

    #[test]
    fn disconnect_with_players_left_stays_active() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        send(&mut room, b, RoomMsg::Join);
        let _ = inbox(&mut rx, b);

        disconnect(&mut room, a);

        assert_eq!(room.phase(), RoomPhase::Active);
        assert_eq!(
            inbox(&mut rx, b),
            vec![ServerMsg::UserLeft {
                text: "User has left the game".to_string(),
                user_id: a,
            }]
        );
    }

    #[test]
    fn weapon_rotation_reaches_others_only() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        send(&mut room, b, RoomMsg::Join);
        let _ = inbox(&mut rx, Uuid::nil());

        send(&mut room, a, RoomMsg::WeaponRotation(1.57));

        let envelopes: Vec<Envelope> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(envelopes.len(), 1);
        let envelope = &envelopes[0];
        assert!(!envelope.is_for(a));
        assert!(envelope.is_for(b));
        match &envelope.msg {
            ServerMsg::WeaponRotated(player) => {
                assert_eq!(player.player_id, a);
                assert_eq!(player.weapon.as_ref().unwrap().angle, 1.57);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn game_state_after_join_lists_the_player() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        let _ = inbox(&mut rx, a);

        send(&mut room, a, RoomMsg::GetGameState);

        let msgs = inbox(&mut rx, a);
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            ServerMsg::ReceiveGameState(full) => {
                assert_eq!(full.players.len(), 1);
                assert_eq!(full.players[0].player_id, a);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn movement_relays_full_player() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        send(&mut room, b, RoomMsg::Join);
        let _ = inbox(&mut rx, Uuid::nil());

        send(
            &mut room,
            a,
            RoomMsg::PlayerMovement(Movement {
                x: 300.0,
                y: 400.0,
                cursors: Some(json!({"up": true})),
                alive: Some(true),
            }),
        );

        let msgs = inbox(&mut rx, b);
        let moved = room.state().player(&a).cloned().unwrap();
        assert_eq!(moved.x, Some(300.0));
        assert_eq!(moved.cursors, Some(json!({"up": true})));
        assert_eq!(msgs, vec![ServerMsg::PlayerMoved(moved)]);
    }

    #[test]
    fn messages_from_unjoined_connection_are_dropped() {
        let (mut room, mut rx) = new_room();
        let stranger = Uuid::new_v4();

        send(&mut room, stranger, RoomMsg::WeaponRotation(2.0));
        send(
            &mut room,
            stranger,
            RoomMsg::NewWeapon {
                texture: "weapon_rifle".to_string(),
                id: "w".to_string(),
            },
        );

        assert!(rx.try_recv().is_err());
        assert!(room.state().players.is_empty());
    }

    #[test]
    fn client_enemies_are_shared_and_killable() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        send(&mut room, b, RoomMsg::Join);
        let _ = inbox(&mut rx, Uuid::nil());

        let enemy = Enemy {
            x: 1.0,
            y: 2.0,
            id: "client-enemy".to_string(),
        };
        send(&mut room, a, RoomMsg::UpdateEnemies(enemy.clone()));
        assert_eq!(inbox(&mut rx, b), vec![ServerMsg::SpawnEnemy(enemy.clone())]);

        // any client may move any enemy
        let moved = Enemy {
            x: 5.0,
            y: 6.0,
            ..enemy.clone()
        };
        send(&mut room, b, RoomMsg::EnemyMoving(moved));
        assert_eq!(room.state().enemies[0].x, 5.0);

        send(&mut room, b, RoomMsg::EnemyKilled(enemy.id.clone()));
        send(&mut room, a, RoomMsg::EnemyMoving(enemy));
        assert!(room.state().enemies.is_empty());
    }

    #[test]
    fn death_and_respawn_are_relayed() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        send(&mut room, a, RoomMsg::PlayerDead(a.to_string()));
        send(&mut room, a, RoomMsg::PlayerAlived(a.to_string()));

        assert_eq!(
            inbox(&mut rx, b),
            vec![
                ServerMsg::PlayerHasDied(a.to_string()),
                ServerMsg::PlayerRespawned(a.to_string()),
            ]
        );
    }

    #[test]
    fn spawn_ticks_broadcast_to_everyone() {
        let (mut room, mut rx) = new_room();
        let a = Uuid::new_v4();
        send(&mut room, a, RoomMsg::Join);
        send(
            &mut room,
            a,
            RoomMsg::PlayerMovement(Movement {
                x: 10.0,
                y: 10.0,
                cursors: None,
                alive: None,
            }),
        );
        let _ = inbox(&mut rx, a);

        room.on_spawn_tick(SpawnTick::Enemy);
        room.on_spawn_tick(SpawnTick::Weapon);

        let msgs = inbox(&mut rx, a);
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], ServerMsg::SpawnEnemy(_)));
        assert!(matches!(msgs[1], ServerMsg::SpawnWeapon(_)));
        assert_eq!(room.state().enemy_count(), 1);
        assert_eq!(room.state().weapons.len(), 1);
    }

    #[test]
    fn enemy_cap_holds_after_every_tick() {
        let (mut room, _rx) = new_room();
        for _ in 0..40 {
            room.on_spawn_tick(SpawnTick::Enemy);
            assert!(room.state().enemy_count() <= 12);
        }
        assert_eq!(room.state().enemy_count(), 12);
    }
}
