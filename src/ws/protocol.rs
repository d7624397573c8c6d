//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! Events without arguments omit `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Weapon texture every player spawns with
pub const DEFAULT_WEAPON_TEXTURE: &str = "weapon_pistol";

/// Textures the weapon spawner picks from
pub const WEAPON_TEXTURES: [&str; 3] = ["weapon_pistol", "weapon_rifle", "weapon_shotgun"];

/// Weapon held by a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub x: f64,
    pub y: f64,
    /// Aim angle in radians
    pub angle: f64,
    pub texture: String,
    /// Id of the drop this weapon was picked from (empty for the spawn pistol)
    pub id: String,
}

impl Default for Weapon {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            texture: DEFAULT_WEAPON_TEXTURE.to_string(),
            id: String::new(),
        }
    }
}

/// A connected participant in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Equals the owning connection id
    pub player_id: Uuid,
    /// Unknown until the first movement update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<Weapon>,
    /// Client input state, relayed verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing: Option<String>,
    pub alive: bool,
}

impl Player {
    /// A freshly joined player: alive, holding the default pistol, no position yet
    pub fn spawn(player_id: Uuid) -> Self {
        Self {
            player_id,
            x: None,
            y: None,
            weapon: Some(Weapon::default()),
            cursors: None,
            facing: None,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub x: f64,
    pub y: f64,
    pub id: String,
}

/// Weapon lying on the map waiting to be picked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponDrop {
    pub x: f64,
    pub y: f64,
    pub texture: String,
    pub id: String,
}

/// Shared world state of a room (players excluded)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub enemies: Vec<Enemy>,
    pub weapons: Vec<WeaponDrop>,
}

/// World state plus the flattened player list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullGameState {
    #[serde(flatten)]
    pub state: GameState,
    pub players: Vec<Player>,
}

/// Movement report from a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub cursors: Option<Value>,
    /// Liveness is left untouched when omitted
    #[serde(default)]
    pub alive: Option<bool>,
}

/// Messages sent from client to server on the default channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RouterMsg {
    /// Create a new room
    CreateGame { name: String, passcode: String },

    /// Locate a room by name+passcode, or by id when reconnecting
    JoinGame {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        passcode: Option<String>,
        #[serde(default, rename = "roomId")]
        room_id: Option<String>,
    },
}

/// Messages sent from client to server on a room channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomMsg {
    Join,
    /// Client-side enemy spawn
    UpdateEnemies(Enemy),
    EnemyMoving(Enemy),
    PlayerMovement(Movement),
    UpdateCursors {
        cursors: Value,
        #[serde(default)]
        facing: Option<String>,
    },
    NewWeapon { texture: String, id: String },
    WeaponRotation(f64),
    GetGameState,
    EnemyKilled(String),
    WeaponPicked(String),
    PlayerDead(String),
    PlayerAlived(String),
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Identifier of the channel the client is connected to
    Namespace(String),
    GameCreated(Uuid),
    RoomFound(Uuid),
    RoomNotFound,
    UserJoined(String),
    NewPlayer(Player),
    SetState(GameState),
    SpawnEnemy(Enemy),
    PlayerMoved(Player),
    UpdatedCursors(Player),
    PickupWeapon(Player),
    WeaponRotated(Player),
    ReceiveGameState(FullGameState),
    SpawnWeapon(WeaponDrop),
    UserLeft {
        text: String,
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
    PlayerHasDied(String),
    PlayerRespawned(String),
}
