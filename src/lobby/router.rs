//! Connection router for the default channel

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::room::{RoomLookup, RoomManager};
use crate::ws::protocol::{RouterMsg, ServerMsg};

/// Identifier of the default channel
pub const DEFAULT_NAMESPACE: &str = "/";

/// Lets clients create or locate a room. It never moves a connection itself;
/// clients reconnect to the room channel named in the reply.
pub struct ConnectionRouter {
    rooms: Arc<RoomManager>,
}

impl ConnectionRouter {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self { rooms }
    }

    /// First message on every new default-channel connection
    pub fn greeting(&self) -> ServerMsg {
        ServerMsg::Namespace(DEFAULT_NAMESPACE.to_string())
    }

    /// Handle a request and build the reply for the requester
    pub fn handle(&self, conn_id: Uuid, msg: RouterMsg) -> ServerMsg {
        match msg {
            RouterMsg::CreateGame { name, passcode } => {
                let room_id = self.rooms.create(&name, &passcode);
                info!(conn_id = %conn_id, room_id = %room_id, "Game created");
                ServerMsg::GameCreated(room_id)
            }
            RouterMsg::JoinGame {
                name,
                passcode,
                room_id,
            } => {
                let lookup = self.lookup(name, passcode, room_id);
                debug!(conn_id = %conn_id, ?lookup, "Join lookup");
                match lookup {
                    RoomLookup::Found(room_id) => ServerMsg::RoomFound(room_id),
                    RoomLookup::NotFound => ServerMsg::RoomNotFound,
                }
            }
        }
    }

    /// Name+passcode wins when both are given; otherwise fall back to the id.
    /// Empty strings count as missing.
    fn lookup(
        &self,
        name: Option<String>,
        passcode: Option<String>,
        room_id: Option<String>,
    ) -> RoomLookup {
        let present = |s: Option<String>| s.filter(|s| !s.is_empty());

        if let (Some(name), Some(passcode)) = (present(name), present(passcode)) {
            return self.rooms.find_by_name_and_passcode(&name, &passcode);
        }

        match present(room_id).and_then(|id| Uuid::parse_str(&id).ok()) {
            Some(room_id) => self.rooms.find_by_id(&room_id),
            None => RoomLookup::NotFound,
        }
    }
}
