//! Per-connection session: turns client messages into registry and room calls

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::room::{RoomError, RoomHandle, RoomRegistry};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// What the reader side asks the socket writer to do
#[derive(Debug)]
pub enum Outbound {
    /// Reply to this player only
    Direct(ServerMsg),
    /// Start forwarding a room's broadcasts
    Subscribe(broadcast::Receiver<ServerMsg>),
    /// Stop forwarding room broadcasts
    Unsubscribe,
}

pub struct Session {
    player_id: Uuid,
    registry: Arc<RoomRegistry>,
    outbound: mpsc::Sender<Outbound>,
}

impl Session {
    pub fn new(player_id: Uuid, registry: Arc<RoomRegistry>, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            player_id,
            registry,
            outbound,
        }
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    /// Handle one client message. Validation failures go back to this
    /// player as an `error` message.
    pub async fn handle(&self, msg: ClientMsg) {
        if let Err(e) = self.dispatch(msg).await {
            debug!(player_id = %self.player_id, code = e.code(), "Request rejected");
            self.send(Outbound::Direct(ServerMsg::error(&e))).await;
        }
    }

    /// Answer a frame that did not parse as a client message
    pub async fn reject_malformed(&self, err: &serde_json::Error) {
        debug!(player_id = %self.player_id, error = %err, "Malformed client message");
        self.send(Outbound::Direct(ServerMsg::bad_request(err))).await;
    }

    async fn dispatch(&self, msg: ClientMsg) -> Result<(), RoomError> {
        match msg {
            ClientMsg::GetRooms => {
                let rooms = self.registry.available_rooms();
                self.send(Outbound::Direct(ServerMsg::RoomList { rooms })).await;
            }

            ClientMsg::CreateRoom { player_name } => {
                let handle = self.registry.create_room(self.player_id, &player_name)?;
                self.send(Outbound::Subscribe(handle.subscribe())).await;

                let room = handle.snapshot().await?;
                self.send(Outbound::Direct(ServerMsg::RoomCreated {
                    room_id: handle.id.clone(),
                    room,
                }))
                .await;
            }

            ClientMsg::JoinRoom {
                room_id,
                player_name,
            } => {
                let handle = self
                    .registry
                    .room(room_id.trim())
                    .ok_or(RoomError::RoomNotFound)?;
                // Subscribe first so the join broadcasts reach this player too
                let feed = handle.subscribe();
                self.registry
                    .join_room(self.player_id, &room_id, &player_name)
                    .await?;
                self.send(Outbound::Subscribe(feed)).await;
            }

            ClientMsg::LeaveRoom => {
                let outcome = self.registry.leave_room(self.player_id).await?;
                info!(
                    player_id = %self.player_id,
                    room_id = %outcome.room_id,
                    room_deleted = outcome.room_deleted,
                    "Player left room"
                );
                self.send(Outbound::Unsubscribe).await;
                let rooms = self.registry.available_rooms();
                self.send(Outbound::Direct(ServerMsg::RoomList { rooms })).await;
            }

            ClientMsg::StartGame => {
                self.current_room()?.start_game(self.player_id).await?;
            }

            // The room sends bet_confirmed on `outbound` itself
            ClientMsg::PlaceBet { animal_id, amount } => {
                self.current_room()?
                    .place_bet(self.player_id, animal_id, amount, &self.outbound)
                    .await?;
            }

            // Chat and cheer outside a room are ignored
            ClientMsg::SendChat { message } => {
                if let Ok(room) = self.current_room() {
                    room.chat(self.player_id, message).await;
                }
            }

            ClientMsg::Cheer => {
                if let Ok(room) = self.current_room() {
                    room.cheer(self.player_id).await;
                }
            }
        }

        Ok(())
    }

    /// Connection closed: same as leaving the room
    pub async fn disconnect(&self) {
        match self.registry.leave_room(self.player_id).await {
            Ok(outcome) => info!(
                player_id = %self.player_id,
                room_id = %outcome.room_id,
                room_deleted = outcome.room_deleted,
                "Disconnected player removed from room"
            ),
            Err(RoomError::NotInRoom) => {}
            Err(e) => debug!(player_id = %self.player_id, error = %e, "Leave on disconnect failed"),
        }
    }

    fn current_room(&self) -> Result<RoomHandle, RoomError> {
        self.registry
            .room_of(self.player_id)
            .ok_or(RoomError::NotInRoom)
    }

    async fn send(&self, out: Outbound) {
        if self.outbound.send(out).await.is_err() {
            debug!(player_id = %self.player_id, "Session writer gone");
        }
    }
}
