//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::session::{Outbound, Session};

const OUTBOUND_CAPACITY: usize = 64;

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler. Every connection is a new anonymous player.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    state.sessions.register(player_id);

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let outgoing = Outgoing::new(player_id, out_rx, state.registry.subscribe_lobby());
    let writer = tokio::spawn(write_loop(player_id, ws_sink, outgoing));

    let session = Session::new(player_id, state.registry.clone(), out_tx);
    read_loop(&session, ws_stream).await;

    // Disconnect is an implicit leave
    session.disconnect().await;
    let connected_ms = state
        .sessions
        .unregister(player_id)
        .map(|info| unix_millis().saturating_sub(info.connected_at));
    writer.abort();

    info!(player_id = %player_id, connected_ms, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> session
async fn read_loop(session: &Session, mut ws_stream: SplitStream<WebSocket>) {
    let player_id = session.player_id();
    let rate_limiter = SessionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(player_id = %player_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => session.handle(msg).await,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        session.reject_malformed(&e).await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Writer loop: drains [`Outgoing`] onto the socket
async fn write_loop(player_id: Uuid, mut ws_sink: WsSink, mut outgoing: Outgoing) {
    while let Some(msg) = outgoing.next().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Everything bound for one socket: direct replies, the lobby feed and the
/// current room's feed. Direct replies win when several are ready.
struct Outgoing {
    player_id: Uuid,
    out_rx: mpsc::Receiver<Outbound>,
    lobby_rx: broadcast::Receiver<ServerMsg>,
    room_rx: Option<broadcast::Receiver<ServerMsg>>,
}

impl Outgoing {
    fn new(
        player_id: Uuid,
        out_rx: mpsc::Receiver<Outbound>,
        lobby_rx: broadcast::Receiver<ServerMsg>,
    ) -> Self {
        Self {
            player_id,
            out_rx,
            lobby_rx,
            room_rx: None,
        }
    }

    /// Next message to write, or `None` once the session is gone
    async fn next(&mut self) -> Option<ServerMsg> {
        let player_id = self.player_id;
        loop {
            tokio::select! {
                biased;

                out = self.out_rx.recv() => match out {
                    Some(Outbound::Direct(msg)) => return Some(msg),
                    Some(Outbound::Subscribe(rx)) => self.room_rx = Some(rx),
                    Some(Outbound::Unsubscribe) => self.room_rx = None,
                    None => return None,
                },
                room = next_room_msg(&mut self.room_rx) => match room {
                    Ok(msg) => return Some(msg),
                    Err(RecvError::Lagged(n)) => {
                        warn!(player_id = %player_id, lagged = n, "Room feed lagged, skipping");
                    }
                    Err(RecvError::Closed) => {
                        debug!(player_id = %player_id, "Room feed closed");
                        self.room_rx = None;
                    }
                },
                lobby = self.lobby_rx.recv() => match lobby {
                    Ok(msg) => return Some(msg),
                    Err(RecvError::Lagged(n)) => {
                        warn!(player_id = %player_id, lagged = n, "Lobby feed lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

/// Next room broadcast, or never when not in a room
async fn next_room_msg(
    room_rx: &mut Option<broadcast::Receiver<ServerMsg>>,
) -> Result<ServerMsg, RecvError> {
    match room_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomError;

    fn outgoing() -> (
        Outgoing,
        mpsc::Sender<Outbound>,
        broadcast::Sender<ServerMsg>,
        broadcast::Sender<ServerMsg>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (lobby_tx, lobby_rx) = broadcast::channel(8);
        let (room_tx, _) = broadcast::channel(8);
        (
            Outgoing::new(Uuid::new_v4(), out_rx, lobby_rx),
            out_tx,
            lobby_tx,
            room_tx,
        )
    }

    #[tokio::test]
    async fn direct_replies_go_out_before_queued_broadcasts() {
        let (mut outgoing, out_tx, lobby_tx, room_tx) = outgoing();
        out_tx.send(Outbound::Subscribe(room_tx.subscribe())).await.unwrap();

        room_tx.send(ServerMsg::PlayerLeft { player_id: Uuid::nil() }).unwrap();
        lobby_tx.send(ServerMsg::RoomList { rooms: Vec::new() }).unwrap();
        out_tx
            .send(Outbound::Direct(ServerMsg::error(&RoomError::NotBetting)))
            .await
            .unwrap();

        assert!(matches!(outgoing.next().await, Some(ServerMsg::Error { .. })));
        assert!(matches!(outgoing.next().await, Some(ServerMsg::PlayerLeft { .. })));
        assert!(matches!(outgoing.next().await, Some(ServerMsg::RoomList { .. })));
    }

    #[tokio::test]
    async fn unsubscribe_stops_room_messages() {
        let (mut outgoing, out_tx, lobby_tx, room_tx) = outgoing();
        out_tx.send(Outbound::Subscribe(room_tx.subscribe())).await.unwrap();
        out_tx.send(Outbound::Unsubscribe).await.unwrap();

        let _ = room_tx.send(ServerMsg::PlayerLeft { player_id: Uuid::nil() });
        lobby_tx.send(ServerMsg::RoomList { rooms: Vec::new() }).unwrap();

        assert!(matches!(outgoing.next().await, Some(ServerMsg::RoomList { .. })));
        drop(out_tx);
        assert!(outgoing.next().await.is_none());
    }
}
