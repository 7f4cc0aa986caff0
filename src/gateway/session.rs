//! WebSocket session handling
//!
//! One task per socket. The session owns the connection-scoped state: the
//! server-assigned user id and, after a create/join, the lobby the socket is
//! bound to. All lobby operations after the bind are resolved from that
//! state, never from message payloads.

use crate::error::{LobbyError, Result};
use crate::gateway::broadcast::{Broadcaster, WsBroadcaster};
use crate::gateway::protocol::{ClientMessage, ServerMessage};
use crate::metrics::MetricsCollector;
use crate::playback::PlaybackEngine;
use crate::types::{LobbyId, UserId};
use crate::utils::generate_user_id;
use anyhow::anyhow;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Bridges sockets to the playback engine
pub struct SessionGateway {
    engine: Arc<PlaybackEngine>,
    broadcaster: Arc<WsBroadcaster>,
    metrics: Arc<MetricsCollector>,
}

impl SessionGateway {
    pub fn new(
        engine: Arc<PlaybackEngine>,
        broadcaster: Arc<WsBroadcaster>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            engine,
            broadcaster,
            metrics,
        }
    }

    /// Drive one socket until it closes.
    ///
    /// A disconnect is an implicit leave: the user is removed from their
    /// lobby and the remaining members are notified, exactly as if they had
    /// left deliberately.
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let user_id = generate_user_id();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
        self.broadcaster.register(user_id, frames_tx);
        self.metrics.connected_clients.inc();
        debug!("Session {} connected", user_id);

        let (mut ws_sink, mut ws_stream) = socket.split();
        let writer = tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        });

        let mut session: Option<LobbyId> = None;
        while let Some(Ok(message)) = ws_stream.next().await {
            match message {
                Message::Text(text) => {
                    self.handle_frame(user_id, &mut session, text.as_str())
                        .await;
                }
                Message::Close(_) => break,
                // Pings are answered by axum; binary frames are not part of
                // the protocol.
                _ => {}
            }
        }

        if let Some(lobby_id) = session {
            if let Err(err) = self.engine.leave_lobby(lobby_id, user_id).await {
                warn!(
                    "Failed to detach session {} from lobby {}: {}",
                    user_id, lobby_id, err
                );
            }
        }
        self.broadcaster.unregister(user_id);
        self.metrics.connected_clients.dec();
        writer.abort();
        debug!("Session {} disconnected", user_id);
    }

    /// Parse and dispatch one inbound frame. Faults never escape: taxonomy
    /// errors go back to the sender as `lobby_error`, internal ones are
    /// logged and swallowed.
    async fn handle_frame(&self, user_id: UserId, session: &mut Option<LobbyId>, raw: &str) {
        let parsed: ClientMessage = match serde_json::from_str(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!("Malformed frame from session {}: {}", user_id, err);
                self.reply_error(user_id, "malformed message".to_string())
                    .await;
                return;
            }
        };

        if let Err(err) = self.dispatch(user_id, session, parsed).await {
            match err.downcast_ref::<LobbyError>().and_then(LobbyError::client_message) {
                Some(message) => self.reply_error(user_id, message).await,
                None => error!("Unhandled fault in session {}: {:#}", user_id, err),
            }
        }
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        session: &mut Option<LobbyId>,
        message: ClientMessage,
    ) -> Result<()> {
        match message {
            ClientMessage::CreateLobby { name } => {
                self.require_unbound(session)?;
                let lobby = self.engine.create_lobby(user_id, &name)?;
                *session = Some(lobby.id);
                info!("Session {} created lobby {}", user_id, lobby.id);
                self.broadcaster
                    .send_to(user_id, ServerMessage::LobbyCreated { lobby })
                    .await
            }
            ClientMessage::JoinLobby { lobby_id, name } => {
                self.require_unbound(session)?;
                let lobby = self.engine.join_lobby(lobby_id, user_id, &name).await?;
                *session = Some(lobby_id);
                self.broadcaster
                    .send_to(user_id, ServerMessage::LobbyJoined { lobby })
                    .await
            }
            ClientMessage::AddTrack { track } => {
                let lobby_id = self.require_bound(session)?;
                self.engine.add_track(lobby_id, user_id, track).await
            }
            ClientMessage::RemoveTrack { source, track_id } => {
                let lobby_id = self.require_bound(session)?;
                self.engine
                    .remove_track(lobby_id, user_id, source, &track_id)
                    .await
            }
            ClientMessage::TrackEnded => {
                let lobby_id = self.require_bound(session)?;
                self.engine.handle_track_ended(lobby_id).await
            }
        }
    }

    fn require_bound(&self, session: &Option<LobbyId>) -> Result<LobbyId> {
        session.ok_or_else(|| {
            anyhow!(LobbyError::InvalidInput {
                reason: "not in a lobby".to_string(),
            })
        })
    }

    fn require_unbound(&self, session: &Option<LobbyId>) -> Result<()> {
        if session.is_some() {
            return Err(LobbyError::InvalidInput {
                reason: "already in a lobby".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn reply_error(&self, user_id: UserId, message: String) {
        if let Err(err) = self
            .broadcaster
            .send_to(user_id, ServerMessage::LobbyError { message })
            .await
        {
            warn!("Failed to send error to session {}: {}", user_id, err);
        }
    }
}
