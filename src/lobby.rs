//! Demo lobby engine wired into the binary.
//!
//! Only routes events between players; there are no game rules. Lobbies live
//! in process memory, so in `COLOCATED` mode each hub only knows the games
//! created through it.

use std::collections::HashMap;

use async_trait::async_trait;
use hubbub_core::{Backends, Engine, Event, EventError, RelayMessage};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

/// Seats per game; later joiners become spectators.
pub const MAX_PLAYERS: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub game_id: String,
    pub host: String,
    pub players: Vec<String>,
    pub spectators: Vec<String>,
}

impl Lobby {
    fn new(game_id: String, host: String) -> Self {
        Self {
            game_id,
            players: vec![host.clone()],
            host,
            spectators: Vec::new(),
        }
    }

    fn seat(&mut self, conn_id: &str) {
        if self.contains(conn_id) {
            return;
        }
        if self.players.len() < MAX_PLAYERS {
            self.players.push(conn_id.to_string());
        } else {
            self.spectators.push(conn_id.to_string());
        }
    }

    fn remove(&mut self, conn_id: &str) {
        self.players.retain(|p| p != conn_id);
        self.spectators.retain(|s| s != conn_id);
        if self.host == conn_id {
            self.host = self.players.first().cloned().unwrap_or_default();
        }
    }

    fn contains(&self, conn_id: &str) -> bool {
        self.players.iter().chain(&self.spectators).any(|c| c == conn_id)
    }

    fn is_empty(&self) -> bool {
        self.players.is_empty() && self.spectators.is_empty()
    }

    fn update(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
pub struct LobbyEngine {
    games: Mutex<HashMap<String, Lobby>>,
}

impl LobbyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lobby(&self, game_id: &str) -> Option<Lobby> {
        self.games.lock().get(game_id).cloned()
    }

    /// Drop a closed connection from every lobby and return the lobbies it
    /// left, as they look afterwards. Empty lobbies are removed.
    pub fn forget(&self, conn_id: &str) -> Vec<Lobby> {
        let mut games = self.games.lock();
        let mut left = Vec::new();
        for lobby in games.values_mut().filter(|lobby| lobby.contains(conn_id)) {
            lobby.remove(conn_id);
            left.push(lobby.clone());
        }
        games.retain(|_, lobby| !lobby.is_empty());
        left
    }

    /// Forget a closed connection, take it out of each game's group and tell
    /// the remaining members. Failures are logged and the rest still runs.
    pub async fn release(&self, backends: &Backends, conn_id: &str) {
        for lobby in self.forget(conn_id) {
            let game_id = lobby.game_id.as_str();
            if let Err(e) = backends.groups.remove_from_group(conn_id, game_id).await {
                tracing::warn!(conn_id, game_id, error = %e, "failed to leave group on disconnect");
            }
            if lobby.is_empty() {
                continue;
            }
            let members = match backends.groups.group_members(game_id).await {
                Ok(members) if !members.is_empty() => members,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(game_id, error = %e, "failed to read group on disconnect");
                    continue;
                }
            };
            let update = Event::to_group(game_id, "LobbyUpdate", lobby.update());
            if let Err(e) = backends
                .relayer
                .broadcast(RelayMessage::to_recipients(update, members))
                .await
            {
                tracing::warn!(game_id, error = %e, "failed to relay lobby update");
            }
        }
    }

    fn create_game(&self, source_id: &str) -> Vec<Event> {
        let game_id = uuid::Uuid::new_v4().to_string();
        let lobby = Lobby::new(game_id.clone(), source_id.to_string());
        let update = lobby.update();
        self.games.lock().insert(game_id.clone(), lobby);
        tracing::info!(game_id = %game_id, host = %source_id, "game created");
        vec![Event::to_client(source_id, "LobbyUpdate", update)]
    }

    fn join_game(&self, source_id: &str, game_id: &str) -> Result<Vec<Event>, EventError> {
        let update = {
            let mut games = self.games.lock();
            let lobby = games.get_mut(game_id).ok_or_else(|| unknown_game(game_id))?;
            lobby.seat(source_id);
            lobby.update()
        };
        Ok(vec![
            Event::join_group(source_id, game_id),
            Event::to_group(game_id, "LobbyUpdate", update),
        ])
    }

    fn leave_game(&self, source_id: &str, game_id: &str) -> Result<Vec<Event>, EventError> {
        let update = {
            let mut games = self.games.lock();
            let lobby = games.get_mut(game_id).ok_or_else(|| unknown_game(game_id))?;
            lobby.remove(source_id);
            let update = lobby.update();
            if lobby.is_empty() {
                games.remove(game_id);
            }
            update
        };
        Ok(vec![
            Event::leave_group(source_id, game_id),
            Event::to_group(game_id, "LobbyUpdate", update),
        ])
    }

    fn game_chat(&self, source_id: &str, game_id: &str, text: Value) -> Result<Vec<Event>, EventError> {
        let member = self
            .games
            .lock()
            .get(game_id)
            .map(|lobby| lobby.contains(source_id))
            .ok_or_else(|| unknown_game(game_id))?;
        if !member {
            return Err(EventError::engine(format!("not a member of game {game_id}")));
        }
        Ok(vec![Event::to_group(
            game_id,
            "GameChat",
            json!({"from": source_id, "text": text}),
        )])
    }
}

fn unknown_game(game_id: &str) -> EventError {
    EventError::engine(format!("game {game_id} not found"))
}

fn game_id(payload: &Value) -> Result<&str, EventError> {
    payload
        .get("gameId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EventError::engine("missing gameId"))
}

#[async_trait]
impl Engine for LobbyEngine {
    async fn handle_event(&self, event: Event) -> Result<Vec<Event>, EventError> {
        let source = event.source_id.as_str();
        match event.event_type.as_str() {
            "CreateGame" => Ok(self.create_game(source)),
            "JoinGame" => self.join_game(source, game_id(&event.payload)?),
            "LeaveGame" => self.leave_game(source, game_id(&event.payload)?),
            "GameChat" => {
                let text = event.payload.get("text").cloned().unwrap_or(Value::Null);
                self.game_chat(source, game_id(&event.payload)?, text)
            }
            "Announce" => Ok(vec![Event::broadcast("Announce", event.payload)]),
            other => Err(EventError::engine(format!("invalid message type: {other}"))),
        }
    }
}
