//! Wire protocol shared by the relay server and its clients.
//!
//! Every frame is a JSON object with a `type` discriminator. Clients send
//! `join` and `update`; the server answers with `init`, `player_joined`,
//! `player_update` and `player_left`.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

pub const DEFAULT_X: f64 = 0.0;
/// Eye height used when a joining client does not report `y`.
pub const DEFAULT_Y: f64 = 1.7;
pub const DEFAULT_Z: f64 = 0.0;
pub const DEFAULT_HP: f64 = 100.0;
pub const DEFAULT_SCORE: f64 = 0.0;
pub const DEFAULT_WEAPON: i64 = 0;

/// Weapon identifier as reported by the client.
///
/// Clients may use numeric slots or named weapons. The value is relayed
/// exactly as received.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum WeaponId {
    Number(Number),
    Name(String),
}

impl WeaponId {
    pub fn slot(slot: i64) -> Self {
        Self::Number(Number::from(slot))
    }
}

impl Default for WeaponId {
    fn default() -> Self {
        Self::slot(DEFAULT_WEAPON)
    }
}

impl From<&str> for WeaponId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Mutable per-player state: position, orientation and vitals.
///
/// This is also the exact body of an `update` frame, where every field is
/// required. Orientation units are a contract with the client and are not
/// validated here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub hp: f64,
    pub score: f64,
    pub weapon: WeaponId,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            x: DEFAULT_X,
            y: DEFAULT_Y,
            z: DEFAULT_Z,
            yaw: 0.0,
            pitch: 0.0,
            hp: DEFAULT_HP,
            score: DEFAULT_SCORE,
            weapon: WeaponId::default(),
        }
    }
}

/// Public view of a player, as sent in `init` and `player_joined`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub state: PlayerState,
}

/// Public delta of a player, as sent in `player_update`. Carries no name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerDelta {
    pub id: String,
    #[serde(flatten)]
    pub state: PlayerState,
}

/// Body of a `join` frame. Absent or `null` state fields take their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct JoinRequest {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<WeaponId>,
}

impl JoinRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resolves the initial state, filling in defaults for omitted fields.
    pub fn initial_state(&self) -> PlayerState {
        let defaults = PlayerState::default();
        PlayerState {
            x: self.x.unwrap_or(defaults.x),
            y: self.y.unwrap_or(defaults.y),
            z: self.z.unwrap_or(defaults.z),
            yaw: self.yaw.unwrap_or(defaults.yaw),
            pitch: self.pitch.unwrap_or(defaults.pitch),
            hp: self.hp.unwrap_or(defaults.hp),
            score: self.score.unwrap_or(defaults.score),
            weapon: self.weapon.clone().unwrap_or(defaults.weapon),
        }
    }
}

/// Frames sent from a client to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join(JoinRequest),
    Update(PlayerState),
}

/// Frames sent from the server to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Init { players: Vec<PlayerView> },
    PlayerJoined { player: PlayerView },
    PlayerUpdate { player: PlayerDelta },
    PlayerLeft { id: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` message: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decodes a client text frame.
///
/// The `type` field is inspected before the body so that an unknown kind and
/// a known kind with bad fields are reported differently.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_owned();

    let decoded = match kind.as_str() {
        "join" => serde_json::from_value::<JoinRequest>(value).map(ClientMessage::Join),
        "update" => serde_json::from_value::<PlayerState>(value).map(ClientMessage::Update),
        _ => return Err(ProtocolError::UnknownType(kind.clone())),
    };

    decoded.map_err(|source| ProtocolError::InvalidFields { kind, source })
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::InvalidJson)
}
