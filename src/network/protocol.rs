//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON text frame tagged by `"type"`; the tag values
//! keep the event names the browser client already listens for.

use serde::{Deserializer, Serialize, Deserialize};
use serde_json::Value;

use crate::game::board::{Board, InvalidMove, Mark, WinningTriple};
use crate::network::session::{ConnectionId, RoomId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Create a room, or take the free seat of an existing one.
    JoinGame(JoinRequest),

    /// Place a mark.
    MakeMove(MoveRequest),

    /// Clear the board of a room.
    RestartGame(RestartRequest),

    /// Keepalive / latency probe.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Display name. Anything but a string counts as empty.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub player_name: String,
    /// Room shared by the opponent, if any.
    #[serde(default, deserialize_with = "string_or_none")]
    pub room_id: Option<RoomId>,
}

/// Move request.
///
/// Fields are loosely typed so that a bad room id or index is answered
/// with `roomNotFound` or `invalidMove` instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Target room.
    #[serde(default, deserialize_with = "string_or_none")]
    pub room_id: Option<RoomId>,
    /// Cell index as sent.
    #[serde(default)]
    pub index: Value,
}

impl MoveRequest {
    /// Move into `room_id` at `index`.
    pub fn new(room_id: impl Into<RoomId>, index: i64) -> Self {
        Self {
            room_id: Some(room_id.into()),
            index: Value::from(index),
        }
    }

    /// The index as an integer. Range is checked by the board.
    pub fn cell(&self) -> Result<i64, InvalidMove> {
        self.index.as_i64().ok_or(InvalidMove::NotAnInteger)
    }
}

/// Restart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRequest {
    /// Target room.
    #[serde(default, deserialize_with = "string_or_none")]
    pub room_id: Option<RoomId>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(string_or_none(deserializer)?.unwrap_or_default())
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sole participant, waiting for the room id to be shared.
    WaitingForOpponent(WaitingInfo),

    /// Both seats taken; play may begin.
    GameReady(ReadyInfo),

    /// Non-terminal move applied.
    GameUpdate(BoardUpdate),

    /// Terminal state reached.
    GameOver(GameOverInfo),

    /// Room reset to an empty board.
    GameRestart(BoardUpdate),

    /// The other participant disconnected.
    OpponentLeft,

    /// Request rejected. Only ever sent to the requester.
    Error(ServerError),

    /// Ping response.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server clock (ms since epoch).
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// A seated connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Display name.
    pub name: String,
    /// Assigned mark.
    pub symbol: Mark,
}

/// Payload of `waitingForOpponent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingInfo {
    /// Room to share with the opponent.
    pub room_id: RoomId,
    /// The waiting participant.
    pub player: Participant,
}

/// Payload of `gameReady`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyInfo {
    /// Room identifier.
    pub room_id: RoomId,
    /// Roster, ordered X then O.
    pub players: Vec<Participant>,
    /// Mark to move.
    pub current_player: Mark,
}

/// Payload of `gameUpdate` and `gameRestart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardUpdate {
    /// Current cells.
    pub board: Board,
    /// Mark to move.
    pub current_player: Mark,
}

/// Payload of `gameOver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverInfo {
    /// Winning mark (absent on a draw).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Mark>,
    /// Completed line (absent on a draw).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_combination: Option<WinningTriple>,
    /// Set only on a draw.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub draw: bool,
    /// Final cells.
    pub board: Board,
}

impl GameOverInfo {
    /// Win by `winner` along `triple`.
    pub fn won(winner: Mark, triple: WinningTriple, board: Board) -> Self {
        Self {
            winner: Some(winner),
            winning_combination: Some(triple),
            draw: false,
            board,
        }
    }

    /// Full board with no winner.
    pub fn drawn(board: Board) -> Self {
        Self {
            winner: None,
            winning_combination: None,
            draw: true,
            board,
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Unknown room id.
    RoomNotFound,
    /// Connection is not seated in the room.
    PlayerNotInRoom,
    /// The other mark is to move.
    NotYourTurn,
    /// Rejected by the board.
    InvalidMove,
    /// Frame could not be parsed.
    InvalidInput,
    /// Connection limit reached.
    ServerFull,
}

impl ServerMessage {
    /// Error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Pong stamped with the current server time.
    pub fn pong(timestamp: u64) -> Self {
        ServerMessage::Pong {
            timestamp,
            server_time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(msg: &ServerMessage) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_join_without_room() {
        let msg = ClientMessage::from_json(r#"{"type":"joinGame","playerName":"Ada"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinGame(JoinRequest {
            player_name: "Ada".to_string(),
            room_id: None,
        }));

        let msg = ClientMessage::from_json(
            r#"{"type":"joinGame","playerName":"Ada","roomId":null}"#,
        ).unwrap();
        assert!(matches!(msg, ClientMessage::JoinGame(JoinRequest { room_id: None, .. })));
    }

    #[test]
    fn test_parse_join_with_room() {
        let msg = ClientMessage::from_json(
            r#"{"type":"joinGame","playerName":"Bob","roomId":"k3x9qa"}"#,
        ).unwrap();
        if let ClientMessage::JoinGame(req) = msg {
            assert_eq!(req.room_id.as_deref(), Some("k3x9qa"));
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_parse_move_accepts_negative_index() {
        let msg = ClientMessage::from_json(
            r#"{"type":"makeMove","roomId":"abc123","index":-1}"#,
        ).unwrap();
        assert_eq!(msg, ClientMessage::MakeMove(MoveRequest::new("abc123", -1)));
    }

    #[test]
    fn test_parse_loose_move_fields() {
        let msg = ClientMessage::from_json(r#"{"type":"makeMove","index":4}"#).unwrap();
        match msg {
            ClientMessage::MakeMove(req) => {
                assert_eq!(req.room_id, None);
                assert_eq!(req.cell(), Ok(4));
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        for index in [r#""4""#, "4.0", "null", "[4]"] {
            let text = format!(r#"{{"type":"makeMove","roomId":"abc123","index":{}}}"#, index);
            match ClientMessage::from_json(&text).unwrap() {
                ClientMessage::MakeMove(req) => assert_eq!(req.cell(), Err(InvalidMove::NotAnInteger)),
                other => panic!("Wrong message type: {:?}", other),
            }
        }

        let msg = ClientMessage::from_json(r#"{"type":"makeMove","roomId":7}"#).unwrap();
        match msg {
            ClientMessage::MakeMove(req) => {
                assert_eq!(req.room_id, None);
                assert_eq!(req.cell(), Err(InvalidMove::NotAnInteger));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_join_with_odd_fields() {
        let msg = ClientMessage::from_json(r#"{"type":"joinGame","roomId":12}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinGame(JoinRequest {
            player_name: String::new(),
            room_id: None,
        }));
    }

    #[test]
    fn test_parse_restart_and_ping() {
        let msg = ClientMessage::from_json(r#"{"type":"restartGame","roomId":"abc123"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RestartGame(RestartRequest {
            room_id: Some("abc123".to_string()),
        }));

        let msg = ClientMessage::from_json(r#"{"type":"restartGame"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RestartGame(RestartRequest { room_id: None }));

        let msg = ClientMessage::from_json(r#"{"type":"ping","timestamp":42}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping { timestamp: 42 });
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(ClientMessage::from_json(r#"{"type":"spectate","roomId":"abc123"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"roomId":"abc123"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::MakeMove(MoveRequest::new("abc123", 4));
        let parsed = ClientMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_game_over_win_shape() {
        let mut board = Board::new();
        for (turn, index) in [(Mark::X, 0), (Mark::O, 3), (Mark::X, 1), (Mark::O, 4), (Mark::X, 2)] {
            board.apply_move(turn, index).unwrap();
        }
        let msg = ServerMessage::GameOver(GameOverInfo::won(Mark::X, [0, 1, 2], board));

        let value = to_value(&msg);
        assert_eq!(value["type"], "gameOver");
        assert_eq!(value["winner"], "X");
        assert_eq!(value["winningCombination"], json!([0, 1, 2]));
        assert!(value.get("draw").is_none());
        assert_eq!(value["board"][3], "O");
    }

    #[test]
    fn test_game_over_draw_shape() {
        let msg = ServerMessage::GameOver(GameOverInfo::drawn(Board::new()));

        let value = to_value(&msg);
        assert_eq!(value["draw"], true);
        assert!(value.get("winner").is_none());
        assert!(value.get("winningCombination").is_none());
    }

    #[test]
    fn test_board_update_shape() {
        let msg = ServerMessage::GameRestart(BoardUpdate {
            board: Board::new(),
            current_player: Mark::X,
        });

        let value = to_value(&msg);
        assert_eq!(value["type"], "gameRestart");
        assert_eq!(value["currentPlayer"], "X");
        assert_eq!(value["board"], json!([null, null, null, null, null, null, null, null, null]));
    }

    #[test]
    fn test_unit_and_error_shapes() {
        assert_eq!(to_value(&ServerMessage::OpponentLeft), json!({ "type": "opponentLeft" }));

        let value = to_value(&ServerMessage::error(ErrorCode::NotYourTurn, "Not your turn"));
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "notYourTurn");
        assert_eq!(value["message"], "Not your turn");
    }

    #[test]
    fn test_pong_shape() {
        let value = to_value(&ServerMessage::pong(7));
        assert_eq!(value["type"], "pong");
        assert_eq!(value["timestamp"], 7);
        assert!(value["serverTime"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_ready_roundtrip() {
        let msg = ServerMessage::GameReady(ReadyInfo {
            room_id: "abc123".to_string(),
            players: vec![
                Participant { id: ConnectionId::new(), name: "Ada".to_string(), symbol: Mark::X },
                Participant { id: ConnectionId::new(), name: "Bob".to_string(), symbol: Mark::O },
            ],
            current_player: Mark::X,
        });

        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
