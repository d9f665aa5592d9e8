//! Room Session Management
//!
//! The authoritative side of a two-player game. A [`Coordinator`] owns every
//! room, pairs connections into rooms of two and validates moves through the
//! board engine. Operations never perform I/O: each one commits its state
//! change and returns the messages to deliver as [`Outbound`] values, which
//! the transport fans out afterwards.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::board::{cell_index, Board, InvalidMove, Mark, WinningTriple};
use crate::game::local::GameSnapshot;
use crate::network::protocol::{
    BoardUpdate, ClientMessage, ErrorCode, GameOverInfo, Participant, ReadyInfo,
    ServerMessage, WaitingInfo,
};

/// Room identifier shared out-of-band between the two players.
pub type RoomId = String;

/// Length of generated room codes.
pub const ROOM_ID_LEN: usize = 6;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 20;

/// Name used when a client sends an empty one.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Ephemeral identity of one WebSocket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Room lifecycle. An abandoned room is removed from the table outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// No second participant has joined yet.
    WaitingForOpponent,
    /// Both seats taken, game in progress.
    Active,
    /// Won or drawn; waits for a restart.
    Concluded,
}

/// A seated participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// Display name.
    pub name: String,
    /// Assigned mark.
    pub symbol: Mark,
}

/// Authoritative state of one room.
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    state: RoomState,
    board: Board,
    current_turn: Mark,
    winning_combination: Option<WinningTriple>,
    seats: BTreeMap<ConnectionId, Seat>,
}

impl Room {
    /// New room with `creator` seated as X.
    pub fn new(id: RoomId, creator: ConnectionId, name: String) -> Self {
        let mut seats = BTreeMap::new();
        seats.insert(creator, Seat { name, symbol: Mark::X });

        Self {
            id,
            state: RoomState::WaitingForOpponent,
            board: Board::new(),
            current_turn: Mark::X,
            winning_combination: None,
            seats,
        }
    }

    /// Room identifier.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Current cells.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mark to move.
    pub fn current_turn(&self) -> Mark {
        self.current_turn
    }

    /// Line recorded by the winning move.
    pub fn winning_combination(&self) -> Option<WinningTriple> {
        self.winning_combination
    }

    /// Won or drawn.
    pub fn is_over(&self) -> bool {
        self.state == RoomState::Concluded
    }

    /// Number of seated connections.
    pub fn participant_count(&self) -> usize {
        self.seats.len()
    }

    /// Check if a connection is seated here.
    pub fn has_participant(&self, conn: &ConnectionId) -> bool {
        self.seats.contains_key(conn)
    }

    /// Mark assigned to a connection.
    pub fn symbol_of(&self, conn: &ConnectionId) -> Option<Mark> {
        self.seats.get(conn).map(|s| s.symbol)
    }

    /// Wire view of one participant.
    pub fn participant(&self, conn: &ConnectionId) -> Option<Participant> {
        self.seats.get(conn).map(|seat| Participant {
            id: *conn,
            name: seat.name.clone(),
            symbol: seat.symbol,
        })
    }

    /// Roster ordered X then O.
    pub fn roster(&self) -> Vec<Participant> {
        let mut players: Vec<Participant> = self.seats.iter()
            .map(|(id, seat)| Participant {
                id: *id,
                name: seat.name.clone(),
                symbol: seat.symbol,
            })
            .collect();
        players.sort_by_key(|p| p.symbol);
        players
    }

    /// Read-only view for presentation.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::of(&self.board, self.current_turn)
    }

    /// Seat a second participant on the free mark and start a fresh game.
    ///
    /// Returns `None` if the room already has two participants.
    fn seat(&mut self, conn: ConnectionId, name: String) -> Option<Mark> {
        if self.seats.len() >= 2 {
            return None;
        }
        let symbol = if self.seats.values().any(|s| s.symbol == Mark::X) {
            Mark::O
        } else {
            Mark::X
        };
        self.seats.insert(conn, Seat { name, symbol });
        if self.seats.len() == 2 {
            self.reset();
        }
        Some(symbol)
    }

    /// Remove a participant. The game state is left as it was; a room with
    /// a free seat accepts a new opponent whatever its state.
    fn unseat(&mut self, conn: &ConnectionId) -> Option<Seat> {
        self.seats.remove(conn)
    }

    /// Empty board, X to move, conclusion cleared.
    fn reset(&mut self) {
        self.board = Board::new();
        self.current_turn = Mark::X;
        self.winning_combination = None;
        self.state = if self.seats.len() == 2 {
            RoomState::Active
        } else {
            RoomState::WaitingForOpponent
        };
    }

    /// Validate and apply a move, returning the message to broadcast.
    ///
    /// `index` is `Err` when the request carried no usable integer; that is
    /// reported only after the participant and turn checks pass.
    fn play(
        &mut self,
        conn: &ConnectionId,
        index: Result<i64, InvalidMove>,
    ) -> Result<ServerMessage, RoomError> {
        let symbol = self.symbol_of(conn).ok_or(RoomError::PlayerNotInRoom)?;
        if symbol != self.current_turn {
            return Err(RoomError::NotYourTurn);
        }
        if self.state == RoomState::Concluded {
            return Err(InvalidMove::GameOver.into());
        }

        let index = cell_index(index?)?;
        self.board.apply_move(symbol, index)?;

        if let Some((winner, triple)) = self.board.check_winner() {
            self.state = RoomState::Concluded;
            self.winning_combination = Some(triple);
            return Ok(ServerMessage::GameOver(GameOverInfo::won(winner, triple, self.board)));
        }

        if self.board.is_full() {
            self.state = RoomState::Concluded;
            return Ok(ServerMessage::GameOver(GameOverInfo::drawn(self.board)));
        }

        self.current_turn = self.current_turn.next_turn();
        Ok(ServerMessage::GameUpdate(BoardUpdate {
            board: self.board,
            current_player: self.current_turn,
        }))
    }

    /// Address `message` to every participant.
    fn broadcast(&self, message: &ServerMessage) -> Vec<Outbound> {
        self.seats.keys()
            .map(|conn| Outbound::new(*conn, message.clone()))
            .collect()
    }
}

// =============================================================================
// ERRORS AND RESULTS
// =============================================================================

/// Rejected room operations. Reported to the requester only; the room is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Unknown room id.
    #[error("Game room not found")]
    RoomNotFound,

    /// Connection is not seated in the room.
    #[error("Player not found in this game")]
    PlayerNotInRoom,

    /// The other mark is to move.
    #[error("Not your turn")]
    NotYourTurn,

    /// Rejected by the board.
    #[error("Invalid move")]
    InvalidMove(#[from] InvalidMove),
}

impl RoomError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::RoomNotFound => ErrorCode::RoomNotFound,
            RoomError::PlayerNotInRoom => ErrorCode::PlayerNotInRoom,
            RoomError::NotYourTurn => ErrorCode::NotYourTurn,
            RoomError::InvalidMove(_) => ErrorCode::InvalidMove,
        }
    }

    /// Error reply for the requester.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// A message addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient.
    pub to: ConnectionId,
    /// Payload.
    pub message: ServerMessage,
}

impl Outbound {
    /// Address `message` to `to`.
    pub fn new(to: ConnectionId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// Result of a join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Room the connection is now seated in.
    pub room_id: RoomId,
    /// Mark assigned to the connection.
    pub symbol: Mark,
    /// True if this join filled an existing room.
    pub paired: bool,
    /// Notifications: `waitingForOpponent` to the joiner, or `gameReady` to
    /// both participants, preceded by `opponentLeft` for any room the
    /// connection had to leave.
    pub outbound: Vec<Outbound>,
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Owns every room and the connection → room index.
#[derive(Debug, Default)]
pub struct Coordinator {
    rooms: BTreeMap<RoomId, Room>,
    memberships: BTreeMap<ConnectionId, RoomId>,
}

impl Coordinator {
    /// Empty room table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a client message, turning rejections into an error reply.
    pub fn handle(&mut self, conn: ConnectionId, msg: ClientMessage) -> Vec<Outbound> {
        let result = match msg {
            ClientMessage::JoinGame(req) => {
                Ok(self.join(conn, &req.player_name, req.room_id.as_deref()).outbound)
            }
            ClientMessage::MakeMove(req) => match req.room_id.as_deref() {
                Some(room_id) => self.play(conn, room_id, req.cell()),
                None => Err(RoomError::RoomNotFound),
            },
            ClientMessage::RestartGame(req) => match req.room_id.as_deref() {
                Some(room_id) => self.restart(conn, room_id),
                None => Err(RoomError::RoomNotFound),
            },
            ClientMessage::Ping { timestamp } => {
                Ok(vec![Outbound::new(conn, ServerMessage::pong(timestamp))])
            }
        };

        result.unwrap_or_else(|e| {
            debug!("Rejected request from {}: {}", conn, e);
            vec![Outbound::new(conn, e.to_message())]
        })
    }

    /// Seat `conn` in the room named by `room_id` if it has a free seat,
    /// otherwise in a newly created room.
    pub fn join(&mut self, conn: ConnectionId, player_name: &str, room_id: Option<&str>) -> JoinOutcome {
        // One room per connection.
        let mut outbound = self.disconnect(conn);
        let name = normalize_name(player_name);

        let requested = room_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(room) = requested
            .and_then(|id| self.rooms.get_mut(id))
            .filter(|room| room.participant_count() == 1)
        {
            if let Some(symbol) = room.seat(conn, name.clone()) {
                let room_id = room.id.clone();
                let ready = ServerMessage::GameReady(ReadyInfo {
                    room_id: room_id.clone(),
                    players: room.roster(),
                    current_player: room.current_turn,
                });
                outbound.extend(room.broadcast(&ready));
                self.memberships.insert(conn, room_id.clone());

                info!("Room {} ready: {} joined as {}", room_id, conn, symbol);
                return JoinOutcome { room_id, symbol, paired: true, outbound };
            }
        }

        let room_id = self.generate_room_id();
        let waiting = ServerMessage::WaitingForOpponent(WaitingInfo {
            room_id: room_id.clone(),
            player: Participant { id: conn, name: name.clone(), symbol: Mark::X },
        });
        let room = Room::new(room_id.clone(), conn, name);
        outbound.push(Outbound::new(conn, waiting));

        self.rooms.insert(room_id.clone(), room);
        self.memberships.insert(conn, room_id.clone());

        info!("Room {} created by {}", room_id, conn);
        JoinOutcome { room_id, symbol: Mark::X, paired: false, outbound }
    }

    /// Apply a move for `conn` and broadcast the resulting state.
    pub fn make_move(
        &mut self,
        conn: ConnectionId,
        room_id: &str,
        index: i64,
    ) -> Result<Vec<Outbound>, RoomError> {
        self.play(conn, room_id, Ok(index))
    }

    fn play(
        &mut self,
        conn: ConnectionId,
        room_id: &str,
        index: Result<i64, InvalidMove>,
    ) -> Result<Vec<Outbound>, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        let message = room.play(&conn, index)?;

        if let ServerMessage::GameOver(info) = &message {
            info!("Room {} concluded (winner: {:?})", room_id, info.winner);
        }

        Ok(room.broadcast(&message))
    }

    /// Reset the board of a room.
    ///
    /// Either participant may restart. A connection that is not seated in
    /// the room gets `PlayerNotInRoom`; knowing the room id is not enough.
    pub fn restart(&mut self, conn: ConnectionId, room_id: &str) -> Result<Vec<Outbound>, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;
        if !room.has_participant(&conn) {
            return Err(RoomError::PlayerNotInRoom);
        }

        room.reset();
        debug!("Room {} restarted by {}", room_id, conn);

        Ok(room.broadcast(&ServerMessage::GameRestart(BoardUpdate {
            board: room.board,
            current_player: room.current_turn,
        })))
    }

    /// Remove `conn` from its room, notifying whoever remains.
    ///
    /// A room left empty is destroyed; a room left with one participant
    /// stays resident and accepts a new opponent under the same id.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let Some(room_id) = self.memberships.remove(&conn) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };

        room.unseat(&conn);
        let outbound = room.broadcast(&ServerMessage::OpponentLeft);

        if room.participant_count() == 0 {
            self.rooms.remove(&room_id);
            info!("Room {} abandoned", room_id);
        } else {
            debug!("{} left room {}", conn, room_id);
        }

        outbound
    }

    /// Look up a room.
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Room a connection is seated in.
    pub fn room_of(&self, conn: &ConnectionId) -> Option<&RoomId> {
        self.memberships.get(conn)
    }

    /// Number of resident rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Random room code not used by any resident room.
    fn generate_room_id(&self) -> RoomId {
        let mut rng = rand::thread_rng();
        loop {
            let id: RoomId = (0..ROOM_ID_LEN)
                .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Trim, cap at `MAX_NAME_LEN` characters, default when empty.
fn normalize_name(name: &str) -> String {
    let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name
    }
}
