//! Network Layer
//!
//! WebSocket relay for two-player rooms.
//! All rule checks happen in `game/`; this layer only routes messages.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ErrorCode, Participant};
pub use session::{ConnectionId, Coordinator, Outbound, Room, RoomError, RoomId, RoomState};
pub use server::{GameServer, ServerConfig, GameServerError};
