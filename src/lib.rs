//! # Tic-Tac-Toe Relay
//!
//! Rules engine and WebSocket relay server for two-player tic-tac-toe.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE RELAY                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rules (pure)                              │
//! │  ├── board.rs    - Cells, moves, win/draw detection          │
//! │  └── local.rs    - Hot-seat game and UI snapshot             │
//! │                                                              │
//! │  network/        - Relay                                     │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Rooms and the coordinator                 │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server is authoritative: clients send intents, every move is
//! validated against the room's board, and only accepted changes are
//! broadcast to the room.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, InvalidMove, Mark, WinningTriple};
pub use game::local::{GameSnapshot, LocalGame};
pub use network::session::{ConnectionId, Coordinator, RoomId};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
