//! Game Logic Module
//!
//! Pure tic-tac-toe rules. No I/O, no clocks.
//!
//! ## Module Structure
//!
//! - `board`: Cells, move validation, win and draw detection
//! - `local`: Hot-seat game and the snapshot the UI renders

pub mod board;
pub mod local;

// Re-export key types
pub use board::{Board, InvalidMove, Mark, WinningTriple, WIN_PATTERNS};
pub use local::{GameSnapshot, LocalGame};
