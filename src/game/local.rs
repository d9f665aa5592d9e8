//! Local single-player game.
//!
//! Drives the board engine for a hot-seat game on one screen and exposes
//! the read-only snapshot the presentation layer renders from.

use serde::{Serialize, Deserialize};

use crate::game::board::{Board, InvalidMove, Mark, WinningTriple};

/// Read-only view of a game handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Current cells.
    pub board: Board,
    /// Mark to move (the last mover once the game is over).
    pub current_player: Mark,
    /// Won or drawn.
    pub game_over: bool,
    /// Winning mark, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Mark>,
    /// Full board with no winner.
    pub is_draw: bool,
    /// Line to highlight, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_combination: Option<WinningTriple>,
}

impl GameSnapshot {
    /// Snapshot of `board` with `current_player` to move.
    pub fn of(board: &Board, current_player: Mark) -> Self {
        let winner = board.check_winner();
        Self {
            board: *board,
            current_player,
            game_over: board.is_concluded(),
            winner: winner.map(|(mark, _)| mark),
            is_draw: board.check_draw(),
            winning_combination: winner.map(|(_, triple)| triple),
        }
    }
}

/// A hot-seat game: both marks are played from the same client.
#[derive(Debug, Clone, Default)]
pub struct LocalGame {
    board: Board,
    current_player: Mark,
    game_over: bool,
    winning_combination: Option<WinningTriple>,
}

impl LocalGame {
    /// Empty board, X to move.
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to an empty board with X to move.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Play the current mark at `index`.
    ///
    /// The turn only passes when the move does not end the game.
    pub fn make_move(&mut self, index: usize) -> Result<(), InvalidMove> {
        if self.game_over {
            return Err(InvalidMove::GameOver);
        }
        self.board.apply_move(self.current_player, index)?;

        if let Some((_, triple)) = self.board.check_winner() {
            self.game_over = true;
            self.winning_combination = Some(triple);
        } else if self.board.check_draw() {
            self.game_over = true;
        } else {
            self.current_player = self.current_player.next_turn();
        }
        Ok(())
    }

    /// Current cells.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mark to move.
    pub fn current_player(&self) -> Mark {
        self.current_player
    }

    /// Won or drawn.
    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// Line to highlight once won.
    pub fn winning_combination(&self) -> Option<WinningTriple> {
        self.winning_combination
    }

    /// View for the presentation layer.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::of(&self.board, self.current_player)
    }
}
