//! Board Engine
//!
//! Pure state transitions for the 3x3 grid: move validation, win and draw
//! detection. Shared by the local game and the authoritative rooms so both
//! agree on which line is reported.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// MARKS
// =============================================================================

/// A play symbol. `X` always moves first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First player.
    #[default]
    X,
    /// Second player.
    O,
}

impl Mark {
    /// The mark that moves after this one.
    #[inline]
    pub fn next_turn(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

// =============================================================================
// WIN PATTERNS
// =============================================================================

/// Indices of a completed line.
pub type WinningTriple = [usize; 3];

/// Every line on the board, in tie-break order.
///
/// Rows top to bottom, columns left to right, then the two diagonals.
/// `check_winner` reports the first match, so this order decides which
/// line is highlighted when a move completes two at once.
pub const WIN_PATTERNS: [WinningTriple; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Number of cells.
pub const CELL_COUNT: usize = 9;

// =============================================================================
// ERRORS
// =============================================================================

/// A rejected move. The board is never modified when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMove {
    /// Index outside 0..=8.
    #[error("Cell index {0} is out of range")]
    OutOfRange(i64),

    /// Target cell already holds a mark.
    #[error("Cell {0} is already occupied")]
    Occupied(usize),

    /// The board already has a winner or is full.
    #[error("Game is already over")]
    GameOver,

    /// Index is missing or not an integer.
    #[error("Cell index must be an integer")]
    NotAnInteger,
}

/// Convert an externally supplied index into a cell index.
pub fn cell_index(index: i64) -> Result<usize, InvalidMove> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < CELL_COUNT)
        .ok_or(InvalidMove::OutOfRange(index))
}

// =============================================================================
// BOARD
// =============================================================================

/// The 3x3 grid, row-major.
///
/// ```text
/// 0 | 1 | 2
/// ---------
/// 3 | 4 | 5
/// ---------
/// 6 | 7 | 8
/// ```
///
/// Serializes as a 9-element array of `null`, `"X"` or `"O"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([Option<Mark>; CELL_COUNT]);

impl Board {
    /// An empty board.
    pub const fn new() -> Self {
        Self([None; CELL_COUNT])
    }

    /// Build a board from raw cells.
    pub const fn from_cells(cells: [Option<Mark>; CELL_COUNT]) -> Self {
        Self(cells)
    }

    /// Raw cells.
    pub fn cells(&self) -> &[Option<Mark>; CELL_COUNT] {
        &self.0
    }

    /// Mark at `index`, if any. Out-of-range indices read as empty.
    pub fn get(&self, index: usize) -> Option<Mark> {
        self.0.get(index).copied().flatten()
    }

    /// True if no cell is empty.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// True if no cell holds a mark.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Number of cells holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.0.iter().filter(|c| **c == Some(mark)).count()
    }

    /// Place `turn`'s mark at `index`.
    ///
    /// Fails if the game is already decided, the index is outside the
    /// board, or the cell is taken.
    pub fn apply_move(&mut self, turn: Mark, index: usize) -> Result<(), InvalidMove> {
        if self.is_concluded() {
            return Err(InvalidMove::GameOver);
        }
        let cell = self.0
            .get_mut(index)
            .ok_or(InvalidMove::OutOfRange(index as i64))?;
        if cell.is_some() {
            return Err(InvalidMove::Occupied(index));
        }
        *cell = Some(turn);
        Ok(())
    }

    /// First line in `WIN_PATTERNS` owned entirely by one mark.
    pub fn check_winner(&self) -> Option<(Mark, WinningTriple)> {
        WIN_PATTERNS.iter().find_map(|&[a, b, c]| {
            let mark = self.0[a]?;
            (self.0[b] == Some(mark) && self.0[c] == Some(mark)).then_some((mark, [a, b, c]))
        })
    }

    /// Full board with no winner.
    pub fn check_draw(&self) -> bool {
        self.check_winner().is_none() && self.is_full()
    }

    /// Won or drawn.
    pub fn is_concluded(&self) -> bool {
        self.is_full() || self.check_winner().is_some()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f, "---------")?;
            }
            let cells: Vec<String> = (0..3)
                .map(|col| match self.0[row * 3 + col] {
                    Some(mark) => mark.to_string(),
                    None => " ".to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const X: Option<Mark> = Some(Mark::X);
    const O: Option<Mark> = Some(Mark::O);
    const E: Option<Mark> = None;

    fn play(moves: &[usize]) -> (Board, Mark) {
        let mut board = Board::new();
        let mut turn = Mark::X;
        for &index in moves {
            board.apply_move(turn, index).unwrap();
            turn = turn.next_turn();
        }
        (board, turn)
    }

    #[test]
    fn test_empty_board() {
        let board = Board::new();
        assert!(board.is_empty());
        assert!(!board.is_full());
        assert_eq!(board.check_winner(), None);
        assert!(!board.check_draw());
    }

    #[test]
    fn test_next_turn_toggles() {
        assert_eq!(Mark::X.next_turn(), Mark::O);
        assert_eq!(Mark::O.next_turn(), Mark::X);
    }

    #[test]
    fn test_apply_move_sets_cell() {
        let mut board = Board::new();
        board.apply_move(Mark::X, 4).unwrap();
        assert_eq!(board.get(4), Some(Mark::X));
        assert_eq!(board.count(Mark::X), 1);
    }

    #[test]
    fn test_apply_move_occupied() {
        let mut board = Board::new();
        board.apply_move(Mark::X, 0).unwrap();
        let before = board;

        assert_eq!(board.apply_move(Mark::O, 0), Err(InvalidMove::Occupied(0)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_apply_move_out_of_range() {
        let mut board = Board::new();
        assert_eq!(board.apply_move(Mark::X, 9), Err(InvalidMove::OutOfRange(9)));
        assert!(board.is_empty());
    }

    #[test]
    fn test_apply_move_after_win() {
        let (mut board, turn) = play(&[0, 3, 1, 4, 2]);
        let before = board;

        assert_eq!(board.apply_move(turn, 8), Err(InvalidMove::GameOver));
        assert_eq!(board, before);
    }

    #[test]
    fn test_cell_index() {
        assert_eq!(cell_index(0), Ok(0));
        assert_eq!(cell_index(8), Ok(8));
        assert_eq!(cell_index(-1), Err(InvalidMove::OutOfRange(-1)));
        assert_eq!(cell_index(9), Err(InvalidMove::OutOfRange(9)));
    }

    #[test]
    fn test_horizontal_win() {
        let (board, _) = play(&[0, 3, 1, 4, 2]);
        assert_eq!(board.check_winner(), Some((Mark::X, [0, 1, 2])));
    }

    #[test]
    fn test_vertical_win() {
        let (board, _) = play(&[0, 1, 3, 2, 6]);
        assert_eq!(board.check_winner(), Some((Mark::X, [0, 3, 6])));
    }

    #[test]
    fn test_diagonal_win() {
        let (board, _) = play(&[0, 1, 4, 2, 8]);
        assert_eq!(board.check_winner(), Some((Mark::X, [0, 4, 8])));
    }

    #[test]
    fn test_second_player_win() {
        let (board, _) = play(&[0, 2, 1, 4, 8, 6]);
        assert_eq!(board.check_winner(), Some((Mark::O, [2, 4, 6])));
    }

    #[test]
    fn test_draw() {
        let board = Board::from_cells([X, O, X, X, O, O, O, X, X]);
        assert!(board.check_draw());
        assert_eq!(board.check_winner(), None);
        assert!(board.is_concluded());
    }

    #[test]
    fn test_no_draw_when_won() {
        let board = Board::from_cells([X, X, X, O, O, E, E, E, E]);
        assert!(!board.check_draw());
    }

    #[test]
    fn test_full_board_with_winner_is_not_draw() {
        let board = Board::from_cells([X, X, X, O, O, X, X, O, O]);
        assert!(board.is_full());
        assert!(!board.check_draw());
        assert_eq!(board.check_winner(), Some((Mark::X, [0, 1, 2])));
    }

    #[test]
    fn test_simultaneous_lines_use_table_order() {
        // Completing cell 0 closes both the top row and the left column.
        let board = Board::from_cells([X, X, X, X, O, O, X, O, O]);
        assert_eq!(board.check_winner(), Some((Mark::X, [0, 1, 2])));

        // Column and diagonal through the centre: column comes first.
        let board = Board::from_cells([X, X, O, O, X, O, O, X, X]);
        assert_eq!(board.check_winner(), Some((Mark::X, [1, 4, 7])));
    }

    #[test]
    fn test_serializes_as_array() {
        let (board, _) = play(&[4, 0]);
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"["O",null,null,null,"X",null,null,null,null]"#);
    }

    #[test]
    fn test_display() {
        let (board, _) = play(&[0, 4]);
        let text = board.to_string();
        assert!(text.starts_with("X |   |  \n"));
        assert!(text.contains("  | O |  "));
    }

    proptest! {
        #[test]
        fn prop_failed_move_never_mutates(
            moves in proptest::collection::vec(0usize..12, 0..20),
        ) {
            let mut board = Board::new();
            let mut turn = Mark::X;
            for index in moves {
                let before = board;
                match board.apply_move(turn, index) {
                    Ok(()) => turn = turn.next_turn(),
                    Err(_) => prop_assert_eq!(board, before),
                }
            }
        }

        #[test]
        fn prop_marks_stay_balanced(
            moves in proptest::collection::vec(0usize..9, 0..20),
        ) {
            let mut board = Board::new();
            let mut turn = Mark::X;
            let mut accepted = 0usize;
            for index in moves {
                if board.apply_move(turn, index).is_ok() {
                    turn = turn.next_turn();
                    accepted += 1;
                }
                let x = board.count(Mark::X);
                let o = board.count(Mark::O);
                prop_assert!(x == o || x == o + 1);
            }
            let expected = if accepted % 2 == 0 { Mark::X } else { Mark::O };
            prop_assert_eq!(turn, expected);
        }

        #[test]
        fn prop_winner_is_deterministic(
            cells in proptest::collection::vec(
                prop_oneof![Just(None), Just(Some(Mark::X)), Just(Some(Mark::O))],
                9,
            ),
        ) {
            let mut arr = [None; CELL_COUNT];
            arr.copy_from_slice(&cells);
            let board = Board::from_cells(arr);

            let first = board.check_winner();
            prop_assert_eq!(first, board.check_winner());
            if let Some((mark, triple)) = first {
                prop_assert!(triple.iter().all(|&i| board.get(i) == Some(mark)));
                let position = WIN_PATTERNS.iter().position(|p| *p == triple).unwrap();
                for earlier in &WIN_PATTERNS[..position] {
                    let owned = earlier.iter().all(|&i| board.get(i).is_some()
                        && board.get(i) == board.get(earlier[0]));
                    prop_assert!(!owned);
                }
            }
            prop_assert!(!(board.check_draw() && first.is_some()));
        }
    }
}
