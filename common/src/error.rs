use thiserror::Error;

use crate::models::Pos;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid board dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("Position ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },
    #[error("Too many mines: requested {requested}, at most {available} fit")]
    TooManyMines { requested: usize, available: usize },
    #[error("Minefield has already been seeded")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn out_of_bounds(pos: Pos) -> Self {
        Self::OutOfBounds {
            row: pos.row,
            col: pos.col,
        }
    }
}
