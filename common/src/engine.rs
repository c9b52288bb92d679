//! Board engine: every rule of the game lives here.
//!
//! All functions are synchronous and only mutate the board they are handed.
//! The server keeps the canonical board and every client keeps a replica;
//! both drive their copy through these functions so the replicas stay in step.

use rand::Rng;
use tracing::{debug, trace};

use crate::{
    error::{EngineError, Result},
    models::{Action, Board, Cell, Event, MINE, Pos},
};

/// Builds a board with every cell hidden, unflagged and valued `0`.
pub fn create_empty_board(width: usize, height: usize) -> Result<Board> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidDimensions { width, height });
    }

    let cells = (0..height)
        .flat_map(|row| (0..width).map(move |col| Cell::new(row, col)))
        .collect();

    Ok(Board {
        width,
        height,
        started: false,
        origin: None,
        cells,
    })
}

/// Largest mine count that can be seeded when the first reveal is at `first`.
///
/// The 3x3 box around `first` is kept clear, clipped at the board edges.
pub fn max_mines(board: &Board, first: Pos) -> usize {
    let exclusion_zone = board.neighbors(first).count() + 1;
    board.cells.len().saturating_sub(exclusion_zone)
}

/// Places `mines` mines uniformly at random outside the 3x3 box around `first`,
/// numbers the board and marks it started.
pub fn seed_minefield(board: &mut Board, mines: usize, first: Pos) -> Result<&mut Board> {
    seed_minefield_with(board, mines, first, &mut rand::rng())
}

/// [`seed_minefield`] with a caller supplied random source.
pub fn seed_minefield_with<'a, R: Rng>(
    board: &'a mut Board,
    mines: usize,
    first: Pos,
    rng: &mut R,
) -> Result<&'a mut Board> {
    check_seedable(board)?;
    if !board.contains(first) {
        return Err(EngineError::out_of_bounds(first));
    }

    let available = max_mines(board, first);
    if mines > available {
        return Err(EngineError::TooManyMines {
            requested: mines,
            available,
        });
    }

    let mut placed = 0;
    while placed < mines {
        let pos = Pos::new(
            rng.random_range(0..board.height),
            rng.random_range(0..board.width),
        );
        if is_near(pos, first) {
            continue;
        }

        if let Some(cell) = board.cell_mut(pos)
            && !cell.is_mine()
        {
            cell.value = MINE;
            placed += 1;
        }
    }

    number_board(board);
    board.started = true;
    debug!(
        "Seeded {}x{} board with {} mines around first reveal ({}, {})",
        board.width, board.height, mines, first.row, first.col
    );

    Ok(board)
}

/// Seeds the board from a fixed mine layout instead of sampling one.
pub fn place_mines<'a>(board: &'a mut Board, positions: &[Pos]) -> Result<&'a mut Board> {
    check_seedable(board)?;
    if let Some(&pos) = positions.iter().find(|&&pos| !board.contains(pos)) {
        return Err(EngineError::out_of_bounds(pos));
    }

    for &pos in positions {
        if let Some(cell) = board.cell_mut(pos) {
            cell.value = MINE;
        }
    }

    number_board(board);
    board.started = true;
    debug!("Placed {} fixed mines", board.mine_count());

    Ok(board)
}

fn check_seedable(board: &Board) -> Result<()> {
    if board.width == 0 || board.height == 0 || board.cells.len() != board.width * board.height {
        return Err(EngineError::InvalidDimensions {
            width: board.width,
            height: board.height,
        });
    }
    if board.started {
        return Err(EngineError::AlreadyStarted);
    }
    Ok(())
}

fn is_near(pos: Pos, center: Pos) -> bool {
    pos.row.abs_diff(center.row) <= 1 && pos.col.abs_diff(center.col) <= 1
}

fn number_board(board: &mut Board) {
    for index in 0..board.cells.len() {
        if board.cells[index].is_mine() {
            continue;
        }

        let pos = Pos::new(index / board.width, index % board.width);
        let adjacent = board
            .neighbors(pos)
            .filter(|&other| board.cell(other).is_some_and(Cell::is_mine))
            .count();
        board.cells[index].value = adjacent as i8;
    }
}

/// Reveals `pos` and, if it is blank, the whole connected blank region plus
/// its numbered rim. Returns how many cells were newly revealed.
///
/// Revealing a mine is not treated as a loss here; callers check
/// [`is_detonated`] or call [`reveal_all_unflagged`] themselves.
pub fn reveal_cell(board: &mut Board, pos: Pos) -> Result<usize> {
    if !board.contains(pos) {
        return Err(EngineError::out_of_bounds(pos));
    }

    let mut revealed = 0;
    let mut pending = vec![pos];

    while let Some(pos) = pending.pop() {
        let Some(cell) = board.cell_mut(pos) else {
            continue;
        };
        if !cell.hidden {
            continue;
        }

        cell.hidden = false;
        revealed += 1;

        if cell.value == 0 {
            pending.extend(
                board
                    .neighbors(pos)
                    .filter(|&other| board.cell(other).is_some_and(|cell| cell.hidden)),
            );
        }
    }

    trace!("Revealed {} cells from ({}, {})", revealed, pos.row, pos.col);
    Ok(revealed)
}

/// Reveals every hidden cell that is not flagged. Used to show the board on a loss.
pub fn reveal_all_unflagged(board: &mut Board) -> usize {
    let mut revealed = 0;
    for cell in board.cells.iter_mut() {
        if cell.hidden && !cell.flagged {
            cell.hidden = false;
            revealed += 1;
        }
    }
    revealed
}

/// Flips the flag on a hidden cell. Returns `false` for revealed cells.
pub fn toggle_flag(board: &mut Board, pos: Pos) -> Result<bool> {
    let cell = board
        .cell_mut(pos)
        .ok_or_else(|| EngineError::out_of_bounds(pos))?;

    if !cell.hidden {
        return Ok(false);
    }

    cell.flagged = !cell.flagged;
    Ok(true)
}

/// Mines minus flags. Goes negative when the player over-flags.
pub fn count_remaining_mines(board: &Board) -> i64 {
    board.mine_count() as i64 - board.flag_count() as i64
}

/// Every hidden cell is a flagged mine and no mine has been revealed.
pub fn is_solved(board: &Board) -> bool {
    board.cells.iter().all(|cell| {
        if cell.hidden {
            cell.is_mine() && cell.flagged
        } else {
            !cell.is_mine()
        }
    })
}

/// A mine has been revealed.
pub fn is_detonated(board: &Board) -> bool {
    board
        .cells
        .iter()
        .any(|cell| !cell.hidden && cell.is_mine())
}

/// The board has moved on since the event's snapshot was taken, or the target
/// cell does not exist.
pub fn is_stale(event: &Event, board: &Board) -> bool {
    let target = &event.target_cell;
    match board.cell(target.pos()) {
        Some(live) => live.hidden != target.hidden || live.flagged != target.flagged,
        None => true,
    }
}

/// Applies an event captured against a snapshot of its target cell.
///
/// The event is dropped when the live cell no longer has the snapshot's
/// `hidden`/`flagged` state. Reveals are ignored until the board is started;
/// seeding on the first reveal is up to the caller. Returns whether the board
/// changed.
pub fn apply_event(event: &Event, board: &mut Board) -> bool {
    let pos = event.target_cell.pos();

    if is_stale(event, board) {
        debug!(
            "Dropping stale {:?} event for cell ({}, {})",
            event.action, pos.row, pos.col
        );
        return false;
    }
    let Some(live) = board.cell(pos) else {
        return false;
    };

    match event.action {
        Action::Reveal => {
            if !live.hidden || live.flagged || !board.started {
                return false;
            }

            if live.is_mine() {
                reveal_all_unflagged(board);
            } else if let Err(e) = reveal_cell(board, pos) {
                debug!("Reveal failed: {}", e);
                return false;
            }
            true
        }
        Action::Flag => toggle_flag(board, pos).unwrap_or(false),
    }
}
