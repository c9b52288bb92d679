//! Property tests for the board engine over randomly seeded boards.

use std::collections::{HashSet, VecDeque};

use minesweeper_common::{
    engine::{
        count_remaining_mines, create_empty_board, is_detonated, is_solved, max_mines,
        reveal_cell, seed_minefield_with, toggle_flag,
    },
    models::{Board, Pos},
};
use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

fn seeded_board(seed: u64, width: usize, height: usize, density: f64, first: Pos) -> (Board, usize) {
    let mut board = create_empty_board(width, height).unwrap();
    let mines = (max_mines(&board, first) as f64 * density) as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    seed_minefield_with(&mut board, mines, first, &mut rng).unwrap();
    (board, mines)
}

fn expected_region(board: &Board, start: Pos) -> HashSet<Pos> {
    let mut region = HashSet::from([start]);
    if board.cell(start).unwrap().value != 0 {
        return region;
    }

    let mut queue = VecDeque::from([start]);
    while let Some(pos) = queue.pop_front() {
        for other in board.neighbors(pos) {
            if region.insert(other) && board.cell(other).unwrap().value == 0 {
                queue.push_back(other);
            }
        }
    }
    region
}

fn board_params() -> impl Strategy<Value = (u64, usize, usize, f64, usize, usize)> {
    (any::<u64>(), 3usize..24, 3usize..24, 0.0f64..0.9).prop_flat_map(
        |(seed, width, height, density)| {
            (
                Just(seed),
                Just(width),
                Just(height),
                Just(density),
                0..height,
                0..width,
            )
        },
    )
}

proptest! {
    #[test]
    fn seeded_board_has_exact_mines_outside_opening(
        (seed, width, height, density, row, col) in board_params()
    ) {
        let first = Pos::new(row, col);
        let (board, mines) = seeded_board(seed, width, height, density, first);

        prop_assert!(board.started);
        prop_assert_eq!(board.mine_count(), mines);
        prop_assert!(!board.cell(first).unwrap().is_mine());
        for pos in board.neighbors(first) {
            prop_assert!(!board.cell(pos).unwrap().is_mine());
        }
    }

    #[test]
    fn numbers_match_neighbouring_mines(
        (seed, width, height, density, row, col) in board_params()
    ) {
        let (board, _) = seeded_board(seed, width, height, density, Pos::new(row, col));

        for cell in board.cells.iter().filter(|cell| !cell.is_mine()) {
            let adjacent = board
                .neighbors(cell.pos())
                .filter(|&pos| board.cell(pos).unwrap().is_mine())
                .count();
            prop_assert_eq!(cell.value as usize, adjacent);
        }
    }

    #[test]
    fn opening_reveal_uncovers_exactly_its_region(
        (seed, width, height, density, row, col) in board_params()
    ) {
        let first = Pos::new(row, col);
        let (mut board, _) = seeded_board(seed, width, height, density, first);
        let expected = expected_region(&board, first);

        let revealed = reveal_cell(&mut board, first).unwrap();

        let actual: HashSet<Pos> = board
            .cells
            .iter()
            .filter(|cell| !cell.hidden)
            .map(|cell| cell.pos())
            .collect();
        prop_assert_eq!(revealed, expected.len());
        prop_assert_eq!(actual, expected);
        prop_assert!(!is_detonated(&board));
    }

    #[test]
    fn reveal_twice_changes_nothing(
        (seed, width, height, density, row, col) in board_params()
    ) {
        let first = Pos::new(row, col);
        let (mut board, _) = seeded_board(seed, width, height, density, first);
        reveal_cell(&mut board, first).unwrap();
        let once = board.clone();

        prop_assert_eq!(reveal_cell(&mut board, first).unwrap(), 0);
        prop_assert_eq!(board, once);
    }

    #[test]
    fn clearing_every_safe_cell_and_flagging_mines_solves_board(
        (seed, width, height, density, row, col) in board_params()
    ) {
        let (mut board, _) = seeded_board(seed, width, height, density, Pos::new(row, col));
        let positions: Vec<(Pos, bool)> = board
            .cells
            .iter()
            .map(|cell| (cell.pos(), cell.is_mine()))
            .collect();

        for (pos, mine) in positions {
            if mine {
                toggle_flag(&mut board, pos).unwrap();
            } else {
                reveal_cell(&mut board, pos).unwrap();
            }
        }

        prop_assert!(is_solved(&board));
        prop_assert_eq!(count_remaining_mines(&board), 0);
    }
}
