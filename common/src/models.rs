use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cell value marking a mine.
pub const MINE: i8 = -1;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub value: i8,
    pub hidden: bool,
    pub flagged: bool,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            value: 0,
            hidden: true,
            flagged: false,
        }
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.row, self.col)
    }

    pub fn is_mine(&self) -> bool {
        self.value == MINE
    }
}

/// Row-major grid of cells.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Board {
    pub width: usize,
    pub height: usize,
    pub started: bool,
    /// Last party that wrote to this board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
    pub cells: Vec<Cell>,
}

impl Board {
    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.height && pos.col < self.width
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        self.contains(pos).then(|| pos.row * self.width + pos.col)
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        self.index(pos).and_then(|index| self.cells.get(index))
    }

    pub fn cell_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        self.index(pos).and_then(|index| self.cells.get_mut(index))
    }

    /// In-bounds 8-neighbourhood of `pos`, not including `pos` itself.
    pub fn neighbors(&self, pos: Pos) -> impl Iterator<Item = Pos> + use<> {
        let (width, height) = (self.width, self.height);
        let rows = pos.row.saturating_sub(1)..=(pos.row + 1).min(height.saturating_sub(1));

        rows.flat_map(move |row| {
            let cols = pos.col.saturating_sub(1)..=(pos.col + 1).min(width.saturating_sub(1));
            cols.map(move |col| Pos::new(row, col))
        })
        .filter(move |&other| other != pos)
    }

    pub fn mine_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_mine()).count()
    }

    pub fn flag_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.flagged).count()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Reveal,
    Flag,
}

/// A player action captured against the cell as the player saw it.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Event {
    #[serde(rename = "targetCell")]
    pub target_cell: Cell,
    pub action: Action,
}

impl Event {
    pub fn reveal(cell: &Cell) -> Self {
        Self {
            target_cell: cell.clone(),
            action: Action::Reveal,
        }
    }

    pub fn flag(cell: &Cell) -> Self {
        Self {
            target_cell: cell.clone(),
            action: Action::Flag,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameParams {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            width: 30,
            height: 16,
            mines: 99,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateResponse {
    pub id: u16,
}
