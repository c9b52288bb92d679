use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Board, Event, GameParams};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "event")]
    Event { event: Event },
    #[serde(rename = "restart")]
    Restart { params: GameParams },
    #[serde(rename = "cursor")]
    Cursor { x: f64, y: f64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once to a stream that joined a room.
    #[serde(rename = "init")]
    Init { room: u16, board: Board, mines: usize },
    /// Replaces the receiver's board wholesale.
    #[serde(rename = "snapshot")]
    Snapshot { board: Board, mines: usize },
    /// An event the room accepted, to be applied to every replica.
    #[serde(rename = "event")]
    Event { event: Event, origin: Uuid },
    #[serde(rename = "cursor")]
    Cursor { peer: Uuid, x: f64, y: f64 },
    #[serde(rename = "cursor_left")]
    CursorLeft { peer: Uuid },
}
