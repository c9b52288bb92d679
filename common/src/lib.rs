//! Shared pieces of the multiplayer minesweeper workspace: the board engine,
//! the board data model and the wire protocol spoken between server and
//! clients.

pub mod engine;
pub mod error;
pub mod models;
pub mod protocol;

pub use error::{EngineError, Result};
