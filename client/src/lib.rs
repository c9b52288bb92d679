//! Minesweeper Client Library
//!
//! Rust client for the multiplayer minesweeper room server. Rooms are shared:
//! every player in a room sees the same board, and actions are exchanged as
//! events that each replica applies through the shared board engine.
//!
//! ## Usage
//!
//! ### High-Level Interface (Recommended)
//!
//! `MinesweeperGame` keeps a local replica of the room's board and applies
//! your own actions to it immediately:
//!
//! ```rust,no_run
//! use minesweeper_client::{MinesweeperGame, GameParams, Pos};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let game = MinesweeperGame::new("http://localhost:8000")?;
//!
//!     let params = GameParams { width: 9, height: 9, mines: 10 };
//!     let room = game.start_game(params).await?;
//!     println!("Share room {} with your friends", room);
//!
//!     game.reveal(Pos::new(4, 4)).await?;
//!     game.flag(Pos::new(0, 0)).await?;
//!
//!     if let Some(state) = game.get_state().await {
//!         println!("Mines left: {}, won: {}", state.remaining_mines(), state.is_won());
//!     }
//!
//!     game.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Low-Level Interface
//!
//! ```rust,no_run
//! use minesweeper_client::{ClientMessage, Event, MinesweeperClient, MinesweeperWebSocket, ServerMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = MinesweeperClient::new("http://localhost:8000")?;
//!     let room = client.random_room_id().await?;
//!
//!     let mut ws = MinesweeperWebSocket::connect(&client.websocket_url(room)?).await?;
//!
//!     if let Some(ServerMessage::Init { board, .. }) = ws.receive_message().await? {
//!         let corner = &board.cells[0];
//!         ws.send_message(ClientMessage::Event { event: Event::reveal(corner) }).await?;
//!     }
//!
//!     ws.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod game;
mod websocket;

pub use client::MinesweeperClient;
pub use game::{GameEvent, GameState, MinesweeperGame};
pub use websocket::MinesweeperWebSocket;

// Re-export common types for convenience
pub use minesweeper_common::{engine, models::*, protocol::*};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
