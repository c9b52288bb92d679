use std::collections::HashMap;
use std::sync::Arc;

use minesweeper_common::{
    engine::{apply_event, count_remaining_mines, is_detonated, is_solved},
    models::{Action, Board, Cell, Event, GameParams, Pos},
    protocol::{ClientMessage, ServerMessage},
};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{MinesweeperClient, MinesweeperWebSocket, Result};

/// Events emitted by the minesweeper game
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The game board was updated with new cell states
    BoardUpdated {
        /// List of cell positions that changed
        changed_positions: Vec<Pos>,
    },
    /// Game status changed (won/lost)
    GameStatusChanged { won: bool, lost: bool },
    /// Game was joined or restarted
    GameInitialized {
        room: u16,
        width: usize,
        height: usize,
        mines: usize,
    },
    /// Another player's pointer moved
    CursorMoved { peer: Uuid, x: f64, y: f64 },
    /// Another player left the room
    CursorLeft { peer: Uuid },
    /// Connection was lost
    ConnectionLost,
}

/// Local replica of a room's board
#[derive(Debug, Clone)]
pub struct GameState {
    pub room: u16,
    pub mines: usize,
    pub board: Board,
    pub cursors: HashMap<Uuid, (f64, f64)>,
}

impl GameState {
    /// Create a new game state
    pub fn new(room: u16, mines: usize, board: Board) -> Self {
        Self {
            room,
            mines,
            board,
            cursors: HashMap::new(),
        }
    }

    /// Get the cell at the specified position
    pub fn get_cell(&self, pos: Pos) -> Option<&Cell> {
        self.board.cell(pos)
    }

    /// Mine counter as shown to the player. Negative when over-flagged.
    pub fn remaining_mines(&self) -> i64 {
        if self.board.started {
            count_remaining_mines(&self.board)
        } else {
            self.mines as i64 - self.board.flag_count() as i64
        }
    }

    /// Check if the player has won
    pub fn is_won(&self) -> bool {
        is_solved(&self.board)
    }

    /// Check if a mine has been revealed
    pub fn is_lost(&self) -> bool {
        is_detonated(&self.board)
    }

    /// Check if the game is in a completed state (won or lost)
    pub fn is_game_over(&self) -> bool {
        self.is_won() || self.is_lost()
    }

    fn status(&self) -> (bool, bool) {
        (self.is_won(), self.is_lost())
    }
}

/// Positions whose cell differs between two boards. Every position of `after`
/// counts as changed when the dimensions differ.
fn changed_positions(before: &Board, after: &Board) -> Vec<Pos> {
    if before.width != after.width || before.height != after.height {
        return after.cells.iter().map(Cell::pos).collect();
    }

    before
        .cells
        .iter()
        .zip(after.cells.iter())
        .filter(|(old, new)| old != new)
        .map(|(_, new)| new.pos())
        .collect()
}

/// Runs `update` against the board and reports what changed.
fn update_board(state: &mut GameState, update: impl FnOnce(&mut GameState)) -> Vec<GameEvent> {
    let before = state.board.clone();
    let old_status = state.status();

    update(state);

    let mut events = Vec::new();
    let changed_positions = changed_positions(&before, &state.board);
    if !changed_positions.is_empty() {
        events.push(GameEvent::BoardUpdated { changed_positions });
    }

    let (won, lost) = state.status();
    if (won, lost) != old_status {
        events.push(GameEvent::GameStatusChanged { won, lost });
    }
    events
}

/// Applies a server message to the local replica.
pub(crate) fn process_message(
    state: &mut Option<GameState>,
    message: ServerMessage,
) -> Vec<GameEvent> {
    match message {
        ServerMessage::Init { room, board, mines } => {
            info!(
                "Joined room {}: {}x{} with {} mines",
                room, board.width, board.height, mines
            );
            let event = GameEvent::GameInitialized {
                room,
                width: board.width,
                height: board.height,
                mines,
            };
            *state = Some(GameState::new(room, mines, board));
            vec![event]
        }
        ServerMessage::Snapshot { board, mines } => {
            let Some(game_state) = state.as_mut() else {
                warn!("Received snapshot before joining a room");
                return Vec::new();
            };

            debug!("Received board snapshot (started: {})", board.started);
            // An unstarted snapshot of the same unstarted game is a resync of
            // a rejected action, not a new game.
            let current = &game_state.board;
            let new_game = current.started
                || current.width != board.width
                || current.height != board.height
                || game_state.mines != mines;
            if !board.started && new_game {
                let event = GameEvent::GameInitialized {
                    room: game_state.room,
                    width: board.width,
                    height: board.height,
                    mines,
                };
                game_state.mines = mines;
                game_state.board = board;
                return vec![event];
            }

            update_board(game_state, |game_state| {
                game_state.mines = mines;
                game_state.board = board;
            })
        }
        ServerMessage::Event { event, origin } => {
            let Some(game_state) = state.as_mut() else {
                return Vec::new();
            };

            debug!(
                "Applying {:?} from {} at ({}, {})",
                event.action, origin, event.target_cell.row, event.target_cell.col
            );
            update_board(game_state, |game_state| {
                if !apply_event(&event, &mut game_state.board) {
                    debug!("Event from {} already applied or stale", origin);
                }
            })
        }
        ServerMessage::Cursor { peer, x, y } => match state.as_mut() {
            Some(game_state) => {
                game_state.cursors.insert(peer, (x, y));
                vec![GameEvent::CursorMoved { peer, x, y }]
            }
            None => Vec::new(),
        },
        ServerMessage::CursorLeft { peer } => match state.as_mut() {
            Some(game_state) => {
                game_state.cursors.remove(&peer);
                vec![GameEvent::CursorLeft { peer }]
            }
            None => Vec::new(),
        },
    }
}

/// Connection state - all fields are required when connected
struct ConnectionState {
    websocket_sender: mpsc::UnboundedSender<ClientMessage>,
    room: u16,
    background_task: JoinHandle<()>,
}

impl ConnectionState {
    /// Send a message through the WebSocket connection
    fn send_message(&self, message: ClientMessage) -> Result<()> {
        self.websocket_sender
            .send(message)
            .map_err(|_| "WebSocket sender closed")?;
        Ok(())
    }

    /// Abort the background task and wait for it to finish
    async fn abort_and_wait_background_task(self) {
        self.background_task.abort();
        let _ = self.background_task.await;
    }
}

type EventSender = Arc<RwLock<Option<mpsc::UnboundedSender<GameEvent>>>>;

async fn emit(event_sender: &EventSender, events: Vec<GameEvent>) {
    if let Some(ref sender) = *event_sender.read().await {
        for event in events {
            let _ = sender.send(event);
        }
    }
}

/// High-level minesweeper game client that keeps a local replica of the room's board
pub struct MinesweeperGame {
    client: MinesweeperClient,
    connection_state: Arc<RwLock<Option<ConnectionState>>>,
    event_sender: EventSender,
    state: Arc<RwLock<Option<GameState>>>,
}

impl MinesweeperGame {
    /// Create a new game instance
    pub fn new(server_url: &str) -> Result<Self> {
        let client = MinesweeperClient::new(server_url)?;
        Ok(Self {
            client,
            connection_state: Arc::new(RwLock::new(None)),
            event_sender: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(None)),
        })
    }

    /// Subscribe to game events. Returns a receiver for game events.
    pub async fn subscribe_to_events(&self) -> mpsc::UnboundedReceiver<GameEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut event_sender = self.event_sender.write().await;
        *event_sender = Some(sender);
        receiver
    }

    /// Create a fresh room with the specified parameters and join it
    pub async fn start_game(&self, params: GameParams) -> Result<u16> {
        info!(
            "Starting new game: {}x{} with {} mines",
            params.width, params.height, params.mines
        );

        let room = self.client.create_room(params).await?;
        info!("Created room {}", room);

        self.join_room(room).await?;
        Ok(room)
    }

    /// Join a room by id, creating it server-side if nobody uses it yet
    pub async fn join_room(&self, room: u16) -> Result<()> {
        info!("Joining room {}", room);

        let mut conn_state = self.connection_state.write().await;

        if let Some(existing_conn) = conn_state.take() {
            existing_conn.abort_and_wait_background_task().await;
        }
        self.state.write().await.take();

        let ws_url = self.client.websocket_url(room)?;
        let websocket = MinesweeperWebSocket::connect(&ws_url).await?;
        let websocket_sender = websocket.get_sender();

        info!("Connected to room {}", room);

        let background_task = self.start_background_listener(websocket);

        *conn_state = Some(ConnectionState {
            websocket_sender,
            room,
            background_task,
        });

        Ok(())
    }

    /// Send a message to the connected room
    async fn send_client_message(&self, message: ClientMessage) -> Result<()> {
        let conn_state = self.connection_state.read().await;

        match *conn_state {
            Some(ref conn) => conn.send_message(message),
            None => Err("Not connected to a room. Call start_game() or join_room() first.".into()),
        }
    }

    /// Captures the target cell as currently seen, applies the action locally
    /// and forwards it to the room.
    async fn act(&self, pos: Pos, action: Action) -> Result<()> {
        let (event, updates) = {
            let mut state_guard = self.state.write().await;
            let game_state = state_guard
                .as_mut()
                .ok_or("No board received yet. Join a room first.")?;

            if game_state.is_game_over() {
                debug!("Ignoring {:?} at ({}, {}) on finished game", action, pos.row, pos.col);
                return Ok(());
            }

            let cell = game_state
                .get_cell(pos)
                .ok_or("Position is outside the board")?;
            let event = Event {
                target_cell: cell.clone(),
                action,
            };

            let updates = update_board(game_state, |game_state| {
                apply_event(&event, &mut game_state.board);
            });
            (event, updates)
        };

        emit(&self.event_sender, updates).await;
        self.send_client_message(ClientMessage::Event { event }).await
    }

    /// Reveal a cell at the specified position
    pub async fn reveal(&self, pos: Pos) -> Result<()> {
        debug!("Revealing cell at ({}, {})", pos.row, pos.col);
        self.act(pos, Action::Reveal).await
    }

    /// Flag/unflag a cell at the specified position
    pub async fn flag(&self, pos: Pos) -> Result<()> {
        debug!("Flagging cell at ({}, {})", pos.row, pos.col);
        self.act(pos, Action::Flag).await
    }

    /// Restart the room with new parameters
    pub async fn restart(&self, params: GameParams) -> Result<()> {
        info!(
            "Restarting game with new parameters: {}x{} with {} mines",
            params.width, params.height, params.mines
        );

        self.send_client_message(ClientMessage::Restart { params })
            .await
    }

    /// Share this player's pointer position with the room
    pub async fn move_cursor(&self, x: f64, y: f64) -> Result<()> {
        self.send_client_message(ClientMessage::Cursor { x, y })
            .await
    }

    /// Get the current game state
    pub async fn get_state(&self) -> Option<GameState> {
        self.state.read().await.clone()
    }

    /// Get the id of the joined room
    pub async fn get_room(&self) -> Option<u16> {
        let conn_state = self.connection_state.read().await;
        conn_state.as_ref().map(|conn| conn.room)
    }

    /// Check if we're connected to a room
    pub async fn is_connected(&self) -> bool {
        let conn_state = self.connection_state.read().await;
        conn_state.is_some()
    }

    /// Close the connection and clean up
    pub async fn disconnect(&self) -> Result<()> {
        let mut conn_state = self.connection_state.write().await;

        if let Some(conn) = conn_state.take() {
            conn.abort_and_wait_background_task().await;
        }

        *self.event_sender.write().await = None;
        *self.state.write().await = None;

        info!("Disconnected from room");
        Ok(())
    }

    /// Start background WebSocket message listener
    fn start_background_listener(&self, mut websocket: MinesweeperWebSocket) -> JoinHandle<()> {
        let state = self.state.clone();
        let event_sender = self.event_sender.clone();

        tokio::spawn(async move {
            Self::background_message_handler(&mut websocket, state, event_sender).await;
        })
    }

    /// Background task that handles incoming WebSocket messages
    async fn background_message_handler(
        websocket: &mut MinesweeperWebSocket,
        state: Arc<RwLock<Option<GameState>>>,
        event_sender: EventSender,
    ) {
        loop {
            let message = match websocket.receive_message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    emit(&event_sender, vec![GameEvent::ConnectionLost]).await;
                    break;
                }
                Err(e) => {
                    warn!("Error receiving WebSocket message: {}", e);
                    emit(&event_sender, vec![GameEvent::ConnectionLost]).await;
                    break;
                }
            };

            let events = {
                let mut state_guard = state.write().await;
                process_message(&mut state_guard, message)
            };
            emit(&event_sender, events).await;
        }
    }
}
