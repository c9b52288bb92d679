use std::{collections::HashMap, ops::RangeInclusive, sync::Arc, time::Instant};

use dashmap::DashMap;
use rocket::futures::{SinkExt, future::join_all, stream::SplitSink};
use rocket_ws::{Message, stream::DuplexStream};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use minesweeper_common::{
    Result,
    engine::{
        apply_event, create_empty_board, is_detonated, is_solved, is_stale, max_mines,
        reveal_cell, seed_minefield,
    },
    models::{Action, Board, Event, GameParams},
    protocol::ServerMessage,
};

pub type Rooms = Arc<DashMap<u16, Arc<Mutex<Room>>>>;

pub const ROOM_IDS: RangeInclusive<u16> = 1000..=9999;

const MAX_DIMENSION: usize = 100;

fn validate_params(params: &mut GameParams) {
    params.width = params.width.clamp(1, MAX_DIMENSION);
    params.height = params.height.clamp(1, MAX_DIMENSION);
    params.mines = params
        .mines
        .min((params.width * params.height).saturating_sub(9));
}

#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// First reveal: the minefield was laid and the opening cell revealed.
    Seeded,
    Applied,
    /// Stale or no-op. The sender's replica needs a fresh snapshot.
    Rejected,
    Finished,
}

/// Streams of a room a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    Everyone,
    Only(Uuid),
    AllBut(Uuid),
}

impl Recipients {
    pub fn includes(&self, stream: &Uuid) -> bool {
        match self {
            Self::Everyone => true,
            Self::Only(id) => id == stream,
            Self::AllBut(id) => id != stream,
        }
    }
}

/// A server message together with the streams that should receive it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: Recipients,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn cursor(peer: Uuid, x: f64, y: f64) -> Self {
        Self {
            to: Recipients::AllBut(peer),
            message: ServerMessage::Cursor { peer, x, y },
        }
    }

    pub fn departure(peer: Uuid) -> Self {
        Self {
            to: Recipients::Everyone,
            message: ServerMessage::CursorLeft { peer },
        }
    }
}

/// Canonical board of a room together with the parameters it was created from.
#[derive(Debug)]
pub struct Game {
    params: GameParams,
    board: Board,
}

impl Game {
    pub fn new(mut params: GameParams) -> Result<Self> {
        validate_params(&mut params);
        Ok(Self {
            board: create_empty_board(params.width, params.height)?,
            params,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn params(&self) -> GameParams {
        self.params
    }

    pub fn is_finished(&self) -> bool {
        is_solved(&self.board) || is_detonated(&self.board)
    }

    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::Snapshot {
            board: self.board.clone(),
            mines: self.params.mines,
        }
    }

    pub fn handle_event(&mut self, event: &Event, from: Uuid) -> EventOutcome {
        if self.is_finished() {
            return EventOutcome::Finished;
        }

        if !self.board.started && event.action == Action::Reveal {
            return self.start(event, from);
        }

        if !apply_event(event, &mut self.board) {
            return EventOutcome::Rejected;
        }

        self.board.origin = Some(from);
        if is_detonated(&self.board) {
            info!("Mine revealed by {} - game over", from);
        } else if is_solved(&self.board) {
            info!("Board solved, last move by {}", from);
        }
        EventOutcome::Applied
    }

    fn start(&mut self, event: &Event, from: Uuid) -> EventOutcome {
        let pos = event.target_cell.pos();
        if is_stale(event, &self.board) || event.target_cell.flagged {
            debug!("Ignoring opening reveal at ({}, {})", pos.row, pos.col);
            return EventOutcome::Rejected;
        }

        let mines = self.params.mines.min(max_mines(&self.board, pos));
        if let Err(e) = seed_minefield(&mut self.board, mines, pos) {
            warn!("Failed to seed minefield: {}", e);
            return EventOutcome::Rejected;
        }
        if let Err(e) = reveal_cell(&mut self.board, pos) {
            warn!("Failed to reveal opening cell: {}", e);
            return EventOutcome::Rejected;
        }

        self.board.origin = Some(from);
        info!(
            "Game started by {} at ({}, {}) with {} mines",
            from, pos.row, pos.col, mines
        );
        EventOutcome::Seeded
    }

    /// Applies `event` and decides who hears about it. Seeding and accepted
    /// events go to every stream, a rejected event resyncs only its sender.
    pub fn route_event(&mut self, event: Event, from: Uuid) -> Option<Delivery> {
        match self.handle_event(&event, from) {
            EventOutcome::Seeded => Some(Delivery {
                to: Recipients::Everyone,
                message: self.snapshot(),
            }),
            EventOutcome::Applied => {
                debug!("Broadcasting {:?} event from {}", event.action, from);
                Some(Delivery {
                    to: Recipients::Everyone,
                    message: ServerMessage::Event {
                        event,
                        origin: from,
                    },
                })
            }
            EventOutcome::Rejected => {
                debug!("Rejected {:?} event from {}, resyncing", event.action, from);
                Some(Delivery {
                    to: Recipients::Only(from),
                    message: self.snapshot(),
                })
            }
            EventOutcome::Finished => {
                debug!("Ignoring {:?} event on finished game", event.action);
                None
            }
        }
    }

    pub fn restart(&mut self, params: GameParams) -> Result<()> {
        *self = Self::new(params)?;
        Ok(())
    }
}

pub struct Room {
    id: u16,
    game: Game,
    streams: HashMap<Uuid, SplitSink<DuplexStream, Message>>,
    last_activity: Instant,
}

async fn send(stream: &mut SplitSink<DuplexStream, Message>, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = stream.send(Message::Text(text)).await;
    }
}

async fn deliver(
    streams: &mut HashMap<Uuid, SplitSink<DuplexStream, Message>>,
    delivery: &Delivery,
) {
    let futures: Vec<_> = streams
        .iter_mut()
        .filter(|(id, _)| delivery.to.includes(id))
        .map(|(_, stream)| send(stream, &delivery.message))
        .collect();

    join_all(futures).await;
}

impl Room {
    #[instrument(level = "trace")]
    pub fn new(id: u16, params: GameParams) -> Result<Self> {
        info!(
            "Creating room {}: {}x{} with {} mines",
            id, params.width, params.height, params.mines
        );
        Ok(Self {
            id,
            game: Game::new(params)?,
            streams: HashMap::new(),
            last_activity: Instant::now(),
        })
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    #[instrument(level = "trace", skip(self), fields(room = self.id))]
    pub async fn restart(&mut self, params: GameParams) {
        info!(
            "Restarting room with new parameters: {}x{} with {} mines",
            params.width, params.height, params.mines
        );
        if let Err(e) = self.game.restart(params) {
            warn!("Rejected restart parameters: {}", e);
            return;
        }
        self.last_activity = Instant::now();
        let delivery = Delivery {
            to: Recipients::Everyone,
            message: self.game.snapshot(),
        };
        deliver(&mut self.streams, &delivery).await;
        info!(
            "Room restarted and broadcasted to {} connections",
            self.streams.len()
        );
    }

    #[instrument(level = "trace", skip(self, stream), fields(room = self.id))]
    pub async fn add_stream(&mut self, mut stream: SplitSink<DuplexStream, Message>) -> Uuid {
        let id = Uuid::new_v4();
        debug!("Adding stream {} to room", id);
        let init = ServerMessage::Init {
            room: self.id,
            board: self.game.board.clone(),
            mines: self.game.params.mines,
        };
        send(&mut stream, &init).await;
        self.streams.insert(id, stream);
        self.last_activity = Instant::now();
        info!(
            "Stream {} added, total connections: {}",
            id,
            self.streams.len()
        );
        id
    }

    #[instrument(level = "trace", skip(self), fields(room = self.id))]
    pub async fn remove_stream(&mut self, id: &Uuid) {
        if self.streams.remove(id).is_some() {
            info!(
                "Stream {} removed, remaining connections: {}",
                id,
                self.streams.len()
            );
            deliver(&mut self.streams, &Delivery::departure(*id)).await;
        } else {
            warn!("Attempted to remove non-existent stream: {}", id);
        }
        self.last_activity = Instant::now()
    }

    pub fn has_active_connections(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn should_cleanup(&self, inactive_timeout_secs: u64, active_timeout_secs: u64) -> bool {
        let elapsed = Instant::now()
            .duration_since(self.last_activity)
            .as_secs();

        if self.has_active_connections() {
            elapsed > active_timeout_secs
        } else {
            elapsed > inactive_timeout_secs
        }
    }

    #[instrument(level = "trace", skip(self, event), fields(room = self.id, row = event.target_cell.row, col = event.target_cell.col))]
    pub async fn handle_event(&mut self, event: Event, from: Uuid) {
        self.last_activity = Instant::now();

        if let Some(delivery) = self.game.route_event(event, from) {
            deliver(&mut self.streams, &delivery).await;
        }
    }

    pub async fn move_cursor(&mut self, from: Uuid, x: f64, y: f64) {
        deliver(&mut self.streams, &Delivery::cursor(from, x, y)).await;
    }
}
