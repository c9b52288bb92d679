use std::{net::IpAddr, sync::Arc};

use dashmap::Entry;
use rand::Rng;
use rocket::{State, futures::StreamExt, get, http::Status, post, serde::json::Json};
use rocket_ws::{Channel, Message, WebSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use minesweeper_common::{
    models::{CreateResponse, GameParams},
    protocol::ClientMessage,
};

use crate::{
    logic::{ROOM_IDS, Room, Rooms},
    quota::{ClientIp, RoomQuota},
};

const MAX_RANDOM_ATTEMPTS: usize = 50;

/// Parses a room id from the query string. Anything that is not a number in
/// `ROOM_IDS` is a bad request.
pub fn validate_room_id(raw: &str) -> Result<u16, Status> {
    match raw.trim().parse::<u16>() {
        Ok(id) if ROOM_IDS.contains(&id) => Ok(id),
        _ => {
            warn!("Rejected room id outside {:?}: {:?}", ROOM_IDS, raw);
            Err(Status::BadRequest)
        }
    }
}

/// Picks an id no room currently uses. Falls back to a scan once random
/// probing keeps colliding.
fn free_room_id(rooms: &Rooms) -> Option<u16> {
    let mut rng = rand::rng();

    for _ in 0..MAX_RANDOM_ATTEMPTS {
        let id = rng.random_range(ROOM_IDS);
        if !rooms.contains_key(&id) {
            return Some(id);
        }
        debug!("Room ID collision, trying another: {}", id);
    }

    warn!(
        "Exhausted {} random room ID attempts, scanning",
        MAX_RANDOM_ATTEMPTS
    );
    ROOM_IDS.into_iter().find(|id| !rooms.contains_key(id))
}

#[instrument(level = "trace", skip(rooms, params))]
fn add_room(rooms: &Rooms, params: GameParams) -> Result<u16, Status> {
    loop {
        let Some(id) = free_room_id(rooms) else {
            error!("All room IDs are in use");
            return Err(Status::ServiceUnavailable);
        };

        match rooms.entry(id) {
            Entry::Occupied(_) => {
                debug!("Room {} was taken concurrently, retrying", id);
                continue;
            }
            Entry::Vacant(entry) => {
                let room = Room::new(id, params).map_err(|e| {
                    warn!("Invalid room parameters: {}", e);
                    Status::BadRequest
                })?;
                entry.insert(Arc::new(Mutex::new(room)));
                info!("Created new room with ID: {}", id);
                return Ok(id);
            }
        }
    }
}

/// Joining an unused id creates the room, which counts against `client`'s
/// room quota just like `POST /create`.
fn fetch_or_create_room(
    rooms: &Rooms,
    id: u16,
    quota: &RoomQuota,
    client: IpAddr,
) -> Result<Arc<Mutex<Room>>, Status> {
    match rooms.entry(id) {
        Entry::Occupied(entry) => Ok(entry.get().clone()),
        Entry::Vacant(entry) => {
            quota.charge(client)?;
            let room = Room::new(id, GameParams::default()).map_err(|e| {
                error!("Failed to create room {}: {}", id, e);
                Status::InternalServerError
            })?;
            info!("Created room {} on first join", id);
            Ok(entry.insert(Arc::new(Mutex::new(room))).value().clone())
        }
    }
}

#[post("/create", data = "<params>")]
#[instrument(level = "trace", skip(rooms, quota), fields(client_ip = %client_ip.0, width = params.width, height = params.height, mines = params.mines))]
pub fn create_room(
    params: Json<GameParams>,
    rooms: &State<Rooms>,
    quota: &State<RoomQuota>,
    client_ip: ClientIp,
) -> Result<Json<CreateResponse>, Status> {
    info!(
        "Room creation request from {}: {}x{} with {} mines",
        client_ip.0, params.width, params.height, params.mines
    );

    quota.charge(client_ip.0)?;

    let id = add_room(rooms, params.0)?;

    info!("Successfully created room {} for client {}", id, client_ip.0);
    Ok(Json(CreateResponse { id }))
}

#[get("/random-id")]
pub fn random_room_id(rooms: &State<Rooms>) -> Result<Json<CreateResponse>, Status> {
    match free_room_id(rooms) {
        Some(id) => {
            debug!("Handing out free room id {}", id);
            Ok(Json(CreateResponse { id }))
        }
        None => Err(Status::ServiceUnavailable),
    }
}

#[get("/ws?<id>")]
#[instrument(level = "trace", skip(ws, rooms, quota, client_ip), fields(room_id = id))]
pub fn websocket_handler(
    ws: WebSocket,
    rooms: &State<Rooms>,
    quota: &State<RoomQuota>,
    client_ip: ClientIp,
    id: &str,
) -> Result<Channel<'static>, Status> {
    let room_id = validate_room_id(id)?;
    let room = fetch_or_create_room(rooms, room_id, quota, client_ip.0)?;
    info!("WebSocket connection established for room: {}", room_id);

    Ok(ws.channel(move |stream| {
        Box::pin(async move {
            let (write, mut read) = stream.split();

            let stream_id = {
                let mut room = room.lock().await;
                room.add_stream(write).await
            };

            info!(
                "Client connected to room {} (stream: {})",
                room_id, stream_id
            );

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => match message {
                            ClientMessage::Event { event } => {
                                debug!(
                                    "Player {} sent {:?} for ({}, {}) in room {}",
                                    stream_id,
                                    event.action,
                                    event.target_cell.row,
                                    event.target_cell.col,
                                    room_id
                                );
                                let mut room = room.lock().await;
                                room.handle_event(event, stream_id).await;
                            }
                            ClientMessage::Restart { params } => {
                                info!(
                                    "Player restarting room {}: {}x{} with {} mines",
                                    room_id, params.width, params.height, params.mines
                                );
                                let mut room = room.lock().await;
                                room.restart(params).await;
                            }
                            ClientMessage::Cursor { x, y } => {
                                let mut room = room.lock().await;
                                room.move_cursor(stream_id, x, y).await;
                            }
                        },
                        Err(e) => {
                            warn!(
                                "Invalid message format in room {}: {} - Error: {}",
                                room_id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(
                            "WebSocket connection closed for room {} (stream: {})",
                            room_id, stream_id
                        );
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {
                        continue;
                    }
                    Err(e) => {
                        error!(
                            "WebSocket error in room {} (stream: {}): {}",
                            room_id, stream_id, e
                        );
                        break;
                    }
                    _ => {
                        debug!("Received non-text message in room {}, ignoring", room_id);
                    }
                }
            }

            {
                let mut room = room.lock().await;
                room.remove_stream(&stream_id).await;
            }

            info!(
                "Client disconnected from room {} (stream: {})",
                room_id, stream_id
            );
            Ok(())
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::net::Ipv4Addr;

    const PLAYER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    #[test]
    fn room_ids_are_four_digit() {
        assert_eq!(validate_room_id("1000"), Ok(1000));
        assert_eq!(validate_room_id("9999"), Ok(9999));
        assert_eq!(validate_room_id("999"), Err(Status::BadRequest));
        assert_eq!(validate_room_id("10000"), Err(Status::BadRequest));
    }

    #[test]
    fn ids_beyond_u16_or_not_numeric_are_bad_requests() {
        assert_eq!(validate_room_id("70000"), Err(Status::BadRequest));
        assert_eq!(validate_room_id("-5"), Err(Status::BadRequest));
        assert_eq!(validate_room_id("abcd"), Err(Status::BadRequest));
        assert_eq!(validate_room_id(""), Err(Status::BadRequest));
    }

    #[test]
    fn free_id_skips_existing_rooms() {
        let rooms: Rooms = Arc::new(DashMap::new());
        let tiny = GameParams {
            width: 1,
            height: 1,
            mines: 0,
        };
        for id in ROOM_IDS.filter(|&id| id != 4321) {
            let room = Room::new(id, tiny).unwrap();
            rooms.insert(id, Arc::new(Mutex::new(room)));
        }

        assert_eq!(free_room_id(&rooms), Some(4321));
    }

    #[test]
    fn join_reuses_existing_room() {
        let rooms: Rooms = Arc::new(DashMap::new());
        let quota = RoomQuota::new(1);

        let first = fetch_or_create_room(&rooms, 1234, &quota, PLAYER).unwrap();
        let second = fetch_or_create_room(&rooms, 1234, &quota, PLAYER).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn joining_unused_ids_draws_from_room_quota() {
        let rooms: Rooms = Arc::new(DashMap::new());
        let quota = RoomQuota::new(2);

        fetch_or_create_room(&rooms, 1001, &quota, PLAYER).unwrap();
        fetch_or_create_room(&rooms, 1002, &quota, PLAYER).unwrap();

        assert_eq!(
            fetch_or_create_room(&rooms, 1003, &quota, PLAYER).err(),
            Some(Status::TooManyRequests)
        );
        assert!(!rooms.contains_key(&1003));
        assert!(fetch_or_create_room(&rooms, 1001, &quota, PLAYER).is_ok());
    }

    #[test]
    fn created_rooms_get_distinct_ids() {
        let rooms: Rooms = Arc::new(DashMap::new());

        let a = add_room(&rooms, GameParams::default()).unwrap();
        let b = add_room(&rooms, GameParams::default()).unwrap();

        assert_ne!(a, b);
        assert!(ROOM_IDS.contains(&a));
        assert!(rooms.contains_key(&b));
    }
}
