use std::sync::Arc;

use dashmap::DashMap;
use rocket::{Build, Rocket, routes};
use tracing::info;

pub mod cleanup;
pub mod cors;
pub mod logic;
pub mod quota;
pub mod routes;

use crate::{
    cleanup::CleanupFairing,
    cors::create_cors,
    logic::Rooms,
    quota::RoomQuota,
    routes::{create_room, random_room_id, websocket_handler},
};

/// Assembles the server with fresh room storage. The cleanup task only runs
/// when `with_cleanup` is set.
pub fn build_rocket(with_cleanup: bool) -> Result<Rocket<Build>, rocket_cors::Error> {
    let rooms: Rooms = Arc::new(DashMap::new());
    let quota = RoomQuota::from_env();

    info!(
        "📊 Initialized room storage, {} new rooms per minute per client",
        quota.rooms_per_minute()
    );

    let mut rocket = rocket::build()
        .attach(create_cors()?)
        .manage(rooms)
        .manage(quota)
        .mount("/", routes![create_room, random_room_id, websocket_handler]);

    if with_cleanup {
        rocket = rocket.attach(CleanupFairing);
    }

    Ok(rocket)
}
