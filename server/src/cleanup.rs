use std::{env, time::Duration};

use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
};
use tokio::time;
use tracing::{debug, info, warn};

use crate::logic::Rooms;

fn env_secs(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

pub async fn start_cleanup_task(rooms: Rooms) {
    let cleanup_interval_secs = env_secs("CLEANUP_INTERVAL_SECONDS", 60);
    let inactive_timeout_secs = env_secs("INACTIVE_GAME_TIMEOUT_SECONDS", 600);
    let active_timeout_secs = env_secs("ACTIVE_GAME_TIMEOUT_SECONDS", 86400);

    let mut interval = time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));

    info!(
        "Started room cleanup task: checking every {}s, inactive timeout: {}s, active timeout: {}s",
        cleanup_interval_secs, inactive_timeout_secs, active_timeout_secs
    );

    loop {
        interval.tick().await;
        cleanup_rooms(&rooms, inactive_timeout_secs, active_timeout_secs);
    }
}

fn cleanup_rooms(rooms: &Rooms, inactive_timeout_secs: u64, active_timeout_secs: u64) -> usize {
    let mut rooms_to_remove = Vec::new();

    for entry in rooms.iter() {
        // Rooms locked by a player are in use; look again next tick.
        if let Ok(room) = entry.value().try_lock()
            && room.should_cleanup(inactive_timeout_secs, active_timeout_secs)
        {
            rooms_to_remove.push(*entry.key());
        }
    }

    let removed_count = rooms_to_remove.len();
    for room_id in rooms_to_remove {
        rooms.remove(&room_id);
        debug!("Cleaned up room: {}", room_id);
    }

    if removed_count > 0 {
        info!("Cleaned up {} inactive rooms", removed_count);
    }
    removed_count
}

pub struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Room Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if let Some(rooms) = rocket.state::<Rooms>() {
            info!("Starting cleanup task for room management");
            let rooms_for_cleanup = rooms.clone();
            tokio::spawn(async move {
                start_cleanup_task(rooms_for_cleanup).await;
            });
        } else {
            warn!("Failed to get rooms state for cleanup task");
        }
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dashmap::DashMap;
    use minesweeper_common::models::GameParams;
    use tokio::sync::Mutex;

    use super::*;
    use crate::logic::Room;

    fn rooms_with(ids: &[u16]) -> Rooms {
        let rooms: Rooms = Arc::new(DashMap::new());
        for &id in ids {
            let room = Room::new(id, GameParams::default()).unwrap();
            rooms.insert(id, Arc::new(Mutex::new(room)));
        }
        rooms
    }

    #[test]
    fn idle_rooms_without_players_are_removed() {
        let rooms = rooms_with(&[1000, 2000]);
        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(cleanup_rooms(&rooms, 0, 86400), 2);
        assert!(rooms.is_empty());
    }

    #[test]
    fn fresh_rooms_are_kept() {
        let rooms = rooms_with(&[1000]);

        assert_eq!(cleanup_rooms(&rooms, 600, 86400), 0);
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn locked_rooms_are_skipped() {
        let rooms = rooms_with(&[1000]);
        std::thread::sleep(Duration::from_millis(1100));
        let room = rooms.get(&1000).unwrap().value().clone();
        let _guard = room.try_lock().unwrap();

        assert_eq!(cleanup_rooms(&rooms, 0, 86400), 0);
    }
}
