use minesweeper_common::models::{CreateResponse, GameParams};
use minesweeper_server::{
    build_rocket,
    logic::{ROOM_IDS, Rooms},
};
use rocket::{
    http::{Header, Status},
    local::blocking::Client,
};

fn client() -> Client {
    Client::tracked(build_rocket(false).expect("valid CORS config")).expect("valid rocket instance")
}

#[test]
fn create_returns_four_digit_room_id() {
    let client = client();

    let response = client
        .post("/create")
        .header(Header::new("X-Real-IP", "10.0.0.1"))
        .json(&GameParams {
            width: 9,
            height: 9,
            mines: 10,
        })
        .dispatch();

    assert_eq!(response.status(), Status::Ok);
    let created: CreateResponse = response.into_json().expect("create response body");
    assert!(ROOM_IDS.contains(&created.id));

    let rooms = client.rocket().state::<Rooms>().expect("room storage");
    let room = rooms.get(&created.id).expect("room registered").value().clone();
    let room = room.blocking_lock();
    assert_eq!(room.game().params().width, 9);
    assert!(!room.game().board().started);
}

#[test]
fn create_clamps_oversized_params() {
    let client = client();

    let response = client
        .post("/create")
        .header(Header::new("X-Real-IP", "10.0.0.2"))
        .json(&GameParams {
            width: 3,
            height: 3,
            mines: 50,
        })
        .dispatch();

    let created: CreateResponse = response.into_json().expect("create response body");
    let rooms = client.rocket().state::<Rooms>().expect("room storage");
    let room = rooms.get(&created.id).expect("room registered").value().clone();
    assert_eq!(room.blocking_lock().game().params().mines, 0);
}

#[test]
fn create_is_limited_per_client() {
    let client = client();
    let capacity: usize = std::env::var("RATE_LIMIT_GAMES_PER_MINUTE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(10);

    for _ in 0..capacity {
        let response = client
            .post("/create")
            .header(Header::new("X-Forwarded-For", "10.0.0.3, 192.168.0.1"))
            .json(&GameParams::default())
            .dispatch();
        assert_eq!(response.status(), Status::Ok);
    }

    let response = client
        .post("/create")
        .header(Header::new("X-Forwarded-For", "10.0.0.3"))
        .json(&GameParams::default())
        .dispatch();
    assert_eq!(response.status(), Status::TooManyRequests);

    let other = client
        .post("/create")
        .header(Header::new("X-Forwarded-For", "10.0.0.4"))
        .json(&GameParams::default())
        .dispatch();
    assert_eq!(other.status(), Status::Ok);
}

#[test]
fn random_id_is_free_and_creates_nothing() {
    let client = client();

    let response = client.get("/random-id").dispatch();

    assert_eq!(response.status(), Status::Ok);
    let free: CreateResponse = response.into_json().expect("random id body");
    assert!(ROOM_IDS.contains(&free.id));
    let rooms = client.rocket().state::<Rooms>().expect("room storage");
    assert!(rooms.is_empty());
}

fn websocket_upgrade(client: &Client, uri: &str) -> Status {
    client
        .get(uri.to_string())
        .header(Header::new("Connection", "Upgrade"))
        .header(Header::new("Upgrade", "websocket"))
        .header(Header::new("Sec-WebSocket-Version", "13"))
        .header(Header::new("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="))
        .dispatch()
        .status()
}

#[test]
fn join_rejects_ids_outside_room_range() {
    let client = client();

    for uri in ["/ws?id=999", "/ws?id=10000", "/ws?id=70000", "/ws?id=room"] {
        assert_eq!(websocket_upgrade(&client, uri), Status::BadRequest, "{uri}");
    }
    let rooms = client.rocket().state::<Rooms>().expect("room storage");
    assert!(rooms.is_empty());
}
