use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    info!("🚀 Starting Minesweeper multiplayer server");

    let rocket = minesweeper_server::build_rocket(true)?;

    info!("🌐 Server configured with CORS, cleanup task, and routes");
    info!("📡 Endpoints: POST /create, GET /random-id, GET /ws?id=<1000-9999>");

    rocket.launch().await?;
    Ok(())
}
