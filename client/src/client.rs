use minesweeper_common::models::{CreateResponse, GameParams};
use reqwest::Client;
use url::Url;

use crate::Result;

/// HTTP client for minesweeper server API
pub struct MinesweeperClient {
    client: Client,
    base_url: Url,
}

impl MinesweeperClient {
    /// Create a new client connecting to the specified server URL
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    /// Create a new room with the specified parameters.
    /// Returns the room id that can be used to connect via WebSocket
    pub async fn create_room(&self, params: GameParams) -> Result<u16> {
        let create_url = self.base_url.join("/create")?;

        let response = self.client.post(create_url).json(&params).send().await?;

        if !response.status().is_success() {
            return Err(format!("Failed to create room: {}", response.status()).into());
        }

        let create_response: CreateResponse = response.json().await?;
        Ok(create_response.id)
    }

    /// Ask the server for a room id nobody is using yet
    pub async fn random_room_id(&self) -> Result<u16> {
        let url = self.base_url.join("/random-id")?;

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Failed to get a room id: {}", response.status()).into());
        }

        let free: CreateResponse = response.json().await?;
        Ok(free.id)
    }

    /// Get the WebSocket URL for a room
    pub fn websocket_url(&self, room: u16) -> Result<String> {
        let mut ws_url = self.base_url.clone();
        ws_url
            .set_scheme(match self.base_url.scheme() {
                "https" => "wss",
                _ => "ws",
            })
            .map_err(|_| "Failed to set WebSocket scheme")?;
        ws_url.set_path("/ws");
        ws_url.set_query(Some(&format!("id={}", room)));

        Ok(ws_url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_http_scheme() {
        let plain = MinesweeperClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            plain.websocket_url(1234).unwrap(),
            "ws://localhost:8000/ws?id=1234"
        );

        let secure = MinesweeperClient::new("https://mines.example.com/app").unwrap();
        assert_eq!(
            secure.websocket_url(9999).unwrap(),
            "wss://mines.example.com/ws?id=9999"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(MinesweeperClient::new("not a url").is_err());
    }
}
