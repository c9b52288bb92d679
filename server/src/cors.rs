use std::env;

use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, Cors, CorsOptions};
use tracing::{info, warn};

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Origins named in a comma separated list. `None` means any origin (`*`).
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();

    if origins.iter().any(|origin| origin == "*") {
        return None;
    }
    if origins.is_empty() {
        warn!("No CORS origins configured, allowing {}", DEFAULT_ORIGIN);
        return Some(vec![DEFAULT_ORIGIN.to_string()]);
    }
    Some(origins)
}

fn cors_for(raw: &str) -> Result<Cors, rocket_cors::Error> {
    let origins = parse_origins(raw);
    // Credentials cannot be combined with a wildcard origin.
    let allow_credentials = origins.is_some();
    let allowed_origins = match &origins {
        Some(origins) => {
            info!("Room API open to {}", origins.join(", "));
            AllowedOrigins::some_exact(origins)
        }
        None => {
            info!("Room API open to every origin");
            AllowedOrigins::all()
        }
    };

    CorsOptions::default()
        .allowed_origins(allowed_origins)
        .allowed_methods([Method::Get, Method::Post].into_iter().map(From::from).collect())
        .allowed_headers(AllowedHeaders::some(&["Accept", "Content-Type"]))
        .allow_credentials(allow_credentials)
        .to_cors()
}

/// CORS fairing for the room routes, configured by `CORS_ALLOWED_ORIGINS`.
pub fn create_cors() -> Result<Cors, rocket_cors::Error> {
    let raw = env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
    cors_for(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_split() {
        assert_eq!(
            parse_origins(" http://a.test ,http://b.test,, "),
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn wildcard_opens_every_origin() {
        assert_eq!(parse_origins("http://a.test,*"), None);
        assert!(cors_for("*").is_ok());
    }

    #[test]
    fn blank_setting_falls_back_to_default() {
        assert_eq!(parse_origins(" , "), Some(vec![DEFAULT_ORIGIN.to_string()]));
        assert!(cors_for("").is_ok());
    }
}
