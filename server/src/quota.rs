//! Room creation allowance per client address.
//!
//! Every path that brings a new room into existence draws from the same
//! allowance: `POST /create` and the first join of an unused room id.

use std::{
    env,
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use tracing::{debug, instrument, warn};

pub const DEFAULT_ROOMS_PER_MINUTE: u32 = 10;

const WINDOW: Duration = Duration::from_secs(60);

/// Fractional tokens, refilled continuously at `capacity` per minute.
#[derive(Debug, Clone, Copy)]
struct Allowance {
    tokens: f64,
    updated: Instant,
}

impl Allowance {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            updated: now,
        }
    }

    fn take(&mut self, capacity: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        let per_second = f64::from(capacity) / WINDOW.as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_second).min(f64::from(capacity));
        self.updated = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct RoomQuota {
    rooms_per_minute: u32,
    allowances: DashMap<IpAddr, Allowance>,
}

impl RoomQuota {
    pub fn new(rooms_per_minute: u32) -> Self {
        debug!("Room quota: {} rooms per minute per client", rooms_per_minute);
        Self {
            rooms_per_minute,
            allowances: DashMap::new(),
        }
    }

    /// Reads `RATE_LIMIT_GAMES_PER_MINUTE`, falling back to the default.
    pub fn from_env() -> Self {
        let rooms_per_minute = env::var("RATE_LIMIT_GAMES_PER_MINUTE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_ROOMS_PER_MINUTE);
        Self::new(rooms_per_minute)
    }

    pub fn rooms_per_minute(&self) -> u32 {
        self.rooms_per_minute
    }

    /// Spends one room creation for `client`.
    #[instrument(level = "trace", skip(self, client), fields(client = %client))]
    pub fn charge(&self, client: IpAddr) -> Result<(), Status> {
        self.charge_at(client, Instant::now())
    }

    fn charge_at(&self, client: IpAddr, now: Instant) -> Result<(), Status> {
        let capacity = self.rooms_per_minute;
        let mut allowance = self
            .allowances
            .entry(client)
            .or_insert_with(|| Allowance::full(capacity, now));

        if allowance.take(capacity, now) {
            debug!(
                "{} may create {:.1} more rooms",
                client, allowance.tokens
            );
            Ok(())
        } else {
            warn!("{} is creating rooms too quickly", client);
            Err(Status::TooManyRequests)
        }
    }
}

impl Default for RoomQuota {
    fn default() -> Self {
        Self::new(DEFAULT_ROOMS_PER_MINUTE)
    }
}

/// First usable address among the proxy headers and the socket peer.
fn resolve_client(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> IpAddr {
    forwarded_for
        .and_then(|chain| chain.split(',').next())
        .into_iter()
        .chain(real_ip)
        .find_map(|candidate| candidate.trim().parse().ok())
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Address a room creation is charged to.
pub struct ClientIp(pub IpAddr);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let headers = req.headers();
        request::Outcome::Success(ClientIp(resolve_client(
            headers.get_one("X-Forwarded-For"),
            headers.get_one("X-Real-IP"),
            req.client_ip(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn allowance_runs_out_within_a_minute() {
        let quota = RoomQuota::new(2);
        let now = Instant::now();

        assert_eq!(quota.charge_at(ip(1), now), Ok(()));
        assert_eq!(quota.charge_at(ip(1), now), Ok(()));
        assert_eq!(quota.charge_at(ip(1), now), Err(Status::TooManyRequests));
    }

    #[test]
    fn clients_have_separate_allowances() {
        let quota = RoomQuota::new(1);
        let now = Instant::now();

        assert_eq!(quota.charge_at(ip(1), now), Ok(()));
        assert_eq!(quota.charge_at(ip(1), now), Err(Status::TooManyRequests));
        assert_eq!(quota.charge_at(ip(2), now), Ok(()));
    }

    #[test]
    fn allowance_refills_gradually() {
        let quota = RoomQuota::new(6);
        let start = Instant::now();
        for _ in 0..6 {
            quota.charge_at(ip(1), start).unwrap();
        }

        assert!(quota.charge_at(ip(1), start + Duration::from_secs(5)).is_err());
        assert!(quota.charge_at(ip(1), start + Duration::from_secs(11)).is_ok());
        assert!(quota.charge_at(ip(1), start + Duration::from_secs(12)).is_err());
    }

    #[test]
    fn allowance_never_exceeds_capacity() {
        let quota = RoomQuota::new(2);
        let start = Instant::now();
        let later = start + Duration::from_secs(3600);
        quota.charge_at(ip(1), start).unwrap();

        assert!(quota.charge_at(ip(1), later).is_ok());
        assert!(quota.charge_at(ip(1), later).is_ok());
        assert!(quota.charge_at(ip(1), later).is_err());
    }

    #[test]
    fn forwarded_for_wins_over_other_sources() {
        assert_eq!(
            resolve_client(Some("10.0.0.7, 192.168.0.1"), Some("10.0.0.8"), Some(ip(9))),
            ip(7)
        );
    }

    #[test]
    fn unparsable_headers_fall_through() {
        assert_eq!(resolve_client(Some("garbage"), Some(" 10.0.0.8 "), None), ip(8));
        assert_eq!(resolve_client(None, Some("nope"), Some(ip(9))), ip(9));
        assert_eq!(
            resolve_client(None, None, None),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }
}
