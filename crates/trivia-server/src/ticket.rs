//! Short-lived WebSocket upgrade tickets.
//!
//! `POST /auth/ws-ticket` mints an opaque, random ticket bound to a user id
//! and a short expiry; `GET /ws?ticket=...` redeems it exactly once. This
//! keeps the long-lived session credential out of the upgrade URL (which
//! tends to get logged by intermediate proxies) without pulling in a JWT
//! dependency the gateway crate otherwise has no use for.

use dashmap::DashMap;
use rand::Rng;
use std::time::{Duration, Instant};

const TICKET_TTL: Duration = Duration::from_secs(30);
const TICKET_BYTES: usize = 24;

struct TicketEntry {
    user_id: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct TicketStore {
    tickets: DashMap<String, TicketEntry>,
}

impl TicketStore {
    #[must_use]
    pub fn new() -> Self {
        TicketStore::default()
    }

    pub fn issue(&self, user_id: String) -> String {
        let token = random_token();
        self.tickets.insert(
            token.clone(),
            TicketEntry {
                user_id,
                expires_at: Instant::now() + TICKET_TTL,
            },
        );
        token
    }

    /// Redeem a ticket, consuming it. A ticket can be redeemed at most once
    /// and only within its TTL.
    pub fn redeem(&self, token: &str) -> Option<String> {
        let (_, entry) = self.tickets.remove(token)?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(entry.user_id)
    }
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..TICKET_BYTES).map(|_| rng.gen()).collect();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
