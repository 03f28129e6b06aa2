use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable identifier of a user, carried as a plain string throughout the
/// core (spec.md §3 `Connection`).
pub type UserId = String;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, process-unique token identifying one live transport
/// (spec.md §3 `Connection`).
///
/// Unlike `UserId`, a `ConnectionId` is never reused and carries no
/// meaning beyond identity; it exists so a shard can distinguish two
/// connections for the same user during the replacement-with-grace window
/// (spec.md §4.2).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection id. Monotonic for the life of the
    /// process; never reused.
    #[must_use]
    pub fn generate() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "conn-{}", self.0)
    }
}

/// Non-cryptographic, stable FNV-1a hash, used only for shard routing
/// (spec.md §4.5: "a non-cryptographic stable hash (FNV-1a or equivalent)").
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Route a user id to a shard index.
///
/// An empty user id (anonymous-origin traffic) is routed pseudorandomly by
/// current-time modulo rather than always to shard 0, preventing
/// hot-spotting (spec.md §4.5).
#[must_use]
pub fn shard_for(user_id: &str, shard_count: u64) -> u64 {
    assert!(shard_count > 0, "shard_count must be greater than zero");

    if user_id.is_empty() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        return (nanos as u64) % shard_count;
    }

    fnv1a(user_id.as_bytes()) % shard_count
}
