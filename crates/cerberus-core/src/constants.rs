//! Shared constants for the Cerberus core.

use std::time::Duration;

/// Default name of the approval cookie
pub const DEFAULT_COOKIE_NAME: &str = "cerberus-auth";

/// Default name of the response header carrying the decision tag
pub const DEFAULT_HEADER_NAME: &str = "X-Cerberus-Status";

/// Default challenge difficulty (leading zero half-bytes in the hash)
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Default pending-attempt threshold per IP block
pub const DEFAULT_MAX_PENDING: i32 = 128;

/// Default number of gate passes granted per solved challenge
pub const DEFAULT_ACCESS_PER_APPROVAL: i32 = 8;

/// Default lifetime of a blocklist entry (1 day)
pub const DEFAULT_BLOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default lifetime of a pending counter (1 hour)
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Default lifetime of an approval counter and its cookie (1 hour)
pub const DEFAULT_APPROVAL_TTL: Duration = Duration::from_secs(60 * 60);

/// Default total memory budget for the caches (512 MiB)
pub const DEFAULT_MAX_MEM_USAGE: u64 = 1 << 29;

/// Default title of the challenge page
pub const DEFAULT_TITLE: &str = "Cerberus Challenge";

/// Default IPv4 aggregation prefix
pub const DEFAULT_IPV4_PREFIX: u8 = 32;

/// Default IPv6 aggregation prefix
pub const DEFAULT_IPV6_PREFIX: u8 = 64;

/// How long a submitted answer nonce stays valid and reserved
pub const NONCE_TTL: Duration = Duration::from_secs(120);

/// Domain-separation tag mixed into the challenge derivation
pub const IV1: &str = "/L4y6KgWa8vHEujU3O6JyI8osQxwh1nE0Eoay4nD3vw/y36eSFT0s/GTGfrngN6+";

/// Domain-separation tag mixed into the answer signature
pub const IV2: &str = "KHo5hHR3ZfisR7xeG1gJwO3LSc1cYyDUQ5+StoAjV8jLhp01NBNi4joHYTWXDqF0";

/// Decision tags written to the status header
pub mod status {
    /// Request carried a valid, unexhausted approval
    pub const PASS: &str = "PASS";

    /// A challenge page was served
    pub const CHALLENGE: &str = "CHALLENGE";

    /// An answer submission was rejected
    pub const FAIL: &str = "FAIL";

    /// The client's IP block is on the deny list
    pub const BLOCK: &str = "BLOCK";

    /// The gate is configured off and forwarded unconditionally
    pub const DISABLED: &str = "DISABLED";
}

/// Purge sweep intervals, co-prime so the sweepers drift apart
pub mod purge {
    use std::time::Duration;

    pub const PENDING: Duration = Duration::from_secs(37);
    pub const USED_NONCE: Duration = Duration::from_secs(41);
    pub const APPROVAL: Duration = Duration::from_secs(43);
    pub const BLOCKLIST: Duration = Duration::from_secs(61);
}

/// Approximate per-entry costs used to size the caches from a byte budget
pub mod cost {
    /// Bookkeeping overhead of one shard map entry
    const MAP_ENTRY_OVERHEAD: usize = 48;

    /// IP block key + shared atomic counter
    pub const PENDING_ITEM: usize = MAP_ENTRY_OVERHEAD + 8 + 24;

    /// IP block key, unit value
    pub const BLOCKLIST_ITEM: usize = MAP_ENTRY_OVERHEAD + 8;

    /// UUID key + shared atomic counter
    pub const APPROVAL_ITEM: usize = MAP_ENTRY_OVERHEAD + 16 + 24;
}
