//! Reserved payload keys and compiled defaults.

/// Reserved framework keys carried inside payloads.
pub mod keys {
    /// Instance identifier.
    pub const ID: &str = "__id";
    /// Optimistic-lock version.
    pub const VERSION: &str = "__version";
    /// Entity-type discriminator (entity name).
    pub const TYPE: &str = "__type";
    /// Caller-supplied correlation token for optimistic client objects.
    pub const CLIENT_REFERENCE_ID: &str = "__clientReferenceId";
    /// Transient marker set on nodes inserted by the current call.
    pub const CREATED: &str = "__created";
    /// Selection marker used by range payloads.
    pub const SELECTED: &str = "__selected";
    /// Mutability marker; immutable payloads are rejected by mutations.
    pub const IMMUTABLE: &str = "__immutable";
    /// Business fault returned by a behavior implementation.
    pub const FAULT: &str = "__fault";

    /// All reserved keys, in the order they are emitted.
    pub const ALL: &[&str] = &[
        ID,
        VERSION,
        TYPE,
        CLIENT_REFERENCE_ID,
        CREATED,
        SELECTED,
        IMMUTABLE,
        FAULT,
    ];

    /// Returns true if `key` is a reserved framework key.
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with("__")
    }
}

/// Default read pool size.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Maximum read pool size.
pub const MAX_READ_POOL_SIZE: usize = 8;

/// Default busy timeout for SQLite connections.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default maximum number of ids bound into a single `IN (...)` list.
pub const DEFAULT_MAX_IN_LIST: usize = 500;

/// Default bounded VARCHAR length for string parameters.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// Default number of memoized select plans.
pub const DEFAULT_PLAN_CACHE_CAPACITY: u64 = 1_024;

/// Default page size for keyset pagination.
pub const DEFAULT_PAGE_SIZE: usize = 100;
