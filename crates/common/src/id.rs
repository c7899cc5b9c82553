//! ID generation utilities.

use ulid::Ulid;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are lexicographically sortable, so they double as the
    /// creation-order cursor for paginated queries.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate an opaque bearer token.
    #[must_use]
    pub fn generate_token(&self) -> String {
        format!("{}{}", Ulid::new(), Ulid::new()).to_lowercase()
    }
}

/// Order two user IDs so that the first is the lexicographically smaller one.
#[must_use]
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Deterministic chat room ID for a pair of users, independent of argument order.
#[must_use]
pub fn chat_room_id(a: &str, b: &str) -> String {
    let (first, second) = sorted_pair(a, b);
    format!("{first}_{second}")
}

/// Friend request ID. Direction matters: `from` sent the request to `to`.
#[must_use]
pub fn friend_request_id(from: &str, to: &str) -> String {
    format!("{from}_{to}")
}
