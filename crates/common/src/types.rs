use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving reservation IDs from idempotency keys.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Unique identifier for a reservation and its saga run.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// reservation IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random reservation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a deterministic reservation ID from an idempotency key.
    ///
    /// The same key always produces the same ID, so a replayed request
    /// addresses the record of its first execution.
    pub fn from_idempotency_key(key: &str) -> Self {
        Self(Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, key.as_bytes()))
    }

    /// Creates a reservation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ReservationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ReservationId> for Uuid {
    fn from(id: ReservationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_id_new_creates_unique_ids() {
        let id1 = ReservationId::new();
        let id2 = ReservationId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn reservation_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ReservationId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn same_idempotency_key_derives_same_id() {
        let a = ReservationId::from_idempotency_key("key-123");
        let b = ReservationId::from_idempotency_key("key-123");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_derive_different_ids() {
        let a = ReservationId::from_idempotency_key("key-123");
        let b = ReservationId::from_idempotency_key("key-456");
        assert_ne!(a, b);
    }

    #[test]
    fn reservation_id_serialization_roundtrip() {
        let id = ReservationId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: ReservationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
