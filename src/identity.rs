use uuid::Uuid;

/// Derives the stable id for an external identity string.
///
/// Name-based (v5), so the same email always maps to the same id no matter
/// which process derives it. This id is the join key across users, swipes,
/// matches and chats.
pub fn derive_id(email: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes())
}
