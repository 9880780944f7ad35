//! Reserved system tags.
//!
//! These tags exist on every installation with fixed ids. They are seeded by
//! the store and are immutable: local edits and incoming merges skip them.

use crate::EntityId;
use uuid::Uuid;

pub const DEFAULT: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0001));
pub const FIAT: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0002));
pub const CRYPTO: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0003));
pub const INCOME: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0004));
pub const EXPENSE: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0005));
pub const TRANSFER: EntityId = EntityId::from_uuid(Uuid::from_u128(0x5157_0000_0000_4000_8000_0000_0000_0006));

/// All reserved tags with their display names.
pub const ALL: [(EntityId, &str); 6] = [
    (DEFAULT, "default"),
    (FIAT, "fiat"),
    (CRYPTO, "crypto"),
    (INCOME, "income"),
    (EXPENSE, "expense"),
    (TRANSFER, "transfer"),
];

/// Returns true if `id` names a reserved system tag.
#[must_use]
pub fn is_system_tag(id: &EntityId) -> bool {
    ALL.iter().any(|(sys, _)| sys == id)
}
