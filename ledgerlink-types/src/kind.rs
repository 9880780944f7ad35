//! Entity kinds and deletion tombstones.

use crate::{Clock, EntityId, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of replicated entity kinds.
///
/// [`EntityKind::IMPORT_ORDER`] is the dependency order the merge engine
/// processes them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Icon,
    Tag,
    Wallet,
    Account,
    Counterparty,
    Currency,
    Transaction,
    Budget,
}

impl EntityKind {
    pub const IMPORT_ORDER: [EntityKind; 8] = [
        EntityKind::Icon,
        EntityKind::Tag,
        EntityKind::Wallet,
        EntityKind::Account,
        EntityKind::Counterparty,
        EntityKind::Currency,
        EntityKind::Transaction,
        EntityKind::Budget,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Icon => "icon",
            EntityKind::Tag => "tag",
            EntityKind::Wallet => "wallet",
            EntityKind::Account => "account",
            EntityKind::Counterparty => "counterparty",
            EntityKind::Currency => "currency",
            EntityKind::Transaction => "transaction",
            EntityKind::Budget => "budget",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::IMPORT_ORDER
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidKind(s.to_string()))
    }
}

/// A timestamped deletion record.
///
/// A tombstone removes the entity on another device iff `deleted_at` is
/// strictly greater than that device's clock for the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deletion {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub deleted_at: Clock,
}

impl Deletion {
    #[must_use]
    pub fn new(kind: EntityKind, entity_id: EntityId, deleted_at: Clock) -> Self {
        Self {
            kind,
            entity_id,
            deleted_at,
        }
    }

    /// Whether this tombstone wins over an entity at `entity_clock`.
    #[must_use]
    pub fn overrides(&self, entity_clock: Clock) -> bool {
        self.deleted_at.supersedes(&entity_clock)
    }
}
