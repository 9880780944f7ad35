//! Ledger entity records.
//!
//! Every record carries its stable id and logical clock. Relation sets are
//! flattened into id arrays owned by (and no fresher than) the record.

use crate::{Clock, EntityId, FixedPoint, Sign};
use serde::{Deserialize, Serialize};

/// An icon that tags may reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub id: EntityId,
    pub clock: Clock,
    pub name: String,
    /// Opaque image payload (typically base64 SVG/PNG).
    pub data: String,
}

/// A classification tag. Tags form a DAG: a tag may have several parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
    pub clock: Clock,
    #[serde(default)]
    pub parent_ids: Vec<EntityId>,
    #[serde(default)]
    pub child_ids: Vec<EntityId>,
    #[serde(default)]
    pub icon_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: EntityId,
    pub name: String,
    pub color: String,
    pub clock: Clock,
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
}

/// An account inside a wallet, denominated in one currency.
///
/// The cached balance is not part of the record: it is derived locally from
/// lines and never travels between devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub wallet_id: EntityId,
    pub currency_id: EntityId,
    pub clock: Clock,
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: EntityId,
    pub name: String,
    pub clock: Clock,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
}

/// The latest known exchange rate of a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate: FixedPoint,
    pub recorded_at: Clock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: EntityId,
    /// Decimal places used when presenting amounts.
    pub precision: u8,
    pub clock: Clock,
    /// Classification memberships (default / fiat / crypto system tags).
    #[serde(default)]
    pub tag_ids: Vec<EntityId>,
    #[serde(default)]
    pub rate: Option<ExchangeRate>,
}

/// One signed leg of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: EntityId,
    pub account_id: EntityId,
    pub tag_id: EntityId,
    pub sign: Sign,
    pub magnitude: FixedPoint,
    pub rate: FixedPoint,
}

/// A transaction header and its lines. Lines are not independently
/// addressable by the merge engine; the header clock governs all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: EntityId,
    /// Seconds since Unix epoch at which the transaction took place.
    pub timestamp: i64,
    pub clock: Clock,
    #[serde(default)]
    pub counterparty_id: Option<EntityId>,
    #[serde(default)]
    pub note: Option<String>,
    pub lines: Vec<Line>,
}

impl Transaction {
    /// Checks the structural invariants of a transaction.
    pub fn validate(&self) -> crate::Result<()> {
        if self.lines.is_empty() {
            return Err(crate::Error::InvalidEntity(format!(
                "transaction {} has no lines",
                self.id
            )));
        }
        Ok(())
    }

    /// Distinct accounts referenced by this transaction's lines.
    pub fn account_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.lines.iter().map(|l| l.account_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: EntityId,
    pub starts_at: i64,
    pub ends_at: i64,
    pub tag_id: EntityId,
    pub amount: FixedPoint,
    pub clock: Clock,
}
