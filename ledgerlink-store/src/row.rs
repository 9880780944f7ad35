//! Column codecs between SQLite values and ledger types.

use ledgerlink_types::{Balance, Clock, EntityId, FixedPoint, Sign};
use rusqlite::types::Type;
use rusqlite::Row;

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn entity_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityId> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion(idx, e))
}

pub(crate) fn opt_entity_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EntityId>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion(idx, e)))
        .transpose()
}

pub(crate) fn clock(row: &Row<'_>, idx: usize) -> rusqlite::Result<Clock> {
    Ok(Clock::new(row.get(idx)?))
}

pub(crate) fn fixed_point(row: &Row<'_>, idx: usize) -> rusqlite::Result<FixedPoint> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion(idx, e))
}

pub(crate) fn balance(row: &Row<'_>, idx: usize) -> rusqlite::Result<Balance> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion(idx, e))
}

pub(crate) fn sign(row: &Row<'_>, idx: usize) -> rusqlite::Result<Sign> {
    let raw: i64 = row.get(idx)?;
    Sign::from_i64(raw).map_err(|e| conversion(idx, e))
}
