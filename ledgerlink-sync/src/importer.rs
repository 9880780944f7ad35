//! Package importer and merge engine.
//!
//! # Merge rules
//!
//! - Entity classes are processed in dependency order
//!   ([`EntityKind::IMPORT_ORDER`]), then tombstones.
//! - An absent entity is inserted (unless a remembered tombstone is newer);
//!   a present one is replaced only by a strictly greater clock. Ties keep
//!   the local version.
//! - Relation sets (hierarchy edges, tag memberships, lines) ride with their
//!   owner: whenever the owner is applied they are deleted and reinserted.
//! - A tombstone deletes iff its deletion time is strictly greater than the
//!   local clock.
//! - The whole package runs in one [`MergeContext`]: balances of touched
//!   accounts are recomputed in bulk before commit, and any error rolls the
//!   package back.

use crate::error::{SyncError, SyncResult};
use crate::package::{SyncPackage, PACKAGE_VERSION};
use ledgerlink_store::{repo, LedgerStore, MergeContext, Resolution};
use ledgerlink_store::repo::Membership;
use ledgerlink_types::{
    system_tags, Account, Budget, Counterparty, Currency, Deletion, EntityId, EntityKind, Icon,
    InstallationId, Tag, Transaction, Wallet,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// What one package import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub sender_id: Option<InstallationId>,
    /// Applied (inserted or replaced) records per kind.
    pub counts: BTreeMap<EntityKind, usize>,
    pub deletions_applied: usize,
    /// Currencies first seen in this package that still have no rate.
    pub currencies_needing_rates: Vec<EntityId>,
    /// Records skipped as invalid; the rest of the package still applied.
    pub errors: Vec<String>,
    /// Accounts whose balance was recomputed.
    pub recomputed_accounts: usize,
}

impl ImportReport {
    fn applied(&mut self, kind: EntityKind) {
        *self.counts.entry(kind).or_default() += 1;
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total records applied, tombstones included.
    pub fn total_applied(&self) -> usize {
        self.counts.values().sum::<usize>() + self.deletions_applied
    }
}

/// Applies decrypted packages to the local ledger.
#[derive(Debug, Clone)]
pub struct PackageImporter {
    store: LedgerStore,
}

impl PackageImporter {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Merges one package atomically.
    pub fn import(&self, package: &SyncPackage) -> SyncResult<ImportReport> {
        if package.version > PACKAGE_VERSION {
            return Err(SyncError::Protocol(format!(
                "unsupported package version {}",
                package.version
            )));
        }

        let mut ctx = self.store.begin_merge()?;
        let mut report = ImportReport {
            sender_id: Some(package.sender_id),
            ..ImportReport::default()
        };

        for kind in EntityKind::IMPORT_ORDER {
            match kind {
                EntityKind::Icon => merge_icons(&ctx, &package.icons, &mut report)?,
                EntityKind::Tag => merge_tags(&ctx, &package.tags, &mut report)?,
                EntityKind::Wallet => merge_wallets(&ctx, &package.wallets, &mut report)?,
                EntityKind::Account => merge_accounts(&mut ctx, &package.accounts, &mut report)?,
                EntityKind::Counterparty => {
                    merge_counterparties(&ctx, &package.counterparties, &mut report)?
                }
                EntityKind::Currency => merge_currencies(&ctx, &package.currencies, &mut report)?,
                EntityKind::Transaction => {
                    merge_transactions(&mut ctx, &package.transactions, &mut report)?
                }
                EntityKind::Budget => merge_budgets(&ctx, &package.budgets, &mut report)?,
            }
        }
        apply_deletions(&mut ctx, &package.deletions, &mut report)?;

        report.recomputed_accounts = ctx.commit()?.len();
        info!(
            sender = %package.sender_id,
            applied = report.total_applied(),
            skipped_invalid = report.errors.len(),
            "imported package"
        );
        Ok(report)
    }
}

fn merge_icons(ctx: &MergeContext<'_>, icons: &[Icon], report: &mut ImportReport) -> SyncResult<()> {
    for icon in icons {
        if ctx.resolve(EntityKind::Icon, icon.id, icon.clock)?.applies() {
            repo::upsert_icon(ctx.conn(), icon)?;
            report.applied(EntityKind::Icon);
        }
    }
    Ok(())
}

fn merge_tags(ctx: &MergeContext<'_>, tags: &[Tag], report: &mut ImportReport) -> SyncResult<()> {
    for tag in tags {
        if system_tags::is_system_tag(&tag.id) {
            debug!(tag = %tag.id, "ignoring incoming system tag");
            continue;
        }
        if ctx.resolve(EntityKind::Tag, tag.id, tag.clock)?.applies() {
            repo::upsert_tag(ctx.conn(), tag)?;
            repo::replace_tag_edges(ctx.conn(), tag)?;
            report.applied(EntityKind::Tag);
        }
    }
    Ok(())
}

fn merge_wallets(ctx: &MergeContext<'_>, wallets: &[Wallet], report: &mut ImportReport) -> SyncResult<()> {
    for wallet in wallets {
        if ctx.resolve(EntityKind::Wallet, wallet.id, wallet.clock)?.applies() {
            repo::upsert_wallet(ctx.conn(), wallet)?;
            repo::replace_memberships(ctx.conn(), Membership::Wallet, wallet.id, &wallet.tag_ids)?;
            report.applied(EntityKind::Wallet);
        }
    }
    Ok(())
}

fn merge_accounts(
    ctx: &mut MergeContext<'_>,
    accounts: &[Account],
    report: &mut ImportReport,
) -> SyncResult<()> {
    for account in accounts {
        let resolution = ctx.resolve(EntityKind::Account, account.id, account.clock)?;
        if resolution.applies() {
            repo::upsert_account(ctx.conn(), account)?;
            repo::replace_memberships(ctx.conn(), Membership::Account, account.id, &account.tag_ids)?;
            if resolution == Resolution::Insert {
                // Lines may already reference it.
                ctx.touch_accounts([account.id]);
            }
            report.applied(EntityKind::Account);
        }
    }
    Ok(())
}

fn merge_counterparties(
    ctx: &MergeContext<'_>,
    counterparties: &[Counterparty],
    report: &mut ImportReport,
) -> SyncResult<()> {
    for cp in counterparties {
        if ctx.resolve(EntityKind::Counterparty, cp.id, cp.clock)?.applies() {
            repo::upsert_counterparty(ctx.conn(), cp)?;
            repo::replace_memberships(ctx.conn(), Membership::Counterparty, cp.id, &cp.tag_ids)?;
            report.applied(EntityKind::Counterparty);
        }
    }
    Ok(())
}

/// Currencies follow the usual clock rule; their rate is taken only when
/// none is known locally, since every device refreshes rates on its own.
fn merge_currencies(
    ctx: &MergeContext<'_>,
    currencies: &[Currency],
    report: &mut ImportReport,
) -> SyncResult<()> {
    for currency in currencies {
        let resolution = ctx.resolve(EntityKind::Currency, currency.id, currency.clock)?;
        match resolution {
            Resolution::Tombstoned => continue,
            Resolution::Insert | Resolution::Update => {
                repo::upsert_currency(ctx.conn(), currency)?;
                repo::replace_memberships(
                    ctx.conn(),
                    Membership::Currency,
                    currency.id,
                    &currency.tag_ids,
                )?;
                report.applied(EntityKind::Currency);
            }
            Resolution::KeepLocal => {}
        }

        let has_rate = repo::latest_rate(ctx.conn(), currency.id)?.is_some();
        if !has_rate {
            match &currency.rate {
                Some(rate) => repo::insert_rate(ctx.conn(), currency.id, rate)?,
                None if resolution == Resolution::Insert => {
                    report.currencies_needing_rates.push(currency.id)
                }
                None => {}
            }
        }
    }
    Ok(())
}

/// Newer transactions replace the local header and every line; old and new
/// lines both mark their accounts for recompute.
fn merge_transactions(
    ctx: &mut MergeContext<'_>,
    transactions: &[Transaction],
    report: &mut ImportReport,
) -> SyncResult<()> {
    for tx in transactions {
        if let Err(e) = tx.validate() {
            warn!(transaction = %tx.id, "skipping invalid transaction: {e}");
            report.errors.push(e.to_string());
            continue;
        }
        if !ctx.resolve(EntityKind::Transaction, tx.id, tx.clock)?.applies() {
            continue;
        }
        let old_lines = repo::lines_of(ctx.conn(), tx.id)?;
        repo::upsert_transaction_header(ctx.conn(), tx)?;
        repo::replace_lines(ctx.conn(), tx.id, &tx.lines)?;
        ctx.touch_accounts(old_lines.iter().map(|l| l.account_id));
        ctx.touch_accounts(tx.account_ids());
        report.applied(EntityKind::Transaction);
    }
    Ok(())
}

fn merge_budgets(ctx: &MergeContext<'_>, budgets: &[Budget], report: &mut ImportReport) -> SyncResult<()> {
    for budget in budgets {
        if ctx.resolve(EntityKind::Budget, budget.id, budget.clock)?.applies() {
            repo::upsert_budget(ctx.conn(), budget)?;
            report.applied(EntityKind::Budget);
        }
    }
    Ok(())
}

/// Tombstones delete iff strictly newer than the local clock. Tombstones for
/// absent entities are remembered so a stale copy cannot be reinserted later.
fn apply_deletions(
    ctx: &mut MergeContext<'_>,
    deletions: &[Deletion],
    report: &mut ImportReport,
) -> SyncResult<()> {
    for deletion in deletions {
        if deletion.kind == EntityKind::Tag && system_tags::is_system_tag(&deletion.entity_id) {
            continue;
        }
        match repo::clock_of(ctx.conn(), deletion.kind, deletion.entity_id)? {
            Some(local) if deletion.overrides(local) => {
                if deletion.kind == EntityKind::Transaction {
                    let lines = repo::lines_of(ctx.conn(), deletion.entity_id)?;
                    ctx.touch_accounts(lines.iter().map(|l| l.account_id));
                }
                repo::delete_entity(ctx.conn(), deletion.kind, deletion.entity_id)?;
                repo::record_deletion(ctx.conn(), deletion)?;
                report.deletions_applied += 1;
            }
            Some(local) => {
                debug!(
                    kind = %deletion.kind,
                    id = %deletion.entity_id,
                    local = %local,
                    deleted_at = %deletion.deleted_at,
                    "local version outlives tombstone"
                );
            }
            None => repo::record_deletion(ctx.conn(), deletion)?,
        }
    }
    Ok(())
}
