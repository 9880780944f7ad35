//! Application-level replacements for write triggers.
//!
//! Local edits consult these flags to decide whether to touch clocks,
//! adjust balances incrementally and announce the change. A
//! [`MergeContext`](crate::MergeContext) switches all three off for its
//! lifetime and puts back whatever was there before.

use ledgerlink_types::{EntityId, EntityKind};
use std::sync::atomic::{AtomicBool, Ordering};

/// Snapshot of the maintenance switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceFlags {
    /// Bump an entity's clock on every local write.
    pub auto_touch: bool,
    /// Keep cached balances in step with line edits.
    pub auto_balance: bool,
    /// Emit [`ChangeNotice`]s for local writes.
    pub notifications: bool,
}

impl MaintenanceFlags {
    /// Everything off, as during a merge.
    pub const SUSPENDED: MaintenanceFlags = MaintenanceFlags {
        auto_touch: false,
        auto_balance: false,
        notifications: false,
    };
}

impl Default for MaintenanceFlags {
    fn default() -> Self {
        Self {
            auto_touch: true,
            auto_balance: true,
            notifications: true,
        }
    }
}

#[derive(Debug)]
pub struct Maintenance {
    auto_touch: AtomicBool,
    auto_balance: AtomicBool,
    notifications: AtomicBool,
}

impl Maintenance {
    pub(crate) fn new(flags: MaintenanceFlags) -> Self {
        Self {
            auto_touch: AtomicBool::new(flags.auto_touch),
            auto_balance: AtomicBool::new(flags.auto_balance),
            notifications: AtomicBool::new(flags.notifications),
        }
    }

    pub fn flags(&self) -> MaintenanceFlags {
        MaintenanceFlags {
            auto_touch: self.auto_touch.load(Ordering::SeqCst),
            auto_balance: self.auto_balance.load(Ordering::SeqCst),
            notifications: self.notifications.load(Ordering::SeqCst),
        }
    }

    /// Replaces all flags, returning the previous ones.
    pub fn replace(&self, flags: MaintenanceFlags) -> MaintenanceFlags {
        MaintenanceFlags {
            auto_touch: self.auto_touch.swap(flags.auto_touch, Ordering::SeqCst),
            auto_balance: self.auto_balance.swap(flags.auto_balance, Ordering::SeqCst),
            notifications: self.notifications.swap(flags.notifications, Ordering::SeqCst),
        }
    }

    pub fn auto_touch(&self) -> bool {
        self.auto_touch.load(Ordering::SeqCst)
    }

    pub fn auto_balance(&self) -> bool {
        self.auto_balance.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> bool {
        self.notifications.load(Ordering::SeqCst)
    }
}

/// A local write the sync layer may want to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeNotice {
    pub kind: EntityKind,
    pub id: EntityId,
}
