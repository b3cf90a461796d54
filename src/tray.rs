//! Tray tracking.

use std::collections::HashMap;

use crate::orders::OrderId;

/// Tray identifier as reported by stations.
pub type TrayId = u32;

/// What the server knows about one physical tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayInfo {
    pub tray_id: TrayId,
    /// Whether an order is currently bound to the tray
    pub executing_order: bool,
    /// The bound order, present exactly when `executing_order` is set
    pub current_order_id: Option<OrderId>,
}

impl TrayInfo {
    fn idle(tray_id: TrayId) -> Self {
        Self {
            tray_id,
            executing_order: false,
            current_order_id: None,
        }
    }
}

/// Sparse tray registry. Entries appear the first time a tray queries the
/// server and live for the server's lifetime.
#[derive(Debug, Default)]
pub struct TrayRegistry {
    trays: HashMap<TrayId, TrayInfo>,
}

impl TrayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the tray record, creating an idle one on first sight.
    pub fn get_or_create(&mut self, tray_id: TrayId) -> &mut TrayInfo {
        self.trays.entry(tray_id).or_insert_with(|| TrayInfo::idle(tray_id))
    }

    /// Read-only lookup; `None` for trays never seen.
    pub fn get(&self, tray_id: TrayId) -> Option<&TrayInfo> {
        self.trays.get(&tray_id)
    }

    /// Number of trays ever seen.
    pub fn len(&self) -> usize {
        self.trays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trays.is_empty()
    }
}
