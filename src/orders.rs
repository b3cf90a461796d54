//! Order pool and lifecycle.

use std::collections::{HashMap, VecDeque};
use tracing::{error, info};

use crate::error::{MesError, MesResult};
use crate::product::ProcessId;
use crate::tray::TrayId;

/// Order identifier; allocated monotonically from 1 and never reused.
pub type OrderId = u32;

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Created, waiting for a tray
    Wait,
    /// Assigned to a tray and being worked
    Executing,
    /// All process steps done
    Finished,
    /// Failed irrecoverably
    Error,
    /// Marked for removal
    Delete,
}

/// A production request for one unit of one product type.
#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: OrderId,
    pub product_type: u8,
    /// Tray currently carrying the order, if assigned
    pub tray_id: Option<TrayId>,
    pub status: OrderStatus,
    /// Process steps already completed, in execution order
    pub executed_processes: Vec<ProcessId>,
}

/// Owns every order and the waiting/running/finished bookkeeping.
///
/// The waiting queue is FIFO; running and finished preserve insertion
/// order. At all times the three lists partition the pool's key set.
#[derive(Debug, Default)]
pub struct OrderManager {
    next_order_id: OrderId,
    pool: HashMap<OrderId, Order>,
    waiting: VecDeque<OrderId>,
    running: Vec<OrderId>,
    finished: Vec<OrderId>,
}

impl OrderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh order in `Wait` state and queue it.
    pub fn create_order(&mut self, product_type: u8) -> OrderId {
        self.next_order_id += 1;
        let order_id = self.next_order_id;
        self.pool.insert(
            order_id,
            Order {
                order_id,
                product_type,
                tray_id: None,
                status: OrderStatus::Wait,
                executed_processes: Vec::new(),
            },
        );
        self.waiting.push_back(order_id);
        order_id
    }

    /// Read-only snapshot of an order.
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.pool.get(&order_id).cloned()
    }

    /// Number of orders still waiting for a tray.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Whether the order has finished all its process steps.
    pub fn is_done(&self, order_id: OrderId) -> bool {
        match self.pool.get(&order_id) {
            Some(order) => order.status == OrderStatus::Finished,
            None => {
                error!("order {order_id} not found");
                false
            }
        }
    }

    /// Pop the front of the waiting queue and bind it to `tray_id`.
    /// Returns `None` (without touching any state) when nothing waits.
    pub fn try_assign_to_tray(&mut self, tray_id: TrayId) -> Option<OrderId> {
        let order_id = self.waiting.pop_front()?;
        let Some(order) = self.pool.get_mut(&order_id) else {
            error!("waiting order {order_id} missing from pool");
            return None;
        };
        order.tray_id = Some(tray_id);
        order.status = OrderStatus::Executing;
        self.running.push(order_id);
        info!("order {order_id} assigned to tray {tray_id}");
        Some(order_id)
    }

    /// Append a completed process step to the order.
    pub fn record_process_success(
        &mut self,
        order_id: OrderId,
        process: ProcessId,
    ) -> MesResult<()> {
        let order = self
            .pool
            .get_mut(&order_id)
            .ok_or(MesError::UnknownOrder(order_id))?;
        order.executed_processes.push(process);
        Ok(())
    }

    /// Mark the order finished and move it from running to finished.
    pub fn finish(&mut self, order_id: OrderId) -> MesResult<()> {
        let order = self
            .pool
            .get_mut(&order_id)
            .ok_or(MesError::UnknownOrder(order_id))?;
        order.status = OrderStatus::Finished;
        self.running.retain(|&id| id != order_id);
        self.finished.push(order_id);
        info!("order {order_id} marked as finished");
        Ok(())
    }

    /// Orders currently assigned to trays, in assignment order.
    pub fn running_ids(&self) -> &[OrderId] {
        &self.running
    }

    /// Completed orders, in completion order.
    pub fn finished_ids(&self) -> &[OrderId] {
        &self.finished
    }

    /// Total number of orders ever created.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }
}
