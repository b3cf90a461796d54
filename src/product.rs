//! Product process plans.

use tracing::error;

use crate::config::ProductsConfig;
use crate::error::{MesError, MesResult};
use crate::orders::Order;

/// Process step identifier.
pub type ProcessId = u8;

/// The ordered process sequence for one product type.
///
/// Plans are strictly linear; an order walks the sequence front to back.
#[derive(Debug, Clone)]
pub struct Product {
    pub product_type: u8,
    pub name: String,
    pub processes: Vec<ProcessId>,
}

impl Product {
    /// Select the plan for `product_type` from the product catalogue.
    pub fn from_config(cfg: &ProductsConfig, product_type: u8) -> MesResult<Self> {
        let record = cfg
            .products
            .iter()
            .find(|p| p.product_type == product_type)
            .ok_or_else(|| {
                MesError::Config(format!("no product with type {product_type} in catalogue"))
            })?;
        Ok(Self {
            product_type,
            name: record.product_name.clone(),
            processes: record.processes.iter().map(|s| s.process_id).collect(),
        })
    }

    /// First process of the plan, if any.
    pub fn first_process(&self) -> Option<ProcessId> {
        self.processes.first().copied()
    }

    /// Last process of the plan, if any.
    pub fn last_process(&self) -> Option<ProcessId> {
        self.processes.last().copied()
    }

    /// Process steps the order still has to run, in plan order.
    ///
    /// The order's executed steps must be an element-wise prefix of the
    /// plan; anything else is a `PlanDiverged` error. A fully executed plan
    /// yields `Ok(None)`.
    pub fn remaining_processes(&self, order: &Order) -> MesResult<Option<Vec<ProcessId>>> {
        let executed = &order.executed_processes;
        if executed.len() > self.processes.len() {
            error!(
                "order {} executed {} steps but the plan has only {}",
                order.order_id,
                executed.len(),
                self.processes.len()
            );
            return Err(MesError::PlanDiverged(order.order_id));
        }
        if executed[..] != self.processes[..executed.len()] {
            error!("order {} executed steps do not match the plan prefix", order.order_id);
            return Err(MesError::PlanDiverged(order.order_id));
        }
        if executed.len() == self.processes.len() {
            return Ok(None);
        }
        Ok(Some(self.processes[executed.len()..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{Order, OrderStatus};

    fn plan(processes: Vec<ProcessId>) -> Product {
        Product {
            product_type: 1,
            name: "widget".to_string(),
            processes,
        }
    }

    fn order_with(executed: Vec<ProcessId>) -> Order {
        Order {
            order_id: 1,
            product_type: 1,
            tray_id: None,
            status: OrderStatus::Executing,
            executed_processes: executed,
        }
    }

    #[test]
    fn test_first_and_last() {
        let p = plan(vec![10, 20, 30]);
        assert_eq!(p.first_process(), Some(10));
        assert_eq!(p.last_process(), Some(30));
        let empty = plan(vec![]);
        assert_eq!(empty.first_process(), None);
        assert_eq!(empty.last_process(), None);
    }

    #[test]
    fn test_remaining_from_start() {
        let p = plan(vec![10, 20, 30]);
        let rem = p.remaining_processes(&order_with(vec![])).unwrap();
        assert_eq!(rem, Some(vec![10, 20, 30]));
    }

    #[test]
    fn test_remaining_mid_plan() {
        let p = plan(vec![10, 20, 30]);
        let rem = p.remaining_processes(&order_with(vec![10])).unwrap();
        assert_eq!(rem, Some(vec![20, 30]));
    }

    #[test]
    fn test_remaining_complete() {
        let p = plan(vec![10, 20]);
        let rem = p.remaining_processes(&order_with(vec![10, 20])).unwrap();
        assert_eq!(rem, None);
    }

    #[test]
    fn test_non_prefix_rejected() {
        let p = plan(vec![10, 20, 30]);
        let err = p.remaining_processes(&order_with(vec![20])).unwrap_err();
        assert!(matches!(err, MesError::PlanDiverged(1)));
    }

    #[test]
    fn test_overlong_executed_rejected() {
        let p = plan(vec![10]);
        let err = p.remaining_processes(&order_with(vec![10, 20])).unwrap_err();
        assert!(matches!(err, MesError::PlanDiverged(1)));
    }

    #[test]
    fn test_from_config_selects_matching_type() {
        let cfg: ProductsConfig = serde_json::from_str(
            r#"{"products": [
                {"product_type": 1, "product_name": "widget",
                 "processes": [{"process_id": 10}, {"process_id": 20}]},
                {"product_type": 2, "product_name": "gadget",
                 "processes": [{"process_id": 30}]}
            ]}"#,
        )
        .unwrap();
        let p = Product::from_config(&cfg, 2).unwrap();
        assert_eq!(p.name, "gadget");
        assert_eq!(p.processes, vec![30]);
        assert!(matches!(
            Product::from_config(&cfg, 9),
            Err(MesError::Config(_))
        ));
    }
}
