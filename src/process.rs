//! Station capabilities and process selection.

use std::collections::HashMap;
use tracing::info;

use crate::config::CapabilitiesConfig;
use crate::error::{MesError, MesResult};
use crate::graph::StationId;
use crate::orders::Order;
use crate::product::{ProcessId, Product};

/// Maps stations to the processes they can perform, knows which stations
/// hand out orders, and selects the next process for an order against the
/// product plan.
#[derive(Debug)]
pub struct ProcessManager {
    capabilities: HashMap<StationId, Vec<ProcessId>>,
    /// Order-assigning stations in configuration order; the first one is
    /// the default returning station. Expected to stay O(10) entries, so
    /// membership checks scan linearly.
    order_assigning: Vec<StationId>,
    product: Product,
}

impl ProcessManager {
    /// Build from the capabilities document and the selected product plan.
    /// At least one order-assigning station must be configured.
    pub fn from_config(cfg: &CapabilitiesConfig, product: Product) -> MesResult<Self> {
        let mut capabilities: HashMap<StationId, Vec<ProcessId>> = HashMap::new();
        let mut order_assigning = Vec::new();
        for station in &cfg.stations {
            if let Some(cap) = station.process_capability {
                let process = u8::try_from(cap).map_err(|_| {
                    MesError::Config(format!(
                        "process capability {cap} of station {} exceeds the process id range",
                        station.id
                    ))
                })?;
                capabilities.entry(station.id).or_default().push(process);
            }
            if station.is_order_assigning_station {
                order_assigning.push(station.id);
            }
        }
        if order_assigning.is_empty() {
            return Err(MesError::Config(
                "no order-assigning station configured".to_string(),
            ));
        }
        Ok(Self {
            capabilities,
            order_assigning,
            product,
        })
    }

    /// The product plan this instance runs.
    pub fn product(&self) -> &Product {
        &self.product
    }

    /// Whether waiting orders may be handed to trays arriving at `station`.
    pub fn is_order_assigning_station(&self, station: StationId) -> bool {
        self.order_assigning.contains(&station)
    }

    /// The station idle trays are sent back to.
    pub fn default_returning_station(&self) -> StationId {
        self.order_assigning[0]
    }

    /// Next process the order has to run, or `None` when the plan is done.
    ///
    /// An order that has not started yet gets the first process of the
    /// plan; otherwise the first remaining step after the prefix check.
    pub fn next_process_for(&self, order: &Order) -> MesResult<Option<ProcessId>> {
        if order.executed_processes.is_empty() {
            return match self.product.first_process() {
                Some(process) => Ok(Some(process)),
                None => Err(MesError::EmptyPlan),
            };
        }
        let remaining = self.product.remaining_processes(order)?;
        match remaining {
            Some(steps) => Ok(steps.first().copied()),
            None => {
                info!("order {} has no remaining processes", order.order_id);
                Ok(None)
            }
        }
    }

    /// Whether `station` can perform `process`.
    pub fn can_station_execute(&self, process: ProcessId, station: StationId) -> bool {
        self.capabilities
            .get(&station)
            .is_some_and(|caps| caps.contains(&process))
    }

    /// All stations able to perform `process`, ordered by id; `None` when
    /// nobody advertises it.
    pub fn stations_capable_of(&self, process: ProcessId) -> Option<Vec<StationId>> {
        let mut stations: Vec<StationId> = self
            .capabilities
            .iter()
            .filter(|(_, caps)| caps.contains(&process))
            .map(|(&id, _)| id)
            .collect();
        if stations.is_empty() {
            return None;
        }
        stations.sort_unstable();
        Some(stations)
    }

    /// Processes configured at `station`, in configuration order.
    pub fn station_processes(&self, station: StationId) -> &[ProcessId] {
        self.capabilities
            .get(&station)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
