//! The dispatch decision engine.
//!
//! Every station query funnels into one of two handlers, and both produce a
//! single [`ActionRsp`]: execute the local process, or release toward a next
//! station. Routing degrades rather than fails: whenever a target is
//! unknown or unreachable the response falls back to a release toward the
//! default returning station, and if even that is unreachable the next
//! station is [`NO_ID`].

use tracing::{error, info, warn};

use crate::error::{MesError, MesResult};
use crate::graph::{AdjustSign, StationGraph, StationId};
use crate::orders::{OrderId, OrderManager};
use crate::process::ProcessManager;
use crate::product::ProcessId;
use crate::protocol::{ActionQuery, ActionRsp, ActionType, NO_ID};
use crate::tray::TrayRegistry;

/// Ties the station graph, the order pool, the capability table, and the
/// tray registry into the two query handlers.
///
/// The engine owns all of its collaborators; callers serialise access (the
/// server holds it behind one mutex).
pub struct DispatchEngine {
    graph: StationGraph,
    orders: OrderManager,
    process: ProcessManager,
    trays: TrayRegistry,
}

impl DispatchEngine {
    pub fn new(graph: StationGraph, process: ProcessManager) -> Self {
        Self {
            graph,
            orders: OrderManager::new(),
            process,
            trays: TrayRegistry::new(),
        }
    }

    /// Seed `count` fresh orders for the configured product type.
    pub fn create_order_batch(&mut self, count: u32) {
        let product_type = self.process.product().product_type;
        for _ in 0..count {
            self.orders.create_order(product_type);
        }
        info!("created {count} orders for product type {product_type}");
    }

    pub fn graph(&self) -> &StationGraph {
        &self.graph
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn orders_mut(&mut self) -> &mut OrderManager {
        &mut self.orders
    }

    pub fn trays(&self) -> &TrayRegistry {
        &self.trays
    }

    /// Handler for `ACTION_QUERY`: a tray has just arrived at a station.
    pub fn on_action_query(&mut self, qry: &ActionQuery) -> ActionRsp {
        let station = qry.workstation_id;
        let tray = self.trays.get_or_create(qry.tray_id).clone();
        let mut rsp = ActionRsp {
            qry: *qry,
            order_id: if tray.executing_order {
                tray.current_order_id.unwrap_or(NO_ID)
            } else {
                NO_ID
            },
            action_type: ActionType::Release,
            next_station_id: self.default_next_station_id(station),
        };

        let order_id = if tray.executing_order {
            match tray.current_order_id {
                Some(id) => id,
                None => {
                    error!("tray {} flagged as executing but carries no order", qry.tray_id);
                    return rsp;
                }
            }
        } else {
            if !self.process.is_order_assigning_station(station) {
                info!("tray {} not at an order-assigning station, default release", qry.tray_id);
                return rsp;
            }
            if self.orders.waiting_count() == 0 {
                info!("no order waiting, default release");
                return rsp;
            }
            let Some(order_id) = self.orders.try_assign_to_tray(qry.tray_id) else {
                warn!("assigning an order to tray {} failed, default release", qry.tray_id);
                return rsp;
            };
            let tray = self.trays.get_or_create(qry.tray_id);
            tray.executing_order = true;
            tray.current_order_id = Some(order_id);
            rsp.order_id = order_id;
            order_id
        };

        // The tray has (or was just given) an executing order.
        let Some(order) = self.orders.order(order_id) else {
            error!("tray {} references unknown order {order_id}", qry.tray_id);
            return rsp;
        };
        let next_process = match self.process.next_process_for(&order) {
            Ok(Some(process)) => process,
            Ok(None) => return self.finish_order(order_id, qry.tray_id, rsp),
            Err(e) => {
                // Plan divergence is a bug indicator; treated as completion.
                error!("order {order_id}: {e}");
                return self.finish_order(order_id, qry.tray_id, rsp);
            }
        };

        if !self.process.can_station_execute(next_process, station) {
            match self.plan_route_to_process(station, next_process) {
                Ok(next_station) => {
                    rsp.action_type = ActionType::Release;
                    rsp.next_station_id = next_station;
                    info!("routing tray {} toward station {next_station}", qry.tray_id);
                }
                Err(e) => {
                    error!("cannot plan a route for tray {}: {e}, default release", qry.tray_id);
                    rsp.order_id = NO_ID;
                }
            }
            return rsp;
        }

        // Execute here; inflate incoming arcs so other route queries see
        // the anticipated congestion until the paired deflate.
        rsp.action_type = ActionType::Execute;
        self.graph.adjust_incoming_by_station(station, AdjustSign::Inflate);
        info!("execute process {next_process} at station {station}");
        rsp
    }

    /// Handler for `ACTION_DONE_QUERY`: a tray finished the local process.
    pub fn on_action_done_query(&mut self, qry: &ActionQuery) -> ActionRsp {
        let station = qry.workstation_id;
        let tray = self.trays.get_or_create(qry.tray_id).clone();

        if !tray.executing_order {
            error!("action done from tray {} with no executing order", qry.tray_id);
            return self.on_action_query(qry);
        }
        let Some(order_id) = tray.current_order_id else {
            error!("tray {} flagged as executing but carries no order", qry.tray_id);
            return self.on_action_query(qry);
        };
        if self.orders.order(order_id).is_none() {
            error!("action done for unknown order {order_id}");
            return ActionRsp {
                qry: *qry,
                order_id: NO_ID,
                action_type: ActionType::Release,
                next_station_id: self.default_next_station_id(station),
            };
        }

        // One process per station: the completed step is the station's sole
        // configured process.
        match self.process.station_processes(station).first() {
            Some(&process) => {
                if let Err(e) = self.orders.record_process_success(order_id, process) {
                    error!("recording process {process} on order {order_id}: {e}");
                }
            }
            None => error!("station {station} reported done but has no configured process"),
        }
        self.graph.adjust_incoming_by_station(station, AdjustSign::Deflate);

        // Hand over for the follow-up decision.
        self.on_action_query(qry)
    }

    fn finish_order(&mut self, order_id: OrderId, tray_id: u32, mut rsp: ActionRsp) -> ActionRsp {
        if let Err(e) = self.orders.finish(order_id) {
            error!("finishing order {order_id}: {e}");
        }
        let tray = self.trays.get_or_create(tray_id);
        tray.executing_order = false;
        tray.current_order_id = None;
        rsp.order_id = NO_ID;
        info!("tray {tray_id} reset to idle");
        rsp
    }

    /// [`default_next_station`](Self::default_next_station) degraded to the
    /// wire sentinel, logging the failure.
    fn default_next_station_id(&self, station: StationId) -> u32 {
        match self.default_next_station(station) {
            Ok(next) => next,
            Err(e) => {
                warn!("no default next station from {station}: {e}");
                NO_ID
            }
        }
    }

    /// Where an uninstructed tray should head: one hop toward the default
    /// returning station, or (when already there) the first outgoing
    /// neighbour.
    fn default_next_station(&self, station: StationId) -> MesResult<StationId> {
        let returning = self.process.default_returning_station();
        if station != returning {
            let (path, _) = self
                .graph
                .shortest_path(station, returning)
                .ok_or(MesError::Unreachable {
                    from: station,
                    to: returning,
                })?;
            return Ok(next_hop(&path));
        }
        // A station that reaches nothing cannot release a tray anywhere.
        self.graph
            .outgoing_neighbours(station)
            .first()
            .copied()
            .ok_or(MesError::Unreachable {
                from: station,
                to: returning,
            })
    }

    /// One hop toward the cheapest station capable of `process`.
    ///
    /// Candidates are compared by expected path length; ties resolve to the
    /// lowest station id. Errs when nobody advertises the process or no
    /// candidate is reachable.
    fn plan_route_to_process(&self, station: StationId, process: ProcessId) -> MesResult<StationId> {
        let candidates = self
            .process
            .stations_capable_of(process)
            .ok_or(MesError::NoCapableStation(process))?;
        let nearest_id = candidates[0];
        let mut best: Option<(f64, StationId)> = None;
        for candidate in candidates {
            let Some((_, length)) = self.graph.shortest_path(station, candidate) else {
                info!("station {candidate} is unreachable from {station}, skipping");
                continue;
            };
            if best.map_or(true, |(best_length, _)| length < best_length) {
                best = Some((length, candidate));
            }
        }
        // No candidate reachable: report the lowest-id one as the target
        // that could not be reached.
        let Some((_, target)) = best else {
            return Err(MesError::Unreachable {
                from: station,
                to: nearest_id,
            });
        };
        let (path, _) = self
            .graph
            .shortest_path(station, target)
            .ok_or(MesError::Unreachable {
                from: station,
                to: target,
            })?;
        Ok(next_hop(&path))
    }
}

/// Second vertex of a path, or the only vertex for a length-one path.
fn next_hop(path: &[StationId]) -> StationId {
    if path.len() >= 2 {
        path[1]
    } else {
        path[0]
    }
}
