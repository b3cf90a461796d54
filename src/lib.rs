//! Manufacturing execution server.
//!
//! Physical trays travel a directed network of workstations and poll this
//! server at every stop; each poll is answered with one dispatch decision:
//! execute the local process, or release toward a next station. The server
//! owns the order lifecycle, the product process plan, and a stochastic
//! model of station/transfer times that routing works on.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod orders;
pub mod process;
pub mod product;
pub mod protocol;
pub mod server;
pub mod timedist;
pub mod tray;

pub use dispatch::DispatchEngine;
pub use error::{MesError, MesResult};
pub use graph::{AdjustSign, Station, StationGraph, StationId, Transfer};
pub use orders::{Order, OrderId, OrderManager, OrderStatus};
pub use process::ProcessManager;
pub use product::{ProcessId, Product};
pub use protocol::{ActionQuery, ActionRsp, ActionType, NO_ID};
pub use server::MesServer;
pub use timedist::TimeDist;
pub use tray::{TrayId, TrayInfo, TrayRegistry};
