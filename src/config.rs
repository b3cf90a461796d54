//! Configuration documents.
//!
//! Four JSON documents describe a deployment: the server config (ports and
//! file locations), the station graph, the station capabilities, and the
//! product catalogue. All of them are parsed up front; any defect is fatal
//! at startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MesError, MesResult};
use crate::timedist::TimeDist;

/// Top-level server configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub mes_service: MesServiceConfig,
    pub production_system: ProductionSystemConfig,
    pub product_info: ProductInfoConfig,
}

/// TCP service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MesServiceConfig {
    /// Port the dispatch service binds to
    pub bind_port: u16,
}

/// Locations of the production-system documents.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductionSystemConfig {
    pub graph_file: PathBuf,
    pub capabilities_file: PathBuf,
}

/// Product catalogue location and the product type this instance runs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInfoConfig {
    pub products_file: PathBuf,
    pub product_type: u8,
}

/// Station graph document.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub vertices: Vec<VertexConfig>,
    pub arcs: Vec<ArcConfig>,
}

/// One station record.
#[derive(Debug, Clone, Deserialize)]
pub struct VertexConfig {
    pub id: u32,
    pub name: String,
    pub buffer_capacity: u8,
    pub service_time_distribution: TimeDist,
}

/// One transfer link record.
#[derive(Debug, Clone, Deserialize)]
pub struct ArcConfig {
    pub tail: u32,
    pub head: u32,
    pub transfer_time_distribution: TimeDist,
}

/// Station capabilities document.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilitiesConfig {
    pub stations: Vec<StationCapabilityConfig>,
}

/// Capability record for one station. `process_capability` is optional; a
/// station without one is transport-only.
#[derive(Debug, Clone, Deserialize)]
pub struct StationCapabilityConfig {
    pub id: u32,
    #[serde(default)]
    pub process_capability: Option<u32>,
    pub is_order_assigning_station: bool,
}

/// Product catalogue document.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductsConfig {
    pub products: Vec<ProductConfig>,
}

/// One product record: an ordered process sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    pub product_type: u8,
    pub product_name: String,
    pub processes: Vec<ProcessStepConfig>,
}

/// One process step of a product plan.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessStepConfig {
    pub process_id: u8,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> MesResult<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MesError::Config(format!("cannot read {what} file {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| MesError::Config(format!("cannot parse {what} file {}: {e}", path.display())))
}

/// Load the top-level server configuration.
pub fn load_server_config(path: &Path) -> MesResult<ServerConfig> {
    load_json(path, "server config")
}

/// Load the station graph document.
pub fn load_graph_config(path: &Path) -> MesResult<GraphConfig> {
    load_json(path, "graph")
}

/// Load the station capabilities document.
pub fn load_capabilities_config(path: &Path) -> MesResult<CapabilitiesConfig> {
    load_json(path, "capabilities")
}

/// Load the product catalogue.
pub fn load_products_config(path: &Path) -> MesResult<ProductsConfig> {
    load_json(path, "products")
}
