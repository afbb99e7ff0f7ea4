#[cfg(feature = "api")]
pub mod api;
pub mod auth;
pub mod config;
pub mod geo;
pub mod identity;
pub mod inventory;
pub mod storage;

use serde::{Deserialize, Serialize};

/// Live operational state of one monitored host.
///
/// Written by the metrics-ingestion path and carried verbatim in stream
/// frames. The hub never interprets the numbers, it only fans them out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetrics {
    pub uptime_secs: u64,
    pub memory: MemoryInformation,
    pub cpus: CpuOverview,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: u64,
    pub used: u64,
    pub total_swap: u64,
    pub used_swap: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuOverview {
    pub total: usize,
    pub arch: String,
    pub average_usage: f32,
}
