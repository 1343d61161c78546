use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub checks: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub beat: String,
    pub service: String,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemInfoResponse {
    pub version: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: usize,
    pub uptime_seconds: u64,
    pub tracked_clients: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

impl ProbeResponse {
    pub fn ready(timestamp: u64) -> Self {
        Self {
            status: "ready".to_string(),
            timestamp,
            uptime_seconds: None,
        }
    }

    pub fn alive(timestamp: u64, uptime_seconds: u64) -> Self {
        Self {
            status: "alive".to_string(),
            timestamp,
            uptime_seconds: Some(uptime_seconds),
        }
    }
}
