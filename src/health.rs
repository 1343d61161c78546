use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::clock::{unix_seconds, Clock};
use crate::rate_limiter::LimiterRegistry;
use crate::response::{HealthResponse, HeartbeatResponse, ProbeResponse, SystemInfoResponse};

pub struct HealthChecker {
    service: String,
    version: String,
    started: Instant,
    rate_limiting_enabled: bool,
    registry: Arc<LimiterRegistry>,
    clock: Arc<dyn Clock>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<LimiterRegistry>,
        rate_limiting_enabled: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started: clock.now(),
            rate_limiting_enabled,
            registry,
            clock,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(self.started)
            .as_secs()
    }

    fn timestamp(&self) -> u64 {
        unix_seconds(self.clock.system_now())
    }

    pub fn check_health(&self) -> HealthResponse {
        let mut checks = BTreeMap::new();
        let rate_limiter = if self.rate_limiting_enabled {
            "enabled"
        } else {
            "disabled"
        };
        checks.insert("rate_limiter".to_string(), rate_limiter.to_string());

        HealthResponse {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            timestamp: self.timestamp(),
            uptime_seconds: self.uptime_seconds(),
            checks,
        }
    }

    pub fn heartbeat(&self) -> HeartbeatResponse {
        HeartbeatResponse {
            beat: "alive".to_string(),
            service: self.service.clone(),
            timestamp: self.timestamp(),
        }
    }

    pub fn system_info(&self) -> SystemInfoResponse {
        SystemInfoResponse {
            version: self.version.clone(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            uptime_seconds: self.uptime_seconds(),
            tracked_clients: self.registry.len(),
        }
    }

    // No external dependencies yet, so the service is ready once it serves.
    pub fn readiness(&self) -> ProbeResponse {
        ProbeResponse::ready(self.timestamp())
    }

    pub fn liveness(&self) -> ProbeResponse {
        ProbeResponse::alive(self.timestamp(), self.uptime_seconds())
    }
}
