use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Liveness reporting for the long-running loops of a service.
///
/// Each loop registers itself with a deadline and must call
/// [`HealthHandle::report_healthy`] more often than that deadline, or the
/// process-level liveness probe starts failing. The probe only goes green
/// once every registered component has reported at least once.
#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Registered but has not reported yet.
    Starting,
    /// Reported healthy, valid until the contained instant.
    HealthyUntil(Instant),
    /// Explicitly reported unhealthy.
    Unhealthy,
    /// Failed to report again before its deadline.
    Stalled,
}

impl ComponentStatus {
    fn current(&self, now: Instant) -> ComponentStatus {
        match self {
            ComponentStatus::HealthyUntil(until) if *until <= now => ComponentStatus::Stalled,
            other => other.clone(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentStatus::HealthyUntil(until) if *until > Instant::now())
    }
}

/// The overall status of the process, as reported by the liveness endpoint.
#[derive(Debug, Default)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// 200 when every component is healthy, 500 otherwise. The body lists
    /// each component status for debugging.
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

/// Handle held by a registered component to report its own status.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl HealthHandle {
    /// Report healthy until `deadline` from now. Must be called more
    /// frequently than the deadline the component registered with.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(Instant::now() + self.deadline));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut components) => {
                components.insert(self.component.clone(), status);
            }
            // Poisoned lock: just warn, the probe will fail and the process restart
            Err(_) => warn!("poisoned HealthRegistry lock"),
        }
    }
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a component. The returned handle should be passed to the
    /// component so it can report its health frequently.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Computes the process status from all registered components. Usable
    /// directly as an axum handler through `HealthStatus: IntoResponse`.
    pub fn get_status(&self) -> HealthStatus {
        let components = self
            .components
            .read()
            .expect("poisoned HealthRegistry lock");

        let now = Instant::now();
        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, component) in components.iter() {
            let current = component.current(now);
            if !matches!(current, ComponentStatus::HealthyUntil(_)) {
                status.healthy = false;
            }
            status.components.insert(name.clone(), current);
        }

        if !status.healthy {
            warn!("{} health check failed: {:?}", self.name, status.components);
        }
        status
    }
}
