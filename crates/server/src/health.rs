//! `/health` aggregation (spec §6, §7: "A component's health status
//! reports running/connected/degraded independently; `/health` aggregates
//! (unhealthy iff any critical dependency is missing a connection).").

use dashmap::DashMap;
use marketflow_model::HealthReport;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    /// The HTTP status this maps to (spec §6: "200 for healthy/degraded,
    /// 503 for unhealthy").
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Healthy | Self::Degraded => 200,
            Self::Unhealthy => 503,
        }
    }
}

/// Collects the latest [`HealthReport`] per component (spec §4.2 step 6's
/// `system:health` publications) and aggregates them.
#[derive(Debug, Default)]
pub struct HealthAggregator {
    components: DashMap<String, HealthReport>,
}

impl HealthAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: HealthReport) {
        self.components.insert(report.component.clone(), report);
    }

    #[must_use]
    pub fn snapshot(&self) -> std::collections::HashMap<String, HealthReport> {
        self.components.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    /// `unhealthy` if any component is disconnected while it should be
    /// running; `degraded` if any is running but not connected; else
    /// `healthy`. A component that has never reported is not counted —
    /// absence isn't failure until the collector has had a chance to run.
    #[must_use]
    pub fn overall(&self) -> OverallStatus {
        let mut degraded = false;
        for entry in &self.components {
            let report = entry.value();
            if report.running && !report.connected {
                return OverallStatus::Unhealthy;
            }
            if !report.running {
                degraded = true;
            }
        }
        if degraded {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(component: &str, running: bool, connected: bool) -> HealthReport {
        HealthReport {
            component: component.to_string(),
            running,
            connected,
            trades_received: 0,
            errors: 0,
            reconnects: 0,
            cb_state: "Closed".to_string(),
            uptime_secs: 0,
        }
    }

    #[test]
    fn healthy_when_everything_connected() {
        let agg = HealthAggregator::new();
        agg.record(report("collector-a", true, true));
        agg.record(report("collector-b", true, true));
        assert_eq!(agg.overall(), OverallStatus::Healthy);
    }

    #[test]
    fn unhealthy_when_a_running_component_is_disconnected() {
        let agg = HealthAggregator::new();
        agg.record(report("collector-a", true, true));
        agg.record(report("collector-b", true, false));
        assert_eq!(agg.overall(), OverallStatus::Unhealthy);
    }

    #[test]
    fn degraded_when_a_component_is_stopped_but_none_disconnected() {
        let agg = HealthAggregator::new();
        agg.record(report("collector-a", true, true));
        agg.record(report("collector-b", false, false));
        assert_eq!(agg.overall(), OverallStatus::Degraded);
    }
}
