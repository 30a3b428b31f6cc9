use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Outcome label for `apix_api_log_events_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Written,
    Failed,
    Dropped,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Written => "written",
            LogOutcome::Failed => "failed",
            LogOutcome::Dropped => "dropped",
        }
    }
}

/// Metrics collector. All counters are gated behind `enabled`.
///
/// When disabled no registry is created and every `record_*` call returns
/// immediately.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub api_log_events_total: Option<IntCounterVec>,
    pub endpoint_requests_total: Option<IntCounterVec>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> Result<Self, prometheus::Error> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let api_log_events_total = IntCounterVec::new(
            Opts::new("api_log_events_total", "API log events by outcome").namespace("apix"),
            &["outcome"],
        )?;

        let endpoint_requests_total = IntCounterVec::new(
            Opts::new(
                "endpoint_requests_total",
                "Requests served by dynamic endpoints",
            )
            .namespace("apix"),
            &["endpoint", "outcome"],
        )?;

        registry.register(Box::new(api_log_events_total.clone()))?;
        registry.register(Box::new(endpoint_requests_total.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            api_log_events_total: Some(api_log_events_total),
            endpoint_requests_total: Some(endpoint_requests_total),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            api_log_events_total: None,
            endpoint_requests_total: None,
        }
    }

    #[inline]
    pub fn record_log_event(&self, outcome: LogOutcome) {
        if let Some(ref counter) = self.api_log_events_total {
            counter.with_label_values(&[outcome.as_str()]).inc();
        }
    }

    #[inline]
    pub fn record_endpoint(&self, endpoint: &str, ok: bool) {
        if let Some(ref counter) = self.endpoint_requests_total {
            let outcome = if ok { "ok" } else { "failed" };
            counter.with_label_values(&[endpoint, outcome]).inc();
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::disabled()
    }
}
