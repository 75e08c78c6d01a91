use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tuck_shared::Role;

// ============================================================================
// Metric Names
// ============================================================================

pub const TRANSITIONS_TOTAL: &str = "tuck_transitions_total";
pub const DELIVERIES_TOTAL: &str = "tuck_deliveries_total";
pub const DELIVERY_FAILURES_TOTAL: &str = "tuck_delivery_failures_total";
pub const STALE_LOCATIONS_TOTAL: &str = "tuck_stale_locations_total";
pub const SUBSCRIBERS: &str = "tuck_subscribers";

/// How a transition request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Accepted,
    Noop,
    Rejected,
    Failed,
}

impl TransitionOutcome {
    fn label(self) -> &'static str {
        match self {
            TransitionOutcome::Accepted => "accepted",
            TransitionOutcome::Noop => "noop",
            TransitionOutcome::Rejected => "rejected",
            TransitionOutcome::Failed => "failed",
        }
    }
}

// ============================================================================
// Engine Metrics
// ============================================================================

/// Counters and gauges owned by one engine instance, on a private registry
pub struct EngineMetrics {
    registry: Registry,
    transitions: IntCounterVec,
    deliveries: IntCounter,
    delivery_failures: IntCounter,
    stale_locations: IntCounter,
    subscribers: IntGaugeVec,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let transitions = IntCounterVec::new(
            Opts::new(TRANSITIONS_TOTAL, "Lifecycle transition requests by outcome"),
            &["outcome"],
        )?;
        let deliveries = IntCounter::new(DELIVERIES_TOTAL, "Frames queued to subscribers")?;
        let delivery_failures = IntCounter::new(
            DELIVERY_FAILURES_TOTAL,
            "Frames dropped because the subscriber was full or gone",
        )?;
        let stale_locations = IntCounter::new(
            STALE_LOCATIONS_TOTAL,
            "Location readings discarded as older than the latest",
        )?;
        let subscribers = IntGaugeVec::new(
            Opts::new(SUBSCRIBERS, "Live subscriptions by role"),
            &["role"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(delivery_failures.clone()))?;
        registry.register(Box::new(stale_locations.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;

        Ok(Self {
            registry,
            transitions,
            deliveries,
            delivery_failures,
            stale_locations,
            subscribers,
        })
    }

    pub fn record_transition(&self, outcome: TransitionOutcome) {
        self.transitions.with_label_values(&[outcome.label()]).inc();
    }

    pub fn record_deliveries(&self, delivered: usize, failed: usize) {
        self.deliveries.inc_by(delivered as u64);
        self.delivery_failures.inc_by(failed as u64);
    }

    pub fn record_stale_location(&self) {
        self.stale_locations.inc();
    }

    pub fn subscriber_joined(&self, role: Role) {
        self.subscribers.with_label_values(&[role.as_str()]).inc();
    }

    pub fn subscriber_left(&self, role: Role) {
        self.subscribers.with_label_values(&[role.as_str()]).dec();
    }

    pub fn transitions(&self, outcome: TransitionOutcome) -> u64 {
        self.transitions.with_label_values(&[outcome.label()]).get()
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.get()
    }

    pub fn stale_locations(&self) -> u64 {
        self.stale_locations.get()
    }

    /// Text exposition format for the `/metrics` endpoint
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
