pub mod broker;
pub mod engine;
pub mod metrics;
pub mod reconcile;
pub mod registry;
pub mod relay;

pub use broker::{DeliveryReport, Event, EventBroker};
pub use engine::{Connection, Engine, EngineSettings, TransitionReply};
pub use metrics::{EngineMetrics, TransitionOutcome};
pub use reconcile::Reconciler;
pub use registry::{Registry, Selector, Subscription, SubscriptionId, Target};
pub use relay::{LocationOutcome, LocationRelay};
