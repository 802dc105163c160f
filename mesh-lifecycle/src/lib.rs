//! Typed pluggable services: dependency-ordered startup/shutdown, health,
//! hot reload, and bounded per-service metrics (spec.md §4.5).

mod dag;
mod manager;
mod metrics;
mod service;

pub use dag::topological_order;
pub use manager::LifecycleManager;
pub use metrics::{MetricsBag, MetricsSnapshot, TimerSnapshot};
pub use service::{Service, ServiceInfo, ServiceInstance, ServiceStatus};
