//! Per-channel rules for collapsing the events that arrive between two reads.

mod policy;

pub use policy::{Retained, RetentionPolicy, TelemetryPolicies, apply};
