//! Observability for the signaling relay.
//!
//! All instrumentation skips payloads and credentials. Identities and room ids
//! appear in log fields, never in metric labels.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `sg_connections_active` | Gauge | none |
//! | `sg_rooms_active` | Gauge | none |
//! | `sg_actor_mailbox_depth` | Gauge | none |
//! | `sg_joins_total` | Counter | `outcome` |
//! | `sg_messages_relayed_total` | Counter | `kind` |
//! | `sg_messages_dropped_total` | Counter | `reason` |
//! | `sg_calls_ended_total` | Counter | `reason` |
//! | `sg_auth_gate_duration_seconds` | Histogram | `outcome` |

pub mod health;
pub mod metrics;
pub mod rooms;

pub use health::{health_router, HealthState};
pub use rooms::rooms_router;
