//! Notification delivery: engine, transports, backoff, sweeper, workers.

mod backoff;
mod email;
mod engine;
mod http;
mod sweeper;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use email::{EmailConfig, EmailTransport};
pub use engine::{
    BatchSubmitOutcome, DeliveryEngine, ExpiryAlerter, SubmitRequest, TracingAlerter,
};
pub use http::{ApiTransport, FormTransport, WebhookTransport};
pub use sweeper::{RetrySweeper, SweepStats, WorkerPool};
pub use transport::{
    DeliveryTarget, DispatchEnvelope, DispatchOutcome, Transport, TransportError,
    TransportRegistry,
};

#[cfg(test)]
pub use transport::MockTransport;
