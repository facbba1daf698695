//! Inbound webhook handling for storelink.
//!
//! This crate provides:
//!
//! - **Signatures**: HMAC-SHA256 verification over the raw delivery body
//! - **Events**: header parsing and topic namespaces
//! - **Dispatcher**: a namespace-keyed registry of [`EventHandler`]s that never fails
//! - **Delivery**: the verify-then-dispatch state machine with error reporting
//! - **Stock handlers**: app lifecycle (credential revocation), and forwarding to an
//!   [`EventSink`] with optional Admin API enrichment

pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod handlers;
pub mod signature;
pub mod sink;

pub use delivery::{Delivery, DeliveryReport, DeliveryState};
pub use dispatcher::EventDispatcher;
pub use error::{EventError, HandlerError, SinkError};
pub use event::{EventMetadata, InboundEvent, namespace_of};
pub use handler::{EventHandler, HandlerOutcome};
pub use handlers::{
    ACCESS_TOKEN_HEADER, AdminApi, AppLifecycleHandler, EnrichingHandler, EnrichmentQuery,
    ForwardingHandler,
};
pub use signature::{compute_signature, verify_signature};
pub use sink::{EventSink, ForwardedEvent, MemorySink};
