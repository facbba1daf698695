//! Stock event handlers.

mod app;
mod enrich;
mod forward;

pub use app::AppLifecycleHandler;
pub use enrich::{ACCESS_TOKEN_HEADER, AdminApi, EnrichingHandler, EnrichmentQuery};
pub use forward::ForwardingHandler;
