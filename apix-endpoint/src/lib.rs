pub mod cache_endpoints;
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod response;

pub use cache_endpoints::register_cache_endpoints;
pub use dispatcher::{EndpointDispatcher, endpoint_layer};
pub use handler::{AsyncResultHandler, HandlerError, HandlerFactory, SyncResultHandler};
pub use registry::{Branch, EndpointRegistry, Matcher};
pub use response::no_cache_response;
