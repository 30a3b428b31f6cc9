use apix_core::error::ApixError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by an endpoint handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The resolved path is not one this handler understands.
    #[error("Invalid path for {handler}: {path}")]
    InvalidPath { handler: &'static str, path: String },

    /// The factory could not produce a handler instance.
    #[error("Could not resolve handler {handler}")]
    Unresolved { handler: &'static str },

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Apix(#[from] ApixError),
}

/// Endpoint handler that produces its result synchronously.
///
/// A fresh instance is created for every matching request.
pub trait SyncResultHandler: Send {
    /// Receives the matched path before `get_result`. Path-aware handlers
    /// validate it here and return `InvalidPath` when it is unusable.
    fn set_path(&mut self, path: &str) -> Result<(), HandlerError> {
        let _ = path;
        Ok(())
    }

    /// `None` is rendered as `"Empty content"`.
    fn get_result(&mut self) -> Result<Option<String>, HandlerError>;
}

/// Endpoint handler that produces its result asynchronously.
#[async_trait]
pub trait AsyncResultHandler: Send {
    fn set_path(&mut self, path: &str) -> Result<(), HandlerError> {
        let _ = path;
        Ok(())
    }

    async fn get_result(&mut self) -> Result<Option<String>, HandlerError>;
}

pub type SyncFactory = Arc<dyn Fn() -> Option<Box<dyn SyncResultHandler>> + Send + Sync>;
pub type AsyncFactory = Arc<dyn Fn() -> Option<Box<dyn AsyncResultHandler>> + Send + Sync>;

/// Per-request handler constructor, tagged with the handler's shape.
///
/// A factory returning `None` means no instance could be resolved for the
/// request.
#[derive(Clone)]
pub enum HandlerFactory {
    Sync(SyncFactory),
    Async(AsyncFactory),
}

impl HandlerFactory {
    pub fn sync<F, H>(factory: F) -> Self
    where
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: SyncResultHandler + 'static,
    {
        HandlerFactory::Sync(Arc::new(move || {
            factory().map(|h| Box::new(h) as Box<dyn SyncResultHandler>)
        }))
    }

    pub fn r#async<F, H>(factory: F) -> Self
    where
        F: Fn() -> Option<H> + Send + Sync + 'static,
        H: AsyncResultHandler + 'static,
    {
        HandlerFactory::Async(Arc::new(move || {
            factory().map(|h| Box::new(h) as Box<dyn AsyncResultHandler>)
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HandlerFactory::Sync(_) => "sync",
            HandlerFactory::Async(_) => "async",
        }
    }
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerFactory::{}", self.kind())
    }
}
