//! Handler capability contract.
//!
//! Business logic plugs into the consumption loop through
//! [`MessageHandler`]: one operation that takes a payload and either
//! succeeds or reports an error.

use crate::envelope::Payload;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`MessageHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Single-method capability invoked for every admitted message.
///
/// # Example
///
/// ```
/// use stream_bus_core::handler::{HandlerFuture, MessageHandler};
/// use stream_bus_core::envelope::Payload;
///
/// struct ImageResultHandler;
///
/// impl MessageHandler for ImageResultHandler {
///     fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a> {
///         Box::pin(async move {
///             let Some(kind) = payload.get("type") else {
///                 anyhow::bail!("payload has no type");
///             };
///             println!("processing {kind}");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait MessageHandler: Send + Sync {
    /// Process one payload.
    ///
    /// # Errors
    ///
    /// Any error is reported to the operator and the message is left
    /// unacknowledged.
    fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
///
/// ```
/// use stream_bus_core::handler::handler_fn;
///
/// let handler = handler_fn(|payload| async move {
///     println!("{payload:?}");
///     Ok::<_, anyhow::Error>(())
/// });
/// # let _ = handler;
/// ```
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a [`MessageHandler`]; `f` receives an owned copy of the payload.
pub const fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a> {
        Box::pin((self.f)(payload.clone()))
    }
}
