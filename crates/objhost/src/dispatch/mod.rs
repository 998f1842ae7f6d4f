//! Type-keyed message dispatch.
//!
//! A [`Dispatcher`] replaces a large `match` in a message reception method
//! with a handler table built at construction time. The table makes the set
//! of handled message types explicit, and handlers can be added or replaced
//! while the owner is running.
//!
//! The dispatcher is stateless across calls: it looks up the handler for the
//! message's type tag and invokes it synchronously. Messages without a
//! handler are reported as [`DispatchOutcome::Unhandled`] and otherwise
//! ignored, so peers speaking a newer protocol revision do not break older
//! receivers. Handler errors are returned to the caller untouched.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::trace;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// A message that carries its own type tag.
pub trait TypedMessage {
    /// Type tag used as the handler table key.
    type Type: Copy + Eq + Hash + fmt::Debug;

    /// Returns the type tag embedded in the message.
    fn message_type(&self) -> Self::Type;
}

impl TypedMessage for objhost_protocol::ScriptRequest {
    type Type = objhost_protocol::ScriptMessageType;

    fn message_type(&self) -> Self::Type {
        Self::message_type(self)
    }
}

/// The owner of a dispatcher, and the shape of its handlers.
///
/// Handlers receive the owner, a mutable context, the channel the message
/// arrived on and the message itself.
pub trait MessageReceiver {
    /// Message type dispatched.
    type Message: TypedMessage;
    /// Mutable state handed to every handler.
    type Context;
    /// Channel the message arrived on.
    type Channel;
    /// Error a handler may return.
    type Error;
}

/// Boxed handler for receiver `R`.
pub type Handler<R> = Box<
    dyn Fn(
        &R,
        &mut <R as MessageReceiver>::Context,
        &<R as MessageReceiver>::Channel,
        &<R as MessageReceiver>::Message,
    ) -> Result<(), <R as MessageReceiver>::Error>,
>;

type TypeOf<R> = <<R as MessageReceiver>::Message as TypedMessage>::Type;

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler was found and completed.
    Handled,
    /// No handler is registered for the message type.
    Unhandled,
}

impl DispatchOutcome {
    /// Returns `true` if a handler ran.
    #[must_use]
    pub const fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Handler table keyed by message type.
pub struct Dispatcher<R: MessageReceiver> {
    handlers: HashMap<TypeOf<R>, Handler<R>>,
}

impl<R: MessageReceiver> Dispatcher<R> {
    /// Creates a dispatcher from an initial handler mapping. Later entries
    /// replace earlier entries for the same type.
    #[must_use]
    pub fn new(handlers: impl IntoIterator<Item = (TypeOf<R>, Handler<R>)>) -> Self {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    /// Registers `handler` for `message_type`, replacing any previous one.
    pub fn add<F>(&mut self, message_type: TypeOf<R>, handler: F)
    where
        F: Fn(&R, &mut R::Context, &R::Channel, &R::Message) -> Result<(), R::Error> + 'static,
    {
        self.handlers.insert(message_type, Box::new(handler));
    }

    /// Removes the handler for `message_type`. Returns `true` if one existed.
    pub fn remove(&mut self, message_type: TypeOf<R>) -> bool {
        self.handlers.remove(&message_type).is_some()
    }

    /// Returns `true` if a handler is registered for `message_type`.
    #[must_use]
    pub fn handles(&self, message_type: TypeOf<R>) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes the handler registered for the message's type.
    ///
    /// # Errors
    ///
    /// Returns whatever error the handler returns.
    pub fn dispatch(
        &self,
        receiver: &R,
        context: &mut R::Context,
        channel: &R::Channel,
        message: &R::Message,
    ) -> Result<DispatchOutcome, R::Error> {
        let message_type = message.message_type();
        let Some(handler) = self.handlers.get(&message_type) else {
            trace!(target: DISPATCH_TARGET, ?message_type, "no handler registered");
            return Ok(DispatchOutcome::Unhandled);
        };
        handler(receiver, context, channel, message)?;
        Ok(DispatchOutcome::Handled)
    }
}

impl<R: MessageReceiver> Default for Dispatcher<R> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<R: MessageReceiver> fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
