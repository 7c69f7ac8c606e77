//! Chat backend contract: outbound sends + the inbound event stream.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{ChannelId, InboundEvent, ThreadRef};

pub mod slack;

pub use slack::SlackTransport;

/// Buffer for the inbound event channel handed to subscribers.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One chat backend. Exactly one implementation is active at a time; the
/// coordinator reaches it only through this seam.
pub trait Transport: Send + Sync + 'static {
    /// Post `text` into `destination`. With no `thread`, a new thread is
    /// opened and its reference returned; with `Some(thread)`, the text is
    /// posted as a reply in that thread and the same reference returned.
    fn send(
        &self,
        destination: &ChannelId,
        text: &str,
        thread: Option<&ThreadRef>,
    ) -> impl Future<Output = Result<ThreadRef, TransportError>> + Send;

    /// Open the inbound event stream. The stream is lazy and infinite; it
    /// ends only when the transport shuts down or the receiver is dropped.
    /// Duplicate and out-of-order events are allowed; consumers must treat
    /// events for settled sessions as no-ops.
    fn subscribe(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<InboundEvent>, TransportError>> + Send;
}
