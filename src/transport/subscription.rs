//! Pull-based view over a server-sent-event stream.
//!
//! [`RequestBuilder::subscribe`](crate::RequestBuilder::subscribe) runs the
//! streaming call on a background task and forwards each event into a bounded
//! channel. A full channel pauses the task, so the body is read no faster than
//! events are consumed.
//! [`EventStream`] is the receiving end and implements [`Stream`], so the usual
//! `StreamExt` combinators apply.
//!
//! # Lifecycle
//!
//! 1. Created by `RequestBuilder::subscribe()`
//! 2. Yields `Ok(data)` per event, in stream order
//! 3. Yields one `Err(..)` if the call fails, then ends
//! 4. Ends (`None`) on `[DONE]` or end of body
//!
//! Dropping the `EventStream` aborts the background task, closing the
//! connection.
//!
//! # Examples
//!
//! ```ignore
//! use rest_chain::{Method, RequestBuilder, RequestContext};
//! use futures::StreamExt;
//!
//! let mut events = RequestBuilder::new()
//!     .payload(&serde_json::json!({"prompt": "hi"}))
//!     .subscribe(RequestContext::background(), Method::POST, "http://localhost:8080/chat")
//!     .await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{}", event?);
//! }
//! ```

use crate::error::Result;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// Stream of event payloads from a server-sent-event response
pub struct EventStream {
    receiver: ReceiverStream<Result<String>>,
    task: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Create a stream from a receiver channel and the task feeding it.
    ///
    /// This is typically called internally by `RequestBuilder::subscribe()`.
    pub fn new(receiver: mpsc::Receiver<Result<String>>, task: Option<JoinHandle<()>>) -> Self {
        EventStream {
            receiver: ReceiverStream::new(receiver),
            task,
        }
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(data))` - An event was received
    /// - `Some(Err(RestError))` - The streaming call failed
    /// - `None` - The stream has ended
    pub async fn next(&mut self) -> Option<Result<String>> {
        futures::StreamExt::next(&mut self.receiver).await
    }
}

impl Stream for EventStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
