//! Core value types shared by the builder and the transports.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ContentType`] | Declared body encoding |
//! | [`PreparedRequest`] | Fully resolved request handed to a transport |
//! | [`Response`] | Buffered response (status, headers, body) |
//! | [`StreamResponse`] | Response metadata for an event stream |
//! | [`RequestContext`] | Deadline and cancellation for one call |

mod content_type;
mod context;
mod request;
mod response;

pub use content_type::ContentType;
pub use context::{CancelHandle, RequestContext};
pub use request::PreparedRequest;
pub use response::{Response, StreamResponse};

pub(crate) use response::status_text;
