//! Represents an object (blob) flowing into the store.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;

/// Streaming body of an object being uploaded.
///
/// Chunks are forwarded to the store as they arrive; the total length is not
/// known up front.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Size in bytes of every object on this page.
    pub sizes: Vec<u64>,

    /// Token for the next page, `None` on the last one.
    pub next_continuation_token: Option<String>,
}
