//! Fixed-size re-chunking of byte streams.
//!
//! Network bodies arrive in whatever chunk sizes the transport
//! produces. Downstream consumers expect uniform frames, so incoming
//! bytes are buffered and drained in fixed-size pieces; the remainder
//! is flushed when the input ends.

use anyhow::Result;
use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures::{pin_mut, Stream, StreamExt};

/// Re-chunk `input` into frames of exactly `size` bytes.
///
/// The final frame may be shorter. Concatenating all frames
/// reconstructs the input byte-for-byte. Errors from the input stream
/// propagate and end the output.
pub fn rechunk<S>(input: S, size: usize) -> impl Stream<Item = Result<Bytes>>
where
    S: Stream<Item = Result<Bytes>>,
{
    assert!(size > 0, "chunk size must be non-zero");
    try_stream! {
        pin_mut!(input);
        let mut buffer = BytesMut::new();
        while let Some(chunk) = input.next().await {
            buffer.extend_from_slice(&chunk?);
            while buffer.len() >= size {
                yield buffer.split_to(size).freeze();
            }
        }
        if !buffer.is_empty() {
            yield buffer.freeze();
        }
    }
}
