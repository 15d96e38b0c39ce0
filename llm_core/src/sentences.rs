//! Sentence re-buffering for token streams.
//!
//! Completion tokens arrive at arbitrary boundaries, not aligned to
//! words or sentences. For the text-streaming endpoint we forward whole
//! sentences only, each framed with a trailing newline.

use anyhow::Result;
use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};

/// Characters that end a sentence.
pub const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Re-buffer a fragment stream into complete sentences.
///
/// Fragments are appended to an accumulator; whenever the accumulator
/// ends with a terminator, it is emitted with a trailing `\n` and
/// cleared. Only the final character is inspected: there is no
/// abbreviation or decimal handling, and a terminator in the middle of
/// a fragment does not flush. A trailing remainder with no terminator
/// is dropped when the input ends.
pub fn sentences<S>(fragments: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<String>>,
{
    try_stream! {
        pin_mut!(fragments);
        let mut sentence = String::new();
        while let Some(fragment) = fragments.next().await {
            sentence.push_str(&fragment?);
            if sentence.ends_with(TERMINATORS) {
                sentence.push('\n');
                yield std::mem::take(&mut sentence);
            }
        }
    }
}
