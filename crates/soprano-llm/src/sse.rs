//! Shared SSE -> [`TextStream`] adapter.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Response;

use crate::provider::{LLMError, Result, TextChunk, TextStream};

fn to_stream_error(err: LLMError) -> LLMError {
    match err {
        LLMError::Stream(msg) => LLMError::Stream(msg),
        other => LLMError::Stream(other.to_string()),
    }
}

/// Convert an SSE HTTP [`Response`] into a [`TextStream`].
///
/// `handler` receives the SSE event name and data payload for each event, and can either:
/// - return `Ok(Some(chunk))` to emit a chunk
/// - return `Ok(None)` to skip an event
/// - return `Err(_)` to emit a stream error (mapped to `LLMError::Stream`)
///
/// The stream always finishes with exactly one [`TextChunk::Done`]: either
/// the one the handler emits or one appended when the body ends without it.
pub fn text_stream_from_sse<H>(response: Response, mut handler: H) -> TextStream
where
    H: FnMut(&str, &str) -> Result<Option<TextChunk>> + Send + 'static,
{
    let mut finished = false;
    let events = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| LLMError::Stream(e.to_string()))?;
            handler(event.event.as_str(), event.data.as_str()).map_err(to_stream_error)
        })
        .filter_map(|result| async move {
            match result {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        })
        .chain(futures::stream::once(async { Ok(TextChunk::Done) }))
        .take_while(move |item| {
            let keep = !finished;
            if matches!(item, Ok(TextChunk::Done)) {
                finished = true;
            }
            futures::future::ready(keep)
        });

    Box::pin(events)
}
