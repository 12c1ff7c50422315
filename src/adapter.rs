//! Adapter orchestration.
//!
//! The two entry points compose the translators with the injected
//! transport: translate the client request, call upstream, translate the
//! result back. Both are stateless across requests; streaming state lives
//! inside the per-call fold.

use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::error::RelayError;
use crate::schema::anthropic::StreamEvent;
use crate::schema::openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::transforms::{self, StreamTranslator, translate_request, translate_response};
use crate::upstream::UpstreamClient;

/// Buffered mode: one request in, one response out.
pub async fn process_request(
    upstream: &UpstreamClient,
    req: ChatCompletionRequest,
) -> Result<ChatCompletionResponse, RelayError> {
    let request = translate_request(req)?;
    let response = upstream.send(&request).await?;
    Ok(translate_response(response))
}

/// Streaming mode: returns a pull-based chunk sequence.
///
/// Errors returned here happened before any chunk was produced and can
/// still change the HTTP status; errors inside the stream arrive after
/// headers are committed. The stream ends after the terminal chunk or the
/// first error; dropping it cancels the upstream call.
pub async fn process_streaming_request(
    upstream: &UpstreamClient,
    req: ChatCompletionRequest,
) -> Result<BoxStream<'static, Result<ChatCompletionChunk, RelayError>>, RelayError> {
    let mut request = translate_request(req)?;
    request.stream = Some(true);

    let model = request.model.clone();
    let mut events = upstream.send_streaming(&request).await?;
    let mut fold = StreamTranslator::new(&model, transforms::now_secs());

    let chunks = stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let is_stop = matches!(event, StreamEvent::MessageStop);
                    match fold.handle(event) {
                        Ok(out) => {
                            for chunk in out {
                                yield Ok(chunk);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    if is_stop {
                        return;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    };

    Ok(chunks.boxed())
}
