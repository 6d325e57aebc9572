use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{web, HttpResponse};
use futures::StreamExt;
use soprano_llm::TextChunk;
use tokio::sync::mpsc;

use super::generate::{prepare, GenerateRequest};
use crate::error::{AppError, Result};
use crate::state::AppState;

fn sse_frame(payload: &serde_json::Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", payload))
}

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Stream the reply as SSE `data:` frames, ending with `data: [DONE]`.
pub async fn handler(
    state: web::Data<AppState>,
    request: web::Json<GenerateRequest>,
) -> Result<HttpResponse> {
    let prepared = prepare(&state, request.into_inner()).await?;
    let request_id = prepared.request_id;

    let mut tokens = prepared
        .generator
        .complete_stream(&prepared.prompt.text, &prepared.params)
        .await
        .map_err(|e| {
            log::error!("[{}] Failed to start stream: {}", request_id, e);
            AppError::Generation(e)
        })?;

    let (sse_tx, mut sse_rx) = mpsc::channel::<Bytes>(100);
    let permit = prepared.permit;

    tokio::spawn(async move {
        let _permit = permit;
        let mut token_count = 0usize;

        while let Some(item) = tokens.next().await {
            let frame = match item {
                Ok(TextChunk::Token(token)) => {
                    let token = if token_count == 0 {
                        token.trim_start().to_string()
                    } else {
                        token
                    };
                    if token.is_empty() {
                        continue;
                    }
                    token_count += 1;
                    sse_frame(&serde_json::json!({ "token": token }))
                }
                Ok(TextChunk::Done) => break,
                Err(e) => {
                    log::error!("[{}] Stream error: {}", request_id, e);
                    let _ = sse_tx
                        .send(sse_frame(&serde_json::json!({ "error": e.to_string() })))
                        .await;
                    break;
                }
            };

            if sse_tx.send(frame).await.is_err() {
                log::info!("[{}] Client disconnected after {} tokens", request_id, token_count);
                return;
            }
        }

        let _ = sse_tx.send(Bytes::from_static(DONE_FRAME)).await;
        log::info!("[{}] Stream completed: {} tokens", request_id, token_count);
    });

    Ok(HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(async_stream::stream! {
            while let Some(item) = sse_rx.recv().await {
                yield Ok::<_, actix_web::Error>(item);
            }
        }))
}
