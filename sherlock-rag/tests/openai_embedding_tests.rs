//! `OpenAIEmbeddingProvider` against a local axum server.

#![cfg(feature = "openai")]

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use sherlock_rag::openai::OpenAIEmbeddingProvider;
use sherlock_rag::{EmbeddingProvider, RagError};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

/// Returns one 2-d vector per input, `[position, length]`, in reverse order.
async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let mut data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let len = text.as_str().map_or(0, str::len);
            json!({"object": "embedding", "index": i, "embedding": [i as f32, len as f32]})
        })
        .collect();
    data.reverse();
    Json(json!({"object": "list", "data": data, "model": body["model"]}))
}

async fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "Incorrect API key provided"}}))).into_response()
}

#[tokio::test]
async fn batch_is_returned_in_input_order() {
    let base = spawn(Router::new().route("/v1/embeddings", post(embeddings))).await;
    let provider = OpenAIEmbeddingProvider::new("test-key").unwrap().with_base_url(base).with_dimensions(2);

    let vectors = provider.embed_batch(&["a", "bbb", "cc"]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 3.0], vec![2.0, 2.0]]);
    assert_eq!(provider.dimensions(), 2);
}

#[tokio::test]
async fn api_error_message_is_surfaced() {
    let base = spawn(Router::new().route("/v1/embeddings", post(unauthorized))).await;
    let provider = OpenAIEmbeddingProvider::new("wrong").unwrap().with_base_url(base);

    let err = provider.embed("hello").await.unwrap_err();
    assert_eq!(err.stage(), "embedding");
    match err {
        RagError::EmbeddingUnavailable { provider, message } => {
            assert_eq!(provider, "openai");
            assert!(message.contains("401"), "{message}");
            assert!(message.contains("Incorrect API key provided"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
