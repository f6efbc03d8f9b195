use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Html,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use sitevault_core::{
    envelope::{Codec, EnvelopeError, PlainValue},
    storage::RecordSummary,
};
use sitevault_site::StoreReceipt;

use crate::{error::ApiError, AppState};

const INDEX_HTML: &str = r#"<h1>Encrypted Site Data API</h1>
<p>Endpoints:</p>
<ul>
    <li>POST /encrypt - Encrypt data</li>
    <li>POST /decrypt - Decrypt data</li>
    <li>POST /site-data - Store encrypted data</li>
    <li>GET /site-data - List all data</li>
    <li>GET /site-data/{id} - Retrieve specific data</li>
    <li>DELETE /site-data/{id} - Delete data</li>
</ul>
"#;

#[derive(Debug, Serialize)]
pub struct EncryptResponse {
    encrypted_data: String,
    original_data: Value,
}

#[derive(Debug, Serialize)]
pub struct DecryptResponse {
    decrypted_data: Value,
    encrypted_data: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "backend": state.site.sealed().backend() }))
}

pub async fn encrypt(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EncryptResponse>, ApiError> {
    let body = json_body(body)?;
    let data =
        required(&body, "data").ok_or_else(|| ApiError::bad_request("Data field is required."))?;

    let plain = match &data {
        Value::String(text) => PlainValue::Text(text.clone()),
        other => PlainValue::Json(other.clone()),
    };
    let encrypted_data = run_codec(&state.codec, move |codec| codec.encrypt(&plain)).await?;
    Ok(Json(EncryptResponse {
        encrypted_data,
        original_data: data,
    }))
}

pub async fn decrypt(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let body = json_body(body)?;
    let encrypted_data = match required(&body, "encrypted_data") {
        Some(Value::String(envelope)) => envelope,
        _ => return Err(ApiError::bad_request("encrypted_data field is required.")),
    };

    let envelope = encrypted_data.clone();
    let plain = run_codec(&state.codec, move |codec| codec.decrypt(&envelope)).await?;
    Ok(Json(DecryptResponse {
        decrypted_data: plain.into_json(),
        encrypted_data,
    }))
}

pub async fn store_site_data(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<StoreReceipt>, ApiError> {
    let body = json_body(body)?;
    let missing = || ApiError::bad_request("Both 'data_id' and 'data' fields are required.");
    let data_id = match required(&body, "data_id") {
        Some(Value::String(id)) => id,
        _ => return Err(missing()),
    };
    let data = required(&body, "data").ok_or_else(missing)?;
    let notes = body
        .get("notes")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Json(state.site.store_site_data(&data_id, data, notes).await?))
}

pub async fn list_site_data(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecordSummary>>, ApiError> {
    Ok(Json(state.site.list_all_data().await?))
}

pub async fn retrieve_site_data(
    State(state): State<AppState>,
    Path(data_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let plain = state.site.retrieve_site_data(&data_id).await?;
    Ok(Json(plain.into_json()))
}

pub async fn delete_site_data(
    State(state): State<AppState>,
    Path(data_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.site.delete_site_data(&data_id).await?;
    Ok(Json(MessageResponse { message }))
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value @ Value::Object(_))) => Ok(value),
        _ => Err(ApiError::bad_request("Request body must be in JSON format.")),
    }
}

/// Field value unless it is absent, null, or empty.
fn required(body: &Value, field: &str) -> Option<Value> {
    match body.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        value => Some(value.clone()),
    }
}

/// Key derivation is CPU-bound; keep it off the async workers.
async fn run_codec<T, F>(codec: &Arc<Codec>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Codec) -> Result<T, EnvelopeError> + Send + 'static,
    T: Send + 'static,
{
    let codec = Arc::clone(codec);
    tokio::task::spawn_blocking(move || op(&codec))
        .await
        .map_err(|_| ApiError::internal("internal error"))?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use sitevault_core::storage::InMemoryRecordStore;

    use super::*;
    use crate::router;

    fn test_server() -> TestServer {
        let codec = Arc::new(Codec::with_iterations("test_passcode_123", 1_000).unwrap());
        let state = AppState::new(codec, Arc::new(InMemoryRecordStore::new()));
        TestServer::new(router(state)).expect("test server")
    }

    #[tokio::test]
    async fn index_and_health() {
        let server = test_server();
        let index = server.get("/").await;
        index.assert_status_ok();
        assert!(index.text().contains("/site-data"));

        let health = server.get("/health").await;
        health.assert_status_ok();
        assert_eq!(
            health.json::<Value>(),
            json!({"status": "ok", "backend": "memory"})
        );
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_text() {
        let server = test_server();
        let encrypted = server
            .post("/encrypt")
            .json(&json!({"data": "This is a secret message"}))
            .await;
        encrypted.assert_status_ok();
        let body = encrypted.json::<Value>();
        assert_eq!(body["original_data"], "This is a secret message");
        let envelope = body["encrypted_data"].as_str().unwrap().to_string();

        let decrypted = server
            .post("/decrypt")
            .json(&json!({"encrypted_data": envelope}))
            .await;
        decrypted.assert_status_ok();
        let body = decrypted.json::<Value>();
        assert_eq!(body["decrypted_data"], "This is a secret message");
        assert_eq!(body["encrypted_data"], envelope);
    }

    #[tokio::test]
    async fn encrypt_structured_data_round_trips_as_json() {
        let server = test_server();
        let original = json!({"key": "value", "number": 42, "list": [1, 2, 3]});
        let envelope = server
            .post("/encrypt")
            .json(&json!({"data": original}))
            .await
            .json::<Value>()["encrypted_data"]
            .as_str()
            .unwrap()
            .to_string();

        let body = server
            .post("/decrypt")
            .json(&json!({"encrypted_data": envelope}))
            .await
            .json::<Value>();
        assert_eq!(body["decrypted_data"], original);
    }

    #[tokio::test]
    async fn encrypt_rejects_bad_requests() {
        let server = test_server();
        let missing = server.post("/encrypt").json(&json!({"other": 1})).await;
        missing.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            missing.json::<Value>(),
            json!({"error": "Data field is required."})
        );

        let empty = server.post("/encrypt").json(&json!({"data": ""})).await;
        empty.assert_status(StatusCode::BAD_REQUEST);

        let not_json = server.post("/encrypt").text("data=hello").await;
        not_json.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            not_json.json::<Value>()["error"],
            "Request body must be in JSON format."
        );
    }

    #[tokio::test]
    async fn decrypt_failures_are_bad_requests() {
        let server = test_server();
        let missing = server.post("/decrypt").json(&json!({})).await;
        missing.assert_status(StatusCode::BAD_REQUEST);

        let garbage = server
            .post("/decrypt")
            .json(&json!({"encrypted_data": "!!not-base64!!"}))
            .await;
        garbage.assert_status(StatusCode::BAD_REQUEST);
        assert!(garbage.json::<Value>()["error"]
            .as_str()
            .unwrap()
            .starts_with("Decryption failed"));

        let forged = server
            .post("/decrypt")
            .json(&json!({"encrypted_data": STANDARD.encode([7u8; 64])}))
            .await;
        forged.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(forged.json::<Value>()["error"], "Decryption failed");
    }

    #[tokio::test]
    async fn site_data_lifecycle() {
        let server = test_server();
        let stored = server
            .post("/site-data")
            .json(&json!({
                "data_id": "homepage_content",
                "data": "{\"title\": \"Welcome\"}",
                "notes": "Homepage content and features"
            }))
            .await;
        stored.assert_status_ok();
        assert_eq!(
            stored.json::<Value>(),
            json!({"message": "Data stored as homepage_content.enc", "id": "homepage_content"})
        );

        let listed = server.get("/site-data").await;
        listed.assert_status_ok();
        assert_eq!(
            listed.json::<Value>(),
            json!([{
                "id": "homepage_content",
                "filename": "homepage_content.enc",
                "path": "memory:homepage_content"
            }])
        );

        let fetched = server.get("/site-data/homepage_content").await;
        fetched.assert_status_ok();
        let body = fetched.json::<Value>();
        assert_eq!(body["data"], "{\"title\": \"Welcome\"}");
        assert_eq!(body["notes"], "Homepage content and features");
        assert!(body["timestamp"].as_f64().unwrap() > 0.0);

        let deleted = server.delete("/site-data/homepage_content").await;
        deleted.assert_status_ok();
        assert_eq!(
            deleted.json::<Value>(),
            json!({"message": "Data 'homepage_content' deleted"})
        );

        let gone = server.get("/site-data/homepage_content").await;
        gone.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            gone.json::<Value>(),
            json!({"error": "Data with ID 'homepage_content' not found"})
        );
        server
            .delete("/site-data/homepage_content")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn site_data_validation() {
        let server = test_server();
        let missing = server
            .post("/site-data")
            .json(&json!({"data_id": "only_id"}))
            .await;
        missing.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            missing.json::<Value>()["error"],
            "Both 'data_id' and 'data' fields are required."
        );

        let bad_key = server
            .post("/site-data")
            .json(&json!({"data_id": "../../etc", "data": "x"}))
            .await;
        bad_key.assert_status(StatusCode::BAD_REQUEST);
    }
}
