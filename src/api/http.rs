use super::{Operation, Reply};
use crate::error::ApiError;
use crate::upload::FileUpload;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one operation within the timeout budget. Expiry drops the
    /// in-flight request and nothing else.
    pub async fn execute(&self, op: &Operation) -> Result<Reply, ApiError> {
        match tokio::time::timeout(self.timeout, self.exchange(op)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        }
    }

    fn url_for(&self, op: &Operation) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("base url {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(op.segments());
        Ok(url)
    }

    async fn exchange(&self, op: &Operation) -> Result<Reply, ApiError> {
        let url = self.url_for(op)?;
        let mut req = self.client.request(op.method(), url);

        // Multipart sets its own boundary header.
        if let Operation::UploadDocument(file) = op {
            req = req.multipart(Form::new().part("file", file_part(file)));
        } else if let Some(body) = op.json_body() {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            // An envelope error is the backend's own message; only raw bodies
            // get the status prefix.
            return Err(match serde_json::from_str::<Envelope>(&text) {
                Ok(Envelope {
                    error: Some(message),
                    ..
                }) => ApiError::Server(message),
                _ => ApiError::Http {
                    status: status.as_u16(),
                    message: text,
                },
            });
        }

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|e| ApiError::Malformed(format!("{}: {}", op.name(), e)))?;
        if !envelope.success {
            return Err(ApiError::Server(
                envelope
                    .error
                    .unwrap_or_else(|| "An unknown error occurred".to_string()),
            ));
        }
        op.decode(envelope.data)
    }
}

fn file_part(file: &FileUpload) -> Part {
    let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
    if file.mime_type.is_empty() {
        return part;
    }
    match part.mime_str(&file.mime_type) {
        Ok(part) => part,
        Err(e) => {
            log::warn!("ignoring invalid mime type {:?}: {}", file.mime_type, e);
            Part::bytes(file.bytes.clone()).file_name(file.name.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, RagSettings};
    use axum::extract::{Multipart, Path};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, post, put};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{}", addr)
    }

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(base_url, Duration::from_secs(2))
    }

    fn doc_json(id: &str, name: &str, selected: bool) -> Value {
        json!({
            "id": id,
            "name": name,
            "type": "text/plain",
            "size": 12,
            "uploadedAt": "2024-05-01T10:00:00",
            "status": "completed",
            "selected": selected
        })
    }

    #[tokio::test]
    async fn test_lists_documents() {
        let router = Router::new().route(
            "/documents",
            get(|| async { Json(json!({ "success": true, "data": [doc_json("a", "a.txt", false)] })) }),
        );
        let base = serve(router).await;

        let reply = backend(&base).execute(&Operation::ListDocuments).await.unwrap();
        match reply {
            Reply::Documents(docs) => {
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].status, DocumentStatus::Completed);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_is_multipart_with_file_field() {
        async fn upload(headers: HeaderMap, mut form: Multipart) -> Json<Value> {
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            assert!(content_type.starts_with("multipart/form-data; boundary="));
            let field = form.next_field().await.unwrap().unwrap();
            assert_eq!(field.name(), Some("file"));
            let name = field.file_name().unwrap_or_default().to_string();
            let mime = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap();
            Json(json!({
                "success": true,
                "data": {
                    "id": "new",
                    "name": name,
                    "type": mime,
                    "size": bytes.len(),
                    "uploadedAt": "2024-05-01T10:00:00",
                    "status": "processing",
                    "selected": false
                }
            }))
        }
        let base = serve(Router::new().route("/documents", post(upload))).await;

        let op = Operation::UploadDocument(FileUpload::new("q3.pdf", "application/pdf", b"%PDF-1.7".to_vec()));
        match backend(&base).execute(&op).await.unwrap() {
            Reply::Document(doc) => {
                assert_eq!(doc.name, "q3.pdf");
                assert_eq!(doc.mime_type, "application/pdf");
                assert_eq!(doc.size, 8);
                assert_eq!(doc.status, DocumentStatus::Processing);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_selection_sends_json_body_to_encoded_path() {
        let router = Router::new().route(
            "/documents/{id}/selection",
            put(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                let selected = body["selected"].as_bool().unwrap();
                Json(json!({ "success": true, "data": doc_json(&id, "x.txt", selected) }))
            }),
        );
        let base = serve(router).await;

        let op = Operation::SetSelection {
            id: "a b".into(),
            selected: true,
        };
        match backend(&base).execute(&op).await.unwrap() {
            Reply::Document(doc) => {
                assert_eq!(doc.id, "a b");
                assert!(doc.selected);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_without_data() {
        let router = Router::new().route(
            "/documents/{id}",
            delete(|| async { Json(json!({ "success": true })) }),
        );
        let base = serve(router).await;
        let op = Operation::DeleteDocument { id: "1".into() };
        assert_eq!(backend(&base).execute(&op).await.unwrap(), Reply::Deleted);
    }

    #[tokio::test]
    async fn test_envelope_failure_passes_message_through() {
        let router = Router::new().route(
            "/documents/{id}",
            delete(|| async { Json(json!({ "success": false, "error": "Document not found" })) }),
        );
        let base = serve(router).await;
        let op = Operation::DeleteDocument { id: "nonexistent-id".into() };
        let err = backend(&base).execute(&op).await.unwrap_err();
        assert_eq!(err, ApiError::Server("Document not found".into()));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_error_status_is_server_error() {
        let router = Router::new().route(
            "/rag-settings",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database locked") }),
        );
        let base = serve(router).await;
        let err = backend(&base).execute(&Operation::GetSettings).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 500,
                message: "database locked".into()
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_with_envelope_keeps_message() {
        let router = Router::new().route(
            "/documents/{id}",
            delete(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "success": false, "error": "Document not found" })),
                )
            }),
        );
        let base = serve(router).await;
        let op = Operation::DeleteDocument { id: "gone".into() };
        let err = backend(&base).execute(&op).await.unwrap_err();
        assert_eq!(err.to_string(), "Document not found");
        assert_eq!(err, ApiError::Server("Document not found".into()));
    }

    #[test]
    fn test_base_url_drops_trailing_slash() {
        assert_eq!(backend("http://localhost:8000/api/").base_url(), "http://localhost:8000/api");
        assert_eq!(backend("http://localhost:8000").base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let router = Router::new()
            .route("/chat", post(|| async { "not json" }))
            .route(
                "/rag-settings",
                get(|| async { Json(json!({ "success": true, "data": { "chunk_size": "big" } })) }),
            );
        let base = serve(router).await;
        let chat = Operation::SendChat { message: "hi".into() };
        assert!(matches!(
            backend(&base).execute(&chat).await.unwrap_err(),
            ApiError::Malformed(_)
        ));
        assert!(matches!(
            backend(&base).execute(&Operation::GetSettings).await.unwrap_err(),
            ApiError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_settings_round_trip_under_base_path() {
        let router = Router::new().route(
            "/api/rag-settings",
            get(|| async { Json(json!({ "success": true, "data": RagSettings::default() })) }),
        );
        let base = serve(router).await;
        let reply = backend(&format!("{}/api/", base))
            .execute(&Operation::GetSettings)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Settings(RagSettings::default()));
    }
}
