//! HTTP trigger surface: `/process`, `/embedding`, `/upload`, `/health`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, eyre};
use graphfeat_core::{Pipeline, SilentProgress, Submission, UploadPayload};
use graphfeat_shared::{EmbeddingRequest, EmbeddingResponse, GraphFeatError};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// State & models
// ---------------------------------------------------------------------------

/// Application state shared across handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Query parameters of `GET /embedding`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EmbeddingQuery {
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub hyperp: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub methods: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub dataset: String,
    pub name: String,
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error_type: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Pipeline error rendered as an HTTP response.
#[derive(Debug)]
pub(crate) struct ApiError(GraphFeatError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GraphFeatError::Validation { .. }
            | GraphFeatError::UnsupportedMethod { .. }
            | GraphFeatError::Upload(_) => StatusCode::BAD_REQUEST,
            GraphFeatError::Acquisition(_) | GraphFeatError::Publication(_) => {
                StatusCode::BAD_GATEWAY
            }
            GraphFeatError::AlgorithmTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GraphFeatError::AlgorithmFailed { .. }
            | GraphFeatError::AlgorithmOutputMissing { .. }
            | GraphFeatError::Assembly { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GraphFeatError::Config { .. } | GraphFeatError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<GraphFeatError> for ApiError {
    fn from(err: GraphFeatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error_type: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the application router.
pub(crate) fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.pipeline.settings().acquisition.max_bytes)
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/embedding", get(embedding))
        .route("/process", post(process))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub(crate) async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> Result<()> {
    let app = router(AppState { pipeline });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| eyre!("failed to bind {addr}: {e}"))?;

    info!(%addr, "graphfeat server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        methods: state.pipeline.methods(),
    })
}

/// Run the pipeline on an address given as query parameters.
async fn embedding(
    State(state): State<AppState>,
    Query(query): Query<EmbeddingQuery>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let request = EmbeddingRequest::new(query.dataset, query.name, query.method, query.hyperp);
    let response = state.pipeline.run(&request, &SilentProgress).await?;
    Ok(Json(response))
}

/// Run the pipeline on a multipart submission, storing an attached file first.
async fn process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let submission = read_submission(multipart).await?;
    let response = state.pipeline.process(submission, &SilentProgress).await?;
    Ok(Json(response))
}

/// Store an uploaded source without running the pipeline.
async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let submission = read_submission(multipart).await?;
    let payload = submission.upload.unwrap_or(UploadPayload {
        filename: String::new(),
        bytes: Vec::new(),
    });

    let stored = state
        .pipeline
        .upload(&payload.filename, &submission.name, &payload.bytes)
        .await?;

    Ok(Json(UploadResponse {
        dataset: stored.address,
        name: stored.name,
    }))
}

/// Collect the known multipart fields; unknown fields are skipped.
async fn read_submission(mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                submission.upload = Some(UploadPayload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "dataset" => submission.dataset = field.text().await.map_err(malformed)?,
            "name" => submission.name = field.text().await.map_err(malformed)?,
            "method" => submission.method = field.text().await.map_err(malformed)?,
            "hyperp" => submission.hyperp = field.text().await.map_err(malformed)?,
            other => warn!(field = other, "ignoring unknown multipart field"),
        }
    }

    Ok(submission)
}

fn malformed(e: axum::extract::multipart::MultipartError) -> ApiError {
    GraphFeatError::validation(format!("malformed multipart body: {e}")).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use graphfeat_shared::{AppConfig, Settings};

    use super::*;

    fn state() -> AppState {
        let settings = Settings::with_api_key(&AppConfig::default(), "test-key").unwrap();
        AppState {
            pipeline: Arc::new(Pipeline::with_openml(Arc::new(settings)).unwrap()),
        }
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (GraphFeatError::validation("x"), StatusCode::BAD_REQUEST),
            (
                GraphFeatError::UnsupportedMethod {
                    method: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (GraphFeatError::Acquisition("x".into()), StatusCode::BAD_GATEWAY),
            (
                GraphFeatError::AlgorithmTimeout { timeout_secs: 1 },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (GraphFeatError::assembly("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (GraphFeatError::Publication("x".into()), StatusCode::BAD_GATEWAY),
            (GraphFeatError::config("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn health_lists_methods() {
        let Json(body) = health(State(state())).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.methods, vec!["rescal"]);
    }

    #[tokio::test]
    async fn embedding_rejects_empty_fields() {
        let query = EmbeddingQuery {
            method: "rescal".into(),
            ..Default::default()
        };
        let err = embedding(State(state()), Query(query)).await.unwrap_err();

        assert!(matches!(err.0, GraphFeatError::Validation { .. }));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn embedding_rejects_unknown_method() {
        let query = EmbeddingQuery {
            dataset: "http://example.org/iris.ttl".into(),
            name: "iris".into(),
            method: "transe".into(),
            hyperp: "rank=5".into(),
        };
        let err = embedding(State(state()), Query(query)).await.unwrap_err();

        assert_eq!(err.0.kind(), "unsupported_method");
    }

    // -----------------------------------------------------------------------
    // Router-level requests
    // -----------------------------------------------------------------------

    mod routes {
        use std::path::PathBuf;
        use std::time::Duration;

        use axum::body::Body;
        use axum::http::{Request, header};
        use graphfeat_shared::{AcquisitionSettings, AlgorithmSettings, RepositorySettings};
        use tower::ServiceExt;
        use url::Url;

        use super::*;

        const BOUNDARY: &str = "graphfeat-test-boundary";

        /// Writes aligned outputs into its output directory argument.
        const WORKING_SCRIPT: &str = "printf 'ex:A\\nex:B\\n' > \"$2resources.tsv\"\n\
                                      printf '0.1\\t0.2\\n0.3\\t0.4\\n' > \"$2vectors.tsv\"\n";

        const TRIPLES: &str = "<ex:A> <ex:p> <ex:B> .\n";

        /// Temp root, settings, and a mock host serving both the dataset
        /// and the OpenML upload endpoint.
        struct Fixture {
            root: PathBuf,
            server: wiremock::MockServer,
            state: AppState,
        }

        impl Fixture {
            async fn new() -> Self {
                let root =
                    std::env::temp_dir().join(format!("gf-server-test-{}", uuid::Uuid::now_v7()));
                let scripts = root.join("scripts");
                std::fs::create_dir_all(&scripts).unwrap();
                std::fs::write(scripts.join("rdf_rescal.py"), WORKING_SCRIPT).unwrap();

                let server = wiremock::MockServer::start().await;
                wiremock::Mock::given(wiremock::matchers::method("GET"))
                    .and(wiremock::matchers::path("/iris.ttl"))
                    .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(TRIPLES))
                    .mount(&server)
                    .await;
                wiremock::Mock::given(wiremock::matchers::method("POST"))
                    .and(wiremock::matchers::path("/api/v1/data"))
                    .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                        "<oml:upload_data_set xmlns:oml=\"http://openml.org/openml\"><oml:id>42</oml:id></oml:upload_data_set>",
                    ))
                    .mount(&server)
                    .await;

                let settings = Settings {
                    tmp_dir: root.join("tmp"),
                    uploads_dir: root.join("uploads"),
                    acquisition: AcquisitionSettings {
                        timeout: Duration::from_secs(10),
                        max_bytes: 1024 * 1024,
                    },
                    algorithm: AlgorithmSettings {
                        interpreter: "sh".into(),
                        scripts_dir: scripts,
                        timeout: Duration::from_secs(10),
                    },
                    repository: RepositorySettings {
                        base_url: Url::parse(&server.uri()).unwrap(),
                        api_key: "test-key".into(),
                        timeout: Duration::from_secs(10),
                    },
                };

                let pipeline = Pipeline::with_openml(Arc::new(settings)).unwrap();
                Self {
                    root,
                    server,
                    state: AppState {
                        pipeline: Arc::new(pipeline),
                    },
                }
            }

            async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
                let response = router(self.state.clone()).oneshot(request).await.unwrap();
                let status = response.status();
                let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                (status, serde_json::from_slice(&bytes).unwrap())
            }

            /// Bodies of the dataset uploads the mock repository received.
            async fn published(&self) -> Vec<String> {
                self.server
                    .received_requests()
                    .await
                    .unwrap()
                    .into_iter()
                    .filter(|r| r.url.path() == "/api/v1/data")
                    .map(|r| String::from_utf8_lossy(&r.body).to_string())
                    .collect()
            }
        }

        impl Drop for Fixture {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.root);
            }
        }

        /// A field of a multipart form: name, optional filename, content.
        type FormField<'a> = (&'a str, Option<&'a str>, &'a [u8]);

        fn multipart(uri: &str, fields: &[FormField<'_>]) -> Request<Body> {
            let mut body = Vec::new();
            for (name, filename, value) in fields {
                body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
                let disposition = match filename {
                    Some(f) => format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    ),
                    None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
                };
                body.extend_from_slice(disposition.as_bytes());
                body.extend_from_slice(value);
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap()
        }

        #[tokio::test]
        async fn health_route_responds() {
            let fixture = Fixture::new().await;
            let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["methods"][0], "rescal");
        }

        #[tokio::test]
        async fn upload_returns_file_address() {
            let fixture = Fixture::new().await;
            let request = multipart(
                "/upload",
                &[
                    ("file", Some("iris.ttl"), TRIPLES.as_bytes()),
                    ("name", None, b"iris"),
                ],
            );

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::OK);
            let dataset = body["dataset"].as_str().unwrap();
            assert!(dataset.starts_with("file://"), "{dataset}");
            assert!(dataset.ends_with("/uploads/iris.ttl"), "{dataset}");
            assert_eq!(body["name"], "iris");
            assert_eq!(
                std::fs::read_to_string(fixture.root.join("uploads").join("iris.ttl")).unwrap(),
                TRIPLES
            );
        }

        #[tokio::test]
        async fn upload_without_file_is_bad_request() {
            let fixture = Fixture::new().await;
            let request = multipart("/upload", &[("name", None, b"iris")]);

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_type"], "upload");
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn process_runs_uploaded_file() {
            let fixture = Fixture::new().await;
            let request = multipart(
                "/process",
                &[
                    ("file", Some("iris.ttl"), TRIPLES.as_bytes()),
                    ("name", None, b"iris"),
                    ("method", None, b"rescal"),
                    ("hyperp", None, b"rank=5"),
                ],
            );

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert!(body["dataset"].as_str().unwrap().starts_with("file://"));
            assert_eq!(body["method"], "rescal");
            assert_eq!(body["hyperp"], "rank=5");
            assert_eq!(body["url"], format!("{}/d/42", fixture.server.uri()));

            let published = fixture.published().await;
            assert_eq!(published.len(), 1);
            assert!(published[0].contains("<oml:name>iris</oml:name>"));
            assert!(published[0].contains("\"ex:A\",0.1,0.2"));
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn process_defaults_name_from_address() {
            let fixture = Fixture::new().await;
            let dataset = format!("{}/iris.ttl", fixture.server.uri());
            let request = multipart(
                "/process",
                &[
                    ("dataset", None, dataset.as_bytes()),
                    ("name", None, b""),
                    ("method", None, b"rescal"),
                    ("hyperp", None, b"rank=5"),
                ],
            );

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(body["dataset"], dataset);

            let published = fixture.published().await;
            assert_eq!(published.len(), 1);
            assert!(published[0].contains("<oml:name>iris.ttl</oml:name>"));
        }

        #[tokio::test]
        async fn embedding_refuses_local_files_outside_uploads() {
            let fixture = Fixture::new().await;
            let outside = fixture.root.join("private.ttl");
            std::fs::write(&outside, TRIPLES).unwrap();
            std::fs::create_dir_all(fixture.root.join("uploads")).unwrap();
            let address = Url::from_file_path(&outside).unwrap();

            let request = Request::builder()
                .uri(format!(
                    "/embedding?dataset={}&name=private&method=rescal&hyperp=rank%3D5",
                    url::form_urlencoded::byte_serialize(address.as_str().as_bytes())
                        .collect::<String>()
                ))
                .body(Body::empty())
                .unwrap();

            let (status, body) = fixture.send(request).await;
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(body["error_type"], "acquisition");
            assert!(fixture.published().await.is_empty());
        }
    }
}
