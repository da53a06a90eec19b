//! Diagram render endpoints
//!
//! - `POST /:format` renders the request body
//! - `GET /:format?source=...` renders a query parameter
//! - `GET /:format/:encoded` renders a PlantUML-encoded diagram
//! - `POST /coder` encodes a body into the URL form used above

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::diagram::{encoding, Fingerprint, NormalizationError, OutputFormat};
use crate::error::{AppError, Result};
use crate::render::RenderedResponse;
use crate::state::AppState;

pub const RENDER_DURATION_HEADER: HeaderName = HeaderName::from_static("x-render-duration-ms");

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub source: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/coder", post(encode_source))
        .route("/:format", get(render_query).post(render_body))
        .route("/:format/:encoded", get(render_encoded))
}

async fn render_body(
    State(state): State<AppState>,
    Path(format): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let format: OutputFormat = format.parse()?;
    respond(&state, &body, format, &headers).await
}

async fn render_query(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Query(query): Query<SourceQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let format: OutputFormat = format.parse()?;
    let source = query
        .source
        .ok_or_else(|| AppError::BadRequest("Missing 'source' query parameter".to_string()))?;
    respond(&state, source.as_bytes(), format, &headers).await
}

async fn render_encoded(
    State(state): State<AppState>,
    Path((format, encoded)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let format: OutputFormat = format.parse()?;
    let raw = encoding::decode(&encoded, state.render().normalizer().max_source_bytes())?;
    respond(&state, &raw, format, &headers).await
}

/// Encode diagram text for use in `GET /:format/:encoded`
async fn encode_source(body: Bytes) -> Result<Response> {
    let text = std::str::from_utf8(&body)
        .map_err(|e| NormalizationError::InvalidEncoding(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(NormalizationError::EmptySource.into());
    }

    let encoded = encoding::encode(text)
        .map_err(|e| AppError::Internal(format!("Failed to encode diagram: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        encoded,
    )
        .into_response())
}

async fn respond(
    state: &AppState,
    raw: &[u8],
    format: OutputFormat,
    headers: &HeaderMap,
) -> Result<Response> {
    let render = state.render();
    let (source, fingerprint) = render.prepare(raw, format)?;
    let etag = etag(&fingerprint);
    let cache_control = cache_control(state);

    // Artifacts are a pure function of the fingerprint
    if if_none_match(headers, &etag) {
        tracing::debug!(fingerprint = %fingerprint.short(), "Not modified");
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control)],
        )
            .into_response());
    }

    let rendered = render.render_source(source, fingerprint).await?;
    let response = RenderedResponse {
        fingerprint,
        rendered,
    };

    tracing::debug!(
        fingerprint = %fingerprint.short(),
        format = %format,
        bytes = response.rendered.data.len(),
        "Diagram served"
    );

    Ok(artifact_response(&response, etag, cache_control))
}

fn artifact_response(response: &RenderedResponse, etag: String, cache_control: String) -> Response {
    let rendered = &response.rendered;
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, rendered.content_type.clone()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, cache_control),
            (
                header::LAST_MODIFIED,
                rendered
                    .rendered_at
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            ),
            (
                RENDER_DURATION_HEADER,
                rendered.render_duration.as_millis().to_string(),
            ),
        ],
        rendered.data.clone(),
    )
        .into_response()
}

fn etag(fingerprint: &Fingerprint) -> String {
    format!("\"{}\"", fingerprint.to_hex())
}

fn cache_control(state: &AppState) -> String {
    format!("public, max-age={}", state.config().cache.ttl.as_secs())
}

/// Whether any entity tag in `If-None-Match` names this artifact
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == etag)
}
