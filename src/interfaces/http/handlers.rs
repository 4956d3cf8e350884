use crate::domain::errors::MetricError;
use crate::domain::metric::{Metric, MetricKind, RawMetric};
use crate::interfaces::http::AppState;
use crate::interfaces::http::error::ApiError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(1);

type ApiResult<T> = Result<T, ApiError>;

/// JSON endpoints refuse anything not declared as `application/json`.
fn json_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> ApiResult<T> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"));
    if !is_json {
        return Err(ApiError::bad_request("Invalid Content-Type"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Unable to parse JSON: {}", e)))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

pub async fn list_metrics(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    let metrics = state.service.all_metrics().await?;

    let mut page = String::from(
        "<!DOCTYPE html><html><head><title>Metrics</title></head><body>\
         <table><tr><th>ID</th><th>Type</th><th>Value</th></tr>",
    );
    for metric in &metrics {
        let _ = write!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&metric.id),
            metric.kind,
            metric.value_string()
        );
    }
    page.push_str("</table></body></html>");
    Ok(Html(page))
}

pub async fn ping(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .service
        .ping(PING_TIMEOUT)
        .await
        .map_err(|e| match e {
            MetricError::Storage(_) => ApiError(e),
            other => ApiError(MetricError::Storage(other.to_string())),
        })?;
    Ok("OK")
}

pub async fn get_value(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind = MetricKind::from_str(&kind)?;
    let metric = state.service.get_metric(&Metric::query(id, kind)).await?;
    Ok(metric.value_string())
}

pub async fn update_from_path(
    State(state): State<Arc<AppState>>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let metric = Metric::parse(&kind, &id, &value)?;
    state.service.update_unsigned(metric).await?;
    Ok(StatusCode::OK)
}

pub async fn get_value_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Metric>> {
    let raw: RawMetric = json_body(&headers, &body)?;
    let query = raw.into_query()?;
    let metric = state.service.get_metric(&query).await?;
    Ok(Json(metric))
}

pub async fn update_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let raw: RawMetric = json_body(&headers, &body)?;
    let metric = Metric::try_from(raw)?;
    state.service.update_metric(metric).await?;
    Ok((StatusCode::OK, Json(json!({}))).into_response())
}

pub async fn batch_update_json(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let raw: Vec<RawMetric> = json_body(&headers, &body)?;
    let metrics = raw
        .into_iter()
        .map(Metric::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    state.service.batch_update(metrics).await?;
    Ok((StatusCode::OK, Json(json!({}))).into_response())
}
