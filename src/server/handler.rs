use super::state::AppState;
use super::{full_body, BoxBody};
use crate::config::LimitRule;
use crate::engine::{clock, Algorithm, Decision, LimitConfig};
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::{Request, Response};
use serde::Deserialize;
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tracing::debug;

/// Request bodies larger than this are rejected with 413. The probe and
/// reset payloads are a few hundred bytes at most.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct AcquireRequest {
    key: String,
    algorithm: String,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    window_seconds: Option<u64>,
    #[serde(default)]
    capacity: Option<u64>,
    #[serde(default)]
    refill_rate: Option<f64>,
    #[serde(default)]
    compat_refill_cap: bool,
}

#[derive(Deserialize)]
struct ResetRequest {
    key: String,
    /// Absent means reset across all five algorithms.
    #[serde(default)]
    algorithm: Option<String>,
}

/// Handle a request on the main listener:
///
/// - `POST /v1/acquire` — JSON admission probe with an inline config record
/// - `POST /v1/reset`   — drop a key's state for one or all algorithms
/// - `GET  /demo/*`     — routes guarded by the configured limit rules
pub async fn handle_request(
    req: Request<Incoming>,
    state: AppState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // Real client IP: trust the left-most X-Forwarded-For entry if present
    // (assumes a trusted reverse proxy in front), otherwise the TCP peer.
    let client_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer_addr.ip());

    let resp = match (&method, path.as_str()) {
        (&Method::POST, "/v1/acquire") => handle_acquire(req, &state).await?,
        (&Method::POST, "/v1/reset") => handle_reset(req, &state).await?,
        (&Method::GET, p) if p.starts_with("/demo") => handle_demo(&req, &state, p, client_ip),
        _ => json_response(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#.into()),
    };

    record_http(method.as_str(), resp.status().as_u16(), start);
    Ok(resp)
}

async fn handle_acquire(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let body = match read_body(req).await? {
        Ok(bytes) => bytes,
        Err(resp) => return Ok(resp),
    };
    let probe: AcquireRequest = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return Ok(bad_request(&format!("malformed request body: {}", e))),
    };

    let algorithm: Algorithm = match probe.algorithm.parse::<Algorithm>() {
        Ok(a) => a,
        Err(e) => return Ok(bad_request(&e.to_string())),
    };
    let config = LimitConfig {
        algorithm,
        limit: probe.limit,
        window_seconds: probe.window_seconds,
        capacity: probe.capacity,
        refill_rate: probe.refill_rate,
        compat_refill_cap: probe.compat_refill_cap,
    };

    match state.engine.try_acquire(&probe.key, &config) {
        Ok(decision) => {
            record_decision(algorithm, &decision);
            if decision.admitted {
                Ok(admitted_response(&decision))
            } else {
                debug!(
                    "acquire rejected, key={}, algorithm={}, retry_after={}",
                    probe.key, algorithm, decision.retry_after_seconds
                );
                Ok(too_many_requests(&decision))
            }
        }
        Err(e) => Ok(bad_request(&e.to_string())),
    }
}

async fn handle_reset(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let body = match read_body(req).await? {
        Ok(bytes) => bytes,
        Err(resp) => return Ok(resp),
    };
    let reset: ResetRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return Ok(bad_request(&format!("malformed request body: {}", e))),
    };

    match reset.algorithm.as_deref() {
        Some(tag) => match tag.parse::<Algorithm>() {
            Ok(algorithm) => state.engine.reset(&reset.key, algorithm),
            Err(e) => return Ok(bad_request(&e.to_string())),
        },
        None => state.engine.reset_all(&reset.key),
    }
    Ok(json_response(StatusCode::OK, r#"{"status":"ok"}"#.into()))
}

fn handle_demo(
    req: &Request<Incoming>,
    state: &AppState,
    path: &str,
    client_ip: IpAddr,
) -> Response<BoxBody> {
    let config = state.config.load();
    let rule = match config.rule_for_path(path) {
        Some(r) => r,
        None => return json_response(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#.into()),
    };

    let derived = derive_key(rule, path, req.headers(), &client_ip);
    // Rule-scoped so two rules sharing a key source never collide.
    let key = format!("{}:{}", rule.name, derived);

    match state.engine.try_acquire(&key, &rule.limit) {
        Ok(decision) => {
            record_decision(rule.limit.algorithm, &decision);
            if decision.admitted {
                let body = serde_json::json!({
                    "message": "request allowed",
                    "rule": rule.name,
                    "remaining": decision.remaining,
                });
                Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", "application/json")
                    .header("x-ratelimit-remaining", decision.remaining.to_string())
                    .body(full_body(body.to_string()))
                    .unwrap()
            } else {
                debug!(
                    "demo rejected, rule={}, key={}, retry_after={}",
                    rule.name, key, decision.retry_after_seconds
                );
                too_many_requests(&decision)
            }
        }
        // Rules are validated at load time; a config error here means the
        // snapshot was swapped out from under us, surface it as 500.
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(r#"{{"error":"{}"}}"#, e),
        ),
    }
}

/// Derive the rate-limit key for a rule. Borrows from the request where
/// possible to avoid heap allocation on the hot path.
fn derive_key<'a>(
    rule: &'a LimitRule,
    path: &'a str,
    headers: &'a HeaderMap,
    client_ip: &IpAddr,
) -> Cow<'a, str> {
    match rule.key.as_str() {
        "header" => {
            let name = rule.key_name.as_deref().unwrap_or("");
            match headers.get(name).and_then(|v| v.to_str().ok()) {
                Some(v) if !v.is_empty() => Cow::Borrowed(v),
                _ => Cow::Owned(client_ip.to_string()),
            }
        }
        "path" => Cow::Borrowed(path),
        "literal" => Cow::Borrowed(rule.key_name.as_deref().unwrap_or("global")),
        _ => Cow::Owned(client_ip.to_string()),
    }
}

/// Collect the request body, rejecting oversized payloads before parsing.
async fn read_body(
    req: Request<Incoming>,
) -> Result<Result<bytes::Bytes, Response<BoxBody>>, hyper::Error> {
    if let Some(len) = req.body().size_hint().upper() {
        if len as usize > MAX_BODY_BYTES {
            return Ok(Err(json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                r#"{"error":"request body too large"}"#.into(),
            )));
        }
    }
    let bytes = req.into_body().collect().await?.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Ok(Err(json_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            r#"{"error":"request body too large"}"#.into(),
        )));
    }
    Ok(Ok(bytes))
}

fn admitted_response(decision: &Decision) -> Response<BoxBody> {
    let body = serde_json::to_string(decision).unwrap_or_default();
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .header(
            "x-ratelimit-remaining",
            decision.remaining.to_string(),
        )
        .body(full_body(body))
        .unwrap()
}

/// The uniform rejection mapping: 429 with a `Retry-After` header and the
/// structured error body.
fn too_many_requests(decision: &Decision) -> Response<BoxBody> {
    let body = serde_json::json!({
        "timestamp": clock::now_ms(),
        "status": 429,
        "error": "Too Many Requests",
        "message": decision.message,
        "retryAfterSeconds": decision.retry_after_seconds,
    });
    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header("content-type", "application/json")
        .header("retry-after", decision.retry_after_seconds.to_string())
        .body(full_body(body.to_string()))
        .unwrap()
}

fn bad_request(msg: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": msg }).to_string(),
    )
}

fn json_response(status: StatusCode, body: String) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(body))
        .unwrap()
}

fn record_decision(algorithm: Algorithm, decision: &Decision) {
    let outcome = if decision.admitted { "admitted" } else { "rejected" };
    metrics::counter!(
        "limiter_decisions_total",
        "algorithm" => algorithm.as_str(),
        "outcome" => outcome,
    )
    .increment(1);
}

fn record_http(method: &str, status: u16, start: Instant) {
    let mut buf = itoa::Buffer::new();
    let status_str = buf.format(status);

    metrics::counter!(
        "limiter_http_requests_total",
        "method" => method.to_owned(),
        "status_code" => status_str.to_owned(),
    )
    .increment(1);

    metrics::histogram!("limiter_http_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}
