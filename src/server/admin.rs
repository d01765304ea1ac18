use super::state::AppState;
use super::{full_body, BoxBody};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};

pub fn handle_admin(
    req: Request<Incoming>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => Ok(Response::builder()
            .status(200)
            .body(full_body(r#"{"status":"ok"}"#))
            .unwrap()),

        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            let cfg = state.config.load();
            let keys: serde_json::Map<String, serde_json::Value> = state
                .engine
                .key_counts()
                .iter()
                .map(|(name, n)| ((*name).to_string(), serde_json::json!(n)))
                .collect();
            let body = serde_json::json!({
                "status": "ready",
                "rules": cfg.rules.len(),
                "tracked_keys": keys,
            });
            Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(body.to_string()))
                .unwrap())
        }

        (&Method::GET, "/metrics") => {
            let body = state.metrics.render();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                .body(full_body(body))
                .unwrap())
        }

        (&Method::POST, "/config/reload") => match state.reload_config() {
            Ok(rules) => Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(format!(
                    r#"{{"status":"reloaded","rules":{}}}"#,
                    rules
                )))
                .unwrap()),
            Err(e) => Ok(Response::builder()
                .status(500)
                .header("content-type", "application/json")
                .body(full_body(
                    serde_json::json!({ "error": e.to_string() }).to_string(),
                ))
                .unwrap()),
        },

        _ => Ok(Response::builder()
            .status(404)
            .body(full_body(r#"{"error":"not found"}"#))
            .unwrap()),
    }
}
