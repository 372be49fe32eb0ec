// workflow-handlers/src/fetch.rs
// ============================================================================
// Module: Fetch Handler
// Description: HTTP client block handler with retry/backoff and a strict
//              URL/host validation posture.
// Purpose: Let a workflow call an external HTTP endpoint without opening the
//          engine up to SSRF against private networks.
// Dependencies: reqwest, url, tokio, workflow-core
// ============================================================================

//! ## Overview
//! Scheme and host validation, private/link-local IP blocking, and a
//! no-redirect policy all follow the same posture as the other HTTP-calling
//! tools in this workspace's provider layer — adapted here to an async
//! client, since this workspace's `reqwest` dependency carries no
//! `"blocking"` feature. Retries apply only to network errors and responses
//! outside `fetch_accepted_status_codes`, with exponential backoff bounded
//! by `fetch_max_retries`.

use std::net::IpAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::redirect::Policy;
use serde_json::Map;
use serde_json::Value;
use url::Url;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::HandlerError;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::limits::DEFAULT_FETCH_TIMEOUT_MS;
use workflow_core::limits::MAX_FETCH_TIMEOUT_MS;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::bind::bind_completion;
use crate::bind::optional_str;
use crate::bind::optional_u64;
use crate::bind::required_str;

fn vld(message: impl Into<String>) -> HandlerError {
    HandlerError::new("VALIDATION_ERROR", message)
}

fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            let mapped_private = addr.to_ipv4_mapped().is_some_and(|mapped| {
                mapped.is_private()
                    || mapped.is_loopback()
                    || mapped.is_link_local()
                    || mapped.is_unspecified()
                    || mapped.is_multicast()
                    || mapped.is_broadcast()
            });
            mapped_private
                || addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

/// Validates scheme, embedded credentials, and resolves + checks peer IPs.
fn validate_and_resolve(url: &Url) -> Result<(), HandlerError> {
    if url.scheme() != "https" {
        return Err(vld("fetch_url must use the https scheme"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(vld("fetch_url must not embed credentials"));
    }
    let host = url.host_str().ok_or_else(|| vld("fetch_url must have a host"))?;
    let port = url.port_or_known_default().unwrap_or(443);
    let ips: Vec<IpAddr> = if let Ok(ip) = host.parse::<IpAddr>() {
        vec![ip]
    } else {
        (host, port)
            .to_socket_addrs()
            .map_err(|_| vld("fetch_url host could not be resolved"))?
            .map(|addr| addr.ip())
            .collect()
    };
    if ips.is_empty() {
        return Err(vld("fetch_url host resolved to no addresses"));
    }
    if ips.iter().any(is_private_or_link_local) {
        return Err(vld("fetch_url resolves to a private or link-local address"));
    }
    Ok(())
}

fn parse_method(method: &str) -> Result<Method, HandlerError> {
    method.parse::<Method>().map_err(|_| vld(format!("unsupported fetch_method: {method}")))
}

/// Returns true if `status` is covered by at least one accepted-code family
/// (`"2xx"`) or exact code (`200`).
fn status_is_accepted(status: u16, accepted: &[Value]) -> bool {
    if accepted.is_empty() {
        return (200..300).contains(&status);
    }
    accepted.iter().any(|entry| match entry {
        Value::Number(n) => n.as_u64() == Some(u64::from(status)),
        Value::String(s) => {
            s.strip_suffix("xx").and_then(|prefix| prefix.parse::<u16>().ok()).is_some_and(|hundreds| status / 100 == hundreds)
        }
        _ => false,
    })
}

/// Handles `fetch` blocks.
pub struct FetchHandler;

#[async_trait]
impl BlockHandler for FetchHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Fetch
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        cancel: &CancellationToken,
    ) -> HandlerResult {
        let url_str = required_str(&block.logic, "fetch_url")?;
        let url = Url::parse(url_str).map_err(|_| vld("fetch_url is not a valid URL"))?;
        validate_and_resolve(&url)?;

        let method = parse_method(optional_str(&block.logic, "fetch_method").unwrap_or("GET"))?;
        let timeout_ms = optional_u64(&block.logic, "fetch_timeout_ms", DEFAULT_FETCH_TIMEOUT_MS).min(MAX_FETCH_TIMEOUT_MS);
        let max_retries = optional_u64(&block.logic, "fetch_max_retries", 1);
        let retry_delay_ms = optional_u64(&block.logic, "fetch_retry_delay_ms", 1_000);
        let backoff_multiplier = block.logic.get("fetch_backoff_multiplier").and_then(Value::as_f64).unwrap_or(2.0);
        let accepted = block.logic.get("fetch_accepted_status_codes").and_then(Value::as_array).cloned().unwrap_or_default();
        let headers = block.logic.get("fetch_headers").and_then(Value::as_object).cloned().unwrap_or_default();
        let body = block.logic.get("fetch_body").cloned();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(Policy::none())
            .build()
            .map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("http client build failed: {e}")))?;

        let mut attempt: u64 = 0;
        let mut delay_ms = retry_delay_ms;
        loop {
            if cancel.is_cancelled() {
                return Err(HandlerError::new("CANCELLED", "run cancelled during fetch"));
            }
            let outcome = send_once(&client, method.clone(), &url, &headers, body.as_ref()).await;
            match outcome {
                Ok((status, response_headers, parsed_body)) if status_is_accepted(status, &accepted) => {
                    let mut out = Map::new();
                    out.insert("status".to_string(), Value::from(status));
                    out.insert("headers".to_string(), Value::Object(response_headers));
                    out.insert("body".to_string(), parsed_body);
                    return Ok(BlockResult::Completed(bind_completion(
                        optional_str(&block.logic, "fetch_bind_value"),
                        Value::Object(out),
                    )));
                }
                Ok((status, _, _)) if attempt >= max_retries => {
                    return Err(HandlerError::new("INTERNAL_ERROR", format!("fetch received unaccepted status {status}")));
                }
                Err(err) if attempt >= max_retries => return Err(err),
                _ => {
                    attempt += 1;
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        () = cancel.cancelled() => return Err(HandlerError::new("CANCELLED", "run cancelled during fetch retry")),
                    }
                    delay_ms = (delay_ms as f64 * backoff_multiplier) as u64;
                }
            }
        }
    }
}

async fn send_once(
    client: &reqwest::Client,
    method: Method,
    url: &Url,
    headers: &Map<String, Value>,
    body: Option<&Value>,
) -> Result<(u16, Map<String, Value>, Value), HandlerError> {
    let mut request = client.request(method, url.clone());
    for (key, value) in headers {
        if let Some(value) = value.as_str() {
            request = request.header(key.as_str(), value);
        }
    }
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request.send().await.map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("fetch request failed: {e}")))?;
    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let mut response_headers = Map::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            response_headers.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
    let body_value = if is_json {
        response.json::<Value>().await.unwrap_or(Value::Null)
    } else {
        let text = response.text().await.unwrap_or_default();
        Value::String(text)
    };
    Ok((status, response_headers, body_value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn private_ip_is_rejected() {
        assert!(is_private_or_link_local(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_or_link_local(&"10.0.0.5".parse().unwrap()));
        assert!(is_private_or_link_local(&"169.254.1.1".parse().unwrap()));
        assert!(!is_private_or_link_local(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn non_https_scheme_rejected() {
        let url = Url::parse("http://example.com").unwrap();
        let err = validate_and_resolve(&url).unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }

    #[test]
    fn status_family_matches_hundreds_digit() {
        assert!(status_is_accepted(204, &[Value::String("2xx".to_string())]));
        assert!(!status_is_accepted(404, &[Value::String("2xx".to_string())]));
        assert!(status_is_accepted(200, &[]));
    }

    #[test]
    fn explicit_status_code_matches_exactly() {
        assert!(status_is_accepted(201, &[Value::from(201)]));
        assert!(!status_is_accepted(202, &[Value::from(201)]));
    }
}
