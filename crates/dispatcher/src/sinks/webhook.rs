//! WebhookSink - HTTP POST per event

use std::collections::HashMap;
use std::time::Duration;

use contracts::{CapturedEvent, ContractError, DataSink};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, info, instrument, warn};

/// Configuration for WebhookSink
#[derive(Debug, Clone)]
pub struct WebhookSinkConfig {
    pub url: String,
    /// Extra request headers (`header.<Name>` params)
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Attempts after the first one
    pub retries: u32,
    /// Linear backoff step between attempts
    pub retry_backoff: Duration,
}

impl WebhookSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let url = params
            .get("url")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| "missing 'url' parameter".to_string())?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("url '{url}' must be http(s)"));
        }

        let mut headers: Vec<(String, String)> = params
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("header.")
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect();
        headers.sort();

        Ok(Self {
            url,
            headers,
            timeout: Duration::from_secs(parse_number(params, "timeout_secs", 30)?),
            retries: u32::try_from(parse_number(params, "retries", 3)?)
                .map_err(|_| format!("'retries' must be at most {}", u32::MAX))?,
            retry_backoff: Duration::from_millis(parse_number(params, "retry_backoff_ms", 500)?),
        })
    }
}

fn parse_number(
    params: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, String> {
    match params.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("'{key}' must be a non-negative integer, got '{raw}'")),
        None => Ok(default),
    }
}

/// Sink that POSTs every payload as `application/json`
///
/// Any 2xx is success. Non-2xx responses and transport errors are retried;
/// the last error is returned once retries run out.
pub struct WebhookSink {
    name: String,
    config: WebhookSinkConfig,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(name: impl Into<String>, config: WebhookSinkConfig) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| format!("invalid header name '{key}': {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header '{key}': {e}"))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let config = WebhookSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    async fn post_once(&self, payload: &[u8]) -> Result<(), String> {
        let response = self
            .client
            .post(&self.config.url)
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }
}

impl DataSink for WebhookSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "webhook_sink_publish",
        skip(self, event, payload),
        fields(sink = %self.name, event_id = event.id)
    )]
    async fn publish(
        &mut self,
        event: &CapturedEvent,
        payload: &[u8],
    ) -> Result<(), ContractError> {
        let attempts = self.config.retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.post_once(payload).await {
                Ok(()) => {
                    debug!(sink = %self.name, event_id = event.id, attempt, "Webhook delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        sink = %self.name,
                        event_id = event.id,
                        attempt,
                        attempts,
                        error = %e,
                        "Webhook attempt failed"
                    );
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff.saturating_mul(attempt)).await;
            }
        }

        Err(ContractError::sink_write(
            &self.name,
            format!("giving up after {attempts} attempts: {last_error}"),
        ))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, url = %self.config.url, "WebhookSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Operation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers each connection with the next status line, then repeats the last one
    async fn serve(statuses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/hook"), hits)
    }

    fn sink(url: String, retries: u32) -> WebhookSink {
        let config = WebhookSinkConfig {
            url,
            headers: vec![("X-Source".to_string(), "tablecast".to_string())],
            timeout: Duration::from_secs(5),
            retries,
            retry_backoff: Duration::from_millis(1),
        };
        WebhookSink::new("hook", config).unwrap()
    }

    fn event() -> CapturedEvent {
        CapturedEvent::new(1, 0, Operation::Insert, "orders", Default::default())
    }

    #[tokio::test]
    async fn test_success_on_2xx() {
        let (url, hits) = serve(vec!["204 No Content"]).await;
        let mut sink = sink(url, 3);

        sink.publish(&event(), b"{}").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let (url, hits) = serve(vec![
            "500 Internal Server Error",
            "503 Service Unavailable",
            "200 OK",
        ])
        .await;
        let mut sink = sink(url, 3);

        sink.publish(&event(), b"{}").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let (url, hits) = serve(vec!["500 Internal Server Error"]).await;
        let mut sink = sink(url, 2);

        let err = sink.publish(&event(), b"{}").await.unwrap_err();
        assert!(err.to_string().contains("giving up after 3 attempts: HTTP 500"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_config_from_params() {
        let params = HashMap::from([
            ("url".to_string(), "https://example.com/in".to_string()),
            ("header.Authorization".to_string(), "Bearer t".to_string()),
            ("retries".to_string(), "0".to_string()),
        ]);
        let config = WebhookSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.retries, 0);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(
            config.headers,
            vec![("Authorization".to_string(), "Bearer t".to_string())]
        );

        let bad = HashMap::from([("url".to_string(), "ftp://x".to_string())]);
        assert!(WebhookSinkConfig::from_params(&bad).is_err());
    }

    #[test]
    fn test_retries_out_of_range_rejected() {
        let params = |retries: &str| {
            HashMap::from([
                ("url".to_string(), "https://example.com/in".to_string()),
                ("retries".to_string(), retries.to_string()),
            ])
        };

        let err = WebhookSinkConfig::from_params(&params("4294967296")).unwrap_err();
        assert!(err.contains("'retries' must be at most"));
        assert!(WebhookSinkConfig::from_params(&params("-1")).is_err());

        let config = WebhookSinkConfig::from_params(&params("4294967295")).unwrap();
        assert_eq!(config.retries, u32::MAX);
    }

    #[tokio::test]
    async fn test_max_retries_does_not_overflow() {
        let (url, hits) = serve(vec!["200 OK"]).await;
        let mut sink = sink(url, u32::MAX);

        sink.publish(&event(), b"{}").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
