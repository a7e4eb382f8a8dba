use reqwest::StatusCode;
use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_millis(1000);
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("network request failed after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Wait requested by a `Retry-After` header in seconds, capped like the
/// backoff. Falls back to `backoff` when the header is missing or not a number.
fn retry_after_delay(headers: &reqwest::header::HeaderMap, backoff: Duration) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_DELAY))
        .unwrap_or(backoff)
}

/// Retries a request closure with exponential backoff.
///
/// Retries on network errors, 429 (honouring `Retry-After`) and 5xx. Other
/// statuses are returned as-is for the caller to interpret. With
/// `max_retries == 0` the request is attempted exactly once.
///
/// Once retries are exhausted the last response is returned even if its
/// status is an error.
pub async fn request_with_retry<F, Fut>(
    mut task: F,
    max_retries: u32,
) -> Result<reqwest::Response, HttpError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    loop {
        attempt += 1;
        match task().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || attempt > max_retries {
                    return Ok(response);
                }
                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    return Ok(response);
                }

                let retry_delay = retry_after_delay(response.headers(), delay);

                tracing::warn!(
                    "[HTTP] Request failed with status {}, retrying in {:?} (attempt {}/{})",
                    status,
                    retry_delay,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(retry_delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
            Err(e) => {
                if attempt > max_retries {
                    return Err(HttpError::Network {
                        attempts: attempt,
                        source: e,
                    });
                }
                tracing::warn!(
                    "[HTTP] Network error: {}, retrying in {:?} (attempt {}/{})",
                    e,
                    delay,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn server_error_is_retried_per_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client();
        let url = format!("{}/flaky", server.uri());
        let response = request_with_retry(|| client.get(&url).send(), 2)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn retry_after_is_capped_at_max_delay() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let backoff = Duration::from_secs(4);
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_delay(&headers, backoff), backoff);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(retry_after_delay(&headers, backoff), MAX_DELAY);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 3 "));
        assert_eq!(retry_after_delay(&headers, backoff), Duration::from_secs(3));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after_delay(&headers, backoff), backoff);
    }

    #[tokio::test]
    async fn zero_retries_returns_first_error_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let calls = AtomicU32::new(0);
        let response = request_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                client.get(server.uri()).send()
            },
            0,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let response = request_with_retry(|| client.get(server.uri()).send(), 3)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn network_failure_reports_attempts() {
        // Nothing listens on port 9 of localhost.
        let client = client();
        let err = request_with_retry(|| client.get("http://127.0.0.1:9/").send(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Network { attempts: 1, .. }));
    }
}
