//! Long-running operation polling
//!
//! ARM reports asynchronous work in one of three ways, checked in this order:
//!
//! 1. an `Azure-AsyncOperation` header pointing at a status resource whose
//!    body carries `status`,
//! 2. a `Location` header that answers `202` until the work is done,
//! 3. for PUT/PATCH only, `properties.provisioningState` on the resource
//!    itself.
//!
//! A [`Poller`] picks the strategy from the initial response and is then
//! driven by [`Poller::poll_until_done`]. Once a terminal outcome has been
//! recorded it never changes and further calls return it without touching
//! the network.

use super::client::{ArmClient, PollSettings};
use super::http::{error_detail, ApiResponse};
use crate::error::{Error, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const LOCATION_HEADER: &str = "Location";
const RETRY_AFTER_HEADER: &str = "Retry-After";

/// How the poller checks for completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStrategy {
    AsyncOperation {
        status_url: Url,
        /// Fetched once the operation succeeds to obtain the result
        final_url: Option<Url>,
    },
    Location {
        url: Url,
    },
    ProvisioningState {
        url: Url,
    },
}

/// Final result of a long-running operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(Value),
    Failed { code: String, message: String },
    Canceled { message: String },
    TimedOut(Duration),
}

impl Outcome {
    fn to_result(&self) -> Result<Value> {
        match self {
            Outcome::Succeeded(value) => Ok(value.clone()),
            Outcome::Failed { code, message } => Err(Error::OperationFailed {
                code: code.clone(),
                message: message.clone(),
            }),
            Outcome::Canceled { message } => Err(Error::OperationFailed {
                code: "Canceled".to_string(),
                message: message.clone(),
            }),
            Outcome::TimedOut(after) => Err(Error::Timeout { after: *after }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    InProgress(PollStrategy),
    Terminal(Outcome),
}

/// Result of a single status check
enum Step {
    Pending(Option<Duration>),
    Done(Outcome),
}

/// Handle to an in-flight long-running operation
pub struct Poller {
    client: ArmClient,
    method: Method,
    state: PollState,
    next_delay: Duration,
    started: Instant,
}

impl Poller {
    /// Wrap the initial response of a request that may complete asynchronously
    pub fn from_response(
        client: ArmClient,
        method: Method,
        resource_url: Url,
        response: ApiResponse,
    ) -> Result<Self> {
        let next_delay = retry_after(&response).unwrap_or(client.poll.interval);
        let async_operation = header_url(&client, &response, ASYNC_OPERATION_HEADER)?;
        let location = header_url(&client, &response, LOCATION_HEADER)?;
        let is_put_or_patch = method == Method::PUT || method == Method::PATCH;
        let path = resource_url.path().to_string();

        let state = if let Some(status_url) = async_operation {
            let final_url = if is_put_or_patch {
                Some(resource_url)
            } else if method == Method::POST {
                location
            } else {
                None
            };
            PollState::InProgress(PollStrategy::AsyncOperation {
                status_url,
                final_url,
            })
        } else if let Some(url) = location {
            PollState::InProgress(PollStrategy::Location { url })
        } else if is_put_or_patch {
            match provisioning_state(&response.body) {
                Some(state) if !is_terminal(state) => {
                    PollState::InProgress(PollStrategy::ProvisioningState { url: resource_url })
                }
                _ => PollState::Terminal(resource_outcome(response.body)),
            }
        } else {
            if response.status == StatusCode::ACCEPTED {
                tracing::warn!("{} {} returned 202 without a polling URL", method, path);
            }
            PollState::Terminal(Outcome::Succeeded(response.body))
        };

        tracing::debug!("Started poller for {} {}: {:?}", method, path, state);

        Ok(Self {
            client,
            method,
            state,
            next_delay,
            started: Instant::now(),
        })
    }

    pub fn status(&self) -> &PollState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, PollState::Terminal(_))
    }

    /// Poll until the operation reaches a terminal state or `deadline` passes
    ///
    /// Transient errors are retried with the client's backoff policy.
    /// Server-reported failures are returned as [`Error::OperationFailed`]
    /// and an elapsed deadline as [`Error::Timeout`]; both are recorded and
    /// returned again on later calls.
    pub async fn poll_until_done(&mut self, deadline: Instant) -> Result<Value> {
        let policy = self.client.poll.retry;
        let mut failures = 0u32;
        let mut delay = self.next_delay;

        loop {
            if let PollState::Terminal(outcome) = &self.state {
                return outcome.to_result();
            }

            let now = Instant::now();
            if now >= deadline {
                self.finish(Outcome::TimedOut(now - self.started));
                continue;
            }

            tokio::time::sleep_until(wake_at(now, delay, deadline)).await;
            if Instant::now() >= deadline {
                self.finish(Outcome::TimedOut(self.started.elapsed()));
                continue;
            }

            match tokio::time::timeout_at(deadline, self.poll_once()).await {
                Err(_) => self.finish(Outcome::TimedOut(self.started.elapsed())),
                Ok(Ok(Step::Done(outcome))) => self.finish(outcome),
                Ok(Ok(Step::Pending(retry_after))) => {
                    failures = 0;
                    delay = retry_after.unwrap_or(self.client.poll.interval);
                }
                Ok(Err(e)) if e.is_transient() => {
                    failures += 1;
                    if !policy.should_retry(failures) {
                        tracing::warn!("Giving up polling after {} transient failures: {}", failures, e);
                        return Err(e);
                    }
                    delay = policy.backoff(failures);
                    tracing::warn!(
                        "Transient error while polling ({}/{}), retrying in {:?}: {}",
                        failures,
                        policy.max_retries,
                        delay,
                        e
                    );
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        tracing::debug!(
            "{} operation finished after {:?}: {}",
            self.method,
            self.started.elapsed(),
            match &outcome {
                Outcome::Succeeded(_) => "succeeded",
                Outcome::Failed { .. } => "failed",
                Outcome::Canceled { .. } => "canceled",
                Outcome::TimedOut(_) => "timed out",
            }
        );
        self.state = PollState::Terminal(outcome);
    }

    async fn poll_once(&self) -> Result<Step> {
        let PollState::InProgress(strategy) = &self.state else {
            return Err(Error::Validation("poller already finished".to_string()));
        };

        match strategy.clone() {
            PollStrategy::AsyncOperation {
                status_url,
                final_url,
            } => {
                let response = self.client.send(Method::GET, &status_url, None, None).await?;
                let status = response
                    .body
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("InProgress");

                if status.eq_ignore_ascii_case("Succeeded") {
                    let result = match final_url {
                        Some(url) => self.client.send(Method::GET, &url, None, None).await?.body,
                        None => response.body.get("properties").cloned().unwrap_or(Value::Null),
                    };
                    return Ok(Step::Done(Outcome::Succeeded(result)));
                }
                if let Some(outcome) = failure_outcome(status, &response.body) {
                    return Ok(Step::Done(outcome));
                }
                Ok(Step::Pending(retry_after(&response)))
            }
            PollStrategy::Location { url } => {
                let response = self.client.send(Method::GET, &url, None, None).await?;
                if response.status == StatusCode::ACCEPTED {
                    return Ok(Step::Pending(retry_after(&response)));
                }
                Ok(Step::Done(Outcome::Succeeded(response.body)))
            }
            PollStrategy::ProvisioningState { url } => {
                let response = self.client.send(Method::GET, &url, None, None).await?;
                match provisioning_state(&response.body) {
                    Some(state) if !is_terminal(state) => Ok(Step::Pending(retry_after(&response))),
                    _ => Ok(Step::Done(resource_outcome(response.body))),
                }
            }
        }
    }
}

/// Poll a resource's reported state until it reaches one of `target`
///
/// For APIs that expose progress as a plain state string (provider and
/// feature registration) rather than as a long-running operation. States in
/// `pending` keep waiting; any other state fails the wait.
pub async fn wait_for_state<F, Fut>(
    description: &str,
    pending: &[&str],
    target: &[&str],
    settings: PollSettings,
    deadline: Instant,
    mut refresh: F,
) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let started = Instant::now();
    let matches = |set: &[&str], state: &str| set.iter().any(|s| s.eq_ignore_ascii_case(state));
    let mut failures = 0u32;

    loop {
        let delay = match tokio::time::timeout_at(deadline, refresh()).await {
            Err(_) => return Err(Error::Timeout { after: started.elapsed() }),
            Ok(Ok(state)) => {
                failures = 0;
                if matches(target, &state) {
                    tracing::debug!("{} reached {}", description, state);
                    return Ok(state);
                }
                if !matches(pending, &state) {
                    return Err(Error::OperationFailed {
                        code: "UnexpectedState".to_string(),
                        message: format!(
                            "{} reached state {:?}, expected one of {:?}",
                            description, state, target
                        ),
                    });
                }
                tracing::debug!("{} is {}, waiting", description, state);
                settings.interval
            }
            Ok(Err(e)) if e.is_transient() => {
                failures += 1;
                if !settings.retry.should_retry(failures) {
                    return Err(e);
                }
                tracing::warn!("Transient error while waiting for {}: {}", description, e);
                settings.retry.backoff(failures)
            }
            Ok(Err(e)) => return Err(e),
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout { after: started.elapsed() });
        }
        tokio::time::sleep_until(wake_at(now, delay, deadline)).await;
    }
}

/// When to wake for the next poll, never past `deadline`
///
/// `delay` may come straight from a `Retry-After` header, so it is unbounded.
fn wake_at(now: Instant, delay: Duration, deadline: Instant) -> Instant {
    now.checked_add(delay).map_or(deadline, |at| at.min(deadline))
}

fn header_url(client: &ArmClient, response: &ApiResponse, name: &str) -> Result<Option<Url>> {
    response
        .header(name)
        .filter(|v| !v.is_empty())
        .map(|link| client.absolute_url(link))
        .transpose()
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|v| v.as_str())
}

fn is_terminal(state: &str) -> bool {
    ["Succeeded", "Failed", "Canceled", "Cancelled"]
        .iter()
        .any(|s| s.eq_ignore_ascii_case(state))
}

/// Outcome for a `Failed`/`Canceled` status, `None` for anything else
fn failure_outcome(status: &str, body: &Value) -> Option<Outcome> {
    let (code, message) = error_detail(body)
        .unwrap_or_else(|| (status.to_string(), format!("operation reported status {}", status)));

    if status.eq_ignore_ascii_case("Failed") {
        Some(Outcome::Failed { code, message })
    } else if status.eq_ignore_ascii_case("Canceled") || status.eq_ignore_ascii_case("Cancelled") {
        Some(Outcome::Canceled { message })
    } else {
        None
    }
}

/// Outcome for a resource body carrying a terminal (or no) provisioning state
fn resource_outcome(body: Value) -> Outcome {
    match provisioning_state(&body).and_then(|state| failure_outcome(state, &body)) {
        Some(outcome) => outcome,
        None => Outcome::Succeeded(body),
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP-date
fn retry_after(response: &ApiResponse) -> Option<Duration> {
    let value = response.header(RETRY_AFTER_HEADER)?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::auth::ArmCredentials;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use serde_json::json;

    fn client() -> ArmClient {
        ArmClient::new(ArmCredentials::from_static("t"), "sub", "https://management.azure.com").unwrap()
    }

    fn resource_url() -> Url {
        Url::parse("https://management.azure.com/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub1?api-version=2020-03-01").unwrap()
    }

    fn response(status: StatusCode, headers: &[(&'static str, &str)], body: Value) -> ApiResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        ApiResponse {
            status,
            headers: map,
            body,
        }
    }

    #[test]
    fn test_async_operation_header_is_preferred() {
        let initial = response(
            StatusCode::CREATED,
            &[
                ("Azure-AsyncOperation", "https://management.azure.com/ops/1"),
                ("Location", "https://management.azure.com/results/1"),
            ],
            json!({}),
        );
        let poller = Poller::from_response(client(), Method::PUT, resource_url(), initial).unwrap();
        match poller.status() {
            PollState::InProgress(PollStrategy::AsyncOperation { status_url, final_url }) => {
                assert_eq!(status_url.path(), "/ops/1");
                assert_eq!(final_url.as_ref(), Some(&resource_url()));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_post_final_url_is_location() {
        let initial = response(
            StatusCode::ACCEPTED,
            &[
                ("Azure-AsyncOperation", "https://management.azure.com/ops/1"),
                ("Location", "/results/1"),
            ],
            Value::Null,
        );
        let poller = Poller::from_response(client(), Method::POST, resource_url(), initial).unwrap();
        match poller.status() {
            PollState::InProgress(PollStrategy::AsyncOperation { final_url, .. }) => {
                assert_eq!(final_url.as_ref().map(|u| u.path()), Some("/results/1"));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_non_terminal_provisioning_state_polls_resource() {
        let initial = response(
            StatusCode::CREATED,
            &[],
            json!({"properties": {"provisioningState": "Creating"}}),
        );
        let poller = Poller::from_response(client(), Method::PUT, resource_url(), initial).unwrap();
        assert_eq!(
            poller.status(),
            &PollState::InProgress(PollStrategy::ProvisioningState { url: resource_url() })
        );
    }

    #[tokio::test]
    async fn test_synchronous_completion_is_terminal() {
        let body = json!({"name": "hub1", "properties": {"provisioningState": "Succeeded"}});
        let initial = response(StatusCode::OK, &[], body.clone());
        let mut poller = Poller::from_response(client(), Method::PUT, resource_url(), initial).unwrap();
        assert!(poller.is_done());
        let result = poller.poll_until_done(Instant::now()).await.unwrap();
        assert_eq!(result, body);
    }

    #[tokio::test]
    async fn test_failed_provisioning_state_in_initial_response() {
        let initial = response(
            StatusCode::OK,
            &[],
            json!({"properties": {"provisioningState": "Failed"}, "error": {"code": "Quota", "message": "no capacity"}}),
        );
        let mut poller = Poller::from_response(client(), Method::PUT, resource_url(), initial).unwrap();
        match poller.poll_until_done(Instant::now()).await {
            Err(Error::OperationFailed { code, message }) => {
                assert_eq!(code, "Quota");
                assert_eq!(message, "no capacity");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_already_passed_times_out() {
        let initial = response(
            StatusCode::ACCEPTED,
            &[("Location", "https://management.azure.com/results/1")],
            Value::Null,
        );
        let mut poller = Poller::from_response(client(), Method::DELETE, resource_url(), initial).unwrap();
        let err = poller.poll_until_done(Instant::now()).await.unwrap_err();
        assert!(err.is_timeout());
        // the outcome is cached
        assert!(poller.is_done());
        assert!(poller.poll_until_done(Instant::now() + Duration::from_secs(60)).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_wait_for_state_reaches_target() {
        let mut states = vec!["Registered", "Registering", "Registering"];
        let result = wait_for_state(
            "provider",
            &["Registering"],
            &["Registered"],
            PollSettings {
                interval: Duration::from_millis(1),
                ..PollSettings::default()
            },
            Instant::now() + Duration::from_secs(5),
            || {
                let state = states.pop().unwrap_or("Registered").to_string();
                async move { Ok(state) }
            },
        )
        .await
        .unwrap();
        assert_eq!(result, "Registered");
    }

    #[tokio::test]
    async fn test_wait_for_state_unexpected_state_fails() {
        let err = wait_for_state(
            "feature",
            &["Registering"],
            &["Registered"],
            PollSettings::default(),
            Instant::now() + Duration::from_secs(5),
            || async { Ok("NotRegistered".to_string()) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_times_out() {
        let err = wait_for_state(
            "provider",
            &["Registering"],
            &["Registered"],
            PollSettings::default(),
            Instant::now() + Duration::from_secs(30),
            || async { Ok("Registering".to_string()) },
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_state_huge_interval_times_out() {
        let err = wait_for_state(
            "provider",
            &["Registering"],
            &["Registered"],
            PollSettings {
                interval: Duration::MAX,
                ..PollSettings::default()
            },
            Instant::now() + Duration::from_secs(30),
            || async { Ok("Registering".to_string()) },
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_retry_after_waits_until_deadline() {
        let initial = response(
            StatusCode::CREATED,
            &[
                ("Azure-AsyncOperation", "https://management.azure.com/ops/1"),
                ("Retry-After", "18446744073709551615"),
            ],
            json!({}),
        );
        let mut poller = Poller::from_response(client(), Method::PUT, resource_url(), initial).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = poller.poll_until_done(deadline).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_wake_at_is_capped_by_deadline() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(5);
        assert_eq!(wake_at(now, Duration::from_secs(1), deadline), now + Duration::from_secs(1));
        assert_eq!(wake_at(now, Duration::from_secs(60), deadline), deadline);
        assert_eq!(wake_at(now, Duration::MAX, deadline), deadline);
    }

    #[test]
    fn test_retry_after_parsing() {
        let seconds = response(StatusCode::ACCEPTED, &[("Retry-After", "7")], Value::Null);
        assert_eq!(retry_after(&seconds), Some(Duration::from_secs(7)));

        let past = response(
            StatusCode::ACCEPTED,
            &[("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT")],
            Value::Null,
        );
        assert_eq!(retry_after(&past), Some(Duration::ZERO));

        let none = response(StatusCode::ACCEPTED, &[], Value::Null);
        assert_eq!(retry_after(&none), None);

        let huge = response(StatusCode::ACCEPTED, &[("Retry-After", "18446744073709551615")], Value::Null);
        assert_eq!(retry_after(&huge), Some(Duration::from_secs(u64::MAX)));
    }
}
