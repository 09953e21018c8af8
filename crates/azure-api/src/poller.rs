use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::OperationStatus;
use crate::{AzureClient, Error, Result};

const ASYNC_OPERATION: &str = "azure-asyncoperation";

/// One observation of a long-running operation.
#[derive(Debug)]
pub enum PollState<T> {
    /// Still running. `retry_after` carries the platform's suggested delay.
    Pending { retry_after: Option<Duration> },
    Succeeded(T),
    Failed(String),
}

/// Handle to an in-flight mutating call.
#[async_trait]
pub trait Poller<T>: Send {
    async fn poll(&mut self) -> Result<PollState<T>>;
}

pub type BoxPoller<T> = Box<dyn Poller<T>>;

enum Monitor {
    AsyncOperation(String),
    Location(String),
    Done(Option<Value>),
}

/// Azure Resource Manager long-running operation.
///
/// Tracks either the `Azure-AsyncOperation` status monitor or the `Location`
/// header of a `202 Accepted` response. When the operation targets a
/// resource (PUT), the final value is read back from `resource_url`.
/// Operations without a resource (start, deallocate, delete) resolve to
/// whatever `T` deserializes from `null`, normally `()`.
pub struct ArmPoller<T> {
    client: AzureClient,
    endpoint: &'static str,
    resource_url: Option<String>,
    monitor: Monitor,
    _result: PhantomData<fn() -> T>,
}

impl<T> ArmPoller<T> {
    pub(crate) async fn from_response(
        client: AzureClient,
        endpoint: &'static str,
        resource_url: Option<String>,
        resp: reqwest::Response,
    ) -> Result<Self> {
        let status = resp.status();
        let headers = resp.headers().clone();

        let monitor = if let Some(url) = header(&headers, ASYNC_OPERATION) {
            Monitor::AsyncOperation(url)
        } else if status == StatusCode::ACCEPTED
            && let Some(url) = header(&headers, LOCATION.as_str())
        {
            Monitor::Location(url)
        } else if status == StatusCode::NOT_FOUND {
            Monitor::Done(None)
        } else {
            Monitor::Done(read_body(resp, endpoint).await?)
        };

        Ok(Self {
            client,
            endpoint,
            resource_url,
            monitor,
            _result: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> ArmPoller<T> {
    async fn finish(&self, body: Option<Value>) -> Result<PollState<T>> {
        let value = match (&self.resource_url, body) {
            (None, _) => Value::Null,
            (Some(_), Some(body)) if !body.is_null() => body,
            (Some(url), _) => self.client.get_value(url, self.endpoint).await?,
        };

        serde_json::from_value(value)
            .map(PollState::Succeeded)
            .map_err(|source| Error::Decode {
                endpoint: self.endpoint,
                source,
            })
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Poller<T> for ArmPoller<T> {
    async fn poll(&mut self) -> Result<PollState<T>> {
        match &self.monitor {
            Monitor::Done(body) => {
                let body = body.clone();
                self.finish(body).await
            }
            Monitor::AsyncOperation(url) => {
                let resp = self.client.get_raw(url, self.endpoint).await?;
                let retry_after = retry_after(resp.headers());
                let status: OperationStatus = match read_body(resp, self.endpoint).await? {
                    Some(body) => serde_json::from_value(body).map_err(|source| Error::Decode {
                        endpoint: self.endpoint,
                        source,
                    })?,
                    None => return Ok(PollState::Pending { retry_after }),
                };

                match status.status.as_str() {
                    "Succeeded" => self.finish(None).await,
                    "Failed" | "Canceled" => Ok(PollState::Failed(
                        status
                            .error
                            .map(|e| e.describe())
                            .unwrap_or_else(|| format!("operation {}", status.status.to_lowercase())),
                    )),
                    _ => Ok(PollState::Pending { retry_after }),
                }
            }
            Monitor::Location(url) => {
                let resp = self.client.get_raw(url, self.endpoint).await?;
                if resp.status() == StatusCode::ACCEPTED {
                    return Ok(PollState::Pending {
                        retry_after: retry_after(resp.headers()),
                    });
                }
                self.finish(None).await
            }
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub(crate) async fn read_body(resp: reqwest::Response, endpoint: &'static str) -> Result<Option<Value>> {
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| Error::Decode { endpoint, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_reads_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(15)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }
}
