use std::sync::{Arc, Mutex};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::tracker::error::{internal_error, network_error, TrackerResult};

/// Issues the collector's GET requests on behalf of a non-browser host.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait CollectorTransport: Send + Sync {
    async fn get(&self, url: &str) -> TrackerResult<()>;
}

/// `reqwest`-backed transport. The response body is never read.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> TrackerResult<Self> {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(10));
        let client = builder
            .build()
            .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_timeout(timeout: Duration) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl CollectorTransport for HttpTransport {
    async fn get(&self, url: &str) -> TrackerResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| network_error(format!("failed to reach collector: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(network_error(format!(
            "collector request failed with status {status}"
        )))
    }
}

/// Transport that keeps every requested URL in memory, optionally failing each request.
#[derive(Clone, Debug, Default)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl CollectorTransport for RecordingTransport {
    async fn get(&self, url: &str) -> TrackerResult<()> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(network_error("recording transport configured to fail"));
        }
        Ok(())
    }
}
