//! Upload transport for favorite-set and token payloads.

use crate::error::{Error, Result};

/// Pushes a serialized payload to a remote endpoint keyed by resource path.
///
/// Implementations must be safe to call redundantly: the server keeps the
/// latest write per resource, so a duplicate upload is harmless. There is
/// deliberately no retry here; recovery belongs to the consistency-check
/// mechanism, which re-derives the desired state and re-uploads on the
/// next trigger.
#[allow(async_fn_in_trait)]
pub trait Uploader: Send + Sync {
    async fn upload(&self, resource: &str, body: Vec<u8>) -> Result<()>;
}

/// HTTP uploader: PUT `{base_url}/{resource}` with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Uploader for HttpUploader {
    async fn upload(&self, resource: &str, body: Vec<u8>) -> Result<()> {
        let url = format!("{}/{resource}", self.base_url);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Server(status.as_u16()))
        }
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidConfiguration(
            "upload base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidConfiguration(
            "upload base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Semaphore;

    use crate::error::{Error, Result};

    use super::Uploader;

    /// Test uploader: records completed calls, can be switched to fail,
    /// and can gate uploads so a test can hold one "in flight".
    #[derive(Clone, Default)]
    pub struct MockUploader {
        state: Arc<MockState>,
    }

    struct MockState {
        calls: Mutex<Vec<(String, Vec<u8>)>>,
        fail: AtomicBool,
        gated: AtomicBool,
        gate: Semaphore,
        started: Semaphore,
    }

    impl Default for MockState {
        fn default() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                gated: AtomicBool::new(false),
                gate: Semaphore::new(0),
                started: Semaphore::new(0),
            }
        }
    }

    impl MockUploader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail(&self, fail: bool) {
            self.state.fail.store(fail, Ordering::SeqCst);
        }

        /// Gate uploads: each upload blocks until [`Self::release_one`].
        pub fn gate(&self) {
            self.state.gated.store(true, Ordering::SeqCst);
        }

        pub fn ungate(&self) {
            self.state.gated.store(false, Ordering::SeqCst);
            self.state.gate.add_permits(1024);
        }

        /// Let exactly one gated upload proceed.
        pub fn release_one(&self) {
            self.state.gate.add_permits(1);
        }

        /// Wait until an upload attempt has started.
        pub async fn upload_started(&self) {
            self.state.started.acquire().await.unwrap().forget();
        }

        pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
            self.state.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.state.calls.lock().unwrap().len()
        }
    }

    impl Uploader for MockUploader {
        async fn upload(&self, resource: &str, body: Vec<u8>) -> Result<()> {
            self.state.started.add_permits(1);
            if self.state.gated.load(Ordering::SeqCst) {
                self.state.gate.acquire().await.unwrap().forget();
            }
            if self.state.fail.load(Ordering::SeqCst) {
                return Err(Error::Server(500));
            }
            self.state
                .calls
                .lock()
                .unwrap()
                .push((resource.to_string(), body));
            Ok(())
        }
    }
}
