//! In-memory collaborator fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::relay::{Mailer, OutboundMessage};
use crate::storage::ObjectStorage;
use crate::tenant::{TenantConfig, TenantDirectory};
use crate::watermark::{
    Download, JobState, WatermarkApi, WatermarkJob, WatermarkPayload, WatermarkResponse,
};

type SubmitFn = dyn Fn(&WatermarkPayload) -> Result<WatermarkResponse, RelayError> + Send + Sync;

/// Watermark API whose answers are scripted per test.
///
/// Job status answers are served in order; once they run out every poll
/// reports `pending`.
pub(crate) struct ScriptedApi {
    on_submit: Box<SubmitFn>,
    submitted: Mutex<Vec<WatermarkPayload>>,
    statuses: Mutex<VecDeque<Result<WatermarkJob, RelayError>>>,
    polls: AtomicU32,
    downloads: HashMap<String, Download>,
}

impl ScriptedApi {
    pub(crate) fn new<F>(on_submit: F) -> Self
    where
        F: Fn(&WatermarkPayload) -> Result<WatermarkResponse, RelayError> + Send + Sync + 'static,
    {
        Self {
            on_submit: Box::new(on_submit),
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
            downloads: HashMap::new(),
        }
    }

    pub(crate) fn with_download(
        mut self,
        url: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.downloads.insert(
            url.to_string(),
            Download {
                content_type: content_type.map(str::to_string),
                bytes,
            },
        );
        self
    }

    pub(crate) fn with_statuses(self, statuses: Vec<Result<WatermarkJob, RelayError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub(crate) fn submitted(&self) -> Vec<WatermarkPayload> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

/// Job snapshot helper.
pub(crate) fn job(
    id: &str,
    state: JobState,
    result_url: Option<&str>,
    error: Option<&str>,
) -> WatermarkJob {
    WatermarkJob {
        id: id.to_string(),
        state,
        result_url: result_url.map(str::to_string),
        error_message: error.map(str::to_string),
    }
}

#[async_trait]
impl WatermarkApi for ScriptedApi {
    async fn submit(&self, payload: &WatermarkPayload) -> Result<WatermarkResponse, RelayError> {
        self.submitted.lock().unwrap().push(payload.clone());
        (self.on_submit)(payload)
    }

    async fn job_status(&self, job_id: &str) -> Result<WatermarkJob, RelayError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(job(job_id, JobState::Pending, None, None)))
    }

    async fn download(&self, url: &str) -> Result<Download, RelayError> {
        self.downloads
            .get(url)
            .cloned()
            .ok_or_else(|| RelayError::WatermarkService {
                status: Some(404),
                body: format!("no such result {url}"),
            })
    }
}

/// Object storage that records every call as `upload:<path>` / `remove:<path>`.
#[derive(Default)]
pub(crate) struct RecordingStorage {
    calls: Mutex<Vec<String>>,
    fail_uploads: bool,
}

impl RecordingStorage {
    pub(crate) fn failing_uploads() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_uploads: true,
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload(
        &self,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(format!("upload:{path}"));
        if self.fail_uploads {
            return Err(RelayError::Internal("bucket unavailable".to_string()));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/public/{path}")
    }

    async fn remove(&self, path: &str) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(format!("remove:{path}"));
        Ok(())
    }
}

/// Tenant directory holding at most one record.
///
/// Returns the record whenever the key matches, even if it is inactive, so
/// the resolver's own active check is exercised.
pub(crate) struct FixedDirectory {
    record: Option<TenantConfig>,
    queries: AtomicU32,
}

impl FixedDirectory {
    pub(crate) fn new(record: Option<TenantConfig>) -> Self {
        Self {
            record,
            queries: AtomicU32::new(0),
        }
    }

    pub(crate) fn acme(active: bool) -> Self {
        Self::new(Some(TenantConfig {
            key: "acme".to_string(),
            active,
            destination_email: "ops@acme.example".to_string(),
            company_name: "Acme Capital".to_string(),
            logo_url: None,
            user_id: "owner-1".to_string(),
        }))
    }

    pub(crate) fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantDirectory for FixedDirectory {
    async fn find_active(&self, key: &str) -> Result<Option<TenantConfig>, RelayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.record.clone().filter(|r| r.key == key))
    }
}

/// Mailer that keeps every message it is asked to send.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<String, RelayError> {
        if self.fail {
            return Err(RelayError::RelayTransmission("provider rejected message".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}
