use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::{ClientConfig, DownloadPolicy};
use crate::download::{download_with_resume, DownloadBody};
use crate::error::{ClientError, DownloadError};

/// Statuses that fail the call at once instead of being reported as a generic HTTP error.
pub const NON_RETRYABLE_STATUS: [u16; 7] = [400, 401, 403, 404, 409, 410, 422];

const BODY_SNIPPET_CHARS: usize = 200;

/// Upload-slot request for a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
    pub model_version: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFile {
    pub name: String,
    pub data_id: String,
}

/// Granted batch and its pre-signed upload targets, one per requested file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadSlot {
    pub batch_id: String,
    pub upload_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ExtractProgress {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub extracted_pages: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_pages: u32,
}

/// Per-file entry of a batch status response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ExtractResult {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub extract_progress: Option<ExtractProgress>,
    #[serde(default)]
    pub full_zip_url: Option<String>,
}

impl ExtractResult {
    pub fn batch_state(&self) -> BatchState {
        BatchState::parse(&self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Running,
    WaitingFile,
    Converting,
    Done,
    Failed,
    Unknown(String),
}

impl BatchState {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => BatchState::Pending,
            "running" => BatchState::Running,
            "waiting-file" => BatchState::WaitingFile,
            "converting" => BatchState::Converting,
            "done" => BatchState::Done,
            "failed" => BatchState::Failed,
            other => BatchState::Unknown(other.to_string()),
        }
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    let v = serde_json::Value::deserialize(de)?;
    Ok(match v {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Remote conversion service as seen by the client. The HTTP implementation is the
/// production one; tests plug in scripted fakes.
pub trait ConversionApi: Send + Sync {
    fn request_upload_slot(&self, request: &UploadRequest) -> Result<UploadSlot, ClientError>;
    /// PUT the file to a pre-signed target.
    fn upload(&self, url: &str, path: &Path) -> Result<(), ClientError>;
    fn batch_results(&self, batch_id: &str) -> Result<Vec<ExtractResult>, ClientError>;
    /// GET `url` starting at byte `offset`.
    fn open_download(&self, url: &str, offset: u64) -> Result<DownloadBody, DownloadError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Deserialize, Default)]
struct SlotData {
    #[serde(default)]
    batch_id: Option<String>,
    #[serde(default)]
    file_urls: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Deserialize, Default)]
struct BatchData {
    #[serde(default)]
    extract_result: Vec<ExtractResult>,
}

/// reqwest-backed client for the `{code, msg, trace_id, data}` JSON API.
pub struct HttpConversionApi {
    api_base: String,
    api_token: String,
    api: reqwest::blocking::Client,
    transfer: reqwest::blocking::Client,
}

impl HttpConversionApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        if config.api_token.trim().is_empty() {
            return Err(ClientError::Processing("conversion api token is not configured".into()));
        }
        let build = |timeout: std::time::Duration| {
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .connect_timeout(config.request_timeout)
                .build()
                .map_err(|e| ClientError::Processing(format!("failed to build http client: {e}")))
        };
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            api: build(config.request_timeout)?,
            transfer: build(config.transfer_timeout)?,
        })
    }

    fn request_json<T: DeserializeOwned + Default>(&self, req: reqwest::blocking::RequestBuilder) -> Result<T, ClientError> {
        let resp = req
            .bearer_auth(&self.api_token)
            .send()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = resp.status();
        if NON_RETRYABLE_STATUS.contains(&status.as_u16()) {
            return Err(ClientError::Processing(format!(
                "request failed (not retryable): HTTP {}, body: {}",
                status.as_u16(),
                body_snippet(resp)
            )));
        }
        if !status.is_success() {
            return Err(ClientError::Processing(format!("HTTP error {}, body: {}", status.as_u16(), body_snippet(resp))));
        }
        let envelope: Envelope<T> = resp
            .json()
            .map_err(|e| ClientError::Processing(format!("response is not valid JSON: {e}")))?;
        if envelope.code != 0 {
            return Err(ClientError::Processing(format!(
                "api error: {} (trace_id: {})",
                envelope.msg.unwrap_or_else(|| "unknown error".into()),
                envelope.trace_id.unwrap_or_default()
            )));
        }
        Ok(envelope.data.unwrap_or_default())
    }
}

fn body_snippet(resp: reqwest::blocking::Response) -> String {
    match resp.text() {
        Ok(t) if !t.is_empty() => t.chars().take(BODY_SNIPPET_CHARS).collect(),
        _ => "(empty body)".to_string(),
    }
}

fn transfer_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        DownloadError::Transient(e.to_string())
    } else {
        DownloadError::Fatal(e.to_string())
    }
}

impl ConversionApi for HttpConversionApi {
    fn request_upload_slot(&self, request: &UploadRequest) -> Result<UploadSlot, ClientError> {
        let url = format!("{}/file-urls/batch", self.api_base);
        let data: SlotData = self.request_json(self.api.post(url).json(request))?;
        let upload_urls = if data.file_urls.is_empty() { data.files } else { data.file_urls };
        Ok(UploadSlot { batch_id: data.batch_id.unwrap_or_default(), upload_urls })
    }

    fn upload(&self, url: &str, path: &Path) -> Result<(), ClientError> {
        let file = File::open(path).map_err(|e| ClientError::Upload(format!("cannot read {}: {e}", path.display())))?;
        // pre-signed target: no bearer token
        let resp = self
            .transfer
            .put(url)
            .body(reqwest::blocking::Body::from(file))
            .send()
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        match resp.status().as_u16() {
            200 | 201 => Ok(()),
            other => Err(ClientError::Upload(format!("HTTP {other}"))),
        }
    }

    fn batch_results(&self, batch_id: &str) -> Result<Vec<ExtractResult>, ClientError> {
        let url = format!("{}/extract-results/batch/{}", self.api_base, batch_id);
        let data: BatchData = self.request_json(self.api.get(url))?;
        Ok(data.extract_result)
    }

    fn open_download(&self, url: &str, offset: u64) -> Result<DownloadBody, DownloadError> {
        let mut req = self.transfer.get(url);
        if offset > 0 {
            req = req.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }
        let resp = req.send().map_err(transfer_error)?;
        match resp.status().as_u16() {
            206 => Ok(DownloadBody::resumed(resp)),
            200 => Ok(DownloadBody::fresh(resp)),
            // everything already on disk
            416 if offset > 0 => Ok(DownloadBody::resumed(std::io::empty())),
            // expired pre-signed urls answer 403; a fresh url is fetched on retry
            s @ (403 | 408 | 429) => Err(DownloadError::Transient(format!("HTTP {s}"))),
            s if s >= 500 => Err(DownloadError::Transient(format!("HTTP {s}"))),
            s => Err(DownloadError::Fatal(format!("HTTP {s}"))),
        }
    }
}

/// Upload, poll and result retrieval for single-document batches.
pub struct ConversionClient<A: ConversionApi = HttpConversionApi> {
    api: A,
    config: ClientConfig,
}

impl ConversionClient<HttpConversionApi> {
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let api = HttpConversionApi::new(&config)?;
        Ok(Self::new(api, config))
    }
}

impl<A: ConversionApi> ConversionClient<A> {
    pub fn new(api: A, config: ClientConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ClientConfig { &self.config }

    pub fn api(&self) -> &A { &self.api }

    /// Upload one document and block until the service reports it done. Returns the batch id.
    ///
    /// `progress` receives `(current_page, total_pages)` while the service is running.
    pub fn upload_and_wait(&self, path: &Path, progress: Option<&mut dyn FnMut(u32, u32)>) -> Result<String, ClientError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::Upload(format!("not a file path: {}", path.display())))?;
        let request = UploadRequest {
            files: vec![UploadFile { name: name.clone(), data_id: random_data_id() }],
            model_version: self.config.model_version.clone(),
            language: self.config.language.clone(),
        };
        log::info!(
            "requesting upload slot for {name} (model={}, language={})",
            request.model_version,
            request.language
        );
        let slot = self
            .api
            .request_upload_slot(&request)
            .map_err(|e| ClientError::Upload(format!("requesting upload slot failed: {e}")))?;
        let upload_url = match slot.upload_urls.first() {
            Some(u) if !slot.batch_id.is_empty() => u.clone(),
            _ => return Err(ClientError::Upload("malformed upload slot: missing batch_id or upload url".into())),
        };
        log::info!("uploading {} to batch {}", path.display(), slot.batch_id);
        self.api.upload(&upload_url, path)?;
        self.wait_until_done(&slot.batch_id, progress)?;
        Ok(slot.batch_id)
    }

    /// Poll on the configured interval until the batch is done, failed or out of attempts.
    pub fn wait_until_done(&self, batch_id: &str, mut progress: Option<&mut dyn FnMut(u32, u32)>) -> Result<(), ClientError> {
        let attempts = self.config.max_poll_attempts;
        for attempt in 1..=attempts {
            let results = self.api.batch_results(batch_id)?;
            let Some(first) = results.first() else {
                log::debug!("batch {batch_id}: no result yet (poll {attempt})");
                thread::sleep(self.config.poll_interval);
                continue;
            };
            let state = first.batch_state();
            log::debug!("batch {batch_id}: state {} (poll {attempt})", first.state);
            match state {
                BatchState::Done => {
                    log::info!("batch {batch_id} converted");
                    return Ok(());
                }
                BatchState::Failed => {
                    let reason = first.err_msg.clone().unwrap_or_else(|| "unknown error".into());
                    return Err(ClientError::Processing(format!("conversion failed: {reason}")));
                }
                BatchState::Running => {
                    if let (Some(cb), Some(p)) = (progress.as_deref_mut(), first.extract_progress) {
                        if p.total_pages > 0 {
                            report(cb, p.extracted_pages, p.total_pages);
                        }
                    }
                }
                BatchState::Pending | BatchState::WaitingFile | BatchState::Converting => {}
                BatchState::Unknown(s) => log::warn!("batch {batch_id}: unknown state `{s}`"),
            }
            thread::sleep(self.config.poll_interval);
        }
        Err(ClientError::Timeout {
            attempts,
            waited_secs: self.config.poll_interval.as_secs().saturating_mul(attempts as u64),
        })
    }

    /// First result of the batch, without waiting.
    pub fn batch_status(&self, batch_id: &str) -> Result<Option<ExtractResult>, ClientError> {
        Ok(self.api.batch_results(batch_id)?.into_iter().next())
    }

    /// Download link of a finished batch. Links are time-limited; ask again before each use.
    pub fn result_url(&self, batch_id: &str) -> Result<String, ClientError> {
        let first = self
            .batch_status(batch_id)?
            .ok_or_else(|| ClientError::Processing("no conversion result found".into()))?;
        if first.batch_state() != BatchState::Done {
            return Err(ClientError::Processing(format!("conversion not finished: {}", first.state)));
        }
        first
            .full_zip_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::Processing("result has no download url".into()))
    }

    /// Fetch the result archive to `<output_dir>/<batch_id>.zip`, resuming partial transfers.
    pub fn download_result(&self, batch_id: &str, output_dir: &Path, policy: &DownloadPolicy) -> Result<PathBuf, DownloadError> {
        if output_dir.exists() && !output_dir.is_dir() {
            return Err(DownloadError::Fatal(format!("output path is not a directory: {}", output_dir.display())));
        }
        std::fs::create_dir_all(output_dir)?;
        let dest = output_dir.join(format!("{batch_id}.zip"));
        log::info!("downloading result of batch {batch_id}");
        download_with_resume(
            &dest,
            policy,
            || self.result_url(batch_id).map_err(url_error),
            |url, offset| self.api.open_download(url, offset),
        )?;
        Ok(dest)
    }
}

/// A lost connection while refreshing the link is worth another attempt; a service answer is not.
fn url_error(e: ClientError) -> DownloadError {
    match e {
        ClientError::Network(msg) => DownloadError::Transient(format!("refreshing download url: {msg}")),
        other => DownloadError::Url(other),
    }
}

fn report(cb: &mut dyn FnMut(u32, u32), current: u32, total: u32) {
    if panic::catch_unwind(AssertUnwindSafe(|| cb(current, total))).is_err() {
        log::error!("progress callback panicked at {current}/{total}; continuing");
    }
}

fn random_data_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
