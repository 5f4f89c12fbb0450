//! Remote SDF download: create a download task, poll it until done, fetch the
//! zipped media and unpack it.
//!
//! The HTTP side sits behind [`HttpTransport`] so the state machine can be
//! driven by a scripted transport in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::SdfBundle;
use crate::config::{FetchInput, PollPolicy, SdfOptions};
use crate::error::SdfError;
use crate::progress::ProgressScope;
use crate::schema::EntityKind;

/// Minimal JSON/bytes HTTP surface the downloader needs.
pub trait HttpTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, SdfError>;
    fn get_json(&self, url: &str) -> Result<Value, SdfError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SdfError>;
}

/// Blocking reqwest client carrying a bearer token.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    token: String,
}

impl ReqwestTransport {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, SdfError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sdfetl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, token: token.into() })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder, url: &str) -> Result<reqwest::blocking::Response, SdfError> {
        let resp = req.bearer_auth(&self.token).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SdfError::HttpStatus { status: status.as_u16(), url: url.to_string(), body });
        }
        Ok(resp)
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, SdfError> {
        tracing::debug!("POST {url}");
        let req = self.client.post(url).header(reqwest::header::ACCEPT, "application/json").json(body);
        Ok(self.send(req, url)?.json()?)
    }

    fn get_json(&self, url: &str) -> Result<Value, SdfError> {
        tracing::debug!("GET {url}");
        let req = self.client.get(url).header(reqwest::header::ACCEPT, "application/json");
        Ok(self.send(req, url)?.json()?)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SdfError> {
        tracing::debug!("GET {url} (media)");
        let resp = self.send(self.client.get(url), url)?;
        Ok(resp.bytes()?.to_vec())
    }
}

/// Shared flag checked between status polls.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    partner_id: &'a str,
    parent_entity_filter: ParentEntityFilter<'a>,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParentEntityFilter<'a> {
    file_type: Vec<&'static str>,
    filter_ids: &'a [String],
    filter_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<OperationResponse>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    resource_name: String,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn operation(v: Value) -> Result<Operation, SdfError> {
    serde_json::from_value(v).map_err(|e| SdfError::BadResponse(e.to_string()))
}

// ── State machine ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum FetchState {
    CreateTask,
    Polling { task: String, attempts: u32 },
    Downloading { resource: String },
    Done(Vec<u8>),
}

/// Drives one SDF download task to completion.
pub struct SdfDownloader<T: HttpTransport> {
    transport: T,
    api_base: String,
    api_version: String,
    sdf_version: &'static str,
    poll: PollPolicy,
    cancel: CancelToken,
    progress: bool,
}

impl<T: HttpTransport> SdfDownloader<T> {
    pub fn new(transport: T, opts: &SdfOptions) -> Self {
        Self {
            transport,
            api_base: opts.api_base.clone(),
            api_version: opts.api_version.clone(),
            sdf_version: opts.sdf_version.tag(),
            poll: opts.poll.clone(),
            cancel: CancelToken::new(),
            progress: opts.progress,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn create_url(&self) -> String {
        format!("{}{}/sdfdownloadtasks", self.api_base, self.api_version)
    }

    fn status_url(&self, task: &str) -> String {
        format!("{}{}/{}", self.api_base, self.api_version, task)
    }

    fn media_url(&self, resource: &str) -> String {
        format!("{}download/{}?alt=media", self.api_base, resource)
    }

    /// Run the task and return the raw zip bytes.
    pub fn fetch_zip(&self, input: &FetchInput) -> Result<Vec<u8>, SdfError> {
        let (filter_type, filter_ids) = input.filter()?;
        let spinner = ProgressScope::spinner(self.progress, "Waiting for SDF task to complete");
        let started = Instant::now();

        let mut state = FetchState::CreateTask;
        loop {
            state = match state {
                FetchState::CreateTask => {
                    let body = CreateTaskRequest {
                        partner_id: &input.partner_id,
                        parent_entity_filter: ParentEntityFilter {
                            file_type: EntityKind::ALL.iter().map(|k| k.file_type()).collect(),
                            filter_ids: &filter_ids,
                            filter_type,
                        },
                        version: self.sdf_version,
                    };
                    let body = serde_json::to_value(&body).map_err(|e| SdfError::BadResponse(e.to_string()))?;
                    let op = operation(self.transport.post_json(&self.create_url(), &body)?)?;
                    if op.name.is_empty() {
                        return Err(SdfError::BadResponse("create response carries no task name".into()));
                    }
                    tracing::info!("created SDF task {} ({} {:?})", op.name, filter_type, filter_ids);
                    self.check(op, 0)?
                }
                FetchState::Polling { task, attempts } => {
                    if attempts >= self.poll.max_attempts {
                        spinner.finish("SDF task timed out");
                        return Err(SdfError::DeadlineExceeded { task, attempts });
                    }
                    if attempts > 0 {
                        self.sleep_or_cancel(self.poll.delay_for(attempts))?;
                    }
                    let mut op = operation(self.transport.get_json(&self.status_url(&task))?)?;
                    spinner.inc(1);
                    if op.name.is_empty() {
                        op.name = task;
                    }
                    self.check(op, attempts + 1)?
                }
                FetchState::Downloading { resource } => {
                    spinner.set_message("Downloading SDF media");
                    let bytes = self.transport.get_bytes(&self.media_url(&resource))?;
                    FetchState::Done(bytes)
                }
                FetchState::Done(bytes) => {
                    spinner.finish(format!("SDF downloaded ({} bytes)", bytes.len()));
                    tracing::info!("SDF media: {} bytes in {:.1?}", bytes.len(), started.elapsed());
                    return Ok(bytes);
                }
            };
        }
    }

    /// Download and unpack.
    pub fn fetch(&self, input: &FetchInput) -> Result<SdfBundle, SdfError> {
        SdfBundle::from_zip(&self.fetch_zip(input)?)
    }

    fn check(&self, op: Operation, attempts: u32) -> Result<FetchState, SdfError> {
        if self.cancel.is_cancelled() {
            return Err(SdfError::Cancelled);
        }
        if let Some(err) = op.error {
            return Err(SdfError::BadResponse(format!("task {} failed ({}): {}", op.name, err.code, err.message)));
        }
        if !op.done {
            return Ok(FetchState::Polling { task: op.name, attempts });
        }
        match op.response {
            Some(r) if !r.resource_name.is_empty() => Ok(FetchState::Downloading { resource: r.resource_name }),
            _ => Err(SdfError::BadResponse(format!("task {} is done but names no resource", op.name))),
        }
    }

    fn sleep_or_cancel(&self, delay: Duration) -> Result<(), SdfError> {
        let slice = Duration::from_millis(100);
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                tracing::warn!("SDF download cancelled while polling");
                return Err(SdfError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }
}
