use crate::date::SdfDate;
use crate::error::SdfError;
use crate::schema::SdfVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status polling policy for the SDF download task.
#[derive(Clone, Debug, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,     // status checks after the first one before giving up
    pub backoff_factor: f64,   // 1.0 = fixed interval
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 900, // 30 minutes at the fixed 2s interval
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Wait after status check number `attempt` (1-based) came back pending.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.backoff_factor <= 1.0 {
            return self.interval;
        }
        let exp = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.interval.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
    }
}

/// Immutable options threaded through every pipeline component.
#[derive(Clone, Debug)]
pub struct SdfOptions {
    pub api_base: String,           // scheme + host, trailing slash
    pub api_version: String,
    pub sdf_version: SdfVersion,
    pub file_prefix: String,        // "<prefix>-Campaigns.csv", ...
    pub target_subtype: String,     // line-item type kept by the filter stage
    pub id_prefix: String,          // marker prepended to ids in creation mode
    pub cell_capacity: usize,
    pub overflow_table: String,
    pub config_table: String,
    pub tracker_table: String,
    pub poll: PollPolicy,
    pub archive_limit: Option<usize>, // hidden copies kept per table; None keeps all
    pub progress: bool,
}

impl Default for SdfOptions {
    fn default() -> Self {
        Self {
            api_base: "https://displayvideo.googleapis.com/".to_string(),
            api_version: "v1".to_string(),
            sdf_version: SdfVersion::V5_3,
            file_prefix: "SDF".to_string(),
            target_subtype: "TrueView".to_string(),
            id_prefix: "ext".to_string(),
            cell_capacity: 50_000,
            overflow_table: "TooBig".to_string(),
            config_table: "Configuration".to_string(),
            tracker_table: "Form".to_string(),
            poll: PollPolicy::default(),
            archive_limit: None,
            progress: true,
        }
    }
}

impl SdfOptions {
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let mut b = base.into();
        if !b.ends_with('/') {
            b.push('/');
        }
        self.api_base = b;
        self
    }
    pub fn with_api_version(mut self, v: impl Into<String>) -> Self {
        self.api_version = v.into();
        self
    }
    pub fn with_sdf_version(mut self, v: SdfVersion) -> Self {
        self.sdf_version = v;
        self
    }
    pub fn with_file_prefix(mut self, p: impl Into<String>) -> Self {
        self.file_prefix = p.into();
        self
    }
    pub fn with_target_subtype(mut self, s: impl Into<String>) -> Self {
        self.target_subtype = s.into();
        self
    }
    pub fn with_id_prefix(mut self, p: impl Into<String>) -> Self {
        self.id_prefix = p.into();
        self
    }
    pub fn with_cell_capacity(mut self, chars: usize) -> Self {
        self.cell_capacity = chars.max(1);
        self
    }
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
    pub fn with_archive_limit(mut self, limit: Option<usize>) -> Self {
        self.archive_limit = limit;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
}

/// What to download: a whole campaign, or a comma-separated list of IOs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchInput {
    pub partner_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub io_ids: Option<String>,
    /// Campaign the edited files will be uploaded into. For campaign-level
    /// fetches this is the source campaign itself.
    #[serde(default)]
    pub destination_campaign_id: Option<String>,
}

/// Level the bundle was fetched at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchScope {
    Campaign,
    InsertionOrder,
}

impl FetchInput {
    pub fn campaign(partner_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        let campaign_id = campaign_id.into();
        Self {
            partner_id: partner_id.into(),
            destination_campaign_id: Some(campaign_id.clone()),
            campaign_id: Some(campaign_id),
            io_ids: None,
        }
    }

    pub fn insertion_orders(
        partner_id: impl Into<String>,
        io_ids: impl Into<String>,
        destination_campaign_id: impl Into<String>,
    ) -> Self {
        Self {
            partner_id: partner_id.into(),
            campaign_id: None,
            io_ids: Some(io_ids.into()),
            destination_campaign_id: Some(destination_campaign_id.into()),
        }
    }

    /// The IO filter wins whenever IO ids are present.
    pub fn scope(&self) -> FetchScope {
        match non_empty(&self.io_ids) {
            Some(_) => FetchScope::InsertionOrder,
            None => FetchScope::Campaign,
        }
    }

    pub fn source_io_ids(&self) -> Option<&str> {
        non_empty(&self.io_ids)
    }

    pub fn destination_campaign(&self) -> &str {
        non_empty(&self.destination_campaign_id)
            .or_else(|| non_empty(&self.campaign_id))
            .unwrap_or("")
    }

    /// `(filterType, filterIds)` for the download task request.
    pub fn filter(&self) -> Result<(&'static str, Vec<String>), SdfError> {
        if let Some(ios) = non_empty(&self.io_ids) {
            let ids: Vec<String> = ios.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            return Ok(("FILTER_TYPE_INSERTION_ORDER_ID", ids));
        }
        match non_empty(&self.campaign_id) {
            Some(c) => Ok(("FILTER_TYPE_CAMPAIGN_ID", vec![c.to_string()])),
            None => Err(SdfError::Precondition("either a campaign id or insertion order ids is required".into())),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Operator-entered campaign settings applied by `update`. Empty strings mean
/// "leave the downloaded value alone".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub campaign_name: String,
    pub io_name: String,
    pub start_date: String,
    pub end_date: String,
    pub io_budget: String,
    pub geo_id: String,
    pub cpv: String,
    pub cpm: String,
    pub cpa: String,
    /// true: create new entities from the downloaded ones; false: modify in place.
    pub creation: bool,
}

impl CampaignConfig {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn start(&self) -> Result<Option<SdfDate>, SdfError> {
        opt_date(&self.start_date)
    }

    pub fn end(&self) -> Result<Option<SdfDate>, SdfError> {
        opt_date(&self.end_date)
    }
}

fn opt_date(s: &str) -> Result<Option<SdfDate>, SdfError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse().map(Some)
}

/// Some(value) when the operator filled the field in.
pub fn filled(v: &str) -> Option<&str> {
    let t = v.trim();
    if t.is_empty() { None } else { Some(t) }
}
