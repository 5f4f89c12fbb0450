//! Hand-off email: the updated entity CSVs zipped into one attachment, with a
//! subject and body naming the advertiser (campaign-level fetch) or the
//! destination campaign (IO-level fetch).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;

use crate::archive::zip_files;
use crate::config::FetchScope;
use crate::error::SdfError;
use crate::util::write_atomic_with_backoff;

pub const ATTACHMENT_NAME: &str = "sdf_files.zip";
pub const UPLOAD_URL: &str = "https://displayvideo.google.com/";

/// Who the files are for: the advertiser, or the destination campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailTarget {
    Advertiser(String),
    Campaign(String),
}

impl EmailTarget {
    pub fn for_scope(scope: FetchScope, advertiser_id: &str, destination_campaign_id: &str) -> Self {
        match scope {
            FetchScope::Campaign => EmailTarget::Advertiser(advertiser_id.to_string()),
            FetchScope::InsertionOrder => EmailTarget::Campaign(destination_campaign_id.to_string()),
        }
    }

    fn label(&self) -> (&'static str, &str) {
        match self {
            EmailTarget::Advertiser(id) => ("AdvertiserID", id),
            EmailTarget::Campaign(id) => ("CampaignID", id),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    #[serde(skip)]
    pub attachment: Vec<u8>,
}

/// Build the draft from `(file name, csv text)` pairs.
pub fn compose(
    to: &str,
    target: &EmailTarget,
    files: &[(String, String)],
    generated_at: OffsetDateTime,
) -> Result<EmailDraft, SdfError> {
    let (label, id) = target.label();
    let stamp = format_stamp(generated_at);
    let subject = format!("SDF Download - {label} = {id} - Date Generated: {stamp}");
    let scope_name = match target {
        EmailTarget::Advertiser(_) => "Advertiser ID",
        EmailTarget::Campaign(_) => "Campaign ID",
    };
    let body = format!(
        "****Your SDF files are ready to be uploaded into DV360 for {scope_name} = {id}. \
         Click here to upload into DV360: {UPLOAD_URL} ****"
    );
    let attachment = zip_files(files)?;
    Ok(EmailDraft {
        to: to.to_string(),
        subject,
        body,
        attachment_name: ATTACHMENT_NAME.to_string(),
        attachment,
    })
}

fn format_stamp(at: OffsetDateTime) -> String {
    let fmt = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    at.format(&fmt).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Mail-send primitive.
pub trait Mailer {
    fn send(&mut self, draft: &EmailDraft) -> Result<()>;
}

/// Writes each draft into a directory: `<n>-message.json` plus the attachment.
pub struct OutboxMailer {
    dir: PathBuf,
    sent: usize,
}

impl OutboxMailer {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).with_context(|| format!("create outbox {}", dir.display()))?;
        let sent = std::fs::read_dir(&dir)
            .with_context(|| format!("list outbox {}", dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with("-message.json"))
            .count();
        Ok(Self { dir, sent })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Mailer for OutboxMailer {
    fn send(&mut self, draft: &EmailDraft) -> Result<()> {
        self.sent += 1;
        let stem = format!("{:03}", self.sent);
        let meta = serde_json::to_vec_pretty(draft)?;
        write_atomic_with_backoff(&self.dir.join(format!("{stem}-message.json")), &meta)?;
        let attachment = self.dir.join(format!("{stem}-{}", draft.attachment_name));
        write_atomic_with_backoff(&attachment, &draft.attachment)?;
        tracing::info!("email to {:?} written to {}", draft.to, attachment.display());
        Ok(())
    }
}
