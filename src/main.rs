use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sdfetl::{
    init_tracing_once, read_text_with_backoff, write_atomic_with_backoff, CampaignConfig, DirStore, FetchInput,
    OutboxMailer, PollPolicy, ReqwestTransport, SdfDownloader, SdfOptions, SdfVersion, SdfWorkspace,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

const INPUT_FILE: &str = "input.json";

#[derive(Parser, Debug)]
#[command(name = "sdfetl", version, about = "Download, flatten, bulk-edit and re-export SDF campaign files")]
struct Cli {
    /// Workspace directory holding the tables.
    #[arg(long, env = "SDFETL_WORKSPACE", default_value = "./sdf_workspace")]
    workspace: PathBuf,

    #[arg(long, env = "SDFETL_API_BASE", default_value = "https://displayvideo.googleapis.com/")]
    api_base: String,

    #[arg(long, env = "SDFETL_SDF_VERSION", value_enum, default_value_t = VersionArg::V5_3)]
    sdf_version: VersionArg,

    /// Hidden archive copies kept per table (all when unset).
    #[arg(long, env = "SDFETL_ARCHIVE_LIMIT")]
    archive_limit: Option<usize>,

    #[arg(long)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum VersionArg {
    #[value(name = "5.2")]
    V5_2,
    #[value(name = "5.3")]
    V5_3,
}

#[derive(Args, Debug, Clone)]
struct FetchArgs {
    #[arg(long, env = "SDFETL_TOKEN", hide_env_values = true)]
    token: String,
    #[arg(long)]
    partner: Option<String>,
    #[arg(long, conflicts_with = "io_ids")]
    campaign: Option<String>,
    /// Comma-separated insertion order ids.
    #[arg(long, requires = "destination")]
    io_ids: Option<String>,
    /// Campaign the IOs will be uploaded into.
    #[arg(long)]
    destination: Option<String>,
    #[arg(long, default_value_t = 2)]
    poll_interval_secs: u64,
    #[arg(long, default_value_t = 900)]
    max_polls: u32,
    /// Multiplier applied to the poll interval after each check (1 = fixed).
    #[arg(long, default_value_t = 1.0)]
    backoff: f64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch SDF files into the workspace and build the configuration table.
    Download(FetchArgs),
    /// Write edits and campaign settings back into the entity tables.
    Update {
        /// JSON file with the campaign settings.
        #[arg(long)]
        config: PathBuf,
    },
    /// Zip the entity tables into an outbox email.
    Email {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "./outbox")]
        outbox: PathBuf,
    },
    /// Build the third-party tracker form without storing the raw tables.
    Tracker(FetchArgs),
    /// Write each entity table as a CSV file.
    Export {
        #[arg(long, default_value = "./sdf_export")]
        out: PathBuf,
    },
    /// Delete all tables except the configuration and tracker tables.
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

impl FetchArgs {
    fn poll(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_polls,
            backoff_factor: self.backoff,
            ..PollPolicy::default()
        }
    }

    /// Flags win; otherwise reuse what the last download in this workspace used.
    fn input(&self, workspace: &Path) -> Result<FetchInput> {
        if let Some(partner) = &self.partner {
            return Ok(match (&self.io_ids, &self.campaign) {
                (Some(ios), _) => FetchInput::insertion_orders(partner, ios, self.destination.clone().unwrap_or_default()),
                (None, Some(c)) => FetchInput::campaign(partner, c),
                (None, None) => bail!("--campaign or --io-ids is required"),
            });
        }
        let saved = load_input(workspace)?;
        tracing::info!("using the saved input for partner {}", saved.partner_id);
        Ok(saved)
    }
}

fn load_input(workspace: &Path) -> Result<FetchInput> {
    let path = workspace.join(INPUT_FILE);
    let text = read_text_with_backoff(&path).context("no saved input; pass --partner with --campaign or --io-ids")?;
    Ok(serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?)
}

fn save_input(workspace: &Path, input: &FetchInput) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(input)?;
    write_atomic_with_backoff(&workspace.join(INPUT_FILE), &bytes)
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();

    let version = match cli.sdf_version {
        VersionArg::V5_2 => SdfVersion::V5_2,
        VersionArg::V5_3 => SdfVersion::V5_3,
    };
    let mut opts = SdfOptions::default()
        .with_api_base(cli.api_base.clone())
        .with_sdf_version(version)
        .with_archive_limit(cli.archive_limit)
        .with_progress(!cli.no_progress);

    std::fs::create_dir_all(&cli.workspace)
        .with_context(|| format!("create workspace {}", cli.workspace.display()))?;
    let store = DirStore::open(&cli.workspace, opts.cell_capacity)?;

    match &cli.command {
        Command::Download(args) | Command::Tracker(args) => {
            opts = opts.with_poll_policy(args.poll());
            let input = args.input(&cli.workspace)?;
            let transport = ReqwestTransport::new(args.token.clone(), Duration::from_secs(120))?;
            let downloader = SdfDownloader::new(transport, &opts);
            let mut ws = SdfWorkspace::with_options(store, opts);
            if matches!(cli.command, Command::Download(_)) {
                let report = ws.download(&downloader, &input)?;
                save_input(&cli.workspace, &input)?;
                println!(
                    "Inserted {} tables, skipped {}, {} config rows ({} line items and {} IOs filtered out)",
                    report.inserted.len(),
                    report.skipped.len(),
                    report.config_rows,
                    report.filter.line_items_removed,
                    report.filter.ios_removed
                );
            } else {
                let rows = ws.tracker(&downloader, &input)?;
                println!("Tracker form has {rows} ads");
            }
        }
        Command::Update { config } => {
            let text = read_text_with_backoff(config)?;
            let cfg = CampaignConfig::from_json(&text).with_context(|| format!("parse {}", config.display()))?;
            let input = load_input(&cli.workspace)?;
            let mut ws = SdfWorkspace::with_options(store, opts);
            let report = ws.update(&cfg, &input)?;
            println!("Applied {} ad edits across {} tables", report.ads_edited, report.tables.len());
        }
        Command::Email { to, outbox } => {
            let input = load_input(&cli.workspace)?;
            let ws = SdfWorkspace::with_options(store, opts);
            let mut mailer = OutboxMailer::new(outbox)?;
            let draft = ws.email(&mut mailer, to, &input)?;
            println!("{}", draft.subject);
        }
        Command::Export { out } => {
            std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
            let ws = SdfWorkspace::with_options(store, opts);
            for (name, csv) in ws.export_csvs()? {
                write_atomic_with_backoff(&out.join(&name), csv.as_bytes())?;
                println!("{}", out.join(&name).display());
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete SDF tables without --yes");
            }
            let mut ws = SdfWorkspace::with_options(store, opts);
            let deleted = ws.clear()?;
            println!("Deleted {} tables", deleted.len());
        }
    }
    Ok(())
}
