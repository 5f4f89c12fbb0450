use crate::archive::SdfBundle;
use crate::config::{CampaignConfig, FetchInput, FetchScope, PollPolicy, SdfOptions};
use crate::csv_codec;
use crate::email::{compose, EmailDraft, EmailTarget, Mailer};
use crate::error::SdfError;
use crate::fetch::{HttpTransport, SdfDownloader};
use crate::filters::{filter_by_kept_parents, filter_line_items_by_subtype};
use crate::index::EntityIndex;
use crate::join::{Hierarchy, JoinKeys};
use crate::mutate::{self, AdEdit, UpdateContext};
use crate::overflow::{referenced_overflow_tables, resolve_rows, OverflowReport, OverflowWriter};
use crate::progress::ProgressScope;
use crate::schema::{EntityKind, SdfSchema, SdfVersion, AD_EDITABLE_LABELS};
use crate::store::{archive_table, archived_copies, TabularStore};
use crate::util::init_tracing_once;
use ahash::AHashSet;
use anyhow::{Context, Result};
use time::OffsetDateTime;

/// Headers of the flattened configuration table, left to right.
pub const CONFIG_NAME_HEADERS: [&str; 3] = ["Insertion Order", "Line Item", "Ad Group"];
pub const CONFIG_KEY_HEADER: &str = "Ad Id";
pub const TRACKER_HEADERS: [&str; 7] =
    ["Insertion Order", "Line Item", "Ad Group", "Ad Name", "Line Item Id", "Ad Group Id", "Ad Id"];

/// A workspace of SDF tables held in some tabular store, plus the operations
/// that fill, reshape and export it.
pub struct SdfWorkspace<S: TabularStore> {
    pub(crate) opts: SdfOptions,
    store: S,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub line_items_removed: usize,
    pub ios_removed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DownloadReport {
    /// `(table, data rows)` per inserted table, in hierarchy order.
    pub inserted: Vec<(String, usize)>,
    /// Entity files that held nothing but a header.
    pub skipped: Vec<String>,
    pub overflow: OverflowReport,
    pub filter: FilterReport,
    pub config_rows: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub ads_edited: usize,
    /// `(table, rows rewritten)` in update order.
    pub tables: Vec<(String, usize)>,
}

fn archive_suffix() -> String {
    OffsetDateTime::now_utc().unix_timestamp().to_string()
}

fn split_header(mut full: Vec<Vec<String>>) -> (Vec<String>, Vec<Vec<String>>) {
    if full.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let header = full.remove(0);
    (header, full)
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

impl<S: TabularStore> SdfWorkspace<S> {
    pub fn new(store: S) -> Self {
        Self { opts: SdfOptions::default(), store }
    }

    pub fn with_options(store: S, opts: SdfOptions) -> Self {
        Self { opts, store }
    }

    // -------- Builder methods --------
    pub fn api_base(mut self, base: impl Into<String>) -> Self { self.opts = self.opts.with_api_base(base); self }
    pub fn sdf_version(mut self, v: SdfVersion) -> Self { self.opts = self.opts.with_sdf_version(v); self }
    pub fn file_prefix(mut self, p: impl Into<String>) -> Self { self.opts = self.opts.with_file_prefix(p); self }
    pub fn target_subtype(mut self, s: impl Into<String>) -> Self { self.opts = self.opts.with_target_subtype(s); self }
    pub fn id_prefix(mut self, p: impl Into<String>) -> Self { self.opts = self.opts.with_id_prefix(p); self }
    pub fn poll_policy(mut self, poll: PollPolicy) -> Self { self.opts = self.opts.with_poll_policy(poll); self }
    pub fn archive_limit(mut self, limit: Option<usize>) -> Self { self.opts = self.opts.with_archive_limit(limit); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }

    pub fn options(&self) -> &SdfOptions {
        &self.opts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn schema(&self) -> SdfSchema {
        SdfSchema::for_version(self.opts.sdf_version)
    }

    pub fn table_name(&self, kind: EntityKind) -> String {
        kind.table_name(&self.opts.file_prefix)
    }

    fn read_optional(&self, name: &str) -> Result<Option<Vec<Vec<String>>>> {
        if !self.store.has_table(name) {
            return Ok(None);
        }
        let rows = self.store.read_table(name).with_context(|| format!("read table {name:?}"))?;
        Ok(Some(rows))
    }

    /// A required entity table, split into header and data rows, header checked
    /// against the positional layout.
    fn read_entity(&self, kind: EntityKind, schema: &SdfSchema) -> Result<(String, Vec<String>, Vec<Vec<String>>)> {
        let name = self.table_name(kind);
        let full = self
            .read_optional(&name)?
            .ok_or_else(|| SdfError::Precondition(format!("table {name:?} is missing; download SDF first")))?;
        let (header, rows) = split_header(full);
        schema.validate_header(kind, &name, &header)?;
        Ok((name, header, rows))
    }

    /// Replace a table's contents wholesale: header first, then data rows.
    fn rewrite(&mut self, name: &str, header: &[String], rows: &[Vec<String>], overflow: &mut OverflowWriter) -> Result<OverflowReport> {
        let mut full = Vec::with_capacity(rows.len() + 1);
        full.push(header.to_vec());
        full.extend_from_slice(rows);
        if !self.store.has_table(name) {
            self.store.create_table(name)?;
        } else {
            self.store.clear_table(name)?;
        }
        let report = overflow
            .write_table(&mut self.store, name, &full)
            .with_context(|| format!("write table {name:?}"))?;
        Ok(report)
    }

    fn prune_archives(&mut self, name: &str) -> Result<()> {
        self.prune_archives_except(name, &AHashSet::new())
    }

    /// Drop the oldest archive copies of `name` beyond the limit, never
    /// touching the ones in `pinned`.
    fn prune_archives_except(&mut self, name: &str, pinned: &AHashSet<String>) -> Result<()> {
        let Some(limit) = self.opts.archive_limit else { return Ok(()) };
        let copies = archived_copies(&self.store, name);
        let mut excess = copies.len().saturating_sub(limit);
        for old in &copies {
            if excess == 0 {
                break;
            }
            if pinned.contains(old) {
                tracing::debug!("keeping archived table {old:?}: still referenced");
                continue;
            }
            tracing::info!("dropping archived table {old:?}");
            self.store.delete_table(old)?;
            excess -= 1;
        }
        Ok(())
    }

    // -------- Download --------

    /// Fetch the SDF bundle for `input` and load it into the workspace.
    pub fn download<T: HttpTransport>(&mut self, downloader: &SdfDownloader<T>, input: &FetchInput) -> Result<DownloadReport> {
        init_tracing_once();
        tracing::info!("downloading SDF files for partner {}", input.partner_id);
        let bundle = downloader.fetch(input).context("fetch SDF bundle")?;
        self.load_bundle(&bundle)
    }

    /// Insert the bundle's entity files in hierarchy order, then run the
    /// sub-type filter and regenerate the configuration table.
    pub fn load_bundle(&mut self, bundle: &SdfBundle) -> Result<DownloadReport> {
        init_tracing_once();
        let suffix = archive_suffix();
        let mut overflow = OverflowWriter::new(self.opts.overflow_table.clone(), suffix.clone());
        let mut report = DownloadReport::default();
        let bar = ProgressScope::count(self.opts.progress, "Inserting SDF tables", EntityKind::ALL.len() as u64);

        for kind in EntityKind::ALL {
            let name = self.table_name(kind);
            bar.set_message(format!("Inserting {name}"));
            let Some(entry) = bundle.get(kind) else {
                tracing::warn!("bundle has no {name}");
                bar.inc(1);
                continue;
            };
            match self.insert_table(&name, &entry.text, &suffix, &mut overflow)? {
                Some((rows, spill)) => {
                    report.overflow.fallback_rows += spill.fallback_rows;
                    report.overflow.spilled_cells += spill.spilled_cells;
                    report.inserted.push((name, rows));
                }
                None => report.skipped.push(name),
            }
            bar.inc(1);
        }
        bar.finish("SDF tables inserted");
        let overflow_table = self.opts.overflow_table.clone();
        let pinned = referenced_overflow_tables(&self.store, &overflow_table)?;
        self.prune_archives_except(&overflow_table, &pinned)?;

        report.filter = self.filter_subtype()?;
        report.config_rows = self.generate_config()?;
        tracing::info!(
            "download loaded {} tables ({} skipped), {} config rows",
            report.inserted.len(),
            report.skipped.len(),
            report.config_rows
        );
        Ok(report)
    }

    /// Insert one CSV file as table `name`. Header-only files are skipped and
    /// leave any existing table alone. Returns `(data rows, overflow report)`.
    pub fn insert_table(
        &mut self,
        name: &str,
        csv_text: &str,
        suffix: &str,
        overflow: &mut OverflowWriter,
    ) -> Result<Option<(usize, OverflowReport)>> {
        let rows = csv_codec::parse(csv_text).with_context(|| format!("parse {name}"))?;
        if rows.len() <= 1 {
            tracing::info!("{name} has no data rows; skipping");
            return Ok(None);
        }
        if let Some(kind) = EntityKind::from_file_name(name) {
            self.schema().validate_header(kind, name, &rows[0])?;
        }
        if archive_table(&mut self.store, name, suffix)?.is_some() {
            self.prune_archives(name)?;
        }
        self.store.create_table(name)?;
        let spill = overflow.write_table(&mut self.store, name, &rows).with_context(|| format!("insert {name}"))?;
        tracing::info!("inserted {name}: {} data rows", rows.len() - 1);
        Ok(Some((rows.len() - 1, spill)))
    }

    /// Drop line items that are not of the target sub-type, then IOs left
    /// without any surviving line item.
    pub fn filter_subtype(&mut self) -> Result<FilterReport> {
        let schema = self.schema();
        let li_name = self.table_name(EntityKind::LineItem);
        let io_name = self.table_name(EntityKind::InsertionOrder);
        let Some(li_full) = self.read_optional(&li_name)? else {
            tracing::warn!("no {li_name}; skipping the {} filter", self.opts.target_subtype);
            return Ok(FilterReport::default());
        };

        let (li_header, li_rows) = split_header(li_full);
        let li = filter_line_items_by_subtype(
            &li_rows,
            schema.line_item.line_item_type,
            schema.line_item.io_id,
            &self.opts.target_subtype,
        );
        let mut report = FilterReport { line_items_removed: li.removed, ios_removed: 0 };
        let mut overflow = OverflowWriter::appending(self.opts.overflow_table.clone());
        self.rewrite(&li_name, &li_header, &li.kept, &mut overflow)?;

        if let Some(io_full) = self.read_optional(&io_name)? {
            let (io_header, io_rows) = split_header(io_full);
            let kept = filter_by_kept_parents(&io_rows, schema.insertion_order.id, &li.kept_io_ids);
            report.ios_removed = io_rows.len() - kept.len();
            self.rewrite(&io_name, &io_header, &kept, &mut overflow)?;
        }
        tracing::info!(
            "kept {} line items ({} removed), {} IOs removed",
            li.kept.len(),
            report.line_items_removed,
            report.ios_removed
        );
        Ok(report)
    }

    fn hierarchy_indexes(&self, schema: &SdfSchema) -> Result<[EntityIndex; 4]> {
        let index = |kind: EntityKind, id: usize, cols: &[usize]| -> Result<EntityIndex> {
            let name = self.table_name(kind);
            let full = self.read_optional(&name)?.unwrap_or_default();
            if let Some(header) = full.first() {
                schema.validate_header(kind, &name, header)?;
            }
            Ok(EntityIndex::from_table(name, &full, id, cols))
        };
        let io = &schema.insertion_order;
        let li = &schema.line_item;
        let ag = &schema.ad_group;
        let ad = &schema.ad;
        let mut ad_cols = vec![ad.ad_group_id];
        ad_cols.extend(ad.editable);
        Ok([
            index(EntityKind::InsertionOrder, io.id, &[io.campaign_id, io.name])?,
            index(EntityKind::LineItem, li.id, &[li.io_id, li.name])?,
            index(EntityKind::AdGroup, ag.id, &[ag.line_item_id, ag.name])?,
            index(EntityKind::Ad, ad.id, &ad_cols)?,
        ])
    }

    /// Overwrite the configuration table with one flattened row per ad:
    /// `[io, line item, ad group, ad name, 9 ad fields, ad id]`. The ad name
    /// and the 9 fields form the editable block, pre-filled with current values.
    pub fn generate_config(&mut self) -> Result<usize> {
        let schema = self.schema();
        let [ios, line_items, ad_groups, ads] = self.hierarchy_indexes(&schema)?;

        let ad_name = self.table_name(EntityKind::Ad);
        let ad_header = self.read_optional(&ad_name)?.and_then(|t| t.into_iter().next()).unwrap_or_default();
        let leaf: Vec<String> = schema.ad.editable[1..]
            .iter()
            .map(|&i| ad_header.get(i).cloned().unwrap_or_default())
            .collect();
        let leaf_refs: Vec<&str> = leaf.iter().map(String::as_str).collect();

        let hierarchy = Hierarchy { ads: &ads, ad_groups: &ad_groups, line_items: &line_items, ios: &ios };
        let rows = hierarchy.flatten(JoinKeys::AdOnly, &leaf_refs).context("flatten campaign hierarchy")?;

        let mut header: Vec<String> = CONFIG_NAME_HEADERS.iter().map(|s| s.to_string()).collect();
        header.extend(AD_EDITABLE_LABELS.iter().map(|s| s.to_string()));
        header.push(CONFIG_KEY_HEADER.to_string());

        let name = self.opts.config_table.clone();
        let mut overflow = OverflowWriter::appending(self.opts.overflow_table.clone());
        self.rewrite(&name, &header, &rows, &mut overflow)?;
        tracing::info!("wrote {} rows to {name:?}", rows.len());
        Ok(rows.len())
    }

    // -------- Tracker form --------

    /// Fetch a bundle in memory and write the tracker form from it.
    pub fn tracker<T: HttpTransport>(&mut self, downloader: &SdfDownloader<T>, input: &FetchInput) -> Result<usize> {
        init_tracing_once();
        let bundle = downloader.fetch(input).context("fetch SDF bundle for the tracker form")?;
        self.tracker_from_bundle(&bundle)
    }

    /// Filter and join the bundle without storing its raw tables; the tracker
    /// table gets `[io, line item, ad group, ad name, line item id, ad group id, ad id]`.
    pub fn tracker_from_bundle(&mut self, bundle: &SdfBundle) -> Result<usize> {
        let schema = self.schema();
        let parse = |kind: EntityKind| -> Result<(Vec<String>, Vec<Vec<String>>)> {
            let name = self.table_name(kind);
            let entry = bundle
                .get(kind)
                .ok_or_else(|| SdfError::Precondition(format!("bundle has no {name}")))?;
            let (header, rows) = split_header(csv_codec::parse(&entry.text).with_context(|| format!("parse {name}"))?);
            schema.validate_header(kind, &name, &header)?;
            Ok((header, rows))
        };

        let (io_header, io_rows) = parse(EntityKind::InsertionOrder)?;
        let (li_header, li_rows) = parse(EntityKind::LineItem)?;
        let (ag_header, ag_rows) = parse(EntityKind::AdGroup)?;
        let (ad_header, ad_rows) = parse(EntityKind::Ad)?;

        let li = &schema.line_item;
        let filtered = filter_line_items_by_subtype(&li_rows, li.line_item_type, li.io_id, &self.opts.target_subtype);
        let io_rows = filter_by_kept_parents(&io_rows, schema.insertion_order.id, &filtered.kept_io_ids);

        let io = &schema.insertion_order;
        let ag = &schema.ad_group;
        let ad = &schema.ad;
        let ios = EntityIndex::build(self.table_name(EntityKind::InsertionOrder), &io_rows, &io_header, io.id, &[io.campaign_id, io.name]);
        let line_items = EntityIndex::build(self.table_name(EntityKind::LineItem), &filtered.kept, &li_header, li.id, &[li.io_id, li.name]);
        let ad_groups = EntityIndex::build(self.table_name(EntityKind::AdGroup), &ag_rows, &ag_header, ag.id, &[ag.line_item_id, ag.name]);
        let ads = EntityIndex::build(self.table_name(EntityKind::Ad), &ad_rows, &ad_header, ad.id, &[ad.ad_group_id, ad.name]);

        let hierarchy = Hierarchy { ads: &ads, ad_groups: &ad_groups, line_items: &line_items, ios: &ios };
        let rows = hierarchy.flatten(JoinKeys::Full, &[]).context("flatten tracker hierarchy")?;

        let name = self.opts.tracker_table.clone();
        if archive_table(&mut self.store, &name, &archive_suffix())?.is_some() {
            self.prune_archives(&name)?;
        }
        let header: Vec<String> = TRACKER_HEADERS.iter().map(|s| s.to_string()).collect();
        let mut overflow = OverflowWriter::appending(self.opts.overflow_table.clone());
        self.rewrite(&name, &header, &rows, &mut overflow)?;
        tracing::info!("wrote {} tracker rows to {name:?}", rows.len());
        Ok(rows.len())
    }

    // -------- Update --------

    /// Edited config rows, trailing blank rows dropped.
    fn read_edits(&self) -> Result<Vec<AdEdit>> {
        let name = &self.opts.config_table;
        let full = self
            .read_optional(name)?
            .ok_or_else(|| SdfError::Precondition(format!("no {name:?} table; download SDF first")))?;
        let (_, mut rows) = split_header(full);
        while rows.last().is_some_and(|r| is_blank(r)) {
            rows.pop();
        }
        if rows.is_empty() {
            return Err(SdfError::Precondition(format!("{name:?} has no edited rows")).into());
        }

        let names = CONFIG_NAME_HEADERS.len();
        let editable = AD_EDITABLE_LABELS.len();
        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.resize(names + editable + 1, String::new());
                let ad_id = row.pop().unwrap_or_default();
                AdEdit { ad_id, values: row.split_off(names) }
            })
            .collect())
    }

    /// Apply operator edits and campaign settings to the entity tables.
    ///
    /// Every table is computed in memory first; nothing is written unless the
    /// whole pass succeeds.
    pub fn update(&mut self, config: &CampaignConfig, input: &FetchInput) -> Result<UpdateReport> {
        init_tracing_once();
        let schema = self.schema();
        let edits = self.read_edits()?;

        let (ad_name, ad_header, mut ads) = self.read_entity(EntityKind::Ad, &schema)?;
        let (io_name, io_header, mut ios) = self.read_entity(EntityKind::InsertionOrder, &schema)?;
        let (li_name, li_header, mut line_items) = self.read_entity(EntityKind::LineItem, &schema)?;
        let (ag_name, ag_header, mut ad_groups) = self.read_entity(EntityKind::AdGroup, &schema)?;

        let mut report = UpdateReport {
            ads_edited: mutate::apply_ad_edits(&mut ads, &edits, &schema, &ad_name)?,
            ..Default::default()
        };
        tracing::info!("applied {} ad edits", report.ads_edited);

        let ctx = UpdateContext { schema: &schema, config, input, id_prefix: &self.opts.id_prefix };
        let mut pending: Vec<(String, Vec<String>, Vec<Vec<String>>)> = Vec::with_capacity(5);

        if input.scope() == FetchScope::Campaign {
            let (name, header, mut campaigns) = self.read_entity(EntityKind::Campaign, &schema)?;
            mutate::update_campaigns(&mut campaigns, &ctx)?;
            pending.push((name, header, campaigns));
        }

        mutate::update_insertion_orders(&mut ios, &ctx)?;
        mutate::update_line_items(&mut line_items, &ctx)?;

        let mut li_full = Vec::with_capacity(line_items.len() + 1);
        li_full.push(li_header.clone());
        li_full.extend(line_items.iter().cloned());
        let bid_types = mutate::bid_strategy_index(&li_full, &schema, &li_name);
        mutate::update_ad_groups(&mut ad_groups, &ctx, &bid_types)?;
        mutate::update_ads(&mut ads, &ctx)?;

        pending.push((io_name, io_header, ios));
        pending.push((li_name, li_header, line_items));
        pending.push((ag_name, ag_header, ad_groups));
        pending.push((ad_name, ad_header, ads));

        let mut overflow = OverflowWriter::appending(self.opts.overflow_table.clone());
        for (name, header, rows) in &pending {
            self.rewrite(name, header, rows, &mut overflow)?;
            tracing::info!("updated {name}: {} rows", rows.len());
            report.tables.push((name.clone(), rows.len()));
        }
        Ok(report)
    }

    // -------- Export / email --------

    /// Every present entity table as `(file name, CSV text)`, overflow pointers
    /// resolved back into their full values.
    pub fn export_csvs(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for kind in EntityKind::ALL {
            let name = self.table_name(kind);
            let Some(rows) = self.read_optional(&name)? else { continue };
            let rows = resolve_rows(&self.store, &rows, &self.opts.overflow_table)
                .with_context(|| format!("resolve overflow pointers in {name}"))?;
            out.push((name, csv_codec::serialize(&rows)?));
        }
        Ok(out)
    }

    pub fn compose_email(&self, to: &str, input: &FetchInput) -> Result<EmailDraft> {
        let scope = input.scope();
        let advertiser = match scope {
            FetchScope::Campaign => {
                let name = self.table_name(EntityKind::Campaign);
                let rows = self
                    .read_optional(&name)?
                    .ok_or_else(|| SdfError::Precondition(format!("no {name} to read the advertiser from")))?;
                let col = self.schema().campaign.advertiser_id;
                rows.get(1).and_then(|r| r.get(col)).cloned().unwrap_or_default()
            }
            FetchScope::InsertionOrder => String::new(),
        };
        let target = EmailTarget::for_scope(scope, &advertiser, input.destination_campaign());
        let files = self.export_csvs()?;
        if files.is_empty() {
            return Err(SdfError::Precondition("no SDF tables to send".into()).into());
        }
        Ok(compose(to, &target, &files, OffsetDateTime::now_utc())?)
    }

    pub fn email(&self, mailer: &mut dyn Mailer, to: &str, input: &FetchInput) -> Result<EmailDraft> {
        let draft = self.compose_email(to, input)?;
        mailer.send(&draft).context("send SDF email")?;
        Ok(draft)
    }

    // -------- Housekeeping --------

    /// Delete every table except the config and tracker tables (and their
    /// archived copies). Returns the deleted names.
    pub fn clear(&mut self) -> Result<Vec<String>> {
        let keep = [self.opts.config_table.to_lowercase(), self.opts.tracker_table.to_lowercase()];
        let doomed: Vec<String> = self
            .store
            .table_names()
            .into_iter()
            .filter(|t| {
                let lower = t.to_lowercase();
                !keep.iter().any(|k| lower.contains(k.as_str()))
            })
            .collect();
        for name in &doomed {
            self.store.delete_table(name)?;
        }
        tracing::info!("cleared {} tables", doomed.len());
        Ok(doomed)
    }
}
