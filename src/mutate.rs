//! Row-level bulk mutation: scatter operator edits and campaign settings back
//! into fixed columns of the per-entity tables.
//!
//! Every function works on data rows (header excluded) and writes each row back
//! into its own position; nothing is reordered, inserted or dropped.

use crate::config::{filled, CampaignConfig, FetchInput};
use crate::date::{day_span, SdfDate};
use crate::error::SdfError;
use crate::index::EntityIndex;
use crate::schema::{SdfSchema, BID_STRATEGY_TYPE};

pub const SAME_AS_IO: &str = "Same as Insertion Order";

/// TrueView bid strategy of a line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BidStrategy {
    TargetCpa,
    MaximumConversions,
    TargetCpm,
    TargetCpv,
    ManualCpv,
    Other,
}

impl BidStrategy {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Target CPA" => BidStrategy::TargetCpa,
            "Maximum Conversions" => BidStrategy::MaximumConversions,
            "Target CPM" => BidStrategy::TargetCpm,
            "Target CPV" => BidStrategy::TargetCpv,
            "Manual CPV" => BidStrategy::ManualCpv,
            _ => BidStrategy::Other,
        }
    }
}

/// Everything the entity-update pass reads besides the rows themselves.
pub struct UpdateContext<'a> {
    pub schema: &'a SdfSchema,
    pub config: &'a CampaignConfig,
    pub input: &'a FetchInput,
    pub id_prefix: &'a str,
}

impl UpdateContext<'_> {
    fn creation(&self) -> bool {
        self.config.creation
    }

    fn prefixed(&self, id: &str) -> String {
        format!("{}{}", self.id_prefix, id)
    }

    fn flight(&self) -> Result<Option<(SdfDate, SdfDate)>, SdfError> {
        Ok(match (self.config.start()?, self.config.end()?) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        })
    }
}

/// One edited config row: the ad it belongs to and its 10 editable values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdEdit {
    pub ad_id: String,
    pub values: Vec<String>,
}

fn set(row: &mut Vec<String>, idx: usize, value: impl Into<String>) {
    if row.len() <= idx {
        row.resize(idx + 1, String::new());
    }
    row[idx] = value.into();
}

fn get(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Copy edited ad fields verbatim into the ad table.
///
/// `edits[i]` must describe `ads[i]`: same count, same ad id at every
/// position. Any drift fails before a single cell is written.
pub fn apply_ad_edits(ads: &mut [Vec<String>], edits: &[AdEdit], schema: &SdfSchema, table: &str) -> Result<usize, SdfError> {
    if edits.len() != ads.len() {
        return Err(SdfError::misaligned(
            table,
            format!("{} edited rows for {} ads", edits.len(), ads.len()),
        ));
    }
    let cols = &schema.ad.editable;
    for (i, (row, edit)) in ads.iter().zip(edits).enumerate() {
        let ad_id = get(row, schema.ad.id);
        if ad_id != edit.ad_id {
            return Err(SdfError::misaligned(
                table,
                format!("row {}: config names ad {:?} but the table holds {:?}", i + 1, edit.ad_id, ad_id),
            ));
        }
        if edit.values.len() != cols.len() {
            return Err(SdfError::misaligned(
                table,
                format!("row {}: {} edited values, expected {}", i + 1, edit.values.len(), cols.len()),
            ));
        }
    }

    for (row, edit) in ads.iter_mut().zip(edits) {
        for (&col, value) in cols.iter().zip(&edit.values) {
            set(row, col, value.as_str());
        }
    }
    Ok(ads.len())
}

/// Per-line-item daily amount: `floor(budget / (day_span * (count - 1)))`, where
/// `count` is the line-item table's row count including its header row.
pub fn daily_budget(start: SdfDate, end: SdfDate, count: usize, budget: f64) -> Result<i64, SdfError> {
    let span = day_span(start, end);
    if span <= 0 {
        return Err(SdfError::BudgetSpan(format!("flight {start} - {end} spans {span} days")));
    }
    if count <= 1 {
        return Err(SdfError::BudgetSpan("no line items to split the budget across".into()));
    }
    let divisor = span as f64 * (count - 1) as f64;
    Ok((budget / divisor).floor() as i64)
}

/// IO budget segment: `(value;MM/DD/YYYY;MM/DD/YYYY;)`.
pub fn io_budget_segment(value: &str, start: SdfDate, end: SdfDate) -> String {
    format!("({};{};{};)", value, start.mdy(), end.mdy())
}

pub fn update_campaigns(rows: &mut [Vec<String>], ctx: &UpdateContext<'_>) -> Result<(), SdfError> {
    let c = &ctx.schema.campaign;
    let cfg = ctx.config;
    let start = ctx.config.start()?;
    let end = ctx.config.end()?;
    for row in rows.iter_mut() {
        if ctx.creation() {
            let id = ctx.prefixed(get(row, c.id));
            set(row, c.id, id);
            set(row, c.timestamp, "");
        }
        if let Some(name) = filled(&cfg.campaign_name) {
            set(row, c.name, name);
        }
        if let Some(cpv) = filled(&cfg.cpv) {
            set(row, c.cpv, cpv);
        }
        if let Some(s) = start {
            set(row, c.start_date, s.mdy_midnight());
        }
        if let Some(e) = end {
            set(row, c.end_date, e.mdy_midnight());
        }
        if let Some(geo) = filled(&cfg.geo_id) {
            set(row, c.geo, geo);
        }
    }
    Ok(())
}

/// Campaign-level fetches in creation mode point IOs at the prefixed campaign
/// that is created alongside them; every other case reparents onto the
/// destination campaign.
pub fn update_insertion_orders(rows: &mut [Vec<String>], ctx: &UpdateContext<'_>) -> Result<(), SdfError> {
    let c = &ctx.schema.insertion_order;
    let cfg = ctx.config;
    let from_io_fetch = ctx.input.source_io_ids().is_some();
    let flight = ctx.flight()?;
    let destination = ctx.input.destination_campaign();
    for row in rows.iter_mut() {
        if ctx.creation() {
            let id = ctx.prefixed(get(row, c.id));
            set(row, c.id, id);
        }
        if !from_io_fetch && ctx.creation() {
            let parent = ctx.prefixed(get(row, c.campaign_id));
            set(row, c.campaign_id, parent);
        } else {
            set(row, c.campaign_id, destination);
        }
        if from_io_fetch {
            if let Some(name) = filled(&cfg.io_name) {
                set(row, c.name, name);
            }
        }
        if ctx.creation() {
            set(row, c.timestamp, "");
        }
        if let (Some((s, e)), Some(budget)) = (flight, filled(&cfg.io_budget)) {
            set(row, c.budget_segments, io_budget_segment(budget, s, e));
        }
        if let Some(geo) = filled(&cfg.geo_id) {
            set(row, c.geo, geo);
        }
    }
    Ok(())
}

pub fn update_line_items(rows: &mut [Vec<String>], ctx: &UpdateContext<'_>) -> Result<(), SdfError> {
    let c = &ctx.schema.line_item;
    let cfg = ctx.config;
    let flight = ctx.flight()?;
    let pacing = match (ctx.creation(), flight, filled(&cfg.io_budget)) {
        (true, Some((s, e)), Some(budget)) => {
            let total: f64 = budget.parse().map_err(|_| SdfError::InvalidNumber(budget.to_string()))?;
            Some(daily_budget(s, e, rows.len() + 1, total)?)
        }
        _ => None,
    };
    let cpa = filled(&cfg.cpa);

    for row in rows.iter_mut() {
        if ctx.creation() {
            let id = ctx.prefixed(get(row, c.id));
            set(row, c.id, id);
            let io = ctx.prefixed(get(row, c.io_id));
            set(row, c.io_id, io);
            set(row, c.timestamp, "");
        }
        set(row, c.start_date, SAME_AS_IO);
        set(row, c.end_date, SAME_AS_IO);
        if let Some(amount) = pacing {
            set(row, c.pacing_amount, amount.to_string());
        }
        match (BidStrategy::parse(get(row, c.bid_strategy_type)), cpa) {
            (BidStrategy::TargetCpa, Some(v)) => set(row, c.bid_value, v),
            (BidStrategy::MaximumConversions, _) => set(row, c.bid_value, "0"),
            _ => {}
        }
        if let Some(geo) = filled(&cfg.geo_id) {
            set(row, c.geo, geo);
        }
    }
    Ok(())
}

/// line item id -> bid strategy type, read from a full line-item table.
pub fn bid_strategy_index(line_items: &[Vec<String>], schema: &SdfSchema, table: &str) -> EntityIndex {
    EntityIndex::from_table(table, line_items, schema.line_item.id, &[schema.line_item.bid_strategy_type])
}

/// `bid_types` must come from the line-item table as already updated, so that
/// prefixed parent ids resolve.
pub fn update_ad_groups(rows: &mut [Vec<String>], ctx: &UpdateContext<'_>, bid_types: &EntityIndex) -> Result<(), SdfError> {
    let c = &ctx.schema.ad_group;
    let cfg = ctx.config;
    for row in rows.iter_mut() {
        if ctx.creation() {
            let id = ctx.prefixed(get(row, c.id));
            set(row, c.id, id);
            let li = ctx.prefixed(get(row, c.line_item_id));
            set(row, c.line_item_id, li);
        }
        let strategy = BidStrategy::parse(bid_types.field(get(row, c.line_item_id), BID_STRATEGY_TYPE)?);
        let bid = match strategy {
            BidStrategy::MaximumConversions => Some("0"),
            BidStrategy::TargetCpm => filled(&cfg.cpm),
            BidStrategy::TargetCpv | BidStrategy::ManualCpv => filled(&cfg.cpv),
            BidStrategy::TargetCpa => filled(&cfg.cpa),
            BidStrategy::Other => None,
        };
        if let Some(v) = bid {
            set(row, c.bid_cost, v);
        }
        // Reused line items must not carry over stale placement targeting.
        if !ctx.creation() {
            for col in c.placement_targeting.clone() {
                set(row, col, "");
            }
        }
    }
    Ok(())
}

pub fn update_ads(rows: &mut [Vec<String>], ctx: &UpdateContext<'_>) -> Result<(), SdfError> {
    let c = &ctx.schema.ad;
    if !ctx.creation() {
        return Ok(());
    }
    for row in rows.iter_mut() {
        set(row, c.id, "");
        let parent = ctx.prefixed(get(row, c.ad_group_id));
        set(row, c.ad_group_id, parent);
    }
    Ok(())
}
