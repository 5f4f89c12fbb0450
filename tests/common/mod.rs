#![allow(dead_code)]

use sdfetl::{
    serialize_csv, zip_files, EntityKind, HttpTransport, PollPolicy, SdfError, SdfOptions, SdfSchema, SdfVersion,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

pub const TASK: &str = "sdfdownloadtasks/operations/42";
pub const RESOURCE: &str = "sdfdownloadtasks-media/42";

pub fn schema() -> SdfSchema {
    SdfSchema::for_version(SdfVersion::V5_3)
}

/// Options for tests: no progress bars, no poll delay, 50 status checks.
pub fn quiet_options() -> SdfOptions {
    SdfOptions::default().with_progress(false).with_poll_policy(PollPolicy {
        interval: Duration::ZERO,
        max_attempts: 50,
        ..PollPolicy::default()
    })
}

fn named_columns(kind: EntityKind, s: &SdfSchema) -> Vec<(usize, &'static str)> {
    match kind {
        EntityKind::Campaign => vec![
            (s.campaign.id, "Campaign Id"),
            (s.campaign.advertiser_id, "Advertiser Id"),
            (s.campaign.name, "Name"),
            (s.campaign.timestamp, "Timestamp"),
            (s.campaign.cpv, "Bid Amount"),
            (s.campaign.start_date, "Start Date"),
            (s.campaign.end_date, "End Date"),
            (s.campaign.geo, "Geography Targeting - Include"),
        ],
        EntityKind::InsertionOrder => vec![
            (s.insertion_order.id, "Io Id"),
            (s.insertion_order.campaign_id, "Campaign Id"),
            (s.insertion_order.name, "Name"),
            (s.insertion_order.timestamp, "Timestamp"),
            (s.insertion_order.budget_segments, "Budget Segments"),
            (s.insertion_order.geo, "Geography Targeting - Include"),
        ],
        EntityKind::LineItem => vec![
            (s.line_item.id, "Line Item Id"),
            (s.line_item.io_id, "Io Id"),
            (s.line_item.line_item_type, "Type"),
            (s.line_item.name, "Name"),
            (s.line_item.timestamp, "Timestamp"),
            (s.line_item.start_date, "Start Date"),
            (s.line_item.end_date, "End Date"),
            (s.line_item.pacing_amount, "Pacing Amount"),
            (s.line_item.geo, "Geography Targeting - Include"),
            (s.line_item.bid_strategy_type, "TrueView Bid Strategy Type"),
            (s.line_item.bid_value, "TrueView Bid Strategy Value"),
        ],
        EntityKind::AdGroup => vec![
            (s.ad_group.id, "Ad Group Id"),
            (s.ad_group.line_item_id, "Line Item Id"),
            (s.ad_group.name, "Name"),
            (s.ad_group.bid_cost, "Max Cost"),
        ],
        EntityKind::Ad => vec![
            (s.ad.id, "Ad Id"),
            (s.ad.ad_group_id, "Ad Group Id"),
            (2, "Name"),
            (4, "Video Id"),
            (5, "Display Url"),
            (6, "Landing Page Url"),
            (7, "DCM Tracking - Placement Id"),
            (8, "DCM Tracking - Ad Id"),
            (9, "DCM Tracking - Creative Id"),
            (10, "Custom Parameters"),
            (12, "Action Button Label"),
            (13, "Action Headline"),
            (17, "Width"),
        ],
    }
}

pub fn width(kind: EntityKind, s: &SdfSchema) -> usize {
    let named = named_columns(kind, s).iter().map(|(i, _)| *i).max().unwrap_or(0);
    named.max(s.max_written_column(kind)) + 2
}

/// A header row wide enough for every column the update stage writes.
/// Unnamed positions get unique placeholders.
pub fn entity_header(kind: EntityKind, s: &SdfSchema) -> Vec<String> {
    let mut header: Vec<String> = (0..width(kind, s)).map(|i| format!("Column {i}")).collect();
    for (i, name) in named_columns(kind, s) {
        header[i] = name.to_string();
    }
    if kind == EntityKind::AdGroup {
        for i in s.ad_group.placement_targeting.clone() {
            header[i] = format!("Placement Targeting {i}");
        }
    }
    header
}

pub fn entity_row(kind: EntityKind, s: &SdfSchema, cells: &[(usize, &str)]) -> Vec<String> {
    let mut row = vec![String::new(); width(kind, s)];
    for (i, v) in cells {
        row[*i] = v.to_string();
    }
    row
}

/// The shared fixture hierarchy (headers included), per entity:
/// - campaign C1 (advertiser ADV9)
/// - IOs I1 "Spring IO", I2 "Display IO"
/// - line items L1 (I1, TrueView, Target CPA), L2 (I2, Display), L3 (I1, TrueView, Maximum Conversions)
/// - ad groups G1 (L1) with placement targeting, G2 (L3)
/// - ads A1 (G1), A2 (G2), A3 (G1)
///
/// The TrueView filter keeps L1, L3 and I1 only.
pub fn fixture_tables(s: &SdfSchema) -> Vec<(EntityKind, Vec<Vec<String>>)> {
    let c = &s.campaign;
    let io = &s.insertion_order;
    let li = &s.line_item;
    let ag = &s.ad_group;
    let ad = &s.ad;

    let campaigns = vec![
        entity_header(EntityKind::Campaign, s),
        entity_row(
            EntityKind::Campaign,
            s,
            &[
                (c.id, "C1"),
                (c.advertiser_id, "ADV9"),
                (c.name, "Campaign X"),
                (c.timestamp, "2021-01-01T00:00:00"),
                (c.cpv, "0.05"),
                (c.start_date, "01/01/2021 00:00"),
                (c.end_date, "02/01/2021 00:00"),
                (c.geo, "2840"),
            ],
        ),
    ];

    let ios = vec![
        entity_header(EntityKind::InsertionOrder, s),
        entity_row(
            EntityKind::InsertionOrder,
            s,
            &[(io.id, "I1"), (io.campaign_id, "C1"), (io.name, "Spring IO"), (io.timestamp, "t-io1"), (io.budget_segments, "(100;01/01/2021;01/31/2021;)")],
        ),
        entity_row(
            EntityKind::InsertionOrder,
            s,
            &[(io.id, "I2"), (io.campaign_id, "C1"), (io.name, "Display IO"), (io.timestamp, "t-io2")],
        ),
    ];

    let line_items = vec![
        entity_header(EntityKind::LineItem, s),
        entity_row(
            EntityKind::LineItem,
            s,
            &[
                (li.id, "L1"),
                (li.io_id, "I1"),
                (li.line_item_type, "TrueView"),
                (li.name, "Spring LI"),
                (li.timestamp, "t-li1"),
                (li.start_date, "01/01/2021"),
                (li.end_date, "01/31/2021"),
                (li.pacing_amount, "10"),
                (li.bid_strategy_type, "Target CPA"),
                (li.bid_value, "5"),
            ],
        ),
        entity_row(
            EntityKind::LineItem,
            s,
            &[(li.id, "L2"), (li.io_id, "I2"), (li.line_item_type, "Display"), (li.name, "Banner LI"), (li.timestamp, "t-li2")],
        ),
        entity_row(
            EntityKind::LineItem,
            s,
            &[
                (li.id, "L3"),
                (li.io_id, "I1"),
                (li.line_item_type, "TrueView"),
                (li.name, "Max LI"),
                (li.timestamp, "t-li3"),
                (li.bid_strategy_type, "Maximum Conversions"),
                (li.bid_value, "7"),
            ],
        ),
    ];

    let mut g1 = entity_row(
        EntityKind::AdGroup,
        s,
        &[(ag.id, "G1"), (ag.line_item_id, "L1"), (ag.name, "Spring AG"), (ag.bid_cost, "0.10")],
    );
    for i in ag.placement_targeting.clone() {
        g1[i] = format!("placement-{i}");
    }
    let ad_groups = vec![
        entity_header(EntityKind::AdGroup, s),
        g1,
        entity_row(
            EntityKind::AdGroup,
            s,
            &[(ag.id, "G2"), (ag.line_item_id, "L3"), (ag.name, "Max AG"), (ag.bid_cost, "0.20")],
        ),
    ];

    let ads = vec![
        entity_header(EntityKind::Ad, s),
        entity_row(
            EntityKind::Ad,
            s,
            &[(ad.id, "A1"), (ad.ad_group_id, "G1"), (ad.name, "Spring Ad"), (4, "v1"), (5, "example.com"), (17, "640")],
        ),
        entity_row(EntityKind::Ad, s, &[(ad.id, "A2"), (ad.ad_group_id, "G2"), (ad.name, "Max Ad"), (4, "v2")]),
        entity_row(EntityKind::Ad, s, &[(ad.id, "A3"), (ad.ad_group_id, "G1"), (ad.name, "Spring Ad 2"), (4, "v3")]),
    ];

    vec![
        (EntityKind::Campaign, campaigns),
        (EntityKind::InsertionOrder, ios),
        (EntityKind::LineItem, line_items),
        (EntityKind::AdGroup, ad_groups),
        (EntityKind::Ad, ads),
    ]
}

pub fn fixture_table(s: &SdfSchema, kind: EntityKind) -> Vec<Vec<String>> {
    fixture_tables(s).into_iter().find(|(k, _)| *k == kind).map(|(_, t)| t).unwrap()
}

/// The fixture tables as `(file name, csv)` pairs named with `prefix`.
pub fn fixture_files(s: &SdfSchema, prefix: &str) -> Vec<(String, String)> {
    fixture_tables(s)
        .into_iter()
        .map(|(kind, rows)| (kind.table_name(prefix), serialize_csv(&rows).unwrap()))
        .collect()
}

pub fn fixture_zip(s: &SdfSchema) -> Vec<u8> {
    zip_files(&fixture_files(s, "SDF")).unwrap()
}

/// HTTP transport that replays canned status responses and records every call.
pub struct ScriptedTransport {
    pub statuses: RefCell<VecDeque<Value>>,
    pub media: Vec<u8>,
    pub calls: RefCell<Vec<String>>,
    pub create_body: RefCell<Option<Value>>,
    pub fail_create_with: Option<u16>,
}

impl ScriptedTransport {
    /// `pending` not-done polls, then done with the media resource.
    pub fn finishing_after(pending: usize, media: Vec<u8>) -> Self {
        let mut statuses: VecDeque<Value> = (0..pending).map(|_| json!({ "name": TASK, "done": false })).collect();
        statuses.push_back(json!({ "name": TASK, "done": true, "response": { "resourceName": RESOURCE } }));
        Self::with_statuses(statuses, media)
    }

    /// Never finishes.
    pub fn never_done() -> Self {
        Self::with_statuses(VecDeque::new(), Vec::new())
    }

    pub fn with_statuses(statuses: VecDeque<Value>, media: Vec<u8>) -> Self {
        Self {
            statuses: RefCell::new(statuses),
            media,
            calls: RefCell::new(Vec::new()),
            create_body: RefCell::new(None),
            fail_create_with: None,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, SdfError> {
        self.calls.borrow_mut().push(format!("POST {url}"));
        *self.create_body.borrow_mut() = Some(body.clone());
        if let Some(status) = self.fail_create_with {
            return Err(SdfError::HttpStatus { status, url: url.to_string(), body: "denied".into() });
        }
        Ok(json!({ "name": TASK, "done": false }))
    }

    fn get_json(&self, url: &str) -> Result<Value, SdfError> {
        self.calls.borrow_mut().push(format!("GET {url}"));
        Ok(self
            .statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| json!({ "name": TASK, "done": false })))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SdfError> {
        self.calls.borrow_mut().push(format!("GET {url}"));
        Ok(self.media.clone())
    }
}
