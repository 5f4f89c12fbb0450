//! Positional SDF column layout per entity type.
//!
//! Writes address columns by position, so every index used by the update
//! stage lives here, tagged with the schema version that shifts it. Reads go
//! through header names; `validate_header` checks that the two agree before
//! any table is touched.

use crate::error::SdfError;
use std::ops::RangeInclusive;

pub const NAME: &str = "Name";
pub const IO_ID: &str = "Io Id";
pub const LINE_ITEM_ID: &str = "Line Item Id";
pub const AD_GROUP_ID: &str = "Ad Group Id";
pub const BID_STRATEGY_TYPE: &str = "TrueView Bid Strategy Type";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Campaign,
    InsertionOrder,
    LineItem,
    AdGroup,
    Ad,
}

impl EntityKind {
    /// Hierarchy order, root first.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Campaign,
        EntityKind::InsertionOrder,
        EntityKind::LineItem,
        EntityKind::AdGroup,
        EntityKind::Ad,
    ];

    pub fn file_type(self) -> &'static str {
        match self {
            EntityKind::Campaign => "FILE_TYPE_CAMPAIGN",
            EntityKind::InsertionOrder => "FILE_TYPE_INSERTION_ORDER",
            EntityKind::LineItem => "FILE_TYPE_LINE_ITEM",
            EntityKind::AdGroup => "FILE_TYPE_AD_GROUP",
            EntityKind::Ad => "FILE_TYPE_AD",
        }
    }

    pub fn file_suffix(self) -> &'static str {
        match self {
            EntityKind::Campaign => "Campaigns.csv",
            EntityKind::InsertionOrder => "InsertionOrders.csv",
            EntityKind::LineItem => "LineItems.csv",
            EntityKind::AdGroup => "AdGroups.csv",
            EntityKind::Ad => "AdGroupAds.csv",
        }
    }

    /// Table and archive entry name, e.g. `SDF-LineItems.csv`.
    pub fn table_name(self, prefix: &str) -> String {
        format!("{prefix}-{}", self.file_suffix())
    }

    /// Reverse of `table_name`, tolerant of directories inside the archive.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let base = name.rsplit('/').next().unwrap_or(name);
        EntityKind::ALL
            .into_iter()
            .find(|k| base.ends_with(&format!("-{}", k.file_suffix())) || base == k.file_suffix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdfVersion {
    V5_2,
    V5_3,
}

impl SdfVersion {
    pub fn tag(self) -> &'static str {
        match self {
            SdfVersion::V5_2 => "SDF_VERSION_5_2",
            SdfVersion::V5_3 => "SDF_VERSION_5_3",
        }
    }

    /// 5.3 inserted two line-item columns ahead of the TrueView bid fields.
    pub fn column_shift(self) -> usize {
        match self {
            SdfVersion::V5_2 => 0,
            SdfVersion::V5_3 => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CampaignColumns {
    pub id: usize,
    pub advertiser_id: usize,
    pub name: usize,
    pub timestamp: usize,
    pub cpv: usize,
    pub start_date: usize,
    pub end_date: usize,
    pub geo: usize,
}

#[derive(Clone, Debug)]
pub struct InsertionOrderColumns {
    pub id: usize,
    pub campaign_id: usize,
    pub name: usize,
    pub timestamp: usize,
    pub budget_segments: usize,
    pub geo: usize,
}

#[derive(Clone, Debug)]
pub struct LineItemColumns {
    pub id: usize,
    pub io_id: usize,
    pub line_item_type: usize,
    pub name: usize,
    pub timestamp: usize,
    pub start_date: usize,
    pub end_date: usize,
    pub pacing_amount: usize,
    pub geo: usize,
    pub bid_strategy_type: usize,
    pub bid_value: usize,
}

#[derive(Clone, Debug)]
pub struct AdGroupColumns {
    pub id: usize,
    pub line_item_id: usize,
    pub name: usize,
    pub bid_cost: usize,
    pub placement_targeting: RangeInclusive<usize>,
}

/// Ad columns. `editable` is the operator-facing block in config order:
/// name, video id, display url, landing page url, three tracking ids,
/// click-tracking url, call to action, headline.
#[derive(Clone, Debug)]
pub struct AdColumns {
    pub id: usize,
    pub ad_group_id: usize,
    pub name: usize,
    pub editable: [usize; 10],
}

pub const AD_EDITABLE_LABELS: [&str; 10] = [
    "Ad Name",
    "Video Id",
    "Display Url",
    "Landing Page Url",
    "DCM Placement Id",
    "DCM Ad Id",
    "DCM Creative Id",
    "Click Tracking Url",
    "Call To Action",
    "Headline",
];

#[derive(Clone, Debug)]
pub struct SdfSchema {
    pub version: SdfVersion,
    pub campaign: CampaignColumns,
    pub insertion_order: InsertionOrderColumns,
    pub line_item: LineItemColumns,
    pub ad_group: AdGroupColumns,
    pub ad: AdColumns,
}

impl SdfSchema {
    pub fn for_version(version: SdfVersion) -> Self {
        let shift = version.column_shift();
        Self {
            version,
            campaign: CampaignColumns {
                id: 0,
                advertiser_id: 1,
                name: 2,
                timestamp: 3,
                cpv: 7,
                start_date: 10,
                end_date: 11,
                geo: 20,
            },
            insertion_order: InsertionOrderColumns {
                id: 0,
                campaign_id: 1,
                name: 2,
                timestamp: 3,
                budget_segments: 22,
                geo: 24,
            },
            line_item: LineItemColumns {
                id: 0,
                io_id: 1,
                line_item_type: 2,
                name: 4,
                timestamp: 5,
                start_date: 7,
                end_date: 8,
                pacing_amount: 13,
                geo: 36,
                bid_strategy_type: 93 + shift,
                bid_value: 94 + shift,
            },
            ad_group: AdGroupColumns {
                id: 0,
                line_item_id: 1,
                name: 2,
                bid_cost: 5,
                placement_targeting: 11..=21,
            },
            ad: AdColumns {
                id: 0,
                ad_group_id: 1,
                name: 2,
                editable: [2, 4, 5, 6, 7, 8, 9, 10, 12, 13],
            },
        }
    }

    /// Header cells the positional layout relies on, per entity.
    pub fn expected_headers(&self, kind: EntityKind) -> Vec<(usize, &'static str)> {
        match kind {
            EntityKind::Campaign => vec![(self.campaign.id, "Campaign Id"), (self.campaign.name, NAME)],
            EntityKind::InsertionOrder => vec![
                (self.insertion_order.id, IO_ID),
                (self.insertion_order.campaign_id, "Campaign Id"),
                (self.insertion_order.name, NAME),
            ],
            EntityKind::LineItem => vec![
                (self.line_item.id, LINE_ITEM_ID),
                (self.line_item.io_id, IO_ID),
                (self.line_item.line_item_type, "Type"),
                (self.line_item.name, NAME),
                (self.line_item.bid_strategy_type, BID_STRATEGY_TYPE),
            ],
            EntityKind::AdGroup => vec![
                (self.ad_group.id, AD_GROUP_ID),
                (self.ad_group.line_item_id, LINE_ITEM_ID),
                (self.ad_group.name, NAME),
            ],
            EntityKind::Ad => vec![(self.ad.id, "Ad Id"), (self.ad.ad_group_id, AD_GROUP_ID), (self.ad.name, NAME)],
        }
    }

    /// Highest column index written by the update stage, per entity.
    pub fn max_written_column(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Campaign => self.campaign.geo,
            EntityKind::InsertionOrder => self.insertion_order.geo,
            EntityKind::LineItem => self.line_item.bid_value,
            EntityKind::AdGroup => *self.ad_group.placement_targeting.end(),
            EntityKind::Ad => self.ad.editable.iter().copied().max().unwrap_or(0),
        }
    }

    pub fn validate_header(&self, kind: EntityKind, table: &str, header: &[String]) -> Result<(), SdfError> {
        for (index, expected) in self.expected_headers(kind) {
            let found = header.get(index).map(|s| s.trim()).unwrap_or("");
            if !found.eq_ignore_ascii_case(expected) {
                return Err(SdfError::SchemaMismatch {
                    table: table.to_string(),
                    index,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }
}
