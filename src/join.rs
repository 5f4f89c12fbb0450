//! Hierarchy join: walk every ad up through ad group, line item and IO and
//! emit one flattened row per ad, in ad-table order.

use crate::error::SdfError;
use crate::index::EntityIndex;
use crate::schema::{AD_GROUP_ID, IO_ID, LINE_ITEM_ID, NAME};

/// Which ids trail the name chain in each flattened row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKeys {
    /// `[ad id]` (stage-2 configuration).
    AdOnly,
    /// `[line item id, ad group id, ad id]` (tracker form).
    Full,
}

/// The four per-level indexes the join reads from. Each must have captured
/// `Name` plus its parent foreign-key column.
pub struct Hierarchy<'a> {
    pub ads: &'a EntityIndex,
    pub ad_groups: &'a EntityIndex,
    pub line_items: &'a EntityIndex,
    pub ios: &'a EntityIndex,
}

impl Hierarchy<'_> {
    /// Rows of `[io name, line item name, ad group name, ad name, leaf_fields.., ids..]`.
    /// `leaf_fields` are extra ad columns (by header name) placed after the ad name.
    ///
    /// Stops at the first foreign key that has no parent row.
    pub fn flatten(&self, keys: JoinKeys, leaf_fields: &[&str]) -> Result<Vec<Vec<String>>, SdfError> {
        let mut out = Vec::with_capacity(self.ads.len());
        for ad_id in self.ads.ids() {
            let ad_name = self.ads.field(ad_id, NAME)?;
            let ad_group_id = self.ads.field(ad_id, AD_GROUP_ID)?;

            let ad_group_name = self.ad_groups.field(ad_group_id, NAME)?;
            let line_item_id = self.ad_groups.field(ad_group_id, LINE_ITEM_ID)?;

            let line_item_name = self.line_items.field(line_item_id, NAME)?;
            let io_id = self.line_items.field(line_item_id, IO_ID)?;

            let io_name = self.ios.field(io_id, NAME)?;

            let mut row = Vec::with_capacity(4 + leaf_fields.len() + 3);
            row.extend([io_name, line_item_name, ad_group_name, ad_name].map(str::to_string));
            for f in leaf_fields {
                row.push(self.ads.field(ad_id, f)?.to_string());
            }
            match keys {
                JoinKeys::AdOnly => row.push(ad_id.to_string()),
                JoinKeys::Full => {
                    row.extend([line_item_id, ad_group_id, ad_id].map(str::to_string));
                }
            }
            out.push(row);
        }
        tracing::debug!("flattened {} ads", out.len());
        Ok(out)
    }
}
