mod config;
mod date;
mod error;
mod schema;

mod csv_codec;
mod range;
mod store;
mod dir_store;
mod overflow;
mod archive;

mod index;
mod filters;
mod join;
mod mutate;

mod fetch;
mod email;
mod progress;
mod util;
mod pipeline;

pub use crate::config::{filled, CampaignConfig, FetchInput, FetchScope, PollPolicy, SdfOptions};
pub use crate::date::{day_span, SdfDate};
pub use crate::error::SdfError;
pub use crate::pipeline::{DownloadReport, FilterReport, SdfWorkspace, UpdateReport};
pub use crate::pipeline::{CONFIG_KEY_HEADER, CONFIG_NAME_HEADERS, TRACKER_HEADERS};

// Column layout per entity and schema version.
pub use crate::schema::{
    AdColumns, AdGroupColumns, CampaignColumns, EntityKind, InsertionOrderColumns, LineItemColumns, SdfSchema,
    SdfVersion, AD_EDITABLE_LABELS, AD_GROUP_ID, BID_STRATEGY_TYPE, IO_ID, LINE_ITEM_ID, NAME,
};

// Tabular stores and A1 ranges.
pub use crate::range::{column_letters, CellRange};
pub use crate::store::{archive_table, archived_copies, MemoryStore, TabularStore};
pub use crate::dir_store::DirStore;

// Codecs: CSV text, zip bundles, oversized-cell chunking.
pub use crate::csv_codec::{parse as parse_csv, serialize as serialize_csv};
pub use crate::archive::{unzip_entries, zip_files, ArchiveEntry, SdfBundle};
pub use crate::overflow::{
    as_pointer, is_overflow_table, join as join_chunks, referenced_overflow_tables, resolve_rows, retarget_pointers,
    split as split_chunks, OverflowReport, OverflowWriter,
};

// Indexing, filtering, joining and the bulk mutator.
pub use crate::index::{EntityIndex, Record};
pub use crate::filters::{filter_by_kept_parents, filter_line_items_by_subtype, LineItemFilter};
pub use crate::join::{Hierarchy, JoinKeys};
pub use crate::mutate::{
    apply_ad_edits, bid_strategy_index, daily_budget, io_budget_segment, update_ad_groups, update_ads,
    update_campaigns, update_insertion_orders, update_line_items, AdEdit, BidStrategy, UpdateContext, SAME_AS_IO,
};

// Remote download.
pub use crate::fetch::{CancelToken, HttpTransport, ReqwestTransport, SdfDownloader};

// Hand-off email.
pub use crate::email::{compose as compose_email, EmailDraft, EmailTarget, Mailer, OutboxMailer, ATTACHMENT_NAME};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, ProgressScope};

//export tracing init and robust file ops so binaries can import from crate root.
pub use crate::util::{init_tracing_once, read_text_with_backoff, write_atomic_with_backoff};
