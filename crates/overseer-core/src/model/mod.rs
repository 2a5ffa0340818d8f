// ── Aggregation data model ──
//
// Source-side types (what polls produce) and view-side types (what the
// builders produce and the store serves).

pub mod source;
pub mod view;

pub use source::{
    Collection, NaturalKey, RecordMap, SourceKind, SourceRecord, SourceSet, SourceSnapshot,
};
pub use view::{
    ResourceType, StatCounters, TableItems, ViewEntry, ViewModel, ViewTable, epoch_millis,
};
