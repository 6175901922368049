mod filter;
mod parse_filter;
mod pipeline;
mod query;
mod sort;
mod update;

pub use filter::Filter;
pub use parse_filter::{FilterParseError, parse_filter};
pub use pipeline::{
    Accumulator, GroupStage, Pipeline, PipelineParseError, UNKNOWN_GROUP, parse_pipeline,
};
pub use query::Query;
pub use sort::{Sort, SortDirection};
pub use update::{FieldUpdate, Update, UpdateOp, UpdateParseError, parse_update};

/// Field name carrying document identity.
pub const ID_FIELD: &str = "_id";
