use bson::Document;
use compass_query::{
    Filter, Pipeline, Update, parse_filter, parse_pipeline, parse_update,
};

use crate::error::StoreError;

/// Types accepted wherever a collection operation takes a filter.
///
/// Implemented for [`Filter`] and for filter documents in the `$`-operator
/// dialect, which are parsed (and rejected on unknown operators).
pub trait IntoFilter {
    fn into_filter(self) -> Result<Filter, StoreError>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> Result<Filter, StoreError> {
        Ok(self)
    }
}

impl IntoFilter for Document {
    fn into_filter(self) -> Result<Filter, StoreError> {
        Ok(parse_filter(&self)?)
    }
}

impl IntoFilter for &Document {
    fn into_filter(self) -> Result<Filter, StoreError> {
        Ok(parse_filter(self)?)
    }
}

pub trait IntoUpdate {
    fn into_update(self) -> Result<Update, StoreError>;
}

impl IntoUpdate for Update {
    fn into_update(self) -> Result<Update, StoreError> {
        Ok(self)
    }
}

impl IntoUpdate for Document {
    fn into_update(self) -> Result<Update, StoreError> {
        Ok(parse_update(&self)?)
    }
}

impl IntoUpdate for &Document {
    fn into_update(self) -> Result<Update, StoreError> {
        Ok(parse_update(self)?)
    }
}

pub trait IntoPipeline {
    fn into_pipeline(self) -> Result<Pipeline, StoreError>;
}

impl IntoPipeline for Pipeline {
    fn into_pipeline(self) -> Result<Pipeline, StoreError> {
        Ok(self)
    }
}

impl IntoPipeline for Vec<Document> {
    fn into_pipeline(self) -> Result<Pipeline, StoreError> {
        Ok(parse_pipeline(&self)?)
    }
}

impl IntoPipeline for &[Document] {
    fn into_pipeline(self) -> Result<Pipeline, StoreError> {
        Ok(parse_pipeline(self)?)
    }
}
