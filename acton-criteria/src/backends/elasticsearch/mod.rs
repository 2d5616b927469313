//! Elasticsearch backend
//!
//! Query DSL translation is always available; [`ElasticsearchDataSource`]
//! requires the `elasticsearch` feature.

mod converter;
#[cfg(feature = "elasticsearch")]
mod datasource;

pub use converter::{
    like_to_wildcard, ElasticsearchCommand, ElasticsearchCommandBuilder,
    ElasticsearchCriteriaConverter, DEFAULT_SEARCH_SIZE,
};
#[cfg(feature = "elasticsearch")]
pub use datasource::ElasticsearchDataSource;
