//! DynamoDB backend
//!
//! Expression translation is always available; [`DynamoDbDataSource`]
//! requires the `dynamodb` feature.

mod converter;
#[cfg(feature = "dynamodb")]
mod datasource;

pub use converter::{
    DynamoDbCommand, DynamoDbCommandBuilder, DynamoDbCriteriaConverter, DynamoDbQuery,
    MAX_IN_OPERANDS, NULL_TYPE,
};
#[cfg(feature = "dynamodb")]
pub use datasource::DynamoDbDataSource;
