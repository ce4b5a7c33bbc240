pub mod config;
pub mod database_info;
pub mod db_pool;
pub mod error;
pub mod query_builder;
pub mod record;
pub mod schema;
pub mod table;
pub mod traits;
pub mod utils;

/// 数据库返回的一行，列顺序与结果集一致
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use config::{ConnectionConfig, SslMode};
pub use database_info::DatabaseInfo;
pub use db_pool::{DbDriver, DbPool};
pub use error::{Result, TableGateError};
pub use query_builder::{BindValue, QueryBuilder, Statement};
pub use record::Record;
pub use schema::{Column, ColumnKind, TableSchema};
pub use table::TableAccessor;
pub use traits::{Crud, Mutation, QueryOutput};
