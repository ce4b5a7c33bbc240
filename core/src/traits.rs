use crate::error::Result;
use crate::query_builder::BindValue;
use crate::record::Record;
use crate::Row;
use serde::Serialize;

/// UPDATE / DELETE 的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub rows_affected: u64,
    /// RETURNING * 返回的行
    pub rows: Vec<Row>,
}

/// 原始 SQL 的执行结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub row_count: u64,
}

impl From<QueryOutput> for Mutation {
    fn from(output: QueryOutput) -> Self {
        Mutation {
            rows_affected: output.row_count,
            rows: output.rows,
        }
    }
}

/// 单表 CRUD 操作
///
/// HTTP 层和 CLI 只依赖这个 trait，测试里可以替换成内存实现
#[async_trait::async_trait]
pub trait Crud: Send + Sync {
    /// 当前操作的表名
    fn table_name(&self) -> &str;

    /// 查询全表
    async fn select_all(&self) -> Result<Vec<Row>> {
        self.select(&Record::new()).await
    }

    /// 按等值条件查询，filters 为空时等同于 select_all
    async fn select(&self, filters: &Record) -> Result<Vec<Row>>;

    /// 插入一行，返回数据库写入后的完整行
    async fn insert(&self, data: &Record) -> Result<Row>;

    async fn update(&self, data: &Record, filters: &Record) -> Result<Mutation>;

    async fn delete(&self, filters: &Record) -> Result<Mutation>;

    /// 原样执行任意 SQL
    ///
    /// 不做列校验、类型转换和空条件检查
    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryOutput>;
}
