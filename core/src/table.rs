use crate::db_pool::DbPool;
use crate::error::{Result, TableGateError};
use crate::query_builder::{BindValue, QueryBuilder, Statement};
use crate::record::Record;
use crate::schema::TableSchema;
use crate::traits::{Crud, Mutation, QueryOutput};
use crate::utils::is_safe_table_name;
use crate::Row;

/// 单表访问器
///
/// 持有共享连接池的句柄和一份不可变的表结构。切换表时构造新的访问器，
/// 不修改已有实例，因此可以放在 `Arc` 后面被多个请求同时使用。
#[derive(Debug, Clone)]
pub struct TableAccessor {
    pool: DbPool,
    schema: TableSchema,
    builder: QueryBuilder,
}

impl TableAccessor {
    /// 校验表名并加载列定义，表不存在时返回 `TableNotFound`
    pub async fn open(pool: DbPool, table: &str) -> Result<Self> {
        if !is_safe_table_name(table) {
            return Err(TableGateError::validation(format!(
                "Invalid table name '{}'",
                table
            )));
        }

        let columns = pool.columns(table).await?;
        let schema = TableSchema::new(table, columns);
        if schema.is_empty() {
            return Err(TableGateError::TableNotFound(table.to_string()));
        }
        tracing::info!(table, columns = schema.columns().len(), "table schema loaded");

        Ok(Self::with_schema(pool, schema))
    }

    /// 使用已经准备好的表结构（例如带别名的）
    pub fn with_schema(pool: DbPool, schema: TableSchema) -> Self {
        let builder = QueryBuilder::new(schema.name()).with_driver(pool.driver());
        Self {
            pool,
            schema,
            builder,
        }
    }

    /// 共享同一个连接池，打开另一张表
    pub async fn with_table(&self, table: &str) -> Result<Self> {
        Self::open(self.pool.clone(), table).await
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// 连通性检查，返回数据库当前时间
    pub async fn ping(&self) -> Result<String> {
        self.pool.ping().await
    }

    /// 空对象不经过白名单，交给构建器自己的空值检查
    fn resolve(&self, record: &Record) -> Result<Record> {
        if record.is_empty() {
            return Ok(Record::new());
        }
        self.schema.resolve(record)
    }

    async fn run(&self, statement: Statement) -> Result<QueryOutput> {
        tracing::debug!(
            table = self.schema.name(),
            sql = %statement.sql,
            params = statement.binds.len(),
            "executing statement"
        );
        self.pool.fetch(&statement).await
    }
}

#[async_trait::async_trait]
impl Crud for TableAccessor {
    fn table_name(&self) -> &str {
        self.schema.name()
    }

    async fn select(&self, filters: &Record) -> Result<Vec<Row>> {
        let filters = self.resolve(filters)?;
        let statement = self.builder.select(&filters);
        Ok(self.run(statement).await?.rows)
    }

    async fn insert(&self, data: &Record) -> Result<Row> {
        let data = self.resolve(data)?;
        let statement = self.builder.insert(&data)?;
        self.run(statement)
            .await?
            .rows
            .into_iter()
            .next()
            .ok_or(TableGateError::NotFound)
    }

    async fn update(&self, data: &Record, filters: &Record) -> Result<Mutation> {
        let data = self.resolve(data)?;
        let filters = self.resolve(filters)?;
        let statement = self.builder.update(&data, &filters)?;
        Ok(self.run(statement).await?.into())
    }

    async fn delete(&self, filters: &Record) -> Result<Mutation> {
        let filters = self.resolve(filters)?;
        let statement = self.builder.delete(&filters)?;
        Ok(self.run(statement).await?.into())
    }

    async fn query(&self, sql: &str, params: &[BindValue]) -> Result<QueryOutput> {
        let binds = self.pool.infer_params(sql, params).await?;
        self.run(Statement::new(sql, binds)).await
    }
}
