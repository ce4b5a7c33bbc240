use crate::config::ConnectionConfig;
use crate::database_info::DatabaseInfo;
use crate::error::{Result, TableGateError};
use crate::query_builder::{BindValue, Statement};
use crate::schema::{Column, ColumnKind};
use crate::traits::QueryOutput;
use futures_util::TryStreamExt;
use sqlx::{Either, Executor, Pool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    Postgres,
    Sqlite,
}

impl DbDriver {
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DbDriver::Postgres)
        } else if url.starts_with("sqlite://") || url.starts_with("sqlite:") {
            Ok(DbDriver::Sqlite)
        } else {
            Err(TableGateError::UnsupportedDatabase(url.to_string()))
        }
    }

    pub fn placeholder(&self, index: usize) -> String {
        match self {
            DbDriver::Sqlite => "?".to_string(),
            DbDriver::Postgres => format!("${}", index + 1),
        }
    }
}

/// 进程级共享连接池
///
/// 内部的 sqlx Pool 本身是引用计数的，clone 只复制句柄
#[derive(Debug, Clone)]
pub enum DbPool {
    #[cfg(feature = "postgres")]
    Postgres(Pool<sqlx::Postgres>),
    #[cfg(feature = "sqlite")]
    Sqlite(Pool<sqlx::Sqlite>),
}

impl DbPool {
    /// 根据连接配置建立连接池，失败属于启动期致命错误
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let driver = config.driver();
        tracing::info!(database = %config.summary(), "connecting to database");

        match driver {
            #[cfg(feature = "postgres")]
            DbDriver::Postgres => {
                let options = config.pg_connect_options()?;
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect_with(options)
                    .await
                    .map_err(TableGateError::Connection)?;
                Ok(Self::from_postgres_pool(pool))
            }
            #[cfg(feature = "sqlite")]
            DbDriver::Sqlite => {
                let options = config.sqlite_connect_options()?;
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect_with(options)
                    .await
                    .map_err(TableGateError::Connection)?;
                Ok(Self::from_sqlite_pool(pool))
            }
            #[allow(unreachable_patterns)]
            _ => Err(TableGateError::UnsupportedDatabase(format!(
                "driver {:?} is not enabled in this build",
                driver
            ))),
        }
    }

    /// 从 PostgreSQL Pool 创建 DbPool
    #[cfg(feature = "postgres")]
    pub fn from_postgres_pool(pool: Pool<sqlx::Postgres>) -> Self {
        DbPool::Postgres(pool)
    }

    /// 从 SQLite Pool 创建 DbPool
    #[cfg(feature = "sqlite")]
    pub fn from_sqlite_pool(pool: Pool<sqlx::Sqlite>) -> Self {
        DbPool::Sqlite(pool)
    }

    pub fn driver(&self) -> DbDriver {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(_) => DbDriver::Postgres,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(_) => DbDriver::Sqlite,
        }
    }


    /// 执行不带参数的语句（建表、迁移等），返回受影响行数
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => {
                let result = sqlx::query(sql).execute(pool).await?;
                Ok(result.rows_affected())
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                let result = sqlx::query(sql).execute(pool).await?;
                Ok(result.rows_affected())
            }
        }
    }

    /// 执行一条语句，收集返回的行和受影响行数
    pub async fn fetch(&self, statement: &Statement) -> Result<QueryOutput> {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => fetch_statement(pool, statement).await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => fetch_statement(pool, statement).await,
        }
    }

    /// 原始 SQL 的参数类型推断
    ///
    /// PostgreSQL 的参数以二进制格式、带类型发送，字符串参数会被声明为 TEXT，
    /// 无法与整数、枚举等列比较。这里先让服务端描述语句，再按推断出的类型转换字符串参数。
    /// SQLite 是动态类型，原样返回。
    pub async fn infer_params(&self, sql: &str, params: &[BindValue]) -> Result<Vec<BindValue>> {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) if params.iter().any(|p| matches!(p, BindValue::String(_))) => {
                let describe = pool.describe(sql).await?;
                let types = match describe.parameters() {
                    Some(Either::Left(types)) => types.to_vec(),
                    _ => Vec::new(),
                };
                Ok(params
                    .iter()
                    .enumerate()
                    .map(|(i, param)| match (param, types.get(i)) {
                        (BindValue::String(text), Some(type_info)) => {
                            crate::database_info::param_for_type(text, type_info)
                        }
                        _ => param.clone(),
                    })
                    .collect())
            }
            _ => Ok(params.to_vec()),
        }
    }

    /// 连通性检查，返回数据库当前时间
    pub async fn ping(&self) -> Result<String> {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => {
                let now: String = sqlx::query_scalar(<sqlx::Postgres as DatabaseInfo>::ping_sql())
                    .fetch_one(pool)
                    .await?;
                Ok(now)
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                let now: String = sqlx::query_scalar(<sqlx::Sqlite as DatabaseInfo>::ping_sql())
                    .fetch_one(pool)
                    .await?;
                Ok(now)
            }
        }
    }

    /// 读取表的列定义，按声明顺序返回；表不存在时返回空列表
    ///
    /// `table` 必须已经通过 [`crate::utils::is_safe_table_name`] 校验
    pub async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let (schema, name) = crate::utils::split_table_name(table);
        let driver = self.driver();
        let raw: Vec<(String, String, Option<String>)> = match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => {
                // udt 是列的实际类型（枚举、数组等），用于在 SQL 里做类型转换
                sqlx::query_as(
                    r#"
                    SELECT column_name::text,
                           data_type::text,
                           (quote_ident(udt_schema) || '.' || quote_ident(udt_name))::text
                    FROM information_schema.columns
                    WHERE table_schema = COALESCE($1, current_schema()::text)
                      AND table_name = $2
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(schema)
                .bind(name)
                .fetch_all(pool)
                .await?
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                let sql = match schema {
                    Some(schema) => format!("PRAGMA {}.table_info({})", schema, name),
                    None => format!("PRAGMA table_info({})", name),
                };
                use sqlx::Row as _;
                sqlx::query(&sql)
                    .fetch_all(pool)
                    .await?
                    .iter()
                    .map(|row| -> Result<(String, String, Option<String>)> {
                        Ok((row.try_get("name")?, row.try_get("type")?, None))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(raw
            .into_iter()
            .map(|(name, type_name, sql_type)| Column {
                kind: ColumnKind::from_type_name(driver, &type_name),
                name,
                type_name,
                sql_type,
            })
            .collect())
    }

    /// 关闭连接池，等待借出的连接归还
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => pool.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => pool.close().await,
        }
        tracing::info!("connection pool closed");
    }
}

/// 泛型执行：绑定参数，逐条读取结果流
async fn fetch_statement<DB>(pool: &Pool<DB>, statement: &Statement) -> Result<QueryOutput>
where
    DB: DatabaseInfo + sqlx::database::HasStatementCache,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'a> DB::Arguments<'a>: sqlx::IntoArguments<'a, DB>,
{
    // 同一条 SQL 的参数类型可能随值变化（NULL 以 OID 0 发送，由服务端推断），
    // 不能复用按 SQL 文本缓存的预编译语句
    let mut query = sqlx::query::<DB>(&statement.sql).persistent(false);
    for bind in &statement.binds {
        query = DB::bind_value(query, bind);
    }

    let mut rows = Vec::new();
    let mut affected = 0u64;
    let mut stream = pool.fetch_many(query);
    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(result) => affected += DB::rows_affected(&result),
            Either::Right(row) => rows.push(DB::decode_row(&row)),
        }
    }

    // SQLite 的 SELECT 不报告行数，以实际返回的行数为下限
    let row_count = affected.max(rows.len() as u64);
    Ok(QueryOutput { rows, row_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_url() {
        assert_eq!(
            DbDriver::from_url("postgresql://u:p@h:5432/db").unwrap(),
            DbDriver::Postgres
        );
        assert_eq!(
            DbDriver::from_url("postgres://h/db").unwrap(),
            DbDriver::Postgres
        );
        assert_eq!(
            DbDriver::from_url("sqlite::memory:").unwrap(),
            DbDriver::Sqlite
        );
        assert!(matches!(
            DbDriver::from_url("mysql://h/db"),
            Err(TableGateError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(DbDriver::Postgres.placeholder(0), "$1");
        assert_eq!(DbDriver::Postgres.placeholder(9), "$10");
        assert_eq!(DbDriver::Sqlite.placeholder(3), "?");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_columns_and_ping() {
        let config = ConnectionConfig::from_url("sqlite::memory:")
            .unwrap()
            .with_max_connections(1);
        let pool = DbPool::connect(&config).await.unwrap();
        pool.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .await
            .unwrap();

        let columns = pool.columns("t").await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "score"]);
        assert_eq!(columns[0].kind, ColumnKind::Integer);
        assert_eq!(columns[1].kind, ColumnKind::Text);
        assert_eq!(columns[2].kind, ColumnKind::Float);

        assert!(pool.columns("missing").await.unwrap().is_empty());
        assert!(!pool.ping().await.unwrap().is_empty());
        pool.close().await;
    }
}
