use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableGateError {
    /// 输入校验失败（空的 data / filters、未知列、类型不匹配），不会触达数据库
    #[error("{0}")]
    Validation(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    /// 启动时建立连接池失败
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    /// INSERT ... RETURNING 没有返回任何行
    #[error("No row returned")]
    NotFound,
}

impl TableGateError {
    pub fn validation(message: impl Into<String>) -> Self {
        TableGateError::Validation(message.into())
    }

    /// 是否为调用方输入导致的错误
    pub fn is_validation(&self) -> bool {
        matches!(self, TableGateError::Validation(_))
    }

    /// 返回给调用方的错误文本，数据库错误只保留服务端给出的消息
    pub fn client_message(&self) -> String {
        match self {
            TableGateError::DatabaseError(sqlx::Error::Database(db)) => db.message().to_string(),
            other => other.to_string(),
        }
    }
}


pub type Result<T> = std::result::Result<T, TableGateError>;
