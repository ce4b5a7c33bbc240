//! 连接配置
//!
//! 启动时解析一次，之后只读。支持连接池 URL 的用户名 / 密码覆盖：
//! 连接池用户名形如 `base.projectRef`，覆盖用户名时保留 `.projectRef` 后缀。

use crate::db_pool::DbDriver;
use crate::error::{Result, TableGateError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// URL 里的密码占位符，出现时视为没有密码
const PASSWORD_PLACEHOLDER: &str = "YOUR-PASSWORD";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DATABASE: &str = "postgres";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = TableGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(TableGateError::Config(format!(
                "Unknown SSL mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "postgres")]
impl From<SslMode> for sqlx::postgres::PgSslMode {
    fn from(mode: SslMode) -> Self {
        use sqlx::postgres::PgSslMode;
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// 数据库连接配置
#[derive(Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// 替换 URL 中的用户名（不含 projectRef）
    pub username_override: Option<String>,
    pub password_override: Option<String>,
    pub ssl_root_cert: Option<PathBuf>,
    /// 未设置时：有 CA 证书为 verify-ca，否则为 prefer
    pub ssl_mode: Option<SslMode>,
    pub max_connections: u32,
    driver: DbDriver,
}

impl ConnectionConfig {
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let driver = DbDriver::from_url(&url)?;
        if driver == DbDriver::Postgres {
            url::Url::parse(&url)
                .map_err(|e| TableGateError::Config(format!("Invalid connection string: {}", e)))?;
        }
        Ok(Self {
            url,
            username_override: None,
            password_override: None,
            ssl_root_cert: None,
            ssl_mode: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            driver,
        })
    }

    /// 从环境变量读取，`.env` 文件会先被加载
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 用任意键值来源构建配置，空字符串视为未设置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("DATABASE_URL")
            .or_else(|| get("SUPABASE_POOLER"))
            .ok_or_else(|| {
                TableGateError::Config(
                    "Connection string not set, define DATABASE_URL or SUPABASE_POOLER".to_string(),
                )
            })?;

        let mut config = Self::from_url(url)?;
        config.username_override = get("DATABASE_USERNAME_OVERRIDE");
        config.password_override = get("DATABASE_PASSWORD");
        config.ssl_root_cert = get("DATABASE_SSL_ROOT_CERT").map(PathBuf::from);
        config.ssl_mode = get("DATABASE_SSL_MODE")
            .map(|mode| mode.parse())
            .transpose()?;
        if let Some(max) = get("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.trim().parse().map_err(|_| {
                TableGateError::Config(format!("Invalid DATABASE_MAX_CONNECTIONS '{}'", max))
            })?;
        }
        Ok(config)
    }

    pub fn with_username_override(mut self, username: impl Into<String>) -> Self {
        self.username_override = Some(username.into());
        self
    }

    pub fn with_password_override(mut self, password: impl Into<String>) -> Self {
        self.password_override = Some(password.into());
        self
    }

    pub fn with_ssl_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_root_cert = Some(path.into());
        self
    }

    pub fn with_ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn driver(&self) -> DbDriver {
        self.driver
    }

    pub fn effective_ssl_mode(&self) -> SslMode {
        match (self.ssl_mode, &self.ssl_root_cert) {
            (Some(mode), _) => mode,
            (None, Some(_)) => SslMode::VerifyCa,
            (None, None) => SslMode::Prefer,
        }
    }

    /// 应用覆盖后的用户名
    ///
    /// URL 用户为 `base.projectRef` 时返回 `override.projectRef`
    pub fn effective_username(&self) -> Option<String> {
        let from_url = self.parsed_url().map(|url| url.username().to_string());
        match &self.username_override {
            Some(username) => {
                let project_ref = from_url
                    .as_deref()
                    .and_then(|user| user.split_once('.'))
                    .map(|(_, project_ref)| project_ref)
                    .filter(|project_ref| !project_ref.is_empty());
                Some(match project_ref {
                    Some(project_ref) => format!("{}.{}", username, project_ref),
                    None => username.clone(),
                })
            }
            None => from_url.filter(|user| !user.is_empty()),
        }
    }

    /// URL 里是否带有可用的密码
    fn url_has_password(&self) -> bool {
        self.parsed_url()
            .and_then(|url| url.password().map(|p| !p.contains(PASSWORD_PLACEHOLDER)))
            .unwrap_or(false)
    }

    fn parsed_url(&self) -> Option<url::Url> {
        url::Url::parse(&self.url).ok()
    }

    /// 可以安全打印到日志的目标描述，不含密码
    pub fn summary(&self) -> String {
        match self.driver {
            DbDriver::Sqlite => self.url.clone(),
            DbDriver::Postgres => {
                let Some(url) = self.parsed_url() else {
                    return "postgres://<invalid>".to_string();
                };
                format!(
                    "postgres://{}@{}:{}/{} (sslmode={})",
                    self.effective_username().unwrap_or_default(),
                    url.host_str().unwrap_or("localhost"),
                    url.port().unwrap_or(5432),
                    database_from_path(url.path()),
                    self.effective_ssl_mode()
                )
            }
        }
    }

    #[cfg(feature = "postgres")]
    pub fn pg_connect_options(&self) -> Result<sqlx::postgres::PgConnectOptions> {
        use sqlx::postgres::PgConnectOptions;

        let mut options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| TableGateError::Config(format!("Invalid connection string: {}", e)))?;

        if let Some(username) = &self.username_override {
            let username = self.effective_username().unwrap_or_else(|| username.clone());
            options = options.username(&username);
        }

        match &self.password_override {
            Some(password) => options = options.password(password),
            None if self.url_has_password() => {}
            None => {
                return Err(TableGateError::Config(
                    "No database password: replace [YOUR-PASSWORD] in the URL or set DATABASE_PASSWORD"
                        .to_string(),
                ))
            }
        }

        if options.get_database().is_none() {
            options = options.database(DEFAULT_DATABASE);
        }

        options = options.ssl_mode(self.effective_ssl_mode().into());
        if let Some(cert) = &self.ssl_root_cert {
            options = options.ssl_root_cert(cert);
        }
        Ok(options)
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite_connect_options(&self) -> Result<sqlx::sqlite::SqliteConnectOptions> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&self.url)
            .map_err(|e| TableGateError::Config(format!("Invalid connection string: {}", e)))?;
        Ok(options.create_if_missing(true))
    }
}

fn database_from_path(path: &str) -> &str {
    match path.trim_start_matches('/') {
        "" => DEFAULT_DATABASE,
        database => database,
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("target", &self.summary())
            .field("username_override", &self.username_override)
            .field(
                "password_override",
                &self.password_override.as_ref().map(|_| "***"),
            )
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("ssl_mode", &self.effective_ssl_mode())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
