//! 网关设置
//!
//! 数据库连接由 [`tablegate::ConnectionConfig`] 单独读取，这里只有 HTTP 相关的部分。

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail};

/// 出错时的 HTTP 状态码策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// 始终返回 200，错误只体现在 `error` 字段
    #[default]
    Envelope,
    /// 按错误类型返回 4xx / 5xx，响应体不变
    Status,
}

impl FromStr for ErrorMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "envelope" => Ok(ErrorMode::Envelope),
            "status" => Ok(ErrorMode::Status),
            other => Err(anyhow!("unknown error mode '{}', expected envelope or status", other)),
        }
    }
}

/// 网关设置
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,

    pub port: u16,

    /// `/api/records` 操作的表
    pub table: String,

    /// 可以通过 `/api/tables/:table/records` 访问的其他表
    pub extra_tables: Vec<String>,

    /// 默认表的 逻辑字段名 -> 物理列名
    pub column_aliases: Vec<(String, String)>,

    /// 浏览器表单等静态文件目录
    pub static_dir: Option<PathBuf>,

    pub error_mode: ErrorMode,

    /// 为空时允许任意来源
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            table: "hospital_records".to_string(),
            extra_tables: Vec::new(),
            column_aliases: Vec::new(),
            static_dir: None,
            error_mode: ErrorMode::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// 从环境变量读取
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: get("GATEWAY_HOST").unwrap_or(defaults.host),

            port: match get("GATEWAY_PORT").or_else(|| get("PORT")) {
                Some(port) => port
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("invalid port '{}'", port))?,
                None => defaults.port,
            },

            table: get("GATEWAY_TABLE").unwrap_or(defaults.table),

            extra_tables: get("GATEWAY_TABLES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),

            column_aliases: get("GATEWAY_COLUMN_ALIASES")
                .map(|v| parse_aliases(&v))
                .transpose()?
                .unwrap_or_default(),

            static_dir: get("GATEWAY_STATIC_DIR").map(PathBuf::from),

            error_mode: get("GATEWAY_ERROR_MODE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),

            cors_origins: get("GATEWAY_CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        })
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `name=patient_name,dob=date_of_birth`
fn parse_aliases(value: &str) -> anyhow::Result<Vec<(String, String)>> {
    split_list(value)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((logical, physical)) if !logical.trim().is_empty() && !physical.trim().is_empty() => {
                Ok((logical.trim().to_string(), physical.trim().to_string()))
            }
            _ => bail!("invalid column alias '{}', expected logical=physical", pair),
        })
        .collect()
}
