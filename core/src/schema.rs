//! 表结构白名单
//!
//! 列名会被直接拼进 SQL，所以只有从数据库读到的列（以及显式配置的别名）
//! 才能进入查询构建器。同时负责把调用方给的值转换成列的实际类型。

use crate::db_pool::DbDriver;
use crate::error::{Result, TableGateError};
use crate::query_builder::BindValue;
use crate::record::Record;
use crate::utils::is_safe_field_name;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 列的类型分类，决定值如何转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Numeric,
    Boolean,
    Text,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Other,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Uuid => "uuid",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::TimestampTz => "timestamptz",
            ColumnKind::Json => "json",
            ColumnKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl ColumnKind {
    /// 根据驱动报告的类型名分类
    ///
    /// PostgreSQL 使用 `information_schema.columns.data_type`，
    /// SQLite 使用建表时声明的类型，按亲和性规则匹配
    pub fn from_type_name(driver: DbDriver, type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        match driver {
            DbDriver::Postgres => match upper.as_str() {
                "SMALLINT" | "INTEGER" | "BIGINT" => ColumnKind::Integer,
                "REAL" | "DOUBLE PRECISION" => ColumnKind::Float,
                "NUMERIC" | "DECIMAL" | "MONEY" => ColumnKind::Numeric,
                "BOOLEAN" => ColumnKind::Boolean,
                "TEXT" | "CHARACTER VARYING" | "CHARACTER" | "CITEXT" | "NAME" => {
                    ColumnKind::Text
                }
                "UUID" => ColumnKind::Uuid,
                "DATE" => ColumnKind::Date,
                "TIMESTAMP WITHOUT TIME ZONE" => ColumnKind::Timestamp,
                "TIMESTAMP WITH TIME ZONE" => ColumnKind::TimestampTz,
                "JSON" | "JSONB" => ColumnKind::Json,
                _ => ColumnKind::Other,
            },
            DbDriver::Sqlite => {
                if upper.starts_with("BOOL") {
                    ColumnKind::Boolean
                } else if upper.contains("INT") {
                    ColumnKind::Integer
                } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT")
                {
                    ColumnKind::Text
                } else if upper.is_empty() || upper.contains("BLOB") {
                    ColumnKind::Other
                } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB")
                {
                    ColumnKind::Float
                } else if upper == "JSON" {
                    ColumnKind::Json
                } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
                    ColumnKind::Timestamp
                } else if upper == "DATE" {
                    ColumnKind::Date
                } else {
                    ColumnKind::Numeric
                }
            }
        }
    }

    /// 把一个值转换成该类型期望的绑定值
    ///
    /// 查询字符串和表单字段都是字符串，这里负责把它们解析成列的类型；
    /// NULL 原样保留，`Other` 不做任何处理
    pub fn coerce(&self, column: &str, value: BindValue) -> Result<BindValue> {
        if value.is_null() || *self == ColumnKind::Other {
            return Ok(value);
        }

        let coerced = match (self, &value) {
            (ColumnKind::Integer, BindValue::Int64(_)) => Some(value.clone()),
            (ColumnKind::Integer, BindValue::Float64(f))
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
            {
                Some(BindValue::Int64(*f as i64))
            }
            (ColumnKind::Integer, BindValue::String(s)) => {
                s.trim().parse::<i64>().ok().map(BindValue::Int64)
            }

            (ColumnKind::Float, BindValue::Float64(_)) => Some(value.clone()),
            (ColumnKind::Float, BindValue::Int64(i)) => Some(BindValue::Float64(*i as f64)),
            (ColumnKind::Float, BindValue::String(s)) => {
                s.trim().parse::<f64>().ok().map(BindValue::Float64)
            }

            (ColumnKind::Numeric, BindValue::Decimal(_)) => Some(value.clone()),
            (ColumnKind::Numeric, BindValue::Int64(i)) => {
                Some(BindValue::Decimal(BigDecimal::from(*i)))
            }
            (ColumnKind::Numeric, BindValue::Float64(f)) => BigDecimal::from_str(&f.to_string())
                .ok()
                .map(BindValue::Decimal),
            (ColumnKind::Numeric, BindValue::String(s)) => {
                BigDecimal::from_str(s.trim()).ok().map(BindValue::Decimal)
            }

            (ColumnKind::Boolean, BindValue::Bool(_)) => Some(value.clone()),
            (ColumnKind::Boolean, BindValue::Int64(0)) => Some(BindValue::Bool(false)),
            (ColumnKind::Boolean, BindValue::Int64(1)) => Some(BindValue::Bool(true)),
            (ColumnKind::Boolean, BindValue::String(s)) => parse_bool(s).map(BindValue::Bool),

            (ColumnKind::Text, BindValue::String(_)) => Some(value.clone()),
            (ColumnKind::Text, other) => Some(BindValue::String(display_value(other))),

            (ColumnKind::Uuid, BindValue::Uuid(_)) => Some(value.clone()),
            (ColumnKind::Uuid, BindValue::String(s)) => {
                uuid::Uuid::parse_str(s.trim()).ok().map(BindValue::Uuid)
            }

            (ColumnKind::Date, BindValue::Date(_)) => Some(value.clone()),
            (ColumnKind::Date, BindValue::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(BindValue::Date),

            (ColumnKind::Timestamp, BindValue::Timestamp(_)) => Some(value.clone()),
            (ColumnKind::Timestamp, BindValue::String(s)) => {
                parse_naive_datetime(s.trim()).map(BindValue::Timestamp)
            }

            (ColumnKind::TimestampTz, BindValue::TimestampTz(_)) => Some(value.clone()),
            (ColumnKind::TimestampTz, BindValue::String(s)) => {
                parse_datetime_utc(s.trim()).map(BindValue::TimestampTz)
            }

            (ColumnKind::Json, BindValue::Json(_)) => Some(value.clone()),
            (ColumnKind::Json, BindValue::String(s)) => Some(BindValue::Json(
                serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
            )),
            (ColumnKind::Json, other) => Some(BindValue::Json(other.to_json())),

            _ => None,
        };

        coerced.ok_or_else(|| {
            TableGateError::validation(format!(
                "Column '{}' expects {}, got '{}'",
                column,
                self,
                display_value(&value)
            ))
        })
    }
}

fn display_value(value: &BindValue) -> String {
    match value {
        BindValue::String(s) => s.clone(),
        other => match other.to_json() {
            Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    // <input type="datetime-local"> 不带秒
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// 带时区的按 RFC 3339 解析，不带时区的按 UTC 处理
fn parse_datetime_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_naive_datetime(s).map(|naive| naive.and_utc()))
}

/// 一列的元数据
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// 驱动报告的原始类型名
    pub type_name: String,
    pub kind: ColumnKind,
    /// 可直接写进 SQL 的限定类型名，仅 PostgreSQL 提供
    pub sql_type: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            type_name: kind.to_string(),
            kind,
            sql_type: None,
        }
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    /// 把调用方的值转换成这一列的绑定值
    ///
    /// `Other` 类型的列如果知道服务端类型名，以文本发送并在 SQL 中转换
    pub fn bind(&self, value: BindValue) -> Result<BindValue> {
        match (&self.kind, &self.sql_type) {
            (ColumnKind::Other, Some(sql_type)) if !value.is_null() => Ok(BindValue::Typed {
                text: display_value(&value),
                sql_type: sql_type.clone(),
            }),
            _ => self.kind.coerce(&self.name, value),
        }
    }
}

/// 一张表的列白名单和字段别名
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    aliases: HashMap<String, String>,
}

impl TableSchema {
    /// 名字不是普通标识符的列无法安全拼接，直接跳过
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let columns = columns
            .into_iter()
            .filter(|column| {
                let safe = is_safe_field_name(&column.name);
                if !safe {
                    tracing::warn!(table = %name, column = %column.name, "skipping column with unsafe name");
                }
                safe
            })
            .collect();
        Self {
            name,
            columns,
            aliases: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 增加一个 逻辑字段名 -> 物理列名 的映射，物理列必须存在
    pub fn with_alias(
        mut self,
        logical: impl Into<String>,
        physical: impl Into<String>,
    ) -> Result<Self> {
        let logical = logical.into();
        let physical = physical.into();
        if !self.columns.iter().any(|c| c.name == physical) {
            return Err(TableGateError::Config(format!(
                "Alias '{}' points to unknown column '{}' in table '{}'",
                logical, physical, self.name
            )));
        }
        self.aliases.insert(logical, physical);
        Ok(self)
    }

    /// 按字段名查找列，别名优先
    pub fn column(&self, field: &str) -> Option<&Column> {
        let physical = self.aliases.get(field).map(String::as_str).unwrap_or(field);
        self.columns.iter().find(|c| c.name == physical)
    }

    /// 把调用方的记录映射到物理列并转换值
    pub fn resolve(&self, record: &Record) -> Result<Record> {
        let mut resolved = Record::new();
        for (field, value) in record.iter() {
            let column = self.column(field).ok_or_else(|| {
                TableGateError::validation(format!("Unknown column '{}'", field))
            })?;
            let value = column.bind(value.clone())?;
            resolved.insert(column.name.clone(), value);
        }
        Ok(resolved)
    }
}
