//! 数据库信息抽象层
//!
//! 提供统一的接口来访问不同数据库的特性：参数绑定、行解码。

use crate::query_builder::BindValue;
use crate::Row;
use sqlx::query::Query;
use sqlx::Database;

/// 数据库信息 trait
///
/// 每个支持的数据库类型（`sqlx::Postgres`, `sqlx::Sqlite`）都实现此 trait，
/// 执行层只依赖这里的方法，不关心具体驱动。
pub trait DatabaseInfo: Database {
    /// 把一个绑定值追加到查询上
    fn bind_value<'q>(
        query: Query<'q, Self, <Self as Database>::Arguments<'q>>,
        value: &BindValue,
    ) -> Query<'q, Self, <Self as Database>::Arguments<'q>>;

    /// 从执行结果中取受影响行数
    fn rows_affected(result: &<Self as Database>::QueryResult) -> u64;

    /// 把一行结果解码成 JSON 对象，列顺序与结果集一致
    fn decode_row(row: &<Self as Database>::Row) -> Row;

    /// 连通性检查语句，返回一列文本形式的当前时间
    fn ping_sql() -> &'static str;
}

// ========== PostgreSQL 实现 ==========

#[cfg(feature = "postgres")]
pub(crate) use postgres::param_for_type;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::schema::ColumnKind;
    use serde_json::Value;
    use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
    use sqlx::postgres::{PgArgumentBuffer, PgQueryResult, PgRow, PgTypeInfo, PgTypeKind};
    use sqlx::{Column, Row as _, TypeInfo};

    /// 不声明类型的 NULL
    ///
    /// 以 OID 0 发送，由服务端根据上下文推断参数类型，
    /// 因此可以写入任意类型的列
    struct UntypedNull;

    impl sqlx::Type<sqlx::Postgres> for UntypedNull {
        fn type_info() -> PgTypeInfo {
            PgTypeInfo::with_oid(Oid(0))
        }
    }

    impl<'q> sqlx::Encode<'q, sqlx::Postgres> for UntypedNull {
        fn encode_by_ref(
            &self,
            _buf: &mut PgArgumentBuffer,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            Ok(sqlx::encode::IsNull::Yes)
        }
    }

    /// 不声明类型的文本，OID 0
    struct UntypedText(String);

    impl sqlx::Type<sqlx::Postgres> for UntypedText {
        fn type_info() -> PgTypeInfo {
            PgTypeInfo::with_oid(Oid(0))
        }
    }

    impl<'q> sqlx::Encode<'q, sqlx::Postgres> for UntypedText {
        fn encode_by_ref(
            &self,
            buf: &mut PgArgumentBuffer,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            <String as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
        }
    }

    impl DatabaseInfo for sqlx::Postgres {
        fn bind_value<'q>(
            query: Query<'q, Self, sqlx::postgres::PgArguments>,
            value: &BindValue,
        ) -> Query<'q, Self, sqlx::postgres::PgArguments> {
            match value {
                BindValue::Null => query.bind(UntypedNull),
                BindValue::Bool(b) => query.bind(*b),
                BindValue::Int64(i) => query.bind(*i),
                BindValue::Float64(f) => query.bind(*f),
                BindValue::String(s) => query.bind(s.clone()),
                BindValue::Decimal(d) => query.bind(d.clone()),
                BindValue::Uuid(u) => query.bind(*u),
                BindValue::Date(d) => query.bind(*d),
                BindValue::Timestamp(t) => query.bind(*t),
                BindValue::TimestampTz(t) => query.bind(*t),
                BindValue::Json(v) => query.bind(sqlx::types::Json(v.clone())),
                // 占位符带有 `::type`，这里按 TEXT 发送
                BindValue::Typed { text, .. } => query.bind(text.clone()),
                BindValue::Untyped(text) => query.bind(UntypedText(text.clone())),
            }
        }

        fn rows_affected(result: &PgQueryResult) -> u64 {
            result.rows_affected()
        }

        fn decode_row(row: &PgRow) -> Row {
            let mut obj = Row::new();
            for column in row.columns() {
                let name = column.name();
                let value = decode_column(row, column.ordinal(), column.type_info());
                obj.insert(name.to_string(), value);
            }
            obj
        }

        fn ping_sql() -> &'static str {
            "SELECT NOW()::text"
        }
    }

    fn decode_column(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Value {
        // 枚举的二进制格式就是标签文本
        if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
            return row
                .try_get_unchecked::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::String);
        }

        let type_name = type_info.name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "INT2" => row.try_get::<Option<i16>, _>(idx).map(|v| v.map(Value::from)),
            "INT4" => row.try_get::<Option<i32>, _>(idx).map(|v| v.map(Value::from)),
            "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| v.map(Value::from)),
            "FLOAT4" => row.try_get::<Option<f32>, _>(idx).map(|v| {
                v.and_then(|v| serde_json::Number::from_f64(v as f64))
                    .map(Value::Number)
            }),
            "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(|v| {
                v.and_then(serde_json::Number::from_f64).map(Value::Number)
            }),
            // 与 node-postgres 一致，NUMERIC 以字符串返回；Decimal 保留服务端的小数位数，
            // 超出 28 位有效数字时退回 BigDecimal
            "NUMERIC" => row
                .try_get::<Option<rust_decimal::Decimal>, _>(idx)
                .map(|v| v.map(|d| Value::String(d.to_string())))
                .or_else(|_| {
                    row.try_get::<Option<bigdecimal::BigDecimal>, _>(idx)
                        .map(|v| v.map(|d| Value::String(d.to_string())))
                }),
            "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| v.map(Value::Bool)),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(idx)
                .map(|v| v.map(|u| Value::String(u.to_string()))),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| v.map(|t| Value::String(t.to_rfc3339()))),
            "TIMESTAMP" => row.try_get::<Option<chrono::NaiveDateTime>, _>(idx).map(|v| {
                v.map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            }),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map(|v| v.map(|d| Value::String(d.to_string()))),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(idx)
                .map(|v| v.map(|t| Value::String(t.to_string()))),
            "TIMETZ" => row
                .try_get::<Option<PgTimeTz<chrono::NaiveTime, chrono::FixedOffset>>, _>(idx)
                .map(|v| v.map(|t| Value::String(format!("{}{}", t.time, t.offset)))),
            "INTERVAL" => row
                .try_get::<Option<PgInterval>, _>(idx)
                .map(|v| v.map(|i| Value::String(format_interval(&i)))),
            "BYTEA" => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .map(|v| v.map(|b| Value::String(format_bytea(&b)))),
            // 二进制格式与文本相同的类型
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => row
                .try_get_unchecked::<Option<String>, _>(idx)
                .map(|v| v.map(Value::String)),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map(|v| v.map(Value::String)),
        };

        match value {
            Ok(value) => value.unwrap_or(Value::Null),
            Err(e) => {
                tracing::warn!(
                    column = idx,
                    type_name = %type_info.name(),
                    error = %e,
                    "cannot decode column value, returning null"
                );
                Value::Null
            }
        }
    }

    /// 原始 SQL 的字符串参数按服务端推断的类型转换
    ///
    /// 枚举以不声明类型的文本发送；没有对应绑定类型的参数保持 TEXT，
    /// 需要调用方在 SQL 中写 `$n::type`
    pub(crate) fn param_for_type(text: &str, type_info: &PgTypeInfo) -> BindValue {
        if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
            return BindValue::Untyped(text.to_string());
        }
        let kind = match type_info.name().to_ascii_uppercase().as_str() {
            "INT2" | "INT4" | "INT8" => ColumnKind::Integer,
            "FLOAT4" | "FLOAT8" => ColumnKind::Float,
            "NUMERIC" => ColumnKind::Numeric,
            "BOOL" => ColumnKind::Boolean,
            "UUID" => ColumnKind::Uuid,
            "DATE" => ColumnKind::Date,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "JSON" | "JSONB" => ColumnKind::Json,
            _ => return BindValue::String(text.to_string()),
        };
        kind.coerce(type_info.name(), BindValue::String(text.to_string()))
            .unwrap_or_else(|_| BindValue::String(text.to_string()))
    }

    /// 按 PostgreSQL 默认的 `postgres` 风格输出，例如 `1 year 2 mons 3 days 04:05:06.5`
    fn format_interval(interval: &PgInterval) -> String {
        fn unit(parts: &mut Vec<String>, n: i64, name: &str, plural: &str) {
            if n != 0 {
                parts.push(format!("{} {}", n, if n == 1 { name } else { plural }));
            }
        }

        let mut parts = Vec::new();
        let months = interval.months as i64;
        unit(&mut parts, months / 12, "year", "years");
        unit(&mut parts, months % 12, "mon", "mons");
        unit(&mut parts, interval.days as i64, "day", "days");

        let micros = interval.microseconds;
        if micros != 0 || parts.is_empty() {
            let sign = if micros < 0 { "-" } else { "" };
            let abs = micros.unsigned_abs();
            let secs = abs / 1_000_000;
            let mut time = format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            let frac = abs % 1_000_000;
            if frac != 0 {
                let digits = format!("{:06}", frac);
                time.push('.');
                time.push_str(digits.trim_end_matches('0'));
            }
            parts.push(time);
        }
        parts.join(" ")
    }

    /// node-postgres 的 `\x` 十六进制表示
    fn format_bytea(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(2 + bytes.len() * 2);
        out.push_str("\\x");
        for b in bytes {
            out.push_str(&format!("{:02x}", b));
        }
        out
    }

}

// ========== SQLite 实现 ==========

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};
    use serde_json::Value;

    impl DatabaseInfo for sqlx::Sqlite {
        fn bind_value<'q>(
            query: Query<'q, Self, SqliteArguments<'q>>,
            value: &BindValue,
        ) -> Query<'q, Self, SqliteArguments<'q>> {
            match value {
                BindValue::Null => query.bind(Option::<String>::None),
                BindValue::Bool(b) => query.bind(*b),
                BindValue::Int64(i) => query.bind(*i),
                BindValue::Float64(f) => query.bind(*f),
                BindValue::String(s) => query.bind(s.clone()),
                // SQLite 没有 DECIMAL / UUID 原生类型，按文本存储
                BindValue::Decimal(d) => query.bind(d.to_string()),
                BindValue::Uuid(u) => query.bind(u.to_string()),
                BindValue::Date(d) => query.bind(*d),
                BindValue::Timestamp(t) => query.bind(*t),
                BindValue::TimestampTz(t) => query.bind(*t),
                BindValue::Json(v) => query.bind(v.to_string()),
                BindValue::Typed { text, .. } | BindValue::Untyped(text) => query.bind(text.clone()),
            }
        }

        fn rows_affected(result: &SqliteQueryResult) -> u64 {
            result.rows_affected()
        }

        fn decode_row(row: &SqliteRow) -> Row {
            let mut obj = Row::new();
            for column in row.columns() {
                let name = column.name();
                let idx = column.ordinal();
                let declared = column.type_info().name().to_ascii_uppercase();

                // 动态类型：按值的实际存储类型解码，声明为 BOOLEAN 的列除外
                let storage = match row.try_get_raw(idx) {
                    Ok(raw) if !raw.is_null() => raw.type_info().name().to_ascii_uppercase(),
                    _ => {
                        obj.insert(name.to_string(), Value::Null);
                        continue;
                    }
                };

                let value = match (declared.as_str(), storage.as_str()) {
                    ("BOOLEAN", "INTEGER") => row
                        .try_get::<Option<bool>, _>(idx)
                        .ok()
                        .flatten()
                        .map(Value::Bool),
                    (_, "INTEGER") => row
                        .try_get::<Option<i64>, _>(idx)
                        .ok()
                        .flatten()
                        .map(Value::from),
                    (_, "REAL") => row
                        .try_get::<Option<f64>, _>(idx)
                        .ok()
                        .flatten()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number),
                    _ => row
                        .try_get::<Option<String>, _>(idx)
                        .ok()
                        .flatten()
                        .map(Value::String),
                }
                .unwrap_or(Value::Null);

                obj.insert(name.to_string(), value);
            }
            obj
        }

        fn ping_sql() -> &'static str {
            "SELECT datetime('now')"
        }
    }
}
