use crate::db_pool::DbDriver;
use crate::error::Result;
use crate::record::Record;
use crate::utils::{quote_identifier, quote_table_name};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// 绑定值，用于安全地传递参数
///
/// 调用方通常只会构造 `Null`/`Bool`/`Int64`/`Float64`/`String`，
/// 其余变体由 [`crate::schema::ColumnKind::coerce`] 按列类型转换得到
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Decimal(BigDecimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(Value),
    /// 以文本发送、由服务端转换成 `sql_type` 的值
    ///
    /// 用于驱动没有对应 Rust 类型的列（time、interval、枚举等），
    /// PostgreSQL 下占位符渲染为 `$n::sql_type`
    Typed { text: String, sql_type: String },
    /// 不声明类型的文本，由服务端根据上下文推断
    ///
    /// PostgreSQL 的参数以二进制格式发送，只有二进制格式就是文本本身的类型
    /// （枚举、文本类）才能这样写入
    Untyped(String),
}

impl BindValue {
    /// 从 JSON 标量转换；数组和对象返回 None
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(BindValue::Null),
            Value::Bool(b) => Some(BindValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(BindValue::Int64(i))
                } else if let Some(u) = n.as_u64() {
                    // 超出 i64 范围的无符号整数
                    Some(BindValue::Decimal(BigDecimal::from(u)))
                } else {
                    n.as_f64().map(BindValue::Float64)
                }
            }
            Value::String(s) => Some(BindValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            BindValue::Null => Value::Null,
            BindValue::Bool(b) => Value::Bool(*b),
            BindValue::Int64(i) => Value::from(*i),
            BindValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            BindValue::String(s) => Value::String(s.clone()),
            BindValue::Decimal(d) => Value::String(d.to_string()),
            BindValue::Uuid(u) => Value::String(u.to_string()),
            BindValue::Date(d) => Value::String(d.to_string()),
            BindValue::Timestamp(t) => Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            BindValue::TimestampTz(t) => Value::String(t.to_rfc3339()),
            BindValue::Json(v) => v.clone(),
            BindValue::Typed { text, .. } => Value::String(text.clone()),
            BindValue::Untyped(text) => Value::String(text.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::String(s)
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

impl From<i64> for BindValue {
    fn from(i: i64) -> Self {
        BindValue::Int64(i)
    }
}

impl From<i32> for BindValue {
    fn from(i: i32) -> Self {
        BindValue::Int64(i as i64)
    }
}

impl From<f64> for BindValue {
    fn from(f: f64) -> Self {
        BindValue::Float64(f)
    }
}

impl From<bool> for BindValue {
    fn from(b: bool) -> Self {
        BindValue::Bool(b)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(BindValue::Null)
    }
}

/// 生成好的 SQL 语句及其按占位符顺序排列的绑定值
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, binds: Vec<BindValue>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }
}

/// 单表 SQL 构建器
///
/// 纯函数：只负责把 filters / data 翻译成 (SQL, 绑定值)，不访问数据库。
/// 列名和表名直接拼接进 SQL，调用前必须先经过 [`crate::schema::TableSchema::resolve`] 校验；
/// 值永远通过占位符绑定。
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    driver: DbDriver,
}

impl QueryBuilder {
    /// 默认使用 PostgreSQL 占位符（`$1`, `$2`, ...）
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            driver: DbDriver::Postgres,
        }
    }

    pub fn with_driver(mut self, driver: DbDriver) -> Self {
        self.driver = driver;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn driver(&self) -> DbDriver {
        self.driver
    }

    /// `SELECT * FROM t [WHERE a = $1 AND b = $2 ...]`
    ///
    /// filters 为空时查询全表
    pub fn select(&self, filters: &Record) -> Statement {
        let mut binds = Vec::with_capacity(filters.len());
        let mut sql = format!("SELECT * FROM {}", quote_table_name(&self.table));
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.assignments(filters, " AND ", &mut binds));
        }
        Statement { sql, binds }
    }

    /// `INSERT INTO t (a, b) VALUES ($1, $2) RETURNING *`
    pub fn insert(&self, data: &Record) -> Result<Statement> {
        require_data(data)?;

        let columns: Vec<String> = data.columns().map(quote_identifier).collect();
        let placeholders: Vec<String> = data
            .values()
            .enumerate()
            .map(|(i, value)| self.placeholder(i, value))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_table_name(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement {
            sql,
            binds: data.values().cloned().collect(),
        })
    }

    /// `UPDATE t SET a = $1 WHERE b = $2 RETURNING *`
    ///
    /// 占位符编号在 SET 和 WHERE 之间连续，绑定值顺序为 `[data..., filters...]`
    pub fn update(&self, data: &Record, filters: &Record) -> Result<Statement> {
        require_data(data)?;
        require_filters(filters, "UPDATE")?;

        let mut binds = Vec::with_capacity(data.len() + filters.len());
        let set_clause = self.assignments(data, ", ", &mut binds);
        let where_clause = self.assignments(filters, " AND ", &mut binds);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            quote_table_name(&self.table),
            set_clause,
            where_clause
        );
        Ok(Statement { sql, binds })
    }

    /// `DELETE FROM t WHERE a = $1 RETURNING *`
    ///
    /// 不允许无条件删除
    pub fn delete(&self, filters: &Record) -> Result<Statement> {
        require_filters(filters, "DELETE")?;

        let mut binds = Vec::with_capacity(filters.len());
        let where_clause = self.assignments(filters, " AND ", &mut binds);
        let sql = format!(
            "DELETE FROM {} WHERE {} RETURNING *",
            quote_table_name(&self.table),
            where_clause
        );
        Ok(Statement { sql, binds })
    }

    /// 生成 `col = $n` 片段，编号从 binds 当前长度继续
    fn assignments(&self, record: &Record, separator: &str, binds: &mut Vec<BindValue>) -> String {
        let mut parts = Vec::with_capacity(record.len());
        for (column, value) in record.iter() {
            parts.push(format!(
                "{} = {}",
                quote_identifier(column),
                self.placeholder(binds.len(), value)
            ));
            binds.push(value.clone());
        }
        parts.join(separator)
    }

    fn placeholder(&self, index: usize, value: &BindValue) -> String {
        let placeholder = self.driver.placeholder(index);
        match (self.driver, value) {
            (DbDriver::Postgres, BindValue::Typed { sql_type, .. }) => {
                format!("{}::{}", placeholder, sql_type)
            }
            _ => placeholder,
        }
    }
}

fn require_data(data: &Record) -> Result<()> {
    if data.is_empty() {
        return Err(crate::error::TableGateError::validation(
            "Data cannot be empty",
        ));
    }
    Ok(())
}

fn require_filters(filters: &Record, operation: &str) -> Result<()> {
    if filters.is_empty() {
        return Err(crate::error::TableGateError::validation(format!(
            "Filters required for {} (safety check)",
            operation
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableGateError;

    fn record(pairs: &[(&str, BindValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ========== SELECT ==========
    #[test]
    fn test_select_without_filters() {
        let stmt = QueryBuilder::new("t").select(&Record::new());
        assert_eq!(stmt.sql, "SELECT * FROM t");
        assert!(stmt.binds.is_empty());
    }

    #[test]
    fn test_select_placeholders_follow_input_order() {
        let filters = record(&[
            ("doctor_name", "Dr. Strange".into()),
            ("patient_name", "John".into()),
            ("age", 42.into()),
        ]);
        let stmt = QueryBuilder::new("hospital_records").select(&filters);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM hospital_records WHERE doctor_name = $1 AND patient_name = $2 AND age = $3"
        );
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::from("Dr. Strange"),
                BindValue::from("John"),
                BindValue::Int64(42)
            ]
        );
    }

    #[test]
    fn test_select_each_placeholder_appears_once() {
        let filters: Record = (0..12)
            .map(|i| (format!("c{}", i), BindValue::Int64(i)))
            .collect();
        let stmt = QueryBuilder::new("t").select(&filters);
        for i in 1..=12 {
            let needle = format!("${}", i);
            let count = stmt
                .sql
                .match_indices(&needle)
                .filter(|(pos, _)| {
                    // 排除 $1 命中 $10 / $11 / $12 的前缀
                    !stmt.sql[pos + needle.len()..]
                        .chars()
                        .next()
                        .map_or(false, |c| c.is_ascii_digit())
                })
                .count();
            assert_eq!(count, 1, "placeholder {} in {}", needle, stmt.sql);
        }
        assert!(!stmt.sql.contains("$13"));
        assert_eq!(stmt.binds, filters.values().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_select_is_deterministic() {
        let filters = record(&[("a", 1.into()), ("b", "x".into())]);
        let builder = QueryBuilder::new("t");
        assert_eq!(builder.select(&filters), builder.select(&filters));
    }

    #[test]
    fn test_values_are_never_interpolated() {
        let filters = record(&[("name", "x' OR '1'='1".into())]);
        let stmt = QueryBuilder::new("t").select(&filters);
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE name = $1");
        assert!(!stmt.sql.contains("OR"));
    }

    // ========== INSERT ==========
    #[test]
    fn test_insert_single_column() {
        let stmt = QueryBuilder::new("t")
            .insert(&record(&[("a", 1.into())]))
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a) VALUES ($1) RETURNING *");
        assert_eq!(stmt.binds, vec![BindValue::Int64(1)]);
    }

    #[test]
    fn test_insert_multiple_columns_with_null() {
        let stmt = QueryBuilder::new("t")
            .insert(&record(&[
                ("patient_name", "John".into()),
                ("doctor_name", BindValue::Null),
            ]))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO t (patient_name, doctor_name) VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(stmt.binds, vec![BindValue::from("John"), BindValue::Null]);
    }

    #[test]
    fn test_insert_empty_is_rejected() {
        let err = QueryBuilder::new("t").insert(&Record::new()).unwrap_err();
        assert!(matches!(err, TableGateError::Validation(ref m) if m == "Data cannot be empty"));
    }

    // ========== UPDATE ==========
    #[test]
    fn test_update_numbering_continues_into_where() {
        let stmt = QueryBuilder::new("t")
            .update(&record(&[("a", 1.into())]), &record(&[("b", 2.into())]))
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE t SET a = $1 WHERE b = $2 RETURNING *");
        assert_eq!(stmt.binds, vec![BindValue::Int64(1), BindValue::Int64(2)]);
    }

    #[test]
    fn test_update_bind_order_matches_placeholders() {
        let data = record(&[("patient_name", "Jane".into()), ("room", 12.into())]);
        let filters = record(&[("record_index", 5.into()), ("ward", "B".into())]);
        let stmt = QueryBuilder::new("t").update(&data, &filters).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE t SET patient_name = $1, room = $2 WHERE record_index = $3 AND ward = $4 RETURNING *"
        );
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::from("Jane"),
                BindValue::Int64(12),
                BindValue::Int64(5),
                BindValue::from("B")
            ]
        );
    }

    #[test]
    fn test_update_requires_filters() {
        let err = QueryBuilder::new("t")
            .update(&record(&[("a", 1.into())]), &Record::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Filters required for UPDATE (safety check)");
    }

    #[test]
    fn test_update_requires_data() {
        let err = QueryBuilder::new("t")
            .update(&Record::new(), &record(&[("b", 2.into())]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Data cannot be empty");
    }

    // ========== DELETE ==========
    #[test]
    fn test_delete_by_id() {
        let stmt = QueryBuilder::new("t")
            .delete(&record(&[("id", 5.into())]))
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM t WHERE id = $1 RETURNING *");
        assert_eq!(stmt.binds, vec![BindValue::Int64(5)]);
    }

    #[test]
    fn test_delete_requires_filters() {
        let err = QueryBuilder::new("t").delete(&Record::new()).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Filters required for DELETE (safety check)");
    }

    #[test]
    fn test_delete_is_deterministic() {
        let filters = record(&[("id", 5.into()), ("ward", "B".into())]);
        let builder = QueryBuilder::new("t");
        assert_eq!(
            builder.delete(&filters).unwrap(),
            builder.delete(&filters).unwrap()
        );
    }

    // ========== 标识符与类型转换 ==========
    #[test]
    fn test_mixed_case_identifiers_are_quoted() {
        let stmt = QueryBuilder::new("public.Patients")
            .update(
                &record(&[("PatientName", "John".into())]),
                &record(&[("id", 1.into())]),
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE public.\"Patients\" SET \"PatientName\" = $1 WHERE id = $2 RETURNING *"
        );

        let stmt = QueryBuilder::new("t")
            .insert(&record(&[("PatientName", "John".into())]))
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (\"PatientName\") VALUES ($1) RETURNING *");
    }

    #[test]
    fn test_typed_values_are_cast_on_postgres() {
        let appt = BindValue::Typed {
            text: "10:30".to_string(),
            sql_type: "pg_catalog.\"time\"".to_string(),
        };
        let data = record(&[("name", "John".into()), ("appt", appt.clone())]);

        let stmt = QueryBuilder::new("t").insert(&data).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO t (name, appt) VALUES ($1, $2::pg_catalog.\"time\") RETURNING *"
        );
        assert_eq!(stmt.binds[1], appt);

        let stmt = QueryBuilder::new("t")
            .with_driver(DbDriver::Sqlite)
            .select(&record(&[("appt", appt)]));
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE appt = ?");
    }

    // ========== SQLite 占位符 ==========
    #[test]
    fn test_sqlite_placeholders() {
        let builder = QueryBuilder::new("t").with_driver(DbDriver::Sqlite);
        let stmt = builder
            .update(&record(&[("a", 1.into())]), &record(&[("b", 2.into())]))
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE t SET a = ? WHERE b = ? RETURNING *");
        assert_eq!(stmt.binds, vec![BindValue::Int64(1), BindValue::Int64(2)]);
    }

    // ========== BindValue ==========
    #[test]
    fn test_bind_value_from_json() {
        assert_eq!(BindValue::from_json(&Value::Null), Some(BindValue::Null));
        assert_eq!(
            BindValue::from_json(&serde_json::json!(3)),
            Some(BindValue::Int64(3))
        );
        assert_eq!(
            BindValue::from_json(&serde_json::json!(1.5)),
            Some(BindValue::Float64(1.5))
        );
        assert_eq!(
            BindValue::from_json(&serde_json::json!("x")),
            Some(BindValue::from("x"))
        );
        assert_eq!(BindValue::from_json(&serde_json::json!([1])), None);
        assert_eq!(BindValue::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn test_bind_value_from_option() {
        assert_eq!(BindValue::from(None::<i64>), BindValue::Null);
        assert_eq!(BindValue::from(Some("x")), BindValue::from("x"));
    }
}
