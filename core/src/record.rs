//! 有序的 列名 -> 值 映射
//!
//! 插入顺序决定占位符编号，所以这里不能用 HashMap

use crate::error::{Result, TableGateError};
use crate::query_builder::BindValue;
use serde_json::{Map, Value};

/// 过滤条件 / 写入数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, BindValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或替换一列，已存在的列保留原来的位置，返回旧值
    pub fn insert(
        &mut self,
        column: impl Into<String>,
        value: impl Into<BindValue>,
    ) -> Option<BindValue> {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((column, value));
                None
            }
        }
    }

    /// 链式插入
    pub fn with(mut self, column: impl Into<String>, value: impl Into<BindValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&BindValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &BindValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// 从 JSON 对象转换，只接受标量值
    pub fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let mut record = Record::new();
        for (column, value) in map {
            let bind = BindValue::from_json(value).ok_or_else(|| {
                TableGateError::validation(format!(
                    "Nested values are not supported (column '{}')",
                    column
                ))
            })?;
            record.insert(column.clone(), bind);
        }
        Ok(record)
    }

    /// 从任意 JSON 值转换：`null` 视为空对象，其他非对象值报错
    pub fn from_json_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Record::new()),
            Value::Object(map) => Self::from_json(map),
            other => Err(TableGateError::validation(format!(
                "Expected a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<K: Into<String>, V: Into<BindValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, BindValue);
    type IntoIter = std::vec::IntoIter<(String, BindValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
