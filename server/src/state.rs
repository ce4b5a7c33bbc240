//! 网关状态

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tablegate::{Crud, DbPool, TableAccessor};

use crate::config::{Config, ErrorMode};
use crate::error::ApiError;

/// 所有 handler 共享的状态，启动后只读
pub struct AppState {
    default_table: Arc<dyn Crud>,

    /// 允许通过路径访问的表，包含默认表
    tables: HashMap<String, Arc<dyn Crud>>,

    pub error_mode: ErrorMode,
}

impl AppState {
    pub fn new(default_table: Arc<dyn Crud>, error_mode: ErrorMode) -> Self {
        let mut tables = HashMap::new();
        tables.insert(default_table.table_name().to_string(), default_table.clone());
        Self {
            default_table,
            tables,
            error_mode,
        }
    }

    /// 追加一张可访问的表
    pub fn with_table(mut self, table: Arc<dyn Crud>) -> Self {
        self.tables.insert(table.table_name().to_string(), table);
        self
    }

    /// 打开配置中的所有表，任意一张不存在都视为启动失败
    pub async fn load(pool: DbPool, config: &Config) -> anyhow::Result<Self> {
        let default = TableAccessor::open(pool.clone(), &config.table)
            .await
            .with_context(|| format!("failed to open table '{}'", config.table))?;

        let mut schema = default.schema().clone();
        for (logical, physical) in &config.column_aliases {
            schema = schema.with_alias(logical, physical)?;
        }
        let default = TableAccessor::with_schema(pool.clone(), schema);

        let mut state = Self::new(Arc::new(default), config.error_mode);
        for table in &config.extra_tables {
            let accessor = TableAccessor::open(pool.clone(), table)
                .await
                .with_context(|| format!("failed to open table '{}'", table))?;
            state = state.with_table(Arc::new(accessor));
        }

        tracing::info!(
            default = %config.table,
            tables = state.tables.len(),
            "gateway tables ready"
        );
        Ok(state)
    }

    pub fn default_table(&self) -> Arc<dyn Crud> {
        self.default_table.clone()
    }

    pub fn table(&self, name: &str) -> Result<Arc<dyn Crud>, ApiError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::UnknownTable(name.to_string()))
    }
}
