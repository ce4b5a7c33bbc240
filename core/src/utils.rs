//! 工具函数模块

/// 验证表名是否安全
///
/// 允许 `table` 或 `schema.table` 两种形式，每一段只能包含字母、数字和下划线，且不能以数字开头
pub fn is_safe_table_name(name: &str) -> bool {
    let mut parts = name.split('.');
    let (Some(first), second, None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    is_safe_field_name(first) && second.map_or(true, is_safe_field_name)
}

/// 验证字段名是否安全
pub fn is_safe_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// 按需给标识符加双引号
///
/// 全小写的普通标识符原样输出，其余（大小写混合、非 ASCII）加引号，
/// 否则 PostgreSQL 会把它折叠成小写
pub fn quote_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// `schema.table` 逐段加引号
pub fn quote_table_name(name: &str) -> String {
    match split_table_name(name) {
        (Some(schema), table) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
        (None, table) => quote_identifier(table),
    }
}

/// 拆分 `schema.table`，没有 schema 时返回 None
pub fn split_table_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_table_name() {
        assert!(is_safe_table_name("hospital_records"));
        assert!(is_safe_table_name("public.hospital_records"));
        assert!(!is_safe_table_name("records; DROP TABLE x"));
        assert!(!is_safe_table_name("a.b.c"));
        assert!(!is_safe_table_name(""));
        assert!(!is_safe_table_name("1records"));
    }

    #[test]
    fn test_safe_field_name() {
        assert!(is_safe_field_name("patient_name"));
        assert!(is_safe_field_name("_x1"));
        assert!(!is_safe_field_name("name = name OR 1"));
        assert!(!is_safe_field_name(""));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("patient_name"), "patient_name");
        assert_eq!(quote_identifier("_x1"), "_x1");
        assert_eq!(quote_identifier("PatientName"), "\"PatientName\"");
        assert_eq!(quote_identifier("größe"), "\"größe\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_table_name() {
        assert_eq!(quote_table_name("hospital_records"), "hospital_records");
        assert_eq!(quote_table_name("public.Patients"), "public.\"Patients\"");
    }

    #[test]
    fn test_split_table_name() {
        assert_eq!(split_table_name("public.t"), (Some("public"), "t"));
        assert_eq!(split_table_name("t"), (None, "t"));
    }
}
