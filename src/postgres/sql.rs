//! SQL text builders for the connector.

use crate::domain::model::Value;

/// PostgreSQL caps bind parameters per statement at 65535.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const LIST_TABLES_SQL: &str = "SELECT c.relname::text \
     FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')";

pub const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p', 'v', 'm', 'f'))";

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn qualified_name(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }
}

/// A bare word is read as a table name; anything containing whitespace is
/// treated as a SQL statement.
pub fn is_table_reference(source: &str) -> bool {
    let trimmed = source.trim();
    !trimmed.is_empty() && !trimmed.chars().any(char::is_whitespace)
}

pub fn select_table_sql(schema: &str, table: &str, columns: Option<&[String]>) -> String {
    let projection = match columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    };
    format!("SELECT {} FROM {}", projection, qualified_name(schema, table))
}

/// Column type from the first non-null value; all-null columns become TEXT.
pub fn infer_sql_type<'a>(mut values: impl Iterator<Item = &'a Value>) -> &'static str {
    match values.find(|v| !v.is_null()) {
        Some(Value::Bool(_)) => "BOOLEAN",
        Some(Value::Int(_)) => "BIGINT",
        Some(Value::Float(_)) => "DOUBLE PRECISION",
        Some(Value::Numeric(_)) => "NUMERIC",
        Some(Value::Date(_)) => "DATE",
        Some(Value::Timestamp(_)) => "TIMESTAMP",
        Some(Value::TimestampTz(_)) => "TIMESTAMPTZ",
        Some(Value::Json(_)) => "JSONB",
        _ => "TEXT",
    }
}

pub fn create_table_sql(qualified: &str, columns: &[(String, String)]) -> String {
    let definitions = columns
        .iter()
        .map(|(name, sql_type)| format!("{} {}", quote_ident(name), sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", qualified, definitions)
}

pub fn drop_table_sql(qualified: &str) -> String {
    format!("DROP TABLE {}", qualified)
}

/// `INSERT ... VALUES ($1, $2), ($3, $4)` for `rows` rows.
pub fn insert_sql(qualified: &str, columns: &[String], rows: usize) -> String {
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let width = columns.len();
    let tuples = (0..rows)
        .map(|r| {
            let placeholders = (1..=width)
                .map(|c| format!("${}", r * width + c))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", placeholders)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) VALUES {}", qualified, names, tuples)
}

/// Largest row batch whose parameters fit in one statement.
pub fn max_rows_per_statement(width: usize) -> usize {
    if width == 0 {
        1
    } else {
        (MAX_BIND_PARAMS / width).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualified_name("sales", "Orders"), "\"sales\".\"Orders\"");
    }

    #[test]
    fn test_table_reference_detection() {
        assert!(is_table_reference("orders"));
        assert!(is_table_reference("  orders "));
        assert!(!is_table_reference("SELECT * FROM orders"));
        assert!(!is_table_reference(""));
    }

    #[test]
    fn test_select_table_sql() {
        assert_eq!(
            select_table_sql("sales", "orders", None),
            "SELECT * FROM \"sales\".\"orders\""
        );
        let cols = vec!["id".to_string(), "total".to_string()];
        assert_eq!(
            select_table_sql("sales", "orders", Some(&cols)),
            "SELECT \"id\", \"total\" FROM \"sales\".\"orders\""
        );
    }

    #[test]
    fn test_infer_sql_type_skips_nulls() {
        let values = [Value::Null, Value::Float(1.5)];
        assert_eq!(infer_sql_type(values.iter()), "DOUBLE PRECISION");
        assert_eq!(infer_sql_type([Value::Null].iter()), "TEXT");
    }

    #[test]
    fn test_insert_sql_numbers_placeholders() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            insert_sql("\"t\"", &cols, 2),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_max_rows_per_statement() {
        assert_eq!(max_rows_per_statement(5), 13_107);
        assert_eq!(max_rows_per_statement(100_000), 1);
    }
}
