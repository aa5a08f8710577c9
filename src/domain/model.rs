use crate::utils::error::{ConnectorError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary precision decimal kept in its textual form.
    Numeric(String),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

/// Target type for explicit column casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int,
    Float,
    Text,
    Bool,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Numeric(_) => "numeric",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Json(_) => "json",
        }
    }

    /// Infers a typed value from a raw text field: empty → null, then
    /// integer, float, boolean, falling back to text.
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        match trimmed {
            "true" | "True" | "TRUE" => Value::Bool(true),
            "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Text(raw.to_string()),
        }
    }

    fn cast_error(&self, target: &str) -> ConnectorError {
        ConnectorError::Processing {
            message: format!("cannot convert {} value '{}' to {}", self.type_name(), self, target),
        }
    }

    pub fn cast(&self, dtype: DType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }

        match dtype {
            DType::Int => match self {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
                Value::Text(s) | Value::Numeric(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| self.cast_error("int")),
                _ => Err(self.cast_error("int")),
            },
            DType::Float => match self {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) | Value::Numeric(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.cast_error("float")),
                _ => Err(self.cast_error("float")),
            },
            DType::Text => Ok(Value::Text(self.to_string())),
            DType::Bool => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "1" => Ok(Value::Bool(true)),
                    "false" | "f" | "no" | "0" => Ok(Value::Bool(false)),
                    _ => Err(self.cast_error("bool")),
                },
                _ => Err(self.cast_error("bool")),
            },
        }
    }

    /// Converts text (RFC 3339, ISO date-time or plain date) and epoch
    /// seconds into timestamp values.
    pub fn parse_date(&self) -> Result<Value> {
        match self {
            Value::Null | Value::Timestamp(_) | Value::TimestampTz(_) => Ok(self.clone()),
            Value::Date(d) => Ok(Value::Timestamp(d.and_time(chrono::NaiveTime::default()))),
            Value::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .map(Value::TimestampTz)
                .ok_or_else(|| self.cast_error("timestamp")),
            Value::Float(secs) => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                DateTime::from_timestamp(whole as i64, nanos)
                    .map(Value::TimestampTz)
                    .ok_or_else(|| self.cast_error("timestamp"))
            }
            Value::Text(s) => {
                let s = s.trim();
                if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                    return Ok(Value::TimestampTz(ts.with_timezone(&Utc)));
                }
                for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                    if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
                        return Ok(Value::Timestamp(ts));
                    }
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|d| Value::Timestamp(d.and_time(chrono::NaiveTime::default())))
                    .map_err(|_| self.cast_error("timestamp"))
            }
            _ => Err(self.cast_error("timestamp")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Numeric(s) | Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

/// Named column lifted out of the rows to label them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableIndex {
    pub name: String,
    pub values: Vec<Value>,
}

/// Row-major table. Without an explicit index, rows are labelled `0..len`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub index: Option<TableIndex>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            index: None,
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ConnectorError::Processing {
                message: format!(
                    "row has {} values but the table has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_position(name)
            .ok_or_else(|| ConnectorError::Processing {
                message: format!("column '{}' not found", name),
            })
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let position = self.column_position(name)?;
        Some(self.rows.iter().map(|row| &row[position]).collect())
    }

    /// Moves `name` out of the columns and into the index.
    pub fn set_index(&mut self, name: &str) -> Result<()> {
        let position = self.require_column(name)?;
        let column = self.columns.remove(position);
        let values = self
            .rows
            .iter_mut()
            .map(|row| row.remove(position))
            .collect();
        self.index = Some(TableIndex {
            name: column,
            values,
        });
        Ok(())
    }

    /// Keeps only the named columns, in the given order.
    pub fn select_columns(&self, names: &[String]) -> Result<Table> {
        let positions = names
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Table {
            columns: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
                .collect(),
            index: self.index.clone(),
        })
    }

    fn map_column(&mut self, name: &str, f: impl Fn(&Value) -> Result<Value>) -> Result<()> {
        let position = self.require_column(name)?;
        for row in &mut self.rows {
            row[position] = f(&row[position])?;
        }
        Ok(())
    }

    pub fn parse_dates(&mut self, columns: &[String]) -> Result<()> {
        for name in columns {
            self.map_column(name, Value::parse_date)?;
        }
        Ok(())
    }

    pub fn apply_dtypes(&mut self, dtypes: &HashMap<String, DType>) -> Result<()> {
        for (name, dtype) in dtypes {
            self.map_column(name, |v| v.cast(*dtype))?;
        }
        Ok(())
    }
}

/// Outcome of a raw statement: returned rows (possibly none) and the
/// server-reported affected row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub table: Table,
    pub rows_affected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec!["id".into(), "name".into(), "created".into()]);
        table
            .push_row(vec![
                Value::Int(1),
                Value::Text("alpha".into()),
                Value::Text("2024-03-01".into()),
            ])
            .unwrap();
        table
            .push_row(vec![
                Value::Int(2),
                Value::Null,
                Value::Text("2024-03-02T10:15:00Z".into()),
            ])
            .unwrap();
        table
    }

    #[test]
    fn test_infer_values() {
        assert_eq!(Value::infer("42"), Value::Int(42));
        assert_eq!(Value::infer("4.5"), Value::Float(4.5));
        assert_eq!(Value::infer("True"), Value::Bool(true));
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("Paris"), Value::Text("Paris".into()));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(vec!["a".into()]);
        assert!(table.push_row(vec![Value::Int(1), Value::Int(2)]).is_err());
    }

    #[test]
    fn test_set_index_lifts_column() {
        let mut table = sample();
        table.set_index("id").unwrap();

        assert_eq!(table.columns, vec!["name", "created"]);
        let index = table.index.as_ref().unwrap();
        assert_eq!(index.name, "id");
        assert_eq!(index.values, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(table.rows[0].len(), 2);
    }

    #[test]
    fn test_parse_dates() {
        let mut table = sample();
        table.parse_dates(&["created".to_string()]).unwrap();

        assert!(matches!(table.rows[0][2], Value::Timestamp(_)));
        assert!(matches!(table.rows[1][2], Value::TimestampTz(_)));
    }

    #[test]
    fn test_apply_dtypes() {
        let mut table = sample();
        let dtypes = HashMap::from([("id".to_string(), DType::Float)]);
        table.apply_dtypes(&dtypes).unwrap();
        assert_eq!(table.rows[1][0], Value::Float(2.0));

        let bad = HashMap::from([("name".to_string(), DType::Int)]);
        assert!(table.apply_dtypes(&bad).is_err());
    }

    #[test]
    fn test_select_unknown_column_fails() {
        assert!(sample().select_columns(&["missing".to_string()]).is_err());
        let narrowed = sample().select_columns(&["name".to_string()]).unwrap();
        assert_eq!(narrowed.columns, vec!["name"]);
    }
}
