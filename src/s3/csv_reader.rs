//! CSV parsing for objects fetched from storage.

use crate::domain::model::{Table, Value};
use crate::utils::error::{ConnectorError, Result};

/// Options forwarded to the object fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetObjectOptions {
    pub range: Option<String>,
    pub version_id: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub part_number: Option<i32>,
}

/// Options controlling how fetched bytes are parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_headers: bool,
    pub skip_rows: usize,
    pub nrows: Option<usize>,
    pub usecols: Option<Vec<String>>,
    pub infer_types: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
            skip_rows: 0,
            nrows: None,
            usecols: None,
            infer_types: true,
        }
    }
}

/// Options for `read_csv`: keys prefixed with `s3_` go to the fetch, the
/// rest to the parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadCsvOptions {
    pub object: GetObjectOptions,
    pub csv: CsvOptions,
}

fn invalid(field: &str, value: &str, reason: &str) -> ConnectorError {
    ConnectorError::InvalidConfigValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(field, value, "expected a non-negative integer"))
}

impl ReadCsvOptions {
    /// Builds options from loose `key=value` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "s3_range" => options.object.range = Some(value.to_string()),
                "s3_version_id" => options.object.version_id = Some(value.to_string()),
                "s3_if_match" => options.object.if_match = Some(value.to_string()),
                "s3_if_none_match" => options.object.if_none_match = Some(value.to_string()),
                "s3_part_number" => options.object.part_number = Some(parse_number(key, value)?),
                "sep" | "delimiter" => {
                    options.csv.delimiter = match value {
                        "\\t" | "\t" => b'\t',
                        v if v.len() == 1 && v.is_ascii() => v.as_bytes()[0],
                        _ => return Err(invalid(key, value, "expected a single ASCII character")),
                    }
                }
                "header" => {
                    options.csv.has_headers = match value.to_ascii_lowercase().as_str() {
                        "infer" | "0" | "true" => true,
                        "none" | "false" => false,
                        _ => return Err(invalid(key, value, "expected 'infer', '0' or 'none'")),
                    }
                }
                "skiprows" => options.csv.skip_rows = parse_number(key, value)?,
                "nrows" => options.csv.nrows = Some(parse_number(key, value)?),
                "usecols" => {
                    options.csv.usecols = Some(
                        value
                            .split(',')
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .collect(),
                    )
                }
                "infer_types" => {
                    options.csv.infer_types = value
                        .parse()
                        .map_err(|_| invalid(key, value, "expected true or false"))?
                }
                _ if key.starts_with("s3_") => {
                    return Err(invalid(key, value, "unknown object fetch option"))
                }
                _ => return Err(invalid(key, value, "unknown CSV option")),
            }
        }

        Ok(options)
    }
}

fn skip_lines(data: &[u8], lines: usize) -> &[u8] {
    let mut rest = data;
    for _ in 0..lines {
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return &[],
        }
    }
    rest
}

/// Parses CSV bytes into a [`Table`]. Without a header row the columns are
/// named by position (`0`, `1`, ...).
pub fn parse_csv(data: &[u8], options: &CsvOptions) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_headers)
        .from_reader(skip_lines(data, options.skip_rows));

    let headers: Option<Vec<String>> = if options.has_headers {
        Some(reader.headers()?.iter().map(str::to_string).collect())
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        if options.nrows.is_some_and(|n| rows.len() >= n) {
            break;
        }
        let record = record?;
        let row: Vec<Value> = record
            .iter()
            .map(|field| {
                if options.infer_types {
                    Value::infer(field)
                } else if field.is_empty() {
                    Value::Null
                } else {
                    Value::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    let columns = headers.unwrap_or_else(|| {
        let width = rows.first().map_or(0, Vec::len);
        (0..width).map(|i| i.to_string()).collect()
    });

    let mut table = Table::new(columns);
    for row in rows {
        table.push_row(row)?;
    }

    match &options.usecols {
        Some(names) => table.select_columns(names),
        None => Ok(table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header_and_inference() {
        let data = b"id,name,score\n1,alice,9.5\n2,bob,\n";
        let table = parse_csv(data, &CsvOptions::default()).unwrap();

        assert_eq!(table.columns, vec!["id", "name", "score"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], Value::Int(1));
        assert_eq!(table.rows[0][1], Value::Text("alice".into()));
        assert_eq!(table.rows[0][2], Value::Float(9.5));
        assert_eq!(table.rows[1][2], Value::Null);
    }

    #[test]
    fn test_parse_without_header() {
        let options = CsvOptions {
            has_headers: false,
            delimiter: b';',
            ..CsvOptions::default()
        };
        let table = parse_csv(b"a;1\nb;2\n", &options).unwrap();
        assert_eq!(table.columns, vec!["0", "1"]);
        assert_eq!(table.rows[1][1], Value::Int(2));
    }

    #[test]
    fn test_skiprows_nrows_and_usecols() {
        let options = CsvOptions {
            skip_rows: 2,
            nrows: Some(1),
            usecols: Some(vec!["b".to_string()]),
            ..CsvOptions::default()
        };
        let data = b"# export\n# generated\na,b\n1,x\n2,y\n";
        let table = parse_csv(data, &options).unwrap();
        assert_eq!(table.columns, vec!["b"]);
        assert_eq!(table.rows, vec![vec![Value::Text("x".into())]]);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        assert!(parse_csv(b"a,b\n1,2,3\n", &CsvOptions::default()).is_err());
    }

    #[test]
    fn test_from_pairs_routes_prefixed_keys() {
        let options = ReadCsvOptions::from_pairs([
            ("s3_range", "bytes=0-99"),
            ("s3_version_id", "v3"),
            ("sep", "|"),
            ("header", "None"),
            ("nrows", "10"),
        ])
        .unwrap();

        assert_eq!(options.object.range.as_deref(), Some("bytes=0-99"));
        assert_eq!(options.object.version_id.as_deref(), Some("v3"));
        assert_eq!(options.csv.delimiter, b'|');
        assert!(!options.csv.has_headers);
        assert_eq!(options.csv.nrows, Some(10));
    }

    #[test]
    fn test_from_pairs_rejects_unknown_keys() {
        let err = ReadCsvOptions::from_pairs([("s3_acl", "private")]).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfigValue { ref field, .. } if field == "s3_acl"));

        assert!(ReadCsvOptions::from_pairs([("engine", "pyarrow")]).is_err());
        assert!(ReadCsvOptions::from_pairs([("sep", "::")]).is_err());
    }
}
