//! Wire conversions between PostgreSQL binary values and [`Value`] cells.

use crate::domain::model::{DType, Value};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Column types that decode into a [`Value`].
pub fn is_supported(ty: &Type) -> bool {
    match *ty {
        Type::BOOL
        | Type::INT2
        | Type::INT4
        | Type::INT8
        | Type::OID
        | Type::FLOAT4
        | Type::FLOAT8
        | Type::NUMERIC
        | Type::TEXT
        | Type::VARCHAR
        | Type::BPCHAR
        | Type::NAME
        | Type::UNKNOWN
        | Type::DATE
        | Type::TIMESTAMP
        | Type::TIMESTAMPTZ
        | Type::JSON
        | Type::JSONB
        | Type::UUID => true,
        ref other => matches!(other.kind(), Kind::Enum(_)),
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Numeric(decode_numeric(raw)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::DATE => Value::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::UUID => Value::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            ref other if matches!(other.kind(), Kind::Enum(_)) => {
                Value::Text(std::str::from_utf8(raw)?.to_string())
            }
            ref other => return Err(format!("unsupported column type {}", other).into()),
        };
        Ok(value)
    }

    fn from_sql_null(_: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn int_of(value: &Value) -> Result<i64, BoxError> {
    match value.cast(DType::Int)? {
        Value::Int(i) => Ok(i),
        other => Err(format!("expected an integer, got {}", other.type_name()).into()),
    }
}

fn float_of(value: &Value) -> Result<f64, BoxError> {
    match value.cast(DType::Float)? {
        Value::Float(f) => Ok(f),
        other => Err(format!("expected a float, got {}", other.type_name()).into()),
    }
}

fn bool_of(value: &Value) -> Result<bool, BoxError> {
    match value.cast(DType::Bool)? {
        Value::Bool(b) => Ok(b),
        other => Err(format!("expected a boolean, got {}", other.type_name()).into()),
    }
}

fn json_of(value: &Value) -> Result<serde_json::Value, BoxError> {
    Ok(match value {
        Value::Json(j) => j.clone(),
        Value::Text(s) => serde_json::from_str(s)?,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        other => serde_json::Value::String(other.to_string()),
    })
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => bool_of(self)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(int_of(self)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(int_of(self)?)?.to_sql(ty, out),
            Type::INT8 => int_of(self)?.to_sql(ty, out),
            Type::OID => u32::try_from(int_of(self)?)?.to_sql(ty, out),
            Type::FLOAT4 => (float_of(self)? as f32).to_sql(ty, out),
            Type::FLOAT8 => float_of(self)?.to_sql(ty, out),
            Type::NUMERIC => {
                encode_numeric(&self.to_string(), out)?;
                Ok(IsNull::No)
            }
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                self.to_string().to_sql(ty, out)
            }
            Type::DATE => match self.parse_date()? {
                Value::Timestamp(ts) => ts.date().to_sql(ty, out),
                Value::TimestampTz(ts) => ts.date_naive().to_sql(ty, out),
                other => Err(format!("cannot encode {} as date", other.type_name()).into()),
            },
            Type::TIMESTAMP => match self.parse_date()? {
                Value::Timestamp(ts) => ts.to_sql(ty, out),
                Value::TimestampTz(ts) => ts.naive_utc().to_sql(ty, out),
                other => Err(format!("cannot encode {} as timestamp", other.type_name()).into()),
            },
            Type::TIMESTAMPTZ => match self.parse_date()? {
                Value::Timestamp(ts) => ts.and_utc().to_sql(ty, out),
                Value::TimestampTz(ts) => ts.to_sql(ty, out),
                other => Err(format!("cannot encode {} as timestamptz", other.type_name()).into()),
            },
            Type::JSON | Type::JSONB => json_of(self)?.to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(&self.to_string())?.to_sql(ty, out),
            ref other if matches!(other.kind(), Kind::Enum(_)) => {
                out.put_slice(self.to_string().as_bytes());
                Ok(IsNull::No)
            }
            ref other => {
                Err(format!("cannot encode {} value as {}", self.type_name(), other).into())
            }
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decodes the binary NUMERIC form (base-10000 digit groups) to its
/// canonical text.
pub fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() < 8 {
        return Err("invalid numeric payload".into());
    }
    let read = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);

    let ndigits = read(0) as usize;
    let weight = i32::from(read(2) as i16);
    let sign = read(4);
    let dscale = read(6) as usize;
    if raw.len() < 8 + ndigits * 2 {
        return Err("truncated numeric payload".into());
    }

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {:#06x}", other).into()),
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| read(8 + i * 2)).collect();
    let group = |i: i32| -> u16 {
        if i < 0 {
            0
        } else {
            digits.get(i as usize).copied().unwrap_or(0)
        }
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Ok(text)
}

/// Encodes a decimal literal (`-12.50`, `NaN`, `Infinity`) as binary NUMERIC.
pub fn encode_numeric(literal: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let literal = literal.trim();
    let special = match literal {
        "NaN" => Some(NUMERIC_NAN),
        "Infinity" | "inf" => Some(NUMERIC_PINF),
        "-Infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal.strip_prefix('+').unwrap_or(literal)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(format!("invalid numeric literal '{}'", literal).into());
    }

    let int_part = int_part.trim_start_matches('0');
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let padded = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_part,
        frac_part,
        "0".repeat(frac_pad)
    );

    let mut digits: Vec<u16> = padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();
    let mut weight = ((int_part.len() + int_pad) / 4) as i32 - 1;

    while digits.first() == Some(&0) {
        digits.remove(0);
        weight -= 1;
    }
    while digits.last() == Some(&0) {
        digits.pop();
    }
    if digits.is_empty() {
        weight = 0;
    }

    out.put_i16(i16::try_from(digits.len())?);
    out.put_i16(i16::try_from(weight)?);
    out.put_u16(if negative && !digits.is_empty() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    });
    out.put_u16(u16::try_from(frac_part.len())?);
    for digit in digits {
        out.put_u16(digit);
    }
    Ok(())
}
