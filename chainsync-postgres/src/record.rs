//! Decoding of result rows into generic JSON records.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use bigdecimal::num_bigint::{BigInt, BigUint, Sign};
use bigdecimal::{BigDecimal, ParseBigDecimalError};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgHasArrayType, PgRow, PgTypeInfo, PgValueFormat, PgValueRef, Postgres};
use sqlx::{Column, Decode, Row, TypeInfo, ValueRef};
use thiserror::Error;
use uuid::Uuid;

/// One result row: column name to value, in row description order.
pub type Record = Map<String, Value>;

/// Largest integer magnitude a JSON consumer can hold in an IEEE double without loss.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Errors raised while decoding a row.
#[derive(Debug, Error)]
pub enum RecordDecodeError {
    #[error("column `{column}` has unsupported type `{type_name}`")]
    UnsupportedType { column: String, type_name: String },

    #[error("failed to decode column `{column}`: {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Converts a row into a [`Record`].
///
/// `numeric` values are always rendered as strings, with the scale the server prints, and `int8`
/// values are rendered as strings when their magnitude exceeds [`MAX_SAFE_INTEGER`], so callers
/// never observe precision loss. Types without a dedicated decoder fall back to their text form.
pub fn decode_row(row: &PgRow) -> Result<Record, RecordDecodeError> {
    let mut record = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let index = column.ordinal();
        let name = column.name();

        let is_null = row
            .try_get_raw(index)
            .map(|value| value.is_null())
            .map_err(|source| RecordDecodeError::Decode {
                column: name.to_string(),
                source,
            })?;

        let value = if is_null {
            Value::Null
        } else {
            decode_value(row, index, column.type_info().name()).map_err(|err| match err {
                DecodeFailure::Unsupported => RecordDecodeError::UnsupportedType {
                    column: name.to_string(),
                    type_name: column.type_info().name().to_string(),
                },
                DecodeFailure::Sqlx(source) => RecordDecodeError::Decode {
                    column: name.to_string(),
                    source,
                },
            })?
        };

        record.insert(name.to_string(), value);
    }

    Ok(record)
}

/// Decodes every row of a result set.
pub fn decode_rows(rows: &[PgRow]) -> Result<Vec<Record>, RecordDecodeError> {
    rows.iter().map(decode_row).collect()
}

enum DecodeFailure {
    Unsupported,
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DecodeFailure {
    fn from(value: sqlx::Error) -> Self {
        DecodeFailure::Sqlx(value)
    }
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value, DecodeFailure> {
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => int8_value(row.try_get::<i64, _>(index)?),
        "OID" => Value::from(row.try_get::<sqlx::postgres::types::Oid, _>(index)?.0),
        "FLOAT4" => float_value(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => float_value(row.try_get::<f64, _>(index)?),
        "NUMERIC" => Value::String(row.try_get_unchecked::<PgNumeric, _>(index)?.to_string()),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
            Value::String(row.try_get::<String, _>(index)?)
        }
        "\"CHAR\"" => Value::String(char_text(row.try_get::<i8, _>(index)?)),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "UUID" => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "TIMETZ" => Value::String(time_tz_text(
            &row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)?,
        )),
        "TIMESTAMP" => Value::String(timestamp_text(&row.try_get::<NaiveDateTime, _>(index)?)),
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "INTERVAL" => Value::String(interval_text(&row.try_get::<PgInterval, _>(index)?)),
        "INET" | "CIDR" => inet_value(row, index)?,
        "BYTEA" => Value::String(bytea_hex(&row.try_get::<Vec<u8>, _>(index)?)),
        "BOOL[]" => array_value(row.try_get::<Vec<Option<bool>>, _>(index)?, Value::Bool),
        "INT2[]" => array_value(row.try_get::<Vec<Option<i16>>, _>(index)?, Value::from),
        "INT4[]" => array_value(row.try_get::<Vec<Option<i32>>, _>(index)?, Value::from),
        "INT8[]" => array_value(row.try_get::<Vec<Option<i64>>, _>(index)?, int8_value),
        "FLOAT4[]" => array_value(row.try_get::<Vec<Option<f32>>, _>(index)?, |v| {
            float_value(f64::from(v))
        }),
        "FLOAT8[]" => array_value(row.try_get::<Vec<Option<f64>>, _>(index)?, float_value),
        "NUMERIC[]" => array_value(
            row.try_get_unchecked::<Vec<Option<PgNumeric>>, _>(index)?,
            |v| Value::String(v.to_string()),
        ),
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array_value(row.try_get::<Vec<Option<String>>, _>(index)?, Value::String)
        }
        "UUID[]" => array_value(row.try_get::<Vec<Option<Uuid>>, _>(index)?, |v| {
            Value::String(v.to_string())
        }),
        "JSON[]" | "JSONB[]" => {
            array_value(row.try_get_unchecked::<Vec<Option<Value>>, _>(index)?, |v| v)
        }
        "DATE[]" => array_value(row.try_get::<Vec<Option<NaiveDate>>, _>(index)?, |v| {
            Value::String(v.to_string())
        }),
        "TIME[]" => array_value(row.try_get::<Vec<Option<NaiveTime>>, _>(index)?, |v| {
            Value::String(v.to_string())
        }),
        "TIMETZ[]" => array_value(
            row.try_get_unchecked::<Vec<Option<PgTimeTz<NaiveTime, FixedOffset>>>, _>(index)?,
            |v| Value::String(time_tz_text(&v)),
        ),
        "TIMESTAMP[]" => array_value(
            row.try_get::<Vec<Option<NaiveDateTime>>, _>(index)?,
            |v| Value::String(timestamp_text(&v)),
        ),
        "TIMESTAMPTZ[]" => array_value(
            row.try_get::<Vec<Option<DateTime<Utc>>>, _>(index)?,
            |v| Value::String(v.to_rfc3339()),
        ),
        "BYTEA[]" => array_value(row.try_get::<Vec<Option<Vec<u8>>>, _>(index)?, |v| {
            Value::String(bytea_hex(&v))
        }),
        _ => text_value(row.try_get_raw(index)?)?,
    };

    Ok(value)
}

/// A `numeric` value, carrying the display scale the server reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgNumeric {
    NaN,
    PositiveInfinity,
    NegativeInfinity,
    Value(BigDecimal),
}

impl PgNumeric {
    /// Decodes the binary wire form: digit count, weight, sign and display scale, followed by
    /// base-10000 digits.
    fn from_binary(bytes: &[u8]) -> Result<Self, BoxDynError> {
        let word = |position: usize| -> Result<u16, BoxDynError> {
            let offset = position * 2;
            bytes
                .get(offset..offset + 2)
                .map(|word| u16::from_be_bytes([word[0], word[1]]))
                .ok_or_else(|| "numeric value is truncated".into())
        };

        let n_digits = word(0)?;
        let weight = word(1)? as i16;
        let sign = match word(2)? {
            0x0000 => Sign::Plus,
            0x4000 => Sign::Minus,
            0xC000 => return Ok(PgNumeric::NaN),
            0xD000 => return Ok(PgNumeric::PositiveInfinity),
            0xF000 => return Ok(PgNumeric::NegativeInfinity),
            other => return Err(format!("invalid numeric sign {other:#06x}").into()),
        };
        let scale = word(3)?;

        let mut magnitude = BigUint::from(0u32);
        for position in 0..usize::from(n_digits) {
            magnitude = magnitude * BigUint::from(10_000u32) + BigUint::from(word(4 + position)?);
        }

        // The last digit carries a factor of 10000^(weight - n_digits + 1).
        let exponent = 4 * (i64::from(weight) - i64::from(n_digits) + 1);
        let value = BigDecimal::new(BigInt::from_biguint(sign, magnitude), -exponent)
            .with_scale(i64::from(scale));

        Ok(PgNumeric::Value(value))
    }
}

impl FromStr for PgNumeric {
    type Err = ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nan" => Ok(PgNumeric::NaN),
            "infinity" => Ok(PgNumeric::PositiveInfinity),
            "-infinity" => Ok(PgNumeric::NegativeInfinity),
            _ => BigDecimal::from_str(s).map(PgNumeric::Value),
        }
    }
}

/// Prints the value the way the server does: positional notation with exactly the display
/// scale's worth of fractional digits.
impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimal = match self {
            PgNumeric::NaN => return f.write_str("NaN"),
            PgNumeric::PositiveInfinity => return f.write_str("Infinity"),
            PgNumeric::NegativeInfinity => return f.write_str("-Infinity"),
            PgNumeric::Value(decimal) => decimal,
        };

        let (digits, scale) = decimal.as_bigint_and_exponent();
        if digits.sign() == Sign::Minus {
            f.write_str("-")?;
        }

        let mut magnitude = digits.magnitude().to_string();
        if scale <= 0 {
            f.write_str(&magnitude)?;
            for _ in 0..scale.unsigned_abs() {
                f.write_str("0")?;
            }
            return Ok(());
        }

        let scale = scale.unsigned_abs() as usize;
        if magnitude.len() <= scale {
            magnitude.insert_str(0, &"0".repeat(scale + 1 - magnitude.len()));
        }
        let (integral, fractional) = magnitude.split_at(magnitude.len() - scale);
        write!(f, "{integral}.{fractional}")
    }
}

impl sqlx::Type<Postgres> for PgNumeric {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }
}

impl PgHasArrayType for PgNumeric {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_numeric")
    }
}

impl<'r> Decode<'r, Postgres> for PgNumeric {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Binary => PgNumeric::from_binary(value.as_bytes()?),
            PgValueFormat::Text => Ok(value.as_str()?.parse::<PgNumeric>()?),
        }
    }
}

/// Values of types without a dedicated decoder are passed through as text when the server sent
/// them as text or when their payload is printable UTF-8, as it is for enums, `citext` or `xml`.
fn text_value(value: PgValueRef<'_>) -> Result<Value, DecodeFailure> {
    let text = match value.format() {
        PgValueFormat::Text => value.as_str().map_err(sqlx::Error::Decode)?,
        PgValueFormat::Binary => value
            .as_bytes()
            .ok()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .filter(|text| {
                !text
                    .chars()
                    .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
            })
            .ok_or(DecodeFailure::Unsupported)?,
    };

    Ok(Value::String(text.to_string()))
}

fn inet_value(row: &PgRow, index: usize) -> Result<Value, DecodeFailure> {
    let value = row.try_get_raw(index)?;
    if matches!(value.format(), PgValueFormat::Text) {
        return text_value(value);
    }

    let bytes = value.as_bytes().map_err(sqlx::Error::Decode)?;
    inet_text(bytes)
        .map(Value::String)
        .ok_or_else(|| DecodeFailure::Sqlx(sqlx::Error::Decode("malformed inet value".into())))
}

/// Formats the binary `inet`/`cidr` form: family, prefix bits, cidr flag, address length and
/// address bytes. The prefix is omitted for host addresses of `inet` columns.
fn inet_text(bytes: &[u8]) -> Option<String> {
    let [family, bits, is_cidr, length, address @ ..] = bytes else {
        return None;
    };
    if address.len() != usize::from(*length) {
        return None;
    }

    let (address, max_bits) = match *family {
        2 => (Ipv4Addr::from(<[u8; 4]>::try_from(address).ok()?).to_string(), 32),
        3 => (Ipv6Addr::from(<[u8; 16]>::try_from(address).ok()?).to_string(), 128),
        _ => return None,
    };

    if *is_cidr == 0 && *bits == max_bits {
        Some(address)
    } else {
        Some(format!("{address}/{bits}"))
    }
}

/// The single-byte `"char"` type.
fn char_text(value: i8) -> String {
    char::from(value as u8).to_string()
}

fn time_tz_text(value: &PgTimeTz<NaiveTime, FixedOffset>) -> String {
    format!("{}{}", value.time, value.offset)
}

fn timestamp_text(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Prints an interval in the server's default `postgres` style, e.g.
/// `1 year 2 mons -3 days +04:05:06.5`.
fn interval_text(interval: &PgInterval) -> String {
    const MICROS_PER_SECOND: u64 = 1_000_000;

    let mut text = String::new();
    let mut is_zero = true;
    let mut is_before = false;

    let years = interval.months / 12;
    let months = interval.months % 12;
    for (value, unit) in [
        (i64::from(years), "year"),
        (i64::from(months), "mon"),
        (i64::from(interval.days), "day"),
    ] {
        if value == 0 {
            continue;
        }
        if !is_zero {
            text.push(' ');
        }
        if is_before && value > 0 {
            text.push('+');
        }
        let plural = if value == 1 { "" } else { "s" };
        text.push_str(&format!("{value} {unit}{plural}"));
        is_before = value < 0;
        is_zero = false;
    }

    let micros = interval.microseconds;
    if is_zero || micros != 0 {
        let total = micros.unsigned_abs();
        let seconds = total / MICROS_PER_SECOND;
        let fraction = total % MICROS_PER_SECOND;

        if !is_zero {
            text.push(' ');
        }
        if micros < 0 {
            text.push('-');
        } else if is_before {
            text.push('+');
        }
        text.push_str(&format!(
            "{:02}:{:02}:{:02}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        ));
        if fraction != 0 {
            let fraction = format!("{fraction:06}");
            text.push('.');
            text.push_str(fraction.trim_end_matches('0'));
        }
    }

    text
}

/// Renders an `int8` as a number when it fits in a double exactly, otherwise as a string.
pub fn int8_value(value: i64) -> Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        Value::from(value)
    } else {
        Value::String(value.to_string())
    }
}

/// Non-finite floats have no JSON number form and are rendered as strings.
fn float_value(value: f64) -> Value {
    match Number::from_f64(value) {
        Some(number) => Value::Number(number),
        None => Value::String(value.to_string()),
    }
}

fn array_value<T>(values: Vec<Option<T>>, map: impl Fn(T) -> Value) -> Value {
    Value::Array(
        values
            .into_iter()
            .map(|value| value.map(&map).unwrap_or(Value::Null))
            .collect(),
    )
}

/// Formats bytes the way Postgres prints `bytea` in hex output mode.
fn bytea_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(2 + bytes.len() * 2);
    hex.push_str("\\x");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int8_outside_safe_range_becomes_string() {
        assert_eq!(int8_value(42), Value::from(42));
        assert_eq!(int8_value(MAX_SAFE_INTEGER), Value::from(MAX_SAFE_INTEGER));
        assert_eq!(
            int8_value(MAX_SAFE_INTEGER + 1),
            Value::String("9007199254740992".to_string())
        );
        assert_eq!(
            int8_value(i64::MIN),
            Value::String("-9223372036854775808".to_string())
        );
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), Value::String("NaN".to_string()));
        assert_eq!(float_value(f64::INFINITY), Value::String("inf".to_string()));
    }

    #[test]
    fn arrays_keep_nulls() {
        let value = array_value(vec![Some(1i32), None, Some(3)], Value::from);
        assert_eq!(value, serde_json::json!([1, null, 3]));
    }

    fn numeric_wire(weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&weight.to_be_bytes());
        bytes.extend_from_slice(&sign.to_be_bytes());
        bytes.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            bytes.extend_from_slice(&digit.to_be_bytes());
        }
        bytes
    }

    fn numeric_text(bytes: &[u8]) -> String {
        PgNumeric::from_binary(bytes).unwrap().to_string()
    }

    #[test]
    fn numeric_keeps_the_display_scale() {
        assert_eq!(numeric_text(&numeric_wire(0, 0, 2, &[12, 5000])), "12.50");
        assert_eq!(numeric_text(&numeric_wire(0, 0, 0, &[12])), "12");
        assert_eq!(numeric_text(&numeric_wire(0, 0, 2, &[])), "0.00");
        assert_eq!(numeric_text(&numeric_wire(-1, 0, 4, &[1])), "0.0001");
        assert_eq!(numeric_text(&numeric_wire(-2, 0, 8, &[1])), "0.00000001");
        assert_eq!(numeric_text(&numeric_wire(1, 0, 0, &[1])), "10000");
        assert_eq!(numeric_text(&numeric_wire(0, 0x4000, 3, &[7, 2500])), "-7.250");
    }

    #[test]
    fn numeric_wide_integers_stay_positional() {
        // 2^256 - 1, the largest uint256.
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let digits = [
            11, 5792, 892, 3731, 6195, 4235, 7098, 5008, 6879, 785, 3269, 9846, 6564, 564, 394,
            5758, 4007, 9131, 2963, 9935,
        ];
        assert_eq!(numeric_text(&numeric_wire(19, 0, 0, &digits)), max);
    }

    #[test]
    fn numeric_special_values() {
        assert_eq!(numeric_text(&numeric_wire(0, 0xC000, 0, &[])), "NaN");
        assert_eq!(numeric_text(&numeric_wire(0, 0xD000, 0, &[])), "Infinity");
        assert_eq!(numeric_text(&numeric_wire(0, 0xF000, 0, &[])), "-Infinity");
        assert!(PgNumeric::from_binary(&numeric_wire(0, 0x1234, 0, &[])).is_err());
        assert!(PgNumeric::from_binary(&[0, 1]).is_err());
    }

    #[test]
    fn numeric_text_form_keeps_trailing_zeros() {
        assert_eq!("12.50".parse::<PgNumeric>().unwrap().to_string(), "12.50");
        assert_eq!("NaN".parse::<PgNumeric>().unwrap(), PgNumeric::NaN);
    }

    #[test]
    fn intervals_print_in_postgres_style() {
        let interval = |months, days, microseconds| PgInterval {
            months,
            days,
            microseconds,
        };

        assert_eq!(interval_text(&interval(0, 0, 0)), "00:00:00");
        assert_eq!(interval_text(&interval(14, 3, 0)), "1 year 2 mons 3 days");
        assert_eq!(interval_text(&interval(0, 1, 14_706_500_000)), "1 day 04:05:06.5");
        assert_eq!(interval_text(&interval(0, -1, 7_200_000_000)), "-1 days +02:00:00");
        assert_eq!(interval_text(&interval(0, 0, -90_000_000)), "-00:01:30");
        assert_eq!(interval_text(&interval(-12, 0, 0)), "-1 years");
    }

    #[test]
    fn inet_prints_prefix_only_for_networks() {
        assert_eq!(inet_text(&[2, 32, 0, 4, 10, 0, 0, 1]).as_deref(), Some("10.0.0.1"));
        assert_eq!(inet_text(&[2, 24, 1, 4, 10, 0, 0, 0]).as_deref(), Some("10.0.0.0/24"));
        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(inet_text(&v6).as_deref(), Some("::1"));
        assert_eq!(inet_text(&[2, 32, 0, 4, 10]), None);
    }

    #[test]
    fn timetz_keeps_its_offset() {
        let value = PgTimeTz {
            time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        assert_eq!(time_tz_text(&value), "12:30:00+02:00");
    }

    #[test]
    fn bytea_is_hex_encoded() {
        assert_eq!(bytea_hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(bytea_hex(&[]), "\\x");
    }
}
