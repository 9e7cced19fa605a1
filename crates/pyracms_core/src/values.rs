use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::{Serialize, Serializer};

use crate::schema::{ColumnDef, ColumnType};

/// Storage format for date/time columns.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    pub fn now() -> Self {
        Self::DateTime(utc_now())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Decode a raw SQLite value according to the declared column type.
    pub fn from_sql_value(ty: ColumnType, value: ValueRef<'_>) -> Result<Self> {
        let decoded = match (ty, value) {
            (_, ValueRef::Null) => Self::Null,
            (ColumnType::Integer, ValueRef::Integer(value)) => Self::Integer(value),
            (ColumnType::Numeric, ValueRef::Integer(value)) => Self::Float(value as f64),
            (ColumnType::Numeric, ValueRef::Real(value)) => Self::Float(value),
            (ColumnType::Boolean, ValueRef::Integer(value)) => Self::Boolean(value != 0),
            (ColumnType::DateTime, ValueRef::Text(raw)) => {
                let raw = std::str::from_utf8(raw).context("date/time column is not UTF-8")?;
                Self::DateTime(parse_datetime(raw)?)
            }
            (_, ValueRef::Text(raw)) => Self::Text(
                std::str::from_utf8(raw)
                    .context("text column is not UTF-8")?
                    .to_string(),
            ),
            (_, ValueRef::Integer(value)) => Self::Integer(value),
            (_, ValueRef::Real(value)) => Self::Float(value),
            (_, ValueRef::Blob(_)) => bail!("blob values are not part of the data model"),
        };
        Ok(decoded)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::DateTime(value) => write!(f, "{}", value.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Integer(value) => ToSqlOutput::from(*value),
            Self::Float(value) => ToSqlOutput::from(*value),
            Self::Boolean(value) => ToSqlOutput::from(*value),
            Self::Text(value) => ToSqlOutput::from(value.as_str()),
            Self::DateTime(value) => {
                ToSqlOutput::from(value.format(DATETIME_FORMAT).to_string())
            }
        })
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Boolean(value) => serializer.serialize_bool(*value),
            Self::Text(value) => serializer.serialize_str(value),
            Self::DateTime(value) => {
                serializer.serialize_str(&value.format(DATETIME_FORMAT).to_string())
            }
        }
    }
}

/// How a column is surfaced as a command-line flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Integer,
    Float,
    Boolean,
    DateTime,
    Text,
}

impl FlagKind {
    pub fn for_column(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Integer => Self::Integer,
            ColumnType::Numeric => Self::Float,
            ColumnType::Boolean => Self::Boolean,
            ColumnType::DateTime => Self::DateTime,
            _ => Self::Text,
        }
    }

    pub fn value_name(self) -> &'static str {
        match self {
            Self::Integer => "INT",
            Self::Float => "NUMBER",
            Self::Boolean => "BOOL",
            Self::DateTime => "DATETIME",
            Self::Text => "TEXT",
        }
    }
}

/// Convert a raw command-line string into a value for `column`.
///
/// Passwords are only checked for emptiness here; hashing happens when the
/// row is assembled so the configured cost applies.
pub fn parse_field_value(column: &ColumnDef, raw: &str) -> Result<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") && column.ty != ColumnType::Password {
        return Ok(FieldValue::Null);
    }

    let value = match column.ty {
        ColumnType::Integer => FieldValue::Integer(
            trimmed
                .parse::<i64>()
                .with_context(|| format!("{} expects an integer, got `{raw}`", column.name))?,
        ),
        ColumnType::Numeric => {
            let value = trimmed
                .parse::<f64>()
                .with_context(|| format!("{} expects a number, got `{raw}`", column.name))?;
            if !value.is_finite() {
                bail!("{} expects a finite number, got `{raw}`", column.name);
            }
            FieldValue::Float(value)
        }
        ColumnType::Boolean => FieldValue::Boolean(parse_bool(trimmed).with_context(|| {
            format!("{} expects a boolean, got `{raw}`", column.name)
        })?),
        ColumnType::DateTime => FieldValue::DateTime(
            parse_datetime(trimmed)
                .with_context(|| format!("{} expects a date/time", column.name))?,
        ),
        ColumnType::Locale => FieldValue::Text(trimmed.parse::<Locale>()?.to_string()),
        ColumnType::Email => FieldValue::Text(trimmed.parse::<Email>()?.to_string()),
        ColumnType::Country => FieldValue::Text(trimmed.parse::<CountryCode>()?.to_string()),
        ColumnType::Password => {
            if raw.is_empty() {
                bail!("{} cannot be empty", column.name);
            }
            FieldValue::Text(raw.to_string())
        }
        ColumnType::Unicode | ColumnType::UnicodeText => FieldValue::Text(raw.to_string()),
    };
    Ok(value)
}

pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "t" | "y" => Ok(true),
        "false" | "no" | "off" | "0" | "f" | "n" => Ok(false),
        other => bail!("`{other}` is not a boolean (use true/false, yes/no, on/off, 1/0)"),
    }
}

/// Parse a date/time in UTC. Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS[.f]]`,
/// the same with a `T` separator, a bare `YYYY-MM-DD` and `now`.
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(utc_now());
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(value.with_timezone(&Utc).naive_utc());
    }
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(value);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        && let Some(value) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(value);
    }
    bail!("`{trimmed}` is not a recognized date/time (try 2024-05-01 or 2024-05-01T12:30:00Z)")
}

pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// A language tag in `language_TERRITORY` form, e.g. `en_GB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    language: String,
    territory: Option<String>,
}

impl Locale {
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn territory(&self) -> Option<&str> {
        self.territory.as_deref()
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (language, territory) = match trimmed.split_once(['_', '-']) {
            Some((language, territory)) => (language, Some(territory)),
            None => (trimmed, None),
        };
        if !(2..=3).contains(&language.len())
            || !language.chars().all(|ch| ch.is_ascii_alphabetic())
        {
            bail!("`{trimmed}` is not a locale (expected a form like en_GB)");
        }
        let territory = match territory {
            None => None,
            Some(value)
                if (value.len() == 2 && value.chars().all(|ch| ch.is_ascii_alphabetic()))
                    || (value.len() == 3 && value.chars().all(|ch| ch.is_ascii_digit())) =>
            {
                Some(value.to_ascii_uppercase())
            }
            Some(_) => bail!("`{trimmed}` has an invalid territory (expected a form like en_GB)"),
        };
        Ok(Self {
            language: language.to_ascii_lowercase(),
            territory,
        })
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.territory {
            Some(territory) => write!(f, "{}_{}", self.language, territory),
            None => f.write_str(&self.language),
        }
    }
}

/// ISO 3166-1 alpha-2 country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != 2 || !trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
            bail!("`{trimmed}` is not a two-letter country code");
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Email {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some((local, domain)) = trimmed.split_once('@') else {
            bail!("`{trimmed}` is not an email address");
        };
        if local.is_empty()
            || domain.contains('@')
            || trimmed.chars().any(char::is_whitespace)
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            bail!("`{trimmed}` is not an email address");
        }
        Ok(Self(format!("{local}@{}", domain.to_ascii_lowercase())))
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
