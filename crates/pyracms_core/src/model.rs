//! Typed records for each model and the [`NewRow`] they lower into.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use crate::password;
use crate::schema::{ColumnType, ModelDef, find_model};
use crate::values::{CountryCode, Email, FieldValue, Locale};

/// Column values for one row of one model, validated against its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct NewRow {
    #[serde(serialize_with = "serialize_model_name")]
    pub model: &'static ModelDef,
    pub values: BTreeMap<&'static str, FieldValue>,
}

fn serialize_model_name<S: serde::Serializer>(
    model: &&'static ModelDef,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(model.name)
}

impl NewRow {
    pub fn new(model: &'static ModelDef) -> Self {
        Self {
            model,
            values: BTreeMap::new(),
        }
    }

    pub fn for_model(name: &str) -> Result<Self> {
        let model = find_model(name).ok_or_else(|| anyhow!("unknown model `{name}`"))?;
        Ok(Self::new(model))
    }

    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        let definition = self
            .model
            .column(column)
            .ok_or_else(|| anyhow!("{} has no column `{column}`", self.model.name))?;
        let value = value.into();
        check_value_type(definition.ty, &value)
            .map_err(|error| anyhow!("{}.{column}: {error}", self.model.name))?;
        self.values.insert(definition.name, value);
        Ok(self)
    }

    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Result<Self> {
        self.set(column, value)?;
        Ok(self)
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    /// Replace plaintext in password columns with PBKDF2 hashes.
    pub fn hash_passwords(&mut self, rounds: u32) -> Result<()> {
        for column in self.model.columns {
            if column.ty != ColumnType::Password {
                continue;
            }
            if let Some(FieldValue::Text(plain)) = self.values.get(column.name)
                && !password::is_password_hash(plain)
            {
                let hashed = password::hash_password(plain, rounds)?;
                self.values.insert(column.name, FieldValue::Text(hashed));
            }
        }
        Ok(())
    }
}

fn check_value_type(ty: ColumnType, value: &FieldValue) -> Result<()> {
    let ok = match (ty, value) {
        (_, FieldValue::Null) => true,
        (ColumnType::Integer, FieldValue::Integer(_)) => true,
        (ColumnType::Numeric, FieldValue::Float(_) | FieldValue::Integer(_)) => true,
        (ColumnType::Boolean, FieldValue::Boolean(_)) => true,
        (ColumnType::DateTime, FieldValue::DateTime(_)) => true,
        (
            ColumnType::Unicode
            | ColumnType::UnicodeText
            | ColumnType::Password
            | ColumnType::Locale
            | ColumnType::Email
            | ColumnType::Country,
            FieldValue::Text(_),
        ) => true,
        _ => false,
    };
    if !ok {
        bail!("value {value} does not fit a {} column", ty.as_str());
    }
    Ok(())
}

/// A typed record that maps onto one model's table.
pub trait Record {
    const MODEL: &'static str;

    fn to_row(&self) -> Result<NewRow>;
}

#[derive(Debug, Clone, Default)]
pub struct Domain {
    pub name: String,
    pub display_name: String,
    pub url: String,
}

impl Record for Domain {
    const MODEL: &'static str = "Domain";

    fn to_row(&self) -> Result<NewRow> {
        NewRow::for_model(Self::MODEL)?
            .with("name", self.name.as_str())?
            .with("display_name", self.display_name.as_str())?
            .with("url", self.url.as_str())
    }
}

/// One collection of translations; rows in `translation` point back at it.
#[derive(Debug, Clone, Default)]
pub struct Translations;

impl Record for Translations {
    const MODEL: &'static str = "Translations";

    fn to_row(&self) -> Result<NewRow> {
        NewRow::for_model(Self::MODEL)
    }
}

#[derive(Debug, Clone)]
pub struct Translation {
    pub translations_id: Option<i64>,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub locale: Locale,
}

impl Translation {
    pub fn new(name: &str, display_name: &str, description: &str, locale: Locale) -> Self {
        Self {
            translations_id: None,
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            locale,
        }
    }
}

impl Record for Translation {
    const MODEL: &'static str = "Translation";

    fn to_row(&self) -> Result<NewRow> {
        NewRow::for_model(Self::MODEL)?
            .with("translation_id", self.translations_id)?
            .with("name", self.name.as_str())?
            .with("display_name", self.display_name.as_str())?
            .with("description", self.description.as_str())?
            .with("locale", self.locale.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub name: String,
    pub route_name: Option<String>,
    pub display_name_id: Option<i64>,
    pub domain_id: Option<i64>,
}

impl Record for Entity {
    const MODEL: &'static str = "Entity";

    fn to_row(&self) -> Result<NewRow> {
        NewRow::for_model(Self::MODEL)?
            .with("name", self.name.as_str())?
            .with("route_name", self.route_name.clone())?
            .with("display_name_id", self.display_name_id)?
            .with("domain_id", self.domain_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub display_name_id: Option<i64>,
}

impl Record for Group {
    const MODEL: &'static str = "Group";

    fn to_row(&self) -> Result<NewRow> {
        NewRow::for_model(Self::MODEL)?
            .with("name", self.name.as_str())?
            .with("display_name_id", self.display_name_id)
    }
}

/// `password_hash` must already be hashed; see [`password::hash_password`].
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub display_name_id: Option<i64>,
    pub password_hash: String,
    pub locale: Locale,
    pub email: Email,
    pub country: CountryCode,
    pub entity_id: Option<i64>,
}

impl Record for User {
    const MODEL: &'static str = "User";

    fn to_row(&self) -> Result<NewRow> {
        if !password::is_password_hash(&self.password_hash) {
            bail!("User.password must be hashed before it is stored");
        }
        NewRow::for_model(Self::MODEL)?
            .with("name", self.name.as_str())?
            .with("display_name_id", self.display_name_id)?
            .with("password", self.password_hash.as_str())?
            .with("locale", self.locale.to_string())?
            .with("email", self.email.to_string())?
            .with("country", self.country.to_string())?
            .with("entity_id", self.entity_id)
    }
}

/// Named value attached to an entity; one variant per value table.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

#[derive(Debug, Clone)]
pub struct EntityAttribute {
    pub entity_id: i64,
    pub name: String,
    pub value: EntityValue,
}

impl EntityAttribute {
    pub fn model_name(&self) -> &'static str {
        match self.value {
            EntityValue::String(_) => "Strings",
            EntityValue::Integer(_) => "Integers",
            EntityValue::Float(_) => "Floats",
            EntityValue::Boolean(_) => "Booleans",
        }
    }

    pub fn to_row(&self) -> Result<NewRow> {
        let row = NewRow::for_model(self.model_name())?
            .with("name", self.name.as_str())?
            .with("entity_id", self.entity_id)?;
        match &self.value {
            EntityValue::String(value) => row.with("string", value.as_str()),
            EntityValue::Integer(value) => row.with("integer", *value),
            EntityValue::Float(value) => row.with("float", *value),
            EntityValue::Boolean(value) => row.with("boolean", *value),
        }
    }
}
