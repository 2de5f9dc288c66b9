//! Registration form configuration: custom fields and general switches.

use crate::store::StoreError;
use crate::visitor::ValidationError;
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, create_dir_all};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

lazy_static! {
    static ref FIELD_NAME_REGEX: Regex = Regex::new(r"^[a-z0-9_]+$").unwrap();
}

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    Tel,
    Number,
    Date,
    Select,
    Textarea,
    Boolean,
}

/// A custom field shown on the registration form. Values end up in the
/// visitor's `metadata.extra` under `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl FormField {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyFieldName);
        }
        if !FIELD_NAME_REGEX.is_match(name) {
            return Err(ValidationError::InvalidFieldName(name.to_string()));
        }
        if self.label.trim().is_empty() {
            return Err(ValidationError::EmptyFieldLabel);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub auto_save: bool,
    pub show_progress: bool,
    pub allow_duplicates: bool,
    pub send_confirmation_email: bool,
    pub require_terms: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        GeneralSettings {
            auto_save: true,
            show_progress: true,
            allow_duplicates: false,
            send_confirmation_email: true,
            require_terms: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSettings {
    pub fields: Vec<FormField>,
    pub general: GeneralSettings,
}

impl FormSettings {
    /// Checks custom values submitted with a visitor form against the
    /// enabled fields.
    pub fn validate_extra(&self, extra: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        for key in extra.keys() {
            if !self.fields.iter().any(|f| f.enabled && &f.name == key) {
                return Err(ValidationError::UnknownField(key.clone()));
            }
        }
        for field in self.fields.iter().filter(|f| f.enabled && f.required) {
            let filled = extra
                .get(&field.name)
                .is_some_and(|v| !v.trim().is_empty());
            if !filled {
                return Err(ValidationError::MissingField(field.label.clone()));
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), ValidationError> {
        for (i, field) in self.fields.iter().enumerate() {
            field.validate()?;
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ValidationError::InvalidFieldName(format!(
                    "{} is used twice",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Form settings kept in memory and mirrored to `settings.json`.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    state: RwLock<FormSettings>,
}

impl SettingsStore {
    /// Loads `settings.json` from `dir`, falling back to defaults when the
    /// file does not exist yet.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        let path = dir.join(SETTINGS_FILE);
        let settings = if path.exists() {
            serde_json::from_reader(BufReader::new(File::open(&path)?))?
        } else {
            FormSettings::default()
        };
        Ok(SettingsStore {
            path: Some(path),
            state: RwLock::new(settings),
        })
    }

    /// Settings that are never written to disk.
    pub fn in_memory(settings: FormSettings) -> Self {
        SettingsStore {
            path: None,
            state: RwLock::new(settings),
        }
    }

    pub fn get(&self) -> FormSettings {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn persist(&self, settings: &FormSettings) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            fs::write(path, serde_json::to_string_pretty(settings)?)?;
        }
        Ok(())
    }

    fn modify<R>(
        &self,
        change: impl FnOnce(&mut FormSettings) -> Result<R, SettingsError>,
    ) -> Result<R, SettingsError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = state.clone();
        let result = change(&mut next)?;
        next.check()?;
        self.persist(&next)?;
        *state = next;
        Ok(result)
    }

    /// Replaces everything at once, as the settings page saves.
    pub fn replace(&self, settings: FormSettings) -> Result<FormSettings, SettingsError> {
        self.modify(|current| {
            *current = settings;
            Ok(current.clone())
        })
    }

    /// Inserts a field, or updates the one with the same name.
    pub fn upsert_field(&self, mut field: FormField) -> Result<FormField, SettingsError> {
        field.validate()?;
        field.name = field.name.trim().to_string();
        let field = self.modify(|current| {
            if let Some(existing) = current.fields.iter_mut().find(|f| f.name == field.name) {
                field.id = existing.id;
                *existing = field.clone();
            } else {
                let next_id = current.fields.iter().filter_map(|f| f.id).max().unwrap_or(0) + 1;
                field.id = Some(next_id);
                current.fields.push(field.clone());
            }
            Ok(field)
        })?;
        info!("Saved form field {}", field.name);
        Ok(field)
    }

    pub fn remove_field(&self, name: &str) -> Result<(), SettingsError> {
        self.modify(|current| {
            let before = current.fields.len();
            current.fields.retain(|f| f.name != name);
            if current.fields.len() == before {
                return Err(ValidationError::UnknownField(name.to_string()).into());
            }
            Ok(())
        })
    }
}
