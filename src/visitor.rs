use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^\(?\d{2}\)?\s?\d{4,5}-?\d{4}$").unwrap();
}

/// A registered visitor, as stored in the record store.
///
/// `created_at` is kept as the raw string the store returned. It is parsed on
/// demand so that one malformed timestamp never prevents a record (or the
/// whole record set) from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default = "default_visit_count")]
    pub visit_count: u32,
    #[serde(default = "default_true")]
    pub is_new_visitor: bool,
    #[serde(default)]
    pub status: VisitorStatus,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(
        default,
        serialize_with = "serialize_some",
        deserialize_with = "null_as_default"
    )]
    pub metadata: VisitorMetadata,
}

fn default_visit_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// Written as an option so that `null` from the store and the binary backup
// format read back through the same path.
fn serialize_some<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    serializer.serialize_some(value)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Open attribute bag filled by the registration form.
///
/// Every field is optional; blank strings are treated exactly like missing
/// values by the accessors on [`VisitorRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitorMetadata {
    pub genero: Option<String>,
    pub cep: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub faixa_etaria: Option<String>,
    pub geracao_amigo_convidou: Option<String>,
    pub telefone: Option<String>,
    pub como_conheceu: Option<String>,
    pub nome_pessoa_convidou: Option<String>,
    pub nome_consolidador: Option<String>,
    pub observacoes: Option<String>,
    /// Custom fields added through the form settings.
    pub extra: BTreeMap<String, String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl VisitorRecord {
    /// Parses `created_at` into a timestamp with an explicit offset.
    ///
    /// Accepts RFC 3339 (`2024-03-05T10:00:00Z`, `...+00:00`), the Postgres
    /// text form (`2024-03-05 10:00:00.123+00`), naive date-times and plain
    /// dates. Values without an offset are interpreted in `local`.
    pub fn created_at_in(&self, local: FixedOffset) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.created_at, local)
    }

    pub fn phone(&self) -> Option<&str> {
        present(&self.metadata.telefone)
    }

    pub fn gender(&self) -> Option<&str> {
        present(&self.metadata.genero)
    }

    pub fn neighborhood(&self) -> Option<&str> {
        present(&self.metadata.bairro)
    }

    pub fn city(&self) -> Option<&str> {
        present(&self.metadata.cidade)
    }

    /// Explicit state, or the `UF` suffix of a `"City - UF"` city label.
    pub fn state(&self) -> Option<&str> {
        present(&self.metadata.estado).or_else(|| {
            self.city()
                .and_then(|city| city.rsplit_once(" - "))
                .map(|(_, uf)| uf.trim())
                .filter(|uf| !uf.is_empty())
        })
    }

    pub fn age_bracket_label(&self) -> Option<&str> {
        present(&self.metadata.faixa_etaria)
    }

    pub fn age_bracket(&self) -> Option<AgeBracket> {
        self.age_bracket_label().and_then(AgeBracket::parse)
    }

    /// Coordinates usable on the map. `(0, 0)` is what the forms write when
    /// nothing was geocoded, so it counts as unresolved.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng))
                if lat.is_finite() && lng.is_finite() && !(lat == 0.0 && lng == 0.0) =>
            {
                Some((lat, lng))
            }
            _ => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.visit_count > 1
    }

    /// Records one more visit and keeps the two status signals consistent.
    pub fn register_visit(&mut self) {
        self.visit_count = self.visit_count.saturating_add(1);
        self.is_new_visitor = false;
        if self.status == VisitorStatus::New {
            self.status = VisitorStatus::Returning;
        }
    }
}

/// Parses the timestamp formats the record store is known to emit.
pub fn parse_timestamp(raw: &str, local: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return naive.and_local_timezone(local).single();
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|naive| naive.and_local_timezone(local).single())
}

/// Formats a timestamp the way it is written back to the store.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Follow-up status of a visitor.
///
/// Stored as its Portuguese label so that existing rows keep working; labels
/// that are not recognised survive untouched as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VisitorStatus {
    #[default]
    New,
    Pending,
    Contacted,
    Returning,
    Custom(String),
}

impl VisitorStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | "Novo" => VisitorStatus::New,
            "Pendente" => VisitorStatus::Pending,
            "Contatado" => VisitorStatus::Contacted,
            "Retornou" => VisitorStatus::Returning,
            other => VisitorStatus::Custom(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            VisitorStatus::New => "Novo",
            VisitorStatus::Pending => "Pendente",
            VisitorStatus::Contacted => "Contatado",
            VisitorStatus::Returning => "Retornou",
            VisitorStatus::Custom(label) => label,
        }
    }
}

impl fmt::Display for VisitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for VisitorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_some(self.label())
    }
}

impl<'de> Deserialize<'de> for VisitorStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label
            .as_deref()
            .map(VisitorStatus::from_label)
            .unwrap_or_default())
    }
}

/// Canonical age-bracket taxonomy, the one the registration form writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBracket {
    #[serde(rename = "Criança")]
    Child,
    #[serde(rename = "Adolescente")]
    Teen,
    #[serde(rename = "Jovem")]
    Young,
    #[serde(rename = "Adulto")]
    Adult,
    #[serde(rename = "Melhor idade")]
    Senior,
}

impl AgeBracket {
    pub const ALL: [AgeBracket; 5] = [
        AgeBracket::Child,
        AgeBracket::Teen,
        AgeBracket::Young,
        AgeBracket::Adult,
        AgeBracket::Senior,
    ];

    /// Exact label match; anything else is not a bracket.
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.label() == label)
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeBracket::Child => "Criança",
            AgeBracket::Teen => "Adolescente",
            AgeBracket::Young => "Jovem",
            AgeBracket::Adult => "Adulto",
            AgeBracket::Senior => "Melhor idade",
        }
    }

    /// Chart colour, lightest to darkest.
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            AgeBracket::Child => (0x9B, 0xC8, 0xEF),
            AgeBracket::Teen => (0x7B, 0xB3, 0xE8),
            AgeBracket::Young => (0x5B, 0x9E, 0xE1),
            AgeBracket::Adult => (0x3B, 0x89, 0xDA),
            AgeBracket::Senior => (0x1B, 0x74, 0xD3),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Invalid phone number, expected (DD) 99999-9999 or (DD) 9999-9999")]
    InvalidPhone,
    #[error("Postal code must have 8 digits")]
    InvalidPostalCode,
    #[error("Unknown form field: {0}")]
    UnknownField(String),
    #[error("Field name cannot be empty")]
    EmptyFieldName,
    #[error("Field name may only contain lowercase letters, digits and underscores: {0}")]
    InvalidFieldName(String),
    #[error("Field label cannot be empty")]
    EmptyFieldLabel,
    #[error("Required field is missing: {0}")]
    MissingField(String),
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone.trim())
}

/// Strips everything that is not a digit, the way the form input does.
pub fn normalize_postal_code(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Registration / edit form submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitorForm {
    pub name: String,
    pub gender: Option<String>,
    pub postal_code: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub age_bracket: Option<String>,
    pub referrer_generation: Option<String>,
    pub phone: Option<String>,
    pub referral_channel: Option<String>,
    pub referrer_name: Option<String>,
    pub counselor_name: Option<String>,
    pub counselor_notes: Option<String>,
    pub status: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl VisitorForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            if !is_valid_phone(phone) {
                return Err(ValidationError::InvalidPhone);
            }
        }
        if let Some(cep) = self.postal_code.as_deref().filter(|c| !c.trim().is_empty()) {
            if normalize_postal_code(cep).len() != 8 {
                return Err(ValidationError::InvalidPostalCode);
            }
        }
        Ok(())
    }

    fn metadata(&self) -> VisitorMetadata {
        VisitorMetadata {
            genero: blank_to_none(self.gender.clone()),
            cep: blank_to_none(self.postal_code.as_deref().map(normalize_postal_code)),
            bairro: blank_to_none(self.neighborhood.clone()),
            cidade: blank_to_none(self.city.clone()),
            estado: blank_to_none(self.state.clone()),
            faixa_etaria: blank_to_none(self.age_bracket.clone()),
            geracao_amigo_convidou: blank_to_none(self.referrer_generation.clone()),
            telefone: blank_to_none(self.phone.clone()),
            como_conheceu: blank_to_none(self.referral_channel.clone()),
            nome_pessoa_convidou: blank_to_none(self.referrer_name.clone()),
            nome_consolidador: blank_to_none(self.counselor_name.clone()),
            observacoes: blank_to_none(self.counselor_notes.clone()),
            extra: self.extra.clone(),
        }
    }

    fn address(&self) -> String {
        format!(
            "{}, {}",
            self.neighborhood.as_deref().unwrap_or("").trim(),
            self.city.as_deref().unwrap_or("").trim()
        )
    }

    fn status(&self) -> VisitorStatus {
        self.status
            .as_deref()
            .map(VisitorStatus::from_label)
            .unwrap_or_default()
    }

    /// Builds the record written on registration.
    pub fn into_new_record(self, now: DateTime<Utc>) -> Result<VisitorRecord, ValidationError> {
        self.validate()?;
        Ok(VisitorRecord {
            id: Uuid::new_v4().to_string(),
            name: self.name.trim().to_string(),
            address: self.address(),
            created_at: format_timestamp(now),
            visit_count: 1,
            is_new_visitor: true,
            status: self.status(),
            lat: self.lat,
            lng: self.lng,
            distance: None,
            metadata: self.metadata(),
        })
    }

    /// Full overwrite of the mutable fields on edit.
    pub fn apply_to(&self, record: &mut VisitorRecord) -> Result<(), ValidationError> {
        self.validate()?;
        record.name = self.name.trim().to_string();
        record.address = self.address();
        record.status = self.status();
        record.lat = self.lat;
        record.lng = self.lng;
        record.metadata = self.metadata();
        Ok(())
    }

    /// Pre-fills the edit form from a stored record.
    pub fn from_record(record: &VisitorRecord) -> Self {
        let m = &record.metadata;
        VisitorForm {
            name: record.name.clone(),
            gender: m.genero.clone(),
            postal_code: m.cep.clone(),
            neighborhood: m.bairro.clone(),
            city: m.cidade.clone(),
            state: m.estado.clone(),
            age_bracket: m.faixa_etaria.clone(),
            referrer_generation: m.geracao_amigo_convidou.clone(),
            phone: m.telefone.clone(),
            referral_channel: m.como_conheceu.clone(),
            referrer_name: m.nome_pessoa_convidou.clone(),
            counselor_name: m.nome_consolidador.clone(),
            counselor_notes: m.observacoes.clone(),
            status: Some(record.status.label().to_string()),
            lat: record.lat,
            lng: record.lng,
            extra: m.extra.clone(),
        }
    }
}

/// A small group ("célula") hosted by a leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGroup {
    pub id: String,
    pub leader_name: String,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub weekday: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellForm {
    pub leader_name: String,
    pub generation: Option<String>,
    pub postal_code: Option<String>,
    pub weekday: Option<String>,
    pub time: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
}

impl CellForm {
    pub fn into_cell(self, now: DateTime<Utc>) -> Result<CellGroup, ValidationError> {
        if self.leader_name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let postal_code = match self.postal_code.as_deref().map(normalize_postal_code) {
            Some(cep) if cep.is_empty() => None,
            Some(cep) if cep.len() != 8 => return Err(ValidationError::InvalidPostalCode),
            other => other,
        };
        Ok(CellGroup {
            id: Uuid::new_v4().to_string(),
            leader_name: self.leader_name.trim().to_string(),
            generation: blank_to_none(self.generation),
            postal_code,
            weekday: blank_to_none(self.weekday),
            time: blank_to_none(self.time),
            neighborhood: blank_to_none(self.neighborhood),
            city: blank_to_none(self.city),
            created_at: format_timestamp(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn brasilia() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn parses_store_timestamp_formats() {
        let local = brasilia();
        let rfc = parse_timestamp("2024-03-05T10:00:00Z", local).unwrap();
        assert_eq!(rfc.hour(), 10);

        let pg = parse_timestamp("2024-03-05 10:00:00.123456+00", local).unwrap();
        assert_eq!(pg.with_timezone(&Utc).hour(), 10);

        let naive = parse_timestamp("2024-03-05T10:00:00", local).unwrap();
        assert_eq!(naive.offset(), &local);

        let date = parse_timestamp("2024-03-05", local).unwrap();
        assert_eq!(date.day(), 5);

        assert!(parse_timestamp("not a date", local).is_none());
        assert!(parse_timestamp("", local).is_none());
    }

    #[test]
    fn record_tolerates_missing_and_null_metadata() {
        let json = r#"{"id":"a","name":"Ana","created_at":"2024-03-01T12:00:00Z","metadata":null}"#;
        let record: VisitorRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.visit_count, 1);
        assert!(record.is_new_visitor);
        assert_eq!(record.status, VisitorStatus::New);
        assert!(record.city().is_none());

        let json = r#"{"id":"b","name":"Bia","status":"Contatado","metadata":{"cidade":"  ","faixa_etaria":"Jovem"}}"#;
        let record: VisitorRecord = serde_json::from_str(json).unwrap();
        assert!(record.city().is_none());
        assert_eq!(record.age_bracket(), Some(AgeBracket::Young));
        assert_eq!(record.status, VisitorStatus::Contacted);
    }

    #[test]
    fn status_labels_round_trip_and_keep_custom_values() {
        for label in ["Novo", "Pendente", "Contatado", "Retornou", "Batizado"] {
            let status = VisitorStatus::from_label(label);
            assert_eq!(status.label(), label);
        }
        assert_eq!(
            VisitorStatus::from_label("Batizado"),
            VisitorStatus::Custom("Batizado".to_string())
        );
    }

    #[test]
    fn age_bracket_requires_exact_label() {
        assert_eq!(AgeBracket::parse("Adulto"), Some(AgeBracket::Adult));
        assert_eq!(AgeBracket::parse("adulto"), None);
        assert_eq!(AgeBracket::parse("18-25"), None);
        assert_eq!(AgeBracket::parse("Unknown"), None);
    }

    #[test]
    fn state_falls_back_to_city_suffix() {
        let mut record = VisitorRecord {
            id: "x".into(),
            name: "X".into(),
            address: String::new(),
            created_at: String::new(),
            visit_count: 1,
            is_new_visitor: true,
            status: VisitorStatus::New,
            lat: None,
            lng: None,
            distance: None,
            metadata: VisitorMetadata {
                cidade: Some("Campinas - SP".into()),
                ..Default::default()
            },
        };
        assert_eq!(record.state(), Some("SP"));
        record.metadata.estado = Some("RJ".into());
        assert_eq!(record.state(), Some("RJ"));
    }

    #[test]
    fn phone_validation_matches_form_rule() {
        assert!(is_valid_phone("(11) 99999-9999"));
        assert!(is_valid_phone("11 9999-9999"));
        assert!(is_valid_phone("1199999999"));
        assert!(!is_valid_phone("9999-9999"));
        assert!(!is_valid_phone("(11) 999-999"));
    }

    #[test]
    fn new_record_from_form() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        let form = VisitorForm {
            name: "  Maria Santos ".into(),
            postal_code: Some("01310-100".into()),
            neighborhood: Some("Bela Vista".into()),
            city: Some("São Paulo - SP".into()),
            phone: Some("".into()),
            ..Default::default()
        };
        let record = form.into_new_record(now).unwrap();
        assert_eq!(record.name, "Maria Santos");
        assert_eq!(record.address, "Bela Vista, São Paulo - SP");
        assert_eq!(record.metadata.cep.as_deref(), Some("01310100"));
        assert_eq!(record.metadata.telefone, None);
        assert_eq!(record.visit_count, 1);
        assert!(record.is_new_visitor);
        assert_eq!(record.status, VisitorStatus::New);
        assert_eq!(record.created_at, "2024-03-10T15:00:00.000Z");
    }

    #[test]
    fn form_validation_errors() {
        let form = VisitorForm::default();
        assert_eq!(form.validate(), Err(ValidationError::EmptyName));

        let form = VisitorForm {
            name: "João".into(),
            phone: Some("123".into()),
            ..Default::default()
        };
        assert_eq!(form.validate(), Err(ValidationError::InvalidPhone));

        let form = VisitorForm {
            name: "João".into(),
            postal_code: Some("1234".into()),
            ..Default::default()
        };
        assert_eq!(form.validate(), Err(ValidationError::InvalidPostalCode));
    }

    #[test]
    fn edit_overwrites_mutable_fields_only() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        let mut record = VisitorForm {
            name: "Pedro".into(),
            city: Some("Recife - PE".into()),
            ..Default::default()
        }
        .into_new_record(now)
        .unwrap();
        record.register_visit();
        let id = record.id.clone();

        let edit = VisitorForm {
            name: "Pedro Oliveira".into(),
            status: Some("Contatado".into()),
            ..Default::default()
        };
        edit.apply_to(&mut record).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.name, "Pedro Oliveira");
        assert_eq!(record.visit_count, 2);
        assert!(!record.is_new_visitor);
        assert!(record.city().is_none());
        assert_eq!(record.status, VisitorStatus::Contacted);
    }

    #[test]
    fn register_visit_moves_new_to_returning() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        let mut record = VisitorForm {
            name: "Ana".into(),
            ..Default::default()
        }
        .into_new_record(now)
        .unwrap();
        record.register_visit();
        assert_eq!(record.visit_count, 2);
        assert!(!record.is_new_visitor);
        assert_eq!(record.status, VisitorStatus::Returning);

        record.status = VisitorStatus::Contacted;
        record.register_visit();
        assert_eq!(record.status, VisitorStatus::Contacted);
    }

    #[test]
    fn zero_coordinates_are_unresolved() {
        let mut record = VisitorForm {
            name: "Ana".into(),
            lat: Some(0.0),
            lng: Some(0.0),
            ..Default::default()
        }
        .into_new_record(Utc::now())
        .unwrap();
        assert!(record.coordinates().is_none());
        record.lat = Some(-23.5);
        record.lng = Some(-46.6);
        assert_eq!(record.coordinates(), Some((-23.5, -46.6)));
    }

    #[test]
    fn cell_form_rules() {
        let now = Utc::now();
        assert!(CellForm::default().into_cell(now).is_err());
        let cell = CellForm {
            leader_name: "Samuel".into(),
            postal_code: Some("".into()),
            weekday: Some("Quarta".into()),
            ..Default::default()
        }
        .into_cell(now)
        .unwrap();
        assert_eq!(cell.postal_code, None);
        assert_eq!(cell.weekday.as_deref(), Some("Quarta"));

        let bad = CellForm {
            leader_name: "Samuel".into(),
            postal_code: Some("123".into()),
            ..Default::default()
        };
        assert_eq!(bad.into_cell(now), Err(ValidationError::InvalidPostalCode));
    }
}
