//! Search and filter predicate of the visitor list.

use crate::visitor::VisitorRecord;
use serde::{Deserialize, Serialize};

/// Status filter of the list. It reads `is_new_visitor`, not the free-text
/// follow-up status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Any,
    New,
    Returning,
    /// A value that names neither option; nothing matches it.
    Unrecognized(String),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => StatusFilter::Any,
            "Novo" => StatusFilter::New,
            "Retornou" => StatusFilter::Returning,
            other => StatusFilter::Unrecognized(other.to_string()),
        }
    }

    pub fn matches(&self, record: &VisitorRecord) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::New => record.is_new_visitor,
            StatusFilter::Returning => !record.is_new_visitor,
            StatusFilter::Unrecognized(_) => false,
        }
    }
}

/// Query parameters of the dashboard list. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitorFilters {
    pub search: String,
    pub gender: String,
    pub city: String,
    pub age_bracket: String,
    pub status: String,
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle_lower))
}

impl VisitorFilters {
    pub fn is_empty(&self) -> bool {
        self.search.is_empty()
            && self.gender.is_empty()
            && self.city.is_empty()
            && self.age_bracket.is_empty()
            && self.status.is_empty()
    }

    /// Case-insensitive substring match against name, phone, city or
    /// neighbourhood. An empty term matches everything.
    pub fn matches_search(&self, record: &VisitorRecord) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let term = self.search.to_lowercase();
        record.name.to_lowercase().contains(&term)
            || contains_ci(record.phone(), &term)
            || contains_ci(record.city(), &term)
            || contains_ci(record.neighborhood(), &term)
    }

    /// Structured filters only: gender and age bracket are exact, city is a
    /// case-insensitive substring.
    pub fn matches_structured(&self, record: &VisitorRecord) -> bool {
        let gender = self.gender.is_empty() || record.gender() == Some(self.gender.as_str());
        let city = self.city.is_empty() || contains_ci(record.city(), &self.city.to_lowercase());
        let age = self.age_bracket.is_empty()
            || record.age_bracket_label() == Some(self.age_bracket.as_str());
        gender && city && age && StatusFilter::parse(&self.status).matches(record)
    }

    pub fn matches(&self, record: &VisitorRecord) -> bool {
        self.is_empty() || (self.matches_search(record) && self.matches_structured(record))
    }

    pub fn apply<'r>(&self, records: &'r [VisitorRecord]) -> Vec<&'r VisitorRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::record;

    fn sample() -> Vec<VisitorRecord> {
        let mut ana = record("1", "2024-03-01T10:00:00Z", 1);
        ana.name = "Ana Souza".into();
        ana.metadata.genero = Some("Feminino".into());
        ana.metadata.cidade = Some("São Paulo - SP".into());
        ana.metadata.bairro = Some("Mooca".into());
        ana.metadata.telefone = Some("(11) 98888-7777".into());
        ana.metadata.faixa_etaria = Some("Jovem".into());

        let mut joao = record("2", "2024-03-02T10:00:00Z", 2);
        joao.name = "João Lima".into();
        joao.metadata.genero = Some("Masculino".into());
        joao.metadata.cidade = Some("Campinas - SP".into());
        joao.metadata.faixa_etaria = Some("Adulto".into());

        let bare = record("3", "2024-03-03T10:00:00Z", 1);
        vec![ana, joao, bare]
    }

    fn ids(filters: &VisitorFilters, records: &[VisitorRecord]) -> Vec<String> {
        filters.apply(records).iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn no_filters_match_everything() {
        let records = sample();
        assert_eq!(ids(&VisitorFilters::default(), &records).len(), 3);
    }

    #[test]
    fn search_covers_name_phone_city_and_neighborhood() {
        let records = sample();
        let by = |term: &str| {
            ids(
                &VisitorFilters {
                    search: term.into(),
                    ..Default::default()
                },
                &records,
            )
        };
        assert_eq!(by("ana"), ["1"]);
        assert_eq!(by("98888"), ["1"]);
        assert_eq!(by("campinas"), ["2"]);
        assert_eq!(by("MOOCA"), ["1"]);
        assert!(by("recife").is_empty());
    }

    #[test]
    fn status_filter_reads_new_visitor_flag() {
        let records = sample();
        let with_status = |status: &str| {
            ids(
                &VisitorFilters {
                    status: status.into(),
                    ..Default::default()
                },
                &records,
            )
        };
        assert_eq!(with_status("Novo"), ["1", "3"]);
        assert_eq!(with_status("Retornou"), ["2"]);
        assert!(with_status("Contatado").is_empty());
    }

    #[test]
    fn structured_filters_combine() {
        let records = sample();
        let filters = VisitorFilters {
            city: "sp".into(),
            gender: "Masculino".into(),
            ..Default::default()
        };
        assert_eq!(ids(&filters, &records), ["2"]);

        let filters = VisitorFilters {
            age_bracket: "Jovem".into(),
            search: "souza".into(),
            ..Default::default()
        };
        assert_eq!(ids(&filters, &records), ["1"]);
    }

    #[test]
    fn missing_metadata_never_matches_a_set_filter() {
        let records = sample();
        let filters = VisitorFilters {
            gender: "Feminino".into(),
            ..Default::default()
        };
        assert_eq!(ids(&filters, &records), ["1"]);
    }
}
