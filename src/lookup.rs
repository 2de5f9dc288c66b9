//! Address lookup: postal codes, city search and neighbourhood suggestions.
//!
//! Lookups are best effort. Any failure clears the dependent form fields and
//! produces a notice for the user; nothing here is fatal.

use crate::visitor::normalize_postal_code;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Lookup service unavailable: {0}")]
    Network(String),

    #[error("Superseded by a newer request")]
    Superseded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityMatch {
    pub id: u64,
    pub name: String,
    pub state: String,
}

/// `"Name - UF"`, the form the city field stores.
pub fn format_city(city: &CityMatch) -> String {
    if city.state.is_empty() {
        city.name.clone()
    } else {
        format!("{} - {}", city.name, city.state)
    }
}

#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn resolve_postal_code(&self, cep: &str) -> Result<Address, LookupError>;

    async fn search_cities(&self, term: &str) -> Result<Vec<CityMatch>, LookupError>;
}

/// Eight-digit postal code or `InvalidInput`.
pub fn checked_postal_code(raw: &str) -> Result<String, LookupError> {
    let cep = normalize_postal_code(raw);
    if cep.len() == 8 {
        Ok(cep)
    } else {
        Err(LookupError::InvalidInput(format!(
            "postal code must have 8 digits, got {}",
            cep.len()
        )))
    }
}

/// Reads a ViaCEP answer. `{"erro": true}` means the code does not exist.
pub fn parse_postal_code_response(cep: &str, body: &Value) -> Result<Address, LookupError> {
    let erro = &body["erro"];
    if erro.as_bool() == Some(true) || erro.as_str() == Some("true") {
        return Err(LookupError::NotFound(cep.to_string()));
    }
    let text = |key: &str| body[key].as_str().unwrap_or("").trim().to_string();
    Ok(Address {
        neighborhood: text("bairro"),
        city: text("localidade"),
        state: text("uf"),
    })
}

fn state_acronym(city: &Value) -> String {
    let paths: [&[&str]; 5] = [
        &["microrregiao", "mesorregiao", "UF", "sigla"],
        &["municipio", "microrregiao", "mesorregiao", "UF", "sigla"],
        &["uf", "sigla"],
        &["municipio", "uf", "sigla"],
        &["regiao-imediata", "regiao-intermediaria", "UF", "sigla"],
    ];
    paths
        .iter()
        .find_map(|path| {
            path.iter()
                .try_fold(city, |node, key| node.get(*key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("")
        .to_string()
}

/// Filters an IBGE municipality list by case-insensitive substring of the
/// name, keeping at most `limit` matches. Malformed entries are skipped.
pub fn filter_cities(all: &Value, term: &str, limit: usize) -> Result<Vec<CityMatch>, LookupError> {
    let list = all
        .as_array()
        .ok_or_else(|| LookupError::Network("unexpected city list format".into()))?;
    let term = term.trim().to_lowercase();
    Ok(list
        .iter()
        .filter_map(|city| {
            let name = city.get("nome")?.as_str()?;
            if !name.to_lowercase().contains(&term) {
                return None;
            }
            Some(CityMatch {
                id: city.get("id").and_then(Value::as_u64).unwrap_or(0),
                name: name.to_string(),
                state: state_acronym(city),
            })
        })
        .take(limit)
        .collect())
}

/// Form fields after a postal-code lookup. On failure every dependent field
/// is cleared and `notice` says why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressFill {
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub notice: Option<String>,
}

impl AddressFill {
    pub fn cleared(notice: impl Into<String>) -> Self {
        AddressFill {
            notice: Some(notice.into()),
            ..Default::default()
        }
    }
}

impl From<Result<Address, LookupError>> for AddressFill {
    fn from(result: Result<Address, LookupError>) -> Self {
        match result {
            Ok(address) => AddressFill {
                neighborhood: address.neighborhood,
                city: if address.state.is_empty() || address.city.is_empty() {
                    address.city
                } else {
                    format!("{} - {}", address.city, address.state)
                },
                state: address.state,
                notice: None,
            },
            Err(LookupError::NotFound(_)) => {
                AddressFill::cleared("CEP não encontrado. Por favor, verifique o CEP digitado.")
            }
            Err(LookupError::InvalidInput(_)) => AddressFill::cleared("CEP deve ter 8 dígitos."),
            Err(_) => {
                AddressFill::cleared("Não foi possível buscar o endereço. Tente novamente.")
            }
        }
    }
}

static NEIGHBORHOODS: &[(&str, &[&str])] = &[
    (
        "São Paulo - SP",
        &[
            "Jardins",
            "Moema",
            "Itaim Bibi",
            "Vila Olímpia",
            "Pinheiros",
            "Vila Madalena",
            "Bela Vista",
            "Consolação",
            "Paraíso",
            "Vila Mariana",
        ],
    ),
    (
        "Rio de Janeiro - RJ",
        &[
            "Copacabana",
            "Ipanema",
            "Leblon",
            "Barra da Tijuca",
            "Botafogo",
            "Flamengo",
            "Laranjeiras",
            "Tijuca",
            "Jardim Botânico",
            "Gávea",
        ],
    ),
    (
        "Belo Horizonte - MG",
        &[
            "Savassi",
            "Lourdes",
            "Funcionários",
            "Santo Antônio",
            "Sion",
            "Cidade Nova",
            "Coração Eucarístico",
            "Gutierrez",
            "São Pedro",
            "Santa Efigênia",
        ],
    ),
    (
        "Porto Alegre - RS",
        &[
            "Moinhos de Vento",
            "Bela Vista",
            "Petrópolis",
            "Bom Fim",
            "Tristeza",
            "Menino Deus",
            "Cidade Baixa",
            "Rio Branco",
            "Auxiliadora",
        ],
    ),
    (
        "Salvador - BA",
        &[
            "Barra",
            "Ondina",
            "Pituba",
            "Rio Vermelho",
            "Stella Maris",
            "Itaigara",
            "Caminho das Árvores",
            "Horto Florestal",
            "Graça",
            "Garcia",
        ],
    ),
];

fn city_name(label: &str) -> &str {
    label.split(" - ").next().unwrap_or(label).trim()
}

/// Neighbourhoods of the catalogue city whose name starts like `city`,
/// filtered by a case-insensitive substring of `term`.
pub fn suggest_neighborhoods(city: &str, term: &str, min_chars: usize) -> Vec<&'static str> {
    let term = term.trim().to_lowercase();
    let city = city_name(city).to_lowercase();
    if term.chars().count() < min_chars || city.is_empty() {
        return Vec::new();
    }
    NEIGHBORHOODS
        .iter()
        .find(|(label, _)| city_name(label).to_lowercase().starts_with(&city))
        .map(|(_, names)| {
            names
                .iter()
                .copied()
                .filter(|n| n.to_lowercase().contains(&term))
                .collect()
        })
        .unwrap_or_default()
}

/// A numbered request issued for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    client: String,
    seq: u64,
}

/// Hands out increasing sequence numbers so that a response to an older
/// request from the same client can be recognised and dropped. Only clients
/// with a request in progress are tracked.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

/// Forgets the client once its newest request is done, however it ends.
#[cfg(feature = "web")]
struct InFlight<'s> {
    sequencer: &'s RequestSequencer,
    ticket: Ticket,
}

#[cfg(feature = "web")]
impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.sequencer.finish(&self.ticket);
    }
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, client: &str) -> Ticket {
        // Numbers are global so a client that was forgotten never reuses one.
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.insert(client.to_string(), seq);
        Ticket {
            client: client.to_string(),
            seq,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.get(&ticket.client) == Some(&ticket.seq)
    }

    pub fn check(&self, ticket: &Ticket) -> Result<(), LookupError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            debug!("Dropping superseded lookup #{} for {}", ticket.seq, ticket.client);
            Err(LookupError::Superseded)
        }
    }

    /// Stops tracking the client if `ticket` is still its newest request.
    pub fn finish(&self, ticket: &Ticket) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if latest.get(&ticket.client) == Some(&ticket.seq) {
            latest.remove(&ticket.client);
        }
    }

    /// Clients with a request in progress.
    pub fn pending(&self) -> usize {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Waits `delay`, then runs `lookup` unless a newer request from the same
    /// client arrived in the meantime. A result that resolves after a newer
    /// request was issued is discarded too.
    #[cfg(feature = "web")]
    pub async fn debounced<T, F>(
        &self,
        client: &str,
        delay: std::time::Duration,
        lookup: F,
    ) -> Result<T, LookupError>
    where
        F: std::future::Future<Output = Result<T, LookupError>>,
    {
        let guard = InFlight {
            sequencer: self,
            ticket: self.issue(client),
        };
        tokio::time::sleep(delay).await;
        self.check(&guard.ticket)?;
        let result = lookup.await;
        self.check(&guard.ticket)?;
        result
    }
}

#[cfg(feature = "web")]
pub use http::HttpLookup;

#[cfg(feature = "web")]
mod http {
    use super::*;
    use crate::config::LookupConfig;
    use log::warn;
    use std::time::Duration;

    /// ViaCEP and IBGE over HTTP.
    #[derive(Clone)]
    pub struct HttpLookup {
        client: reqwest::Client,
        postal_code_url: String,
        cities_url: String,
        min_city_chars: usize,
        max_cities: usize,
    }

    impl HttpLookup {
        pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| LookupError::Network(e.to_string()))?;
            Ok(HttpLookup {
                client,
                postal_code_url: config.postal_code_url.trim_end_matches('/').to_string(),
                cities_url: config.cities_url.clone(),
                min_city_chars: config.min_city_chars,
                max_cities: config.max_cities,
            })
        }

        async fn get_json(&self, url: &str) -> Result<Value, LookupError> {
            let resp = self.client.get(url).send().await.map_err(|e| {
                warn!("Lookup request to {url} failed: {e}");
                LookupError::Network(e.to_string())
            })?;
            if !resp.status().is_success() {
                warn!("Lookup request to {url} answered {}", resp.status());
                return Err(LookupError::Network(format!("HTTP {}", resp.status())));
            }
            resp.json()
                .await
                .map_err(|e| LookupError::Network(e.to_string()))
        }
    }

    #[async_trait]
    impl AddressLookup for HttpLookup {
        async fn resolve_postal_code(&self, cep: &str) -> Result<Address, LookupError> {
            let cep = checked_postal_code(cep)?;
            let url = format!("{}/{}/json/", self.postal_code_url, cep);
            let body = self.get_json(&url).await?;
            parse_postal_code_response(&cep, &body)
        }

        async fn search_cities(&self, term: &str) -> Result<Vec<CityMatch>, LookupError> {
            if term.trim().chars().count() < self.min_city_chars {
                return Ok(Vec::new());
            }
            let all = self.get_json(&self.cities_url).await?;
            filter_cities(&all, term, self.max_cities)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn viacep_error_flag_means_not_found() {
        let body = json!({ "erro": true });
        assert_eq!(
            parse_postal_code_response("00000000", &body),
            Err(LookupError::NotFound("00000000".into()))
        );
        let body = json!({ "erro": "true" });
        assert!(parse_postal_code_response("00000000", &body).is_err());
    }

    #[test]
    fn viacep_fields_are_mapped() {
        let body = json!({
            "cep": "01310-100",
            "bairro": "Bela Vista",
            "localidade": "São Paulo",
            "uf": "SP"
        });
        let address = parse_postal_code_response("01310100", &body).unwrap();
        assert_eq!(address.neighborhood, "Bela Vista");
        assert_eq!(address.city, "São Paulo");
        assert_eq!(address.state, "SP");

        let fill = AddressFill::from(Ok(address));
        assert_eq!(fill.city, "São Paulo - SP");
        assert!(fill.notice.is_none());
    }

    #[test]
    fn failures_clear_dependent_fields() {
        for err in [
            LookupError::NotFound("x".into()),
            LookupError::Network("timeout".into()),
            LookupError::InvalidInput("short".into()),
        ] {
            let fill = AddressFill::from(Err(err));
            assert!(fill.neighborhood.is_empty());
            assert!(fill.city.is_empty());
            assert!(fill.notice.is_some());
        }
    }

    #[test]
    fn postal_code_must_have_eight_digits() {
        assert_eq!(checked_postal_code("01310-100").unwrap(), "01310100");
        assert!(matches!(
            checked_postal_code("0131"),
            Err(LookupError::InvalidInput(_))
        ));
    }

    #[test]
    fn ibge_state_comes_from_any_known_path() {
        let all = json!([
            { "id": 1, "nome": "Campinas",
              "microrregiao": { "mesorregiao": { "UF": { "sigla": "SP" } } } },
            { "id": 2, "nome": "Campina Grande", "uf": { "sigla": "PB" } },
            { "id": 3, "nome": "Campinápolis",
              "regiao-imediata": { "regiao-intermediaria": { "UF": { "sigla": "MT" } } } },
            { "id": 4, "nome": "Recife" },
            { "id": 5 }
        ]);
        let found = filter_cities(&all, "CAMPIN", 10).unwrap();
        let labels: Vec<_> = found.iter().map(format_city).collect();
        assert_eq!(
            labels,
            ["Campinas - SP", "Campina Grande - PB", "Campinápolis - MT"]
        );
        assert_eq!(filter_cities(&all, "campin", 2).unwrap().len(), 2);
        assert!(filter_cities(&json!({}), "x", 10).is_err());
    }

    #[test]
    fn neighborhoods_match_city_prefix_and_term() {
        assert_eq!(
            suggest_neighborhoods("São Paulo - SP", "vila", 2),
            ["Vila Olímpia", "Vila Madalena", "Vila Mariana"]
        );
        assert_eq!(suggest_neighborhoods("Rio", "bo", 2), ["Botafogo", "Jardim Botânico"]);
        assert!(suggest_neighborhoods("Salvador - BA", "b", 2).is_empty());
        assert!(suggest_neighborhoods("Curitiba - PR", "centro", 2).is_empty());
    }

    #[test]
    fn sequencer_only_honours_latest_ticket() {
        let seq = RequestSequencer::new();
        let first = seq.issue("form-1");
        let other_client = seq.issue("form-2");
        assert!(seq.is_current(&first));
        let second = seq.issue("form-1");
        assert!(!seq.is_current(&first));
        assert_eq!(seq.check(&first), Err(LookupError::Superseded));
        assert!(seq.is_current(&second));
        assert!(seq.is_current(&other_client));
    }

    #[cfg(feature = "web")]
    #[tokio::test(start_paused = true)]
    async fn debounce_drops_superseded_requests() {
        use std::sync::Arc;
        use std::time::Duration;

        let seq = Arc::new(RequestSequencer::new());
        let early = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.debounced("c", Duration::from_millis(500), async { Ok::<_, LookupError>(1) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let late = seq
            .debounced("c", Duration::from_millis(500), async { Ok::<_, LookupError>(2) })
            .await;

        assert_eq!(early.await.unwrap(), Err(LookupError::Superseded));
        assert_eq!(late, Ok(2));
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn finished_clients_are_forgotten() {
        let seq = RequestSequencer::new();
        let tickets: Vec<Ticket> = (0..100).map(|i| seq.issue(&format!("tab-{i}"))).collect();
        assert_eq!(seq.pending(), 100);

        let stale = seq.issue("tab-0");
        seq.finish(&tickets[0]);
        assert_eq!(seq.pending(), 100, "an outdated ticket leaves the newer one tracked");
        seq.finish(&stale);
        for ticket in &tickets[1..] {
            seq.finish(ticket);
        }
        assert_eq!(seq.pending(), 0);

        // A returning client never gets a number an old ticket still holds.
        let fresh = seq.issue("tab-0");
        assert!(!seq.is_current(&tickets[0]));
        assert!(seq.is_current(&fresh));
    }

    #[cfg(feature = "web")]
    #[tokio::test(start_paused = true)]
    async fn abandoned_lookup_is_forgotten() {
        use std::time::Duration;

        let seq = RequestSequencer::new();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            seq.debounced("gone", Duration::from_millis(500), async { Ok::<_, LookupError>(()) }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(seq.pending(), 0);
    }
}
