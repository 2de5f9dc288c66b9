use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dataset::Dataset;
use crate::downloader;
use crate::error::{AppError, StatusResponse};
use crate::filter::VisitorFilters;
use crate::geo::{MapFilter, haversine_km};
use crate::graph::{ChartKind, ChartOptions, render_chart};
use crate::lookup::{
    AddressFill, AddressLookup, LookupError, RequestSequencer, format_city, suggest_neighborhoods,
};
use crate::metrics::round1;
use crate::period::Period;
use crate::report::{ReportRequest, dashboard_view, report_view};
use crate::saving::{self, BACKUP_FILE_NAME};
use crate::settings::{FormField, FormSettings, SettingsStore};
use crate::store::{RecordStore, insert_visitor, load_snapshot};
use crate::visitor::{CellForm, VisitorForm, VisitorRecord};

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub lookup: Arc<dyn AddressLookup>,
    pub sequencer: RequestSequencer,
    pub settings: SettingsStore,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        lookup: Arc<dyn AddressLookup>,
        settings: SettingsStore,
        config: Config,
    ) -> Self {
        AppState {
            store,
            lookup,
            sequencer: RequestSequencer::new(),
            settings,
            config,
        }
    }

    /// Distance from the church, when the visitor was geocoded.
    fn locate(&self, record: &mut VisitorRecord) {
        let church = self.config.report.church.coordinates();
        record.distance = record
            .coordinates()
            .map(|point| round1(haversine_km(church, point)));
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReportQuery {
    month: Option<u32>,
    year: Option<i32>,
    filter: MapFilter,
}

#[derive(Deserialize)]
struct CityQuery {
    term: String,
    client: Option<String>,
}

#[derive(Deserialize)]
struct NeighborhoodQuery {
    city: String,
    term: String,
    client: Option<String>,
}

#[derive(Serialize)]
struct CitySuggestion {
    id: u64,
    name: String,
    state: String,
    label: String,
}

#[derive(Serialize)]
struct Suggestions<T> {
    suggestions: Vec<T>,
    notice: Option<String>,
}

/// Builds the router with every API route, request tracing and the static
/// presentation files as fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        .route("/api/health", get(health))
        .route("/api/dashboard", get(dashboard))
        .route("/api/visitors", get(list_visitors).post(create_visitor))
        .route(
            "/api/visitors/:id",
            get(get_visitor).put(update_visitor).delete(delete_visitor),
        )
        .route("/api/visitors/:id/visit", post(register_visit))
        .route("/api/cells", get(list_cells).post(create_cell))
        .route("/api/report", get(report))
        .route("/api/report/chart/:kind", get(chart))
        .route("/api/export/csv", get(export_csv))
        .route("/api/export/xlsx", get(export_xlsx))
        .route("/api/export/backup", get(export_backup))
        .route("/api/import/backup", post(import_backup))
        .route("/api/lookup/cep/:cep", get(lookup_postal_code))
        .route("/api/lookup/cities", get(lookup_cities))
        .route("/api/lookup/neighborhoods", get(lookup_neighborhoods))
        .route("/api/settings", get(get_settings).put(replace_settings))
        .route("/api/settings/fields", put(upsert_field))
        .route("/api/settings/fields/:name", delete(remove_field))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!(
        "{}:{}",
        state.config.server.bind, state.config.server.port
    );
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn dashboard(
    Query(filters): Query<VisitorFilters>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let snapshot = load_snapshot(state.store.as_ref()).await;
    let local = state.config.report.local_offset();
    Json(dashboard_view(&snapshot, &filters, Utc::now(), local))
}

async fn list_visitors(
    Query(filters): Query<VisitorFilters>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VisitorRecord>>, AppError> {
    let records = state.store.fetch_all().await?;
    Ok(Json(filters.apply(&records).into_iter().cloned().collect()))
}

async fn create_visitor(
    State(state): State<Arc<AppState>>,
    Json(form): Json<VisitorForm>,
) -> Result<impl IntoResponse, AppError> {
    let settings = state.settings.get();
    settings.validate_extra(&form.extra)?;

    let mut record = form.into_new_record(Utc::now())?;
    state.locate(&mut record);
    let stored = insert_visitor(
        state.store.as_ref(),
        record,
        settings.general.allow_duplicates,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

async fn get_visitor(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<VisitorRecord>, AppError> {
    Ok(Json(state.store.fetch_one(&id).await?))
}

async fn update_visitor(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(form): Json<VisitorForm>,
) -> Result<Json<VisitorRecord>, AppError> {
    state.settings.get().validate_extra(&form.extra)?;

    let mut record = state.store.fetch_one(&id).await?;
    form.apply_to(&mut record)?;
    state.locate(&mut record);
    Ok(Json(state.store.update(&id, record).await?))
}

async fn delete_visitor(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    state.store.delete(&id).await?;
    Ok(Json(StatusResponse::ok("Visitante excluído")))
}

async fn register_visit(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<VisitorRecord>, AppError> {
    let record = state.store.record_visit(&id).await?;
    info!("Visit #{} recorded for {id}", record.visit_count);
    Ok(Json(record))
}

async fn list_cells(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.store.fetch_cells().await?))
}

async fn create_cell(
    State(state): State<Arc<AppState>>,
    Json(form): Json<CellForm>,
) -> Result<impl IntoResponse, AppError> {
    let cell = state.store.insert_cell(form.into_cell(Utc::now())?).await?;
    info!("Registered cell led by {}", cell.leader_name);
    Ok((StatusCode::CREATED, Json(cell)))
}

fn selected_period(state: &AppState, query: &ReportQuery) -> Result<Period, AppError> {
    let local = state.config.report.local_offset();
    let current = Period::of(&Utc::now().with_timezone(&local));
    let year = query.year.unwrap_or(current.year);
    let month = query.month.unwrap_or(current.month);
    Period::new(year, month)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid month {month}, expected 0-11")))
}

async fn report(
    Query(query): Query<ReportQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let period = selected_period(&state, &query)?;
    let snapshot = load_snapshot(state.store.as_ref()).await;
    let report = &state.config.report;

    Ok(Json(report_view(
        &snapshot,
        ReportRequest {
            period,
            map_filter: query.filter,
            church: &report.church,
            influence_radius_km: report.influence_radius_km,
            local: report.local_offset(),
        },
    )))
}

async fn chart(
    Path(kind): Path<String>,
    Query(query): Query<ReportQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, AppError> {
    let kind: ChartKind = kind.parse().map_err(AppError::BadRequest)?;
    let period = selected_period(&state, &query)?;
    let local = state.config.report.local_offset();
    let snapshot = load_snapshot(state.store.as_ref()).await;

    // plotters draws synchronously
    let png = tokio::task::spawn_blocking(move || {
        let data = Dataset::new(&snapshot.records, local);
        render_chart(kind, &data, period, &ChartOptions::default()).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map_err(AppError::Internal)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let records = state.store.fetch_all().await?;
    let csv = downloader::to_csv(&records, state.config.report.local_offset());
    Ok(attachment(
        "text/csv; charset=utf-8",
        "visitantes.csv",
        csv.into_bytes(),
    ))
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let records = state.store.fetch_all().await?;
    let xlsx = downloader::to_xlsx(&records, state.config.report.local_offset())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "visitantes.xlsx",
        xlsx,
    ))
}

async fn export_backup(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let records = state.store.fetch_all().await?;
    let backup =
        saving::backup_to_memory(&records).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(attachment("application/gzip", BACKUP_FILE_NAME, backup))
}

async fn import_backup(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<StatusResponse>, AppError> {
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("backup") {
            file_data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?
                .to_vec();
        }
    }

    if file_data.is_empty() {
        return Err(AppError::BadRequest("No file data received".to_string()));
    }

    let records = saving::backup_from_memory(&file_data)
        .map_err(|e| AppError::BadRequest(format!("Failed to read backup: {e}")))?;
    let imported = state.store.import(records).await?;
    info!("Imported {imported} visitors from backup");

    Ok(Json(StatusResponse::ok(format!(
        "{imported} visitantes importados"
    ))))
}

async fn lookup_postal_code(
    Path(cep): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = state.lookup.resolve_postal_code(&cep).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(LookupError::NotFound(_)) => StatusCode::NOT_FOUND,
        Err(LookupError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::BAD_GATEWAY,
    };
    if let Err(e) = &result {
        warn!("Postal code lookup for {cep} failed: {e}");
    }
    (status, Json(AddressFill::from(result)))
}

async fn lookup_cities(
    Query(query): Query<CityQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Suggestions<CitySuggestion>>, AppError> {
    let client = query.client.as_deref().unwrap_or("anonymous");
    let delay = Duration::from_millis(state.config.lookup.city_debounce_ms);
    let result = state
        .sequencer
        .debounced(
            &format!("{client}/cidade"),
            delay,
            state.lookup.search_cities(&query.term),
        )
        .await;

    match result {
        Ok(cities) => Ok(Json(Suggestions {
            suggestions: cities
                .into_iter()
                .map(|city| CitySuggestion {
                    label: format_city(&city),
                    id: city.id,
                    name: city.name,
                    state: city.state,
                })
                .collect(),
            notice: None,
        })),
        Err(LookupError::Superseded) => Err(LookupError::Superseded.into()),
        Err(e) => {
            warn!("City search for {:?} failed: {e}", query.term);
            Ok(Json(Suggestions {
                suggestions: Vec::new(),
                notice: Some("Não foi possível buscar cidades. Tente novamente.".to_string()),
            }))
        }
    }
}

async fn lookup_neighborhoods(
    Query(query): Query<NeighborhoodQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Suggestions<&'static str>>, AppError> {
    let client = query.client.as_deref().unwrap_or("anonymous");
    let lookup = &state.config.lookup;
    let suggestions = state
        .sequencer
        .debounced(
            &format!("{client}/bairro"),
            Duration::from_millis(lookup.neighborhood_debounce_ms),
            async {
                Ok(suggest_neighborhoods(
                    &query.city,
                    &query.term,
                    lookup.min_neighborhood_chars,
                ))
            },
        )
        .await?;

    Ok(Json(Suggestions {
        suggestions,
        notice: None,
    }))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<FormSettings> {
    Json(state.settings.get())
}

async fn replace_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<FormSettings>,
) -> Result<Json<FormSettings>, AppError> {
    Ok(Json(state.settings.replace(settings)?))
}

async fn upsert_field(
    State(state): State<Arc<AppState>>,
    Json(field): Json<FormField>,
) -> Result<Json<FormField>, AppError> {
    Ok(Json(state.settings.upsert_field(field)?))
}

async fn remove_field(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    state.settings.remove_field(&name)?;
    Ok(Json(StatusResponse::ok(format!("Campo {name} removido"))))
}
