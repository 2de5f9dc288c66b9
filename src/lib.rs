/*!
# Visitor Hub

Visitor registration and reporting backend for a church community, built in Rust.

## Overview

Volunteers register visitors and small groups ("células") through web forms. The
dashboard lists and filters registrants, and the report page turns the same flat
record set into monthly metrics, charts, month-over-month comparisons and a map
of where visitors live.

## Architecture

### Presentation Layer
- Static HTML/JS served from `server.static_dir`
- Renders the JSON view-models returned by the API as tables, cards, charts and a map

### Backend Layer
- **Technologies**: Rust, axum, tokio
- **Core Components**:
  - Aggregation Engine - Pure functions over a record snapshot (`dataset`, `period`,
    `buckets`, `metrics`, `geo`, `filter`)
  - View-models - Dashboard and report assembled from the engine (`report`)
  - Record Store - Async trait with file, in-memory and remote implementations
  - Address Lookup - Postal code and city search with debounced, sequenced requests
  - Form Settings - Custom registration fields and general switches

### Data Persistence Layer
- JSON files under `store.data_dir`, or a remote REST table
- Gzip-compressed bincode backups (`.bin.gz`)
- CSV and XLSX exports

## Design Highlights

- Every view is computed from a fresh snapshot; a failed fetch degrades to an
  empty set carrying the error message
- Dates are bucketed on one configured local calendar
- Malformed records are skipped per bucket instead of failing the whole report

## Modules

- **visitor**: Visitor and cell records, form input and validation
- **period**: Month selection and week folding
- **dataset**: Records indexed by local registration time
- **buckets**: Daily, weekly, monthly and age-bracket counts
- **metrics**: Dashboard stats, growth, retention and comparisons
- **geo**: Location grouping, distances and the map view
- **filter**: Dashboard search and filters
- **report**: Dashboard and report view-models
- **store**: Record store trait and local implementations
- **remote**: REST-backed record store
- **lookup**: Postal code, city and neighbourhood lookup
- **settings**: Registration form configuration
- **saving**: Backup persistence with compression
- **downloader**: Export functionality (CSV, XLSX)
- **graph**: Chart rendering
- **config**: Configuration file and environment overrides
- **error**: HTTP error mapping
- **app**: Routing and middleware

## REST API Endpoints

- `GET /api/dashboard` - Stats cards and the filtered visitor list
- `GET|POST /api/visitors`, `GET|PUT|DELETE /api/visitors/:id` - Visitor CRUD
- `POST /api/visitors/:id/visit` - Records a repeat visit
- `GET|POST /api/cells` - Small groups
- `GET /api/report?month=&year=&filter=` - Monthly report (month is zero-based)
- `GET /api/report/chart/:kind` - PNG chart (`daily`, `weekly`, `monthly`, `age`)
- `GET /api/export/{csv,xlsx,backup}`, `POST /api/import/backup` - Export and restore
- `GET /api/lookup/cep/:cep`, `/api/lookup/cities`, `/api/lookup/neighborhoods` - Address lookup
- `GET|PUT /api/settings`, `PUT /api/settings/fields`, `DELETE /api/settings/fields/:name` - Form settings
*/

pub mod buckets;
pub mod config;
pub mod dataset;
pub mod downloader;
pub mod filter;
pub mod geo;
pub mod lookup;
pub mod metrics;
pub mod period;
pub mod report;
pub mod saving;
pub mod settings;
pub mod store;
pub mod visitor;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod remote;

pub use dataset::Dataset;
pub use period::Period;
pub use store::{RecordStore, Snapshot};
pub use visitor::{VisitorRecord, VisitorStatus};
