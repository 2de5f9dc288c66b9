//! Geographic grouping of visitors and the map view built on top of it.

use crate::metrics::round1;
use crate::visitor::VisitorRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MARKER_BASE_PX: f64 = 24.0;

/// Where distances on the map are measured from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurchLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Default for ChurchLocation {
    fn default() -> Self {
        ChurchLocation {
            name: "Igreja".to_string(),
            lat: -23.5505,
            lng: -46.6333,
        }
    }
}

impl ChurchLocation {
    pub fn coordinates(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Great-circle distance between two `(lat, lng)` points in kilometres.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Marker size in pixels for a group of `weight` visitors.
pub fn marker_radius(weight: usize) -> f64 {
    (0.8 + weight as f64 / 10.0).min(1.2) * MARKER_BASE_PX
}

/// Visitors sharing a neighbourhood, city and state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoGroup {
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub count: usize,
    pub new_visitors: usize,
    pub recurring: usize,
    /// Taken from the first member that has usable coordinates.
    pub coordinates: Option<(f64, f64)>,
}

impl GeoGroup {
    pub fn label(&self) -> String {
        match (self.neighborhood.is_empty(), self.city.is_empty()) {
            (false, false) => format!("{}, {}", self.neighborhood, self.city),
            (false, true) => self.neighborhood.clone(),
            _ => self.city.clone(),
        }
    }
}

fn group_key(record: &VisitorRecord) -> Option<(String, String, String)> {
    let neighborhood = record.neighborhood().unwrap_or("");
    let city = record.city().unwrap_or("");
    if neighborhood.is_empty() && city.is_empty() {
        return None;
    }
    let state = record.state().unwrap_or("");
    Some((
        neighborhood.to_lowercase(),
        city.to_lowercase(),
        state.to_lowercase(),
    ))
}

/// Groups records by case-insensitive `(neighborhood, city, state)`, in
/// order of first appearance. Records with neither neighbourhood nor city
/// are left out.
pub fn group_by_location<'r, I>(records: I) -> Vec<GeoGroup>
where
    I: IntoIterator<Item = &'r VisitorRecord>,
{
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut groups: Vec<GeoGroup> = Vec::new();

    for record in records {
        let Some(key) = group_key(record) else {
            continue;
        };
        let idx = *index.entry(key).or_insert_with(|| {
            groups.push(GeoGroup {
                neighborhood: record.neighborhood().unwrap_or("").to_string(),
                city: record.city().unwrap_or("").to_string(),
                state: record.state().unwrap_or("").to_string(),
                count: 0,
                new_visitors: 0,
                recurring: 0,
                coordinates: None,
            });
            groups.len() - 1
        });

        let group = &mut groups[idx];
        group.count += 1;
        if record.is_new_visitor {
            group.new_visitors += 1;
        } else {
            group.recurring += 1;
        }
        if group.coordinates.is_none() {
            group.coordinates = record.coordinates();
        }
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapFilter {
    #[default]
    All,
    New,
    Recurring,
}

impl MapFilter {
    pub fn matches(self, record: &VisitorRecord) -> bool {
        match self {
            MapFilter::All => true,
            MapFilter::New => record.is_new_visitor,
            MapFilter::Recurring => !record.is_new_visitor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    pub weight: usize,
    pub radius: f64,
    pub distance_km: f64,
    pub new_visitors: usize,
    pub recurring: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSummary {
    pub total: usize,
    pub new_visitors: usize,
    pub recurring: usize,
    /// Visitors with usable coordinates.
    pub mapped: usize,
    pub within_radius: usize,
    pub average_distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub church: ChurchLocation,
    pub filter: MapFilter,
    pub markers: Vec<MapMarker>,
    pub groups: Vec<GeoGroup>,
    pub summary: MapSummary,
}

pub fn map_view<'r, I>(
    records: I,
    filter: MapFilter,
    church: &ChurchLocation,
    influence_radius_km: f64,
) -> MapView
where
    I: IntoIterator<Item = &'r VisitorRecord>,
{
    let visible: Vec<&VisitorRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    let origin = church.coordinates();

    let distances: Vec<f64> = visible
        .iter()
        .filter_map(|r| r.coordinates())
        .map(|point| haversine_km(origin, point))
        .collect();
    let average_distance_km = if distances.is_empty() {
        0.0
    } else {
        round1(distances.iter().sum::<f64>() / distances.len() as f64)
    };

    let groups = group_by_location(visible.iter().copied());
    let markers = groups
        .iter()
        .filter_map(|group| {
            let (lat, lng) = group.coordinates?;
            Some(MapMarker {
                label: group.label(),
                lat,
                lng,
                weight: group.count,
                radius: marker_radius(group.count),
                distance_km: round1(haversine_km(origin, (lat, lng))),
                new_visitors: group.new_visitors,
                recurring: group.recurring,
            })
        })
        .collect();

    let new_visitors = visible.iter().filter(|r| r.is_new_visitor).count();
    MapView {
        church: church.clone(),
        filter,
        markers,
        summary: MapSummary {
            total: visible.len(),
            new_visitors,
            recurring: visible.len() - new_visitors,
            mapped: distances.len(),
            within_radius: distances.iter().filter(|d| **d <= influence_radius_km).count(),
            average_distance_km,
        },
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::record;

    fn located(id: &str, bairro: &str, cidade: &str, coords: Option<(f64, f64)>) -> VisitorRecord {
        let mut r = record(id, "2024-03-01T10:00:00Z", 1);
        r.metadata.bairro = Some(bairro.to_string());
        r.metadata.cidade = Some(cidade.to_string());
        if let Some((lat, lng)) = coords {
            r.lat = Some(lat);
            r.lng = Some(lng);
        }
        r
    }

    #[test]
    fn haversine_known_distance() {
        // São Paulo to Rio de Janeiro is roughly 360 km.
        let d = haversine_km((-23.5505, -46.6333), (-22.9068, -43.1729));
        assert!((d - 360.0).abs() < 10.0, "got {d}");
        assert_eq!(haversine_km((1.0, 1.0), (1.0, 1.0)), 0.0);
    }

    #[test]
    fn marker_radius_is_capped() {
        assert!((marker_radius(1) - 0.9 * 24.0).abs() < 1e-9);
        assert!((marker_radius(4) - 1.2 * 24.0).abs() < 1e-9);
        assert!((marker_radius(50) - 1.2 * 24.0).abs() < 1e-9);
    }

    #[test]
    fn groups_are_case_insensitive_and_keep_first_coordinate() {
        let records = vec![
            located("a", "Centro", "São Paulo - SP", None),
            located("b", "centro", "SÃO PAULO - SP", Some((-23.54, -46.63))),
            located("c", "CENTRO", "são paulo - sp", Some((-23.0, -46.0))),
            located("d", "Lapa", "São Paulo - SP", Some((-23.52, -46.70))),
        ];
        let groups = group_by_location(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].neighborhood, "Centro");
        assert_eq!(groups[0].state, "SP");
        assert_eq!(groups[0].coordinates, Some((-23.54, -46.63)));
    }

    #[test]
    fn records_without_location_are_not_grouped() {
        let records = vec![record("a", "2024-03-01T10:00:00Z", 1)];
        assert!(group_by_location(&records).is_empty());
    }

    #[test]
    fn unmapped_groups_stay_in_table_but_not_on_map() {
        let church = ChurchLocation::default();
        let mut records = vec![
            located("a", "Centro", "São Paulo - SP", Some((0.0, 0.0))),
            located("b", "Lapa", "São Paulo - SP", Some((-23.52, -46.70))),
        ];
        records[1].is_new_visitor = false;

        let view = map_view(&records, MapFilter::All, &church, 5.0);
        assert_eq!(view.groups.len(), 2);
        assert_eq!(view.markers.len(), 1);
        assert_eq!(view.summary.total, 2);
        assert_eq!(view.summary.mapped, 1);
        assert_eq!(view.summary.recurring, 1);
        assert!(view.summary.average_distance_km > 0.0);

        let only_new = map_view(&records, MapFilter::New, &church, 5.0);
        assert_eq!(only_new.summary.total, 1);
        assert!(only_new.markers.is_empty());
        assert_eq!(only_new.summary.average_distance_km, 0.0);
    }
}
