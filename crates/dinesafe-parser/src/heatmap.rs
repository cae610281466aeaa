use std::collections::HashMap;

use serde::Serialize;

use crate::dataset::Dataset;
use crate::errors::FormatError;
use crate::schema;
use crate::summary::ranked_counts;

/// One mapped location: every inspection row sharing coordinates, name and
/// address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub establishment_name: String,
    pub establishment_address: String,
    pub inspection_count: usize,
    /// Sorted by descending count, then by severity.
    pub severity_counts: Vec<(String, usize)>,
    /// Status of the first row in the group.
    pub status: String,
}

struct Group<'a> {
    latitude: f64,
    longitude: f64,
    name: &'a str,
    address: &'a str,
    status: &'a str,
    severities: Vec<&'a str>,
}

/// Groups located rows into map points, busiest first. Rows missing a
/// coordinate, name or address are left out. Equal counts keep the order in
/// which their locations first appear.
pub fn heatmap_points(dataset: &Dataset) -> Result<Vec<HeatmapPoint>, FormatError> {
    let df = dataset.frame();
    let latitude = df.column(schema::LATITUDE)?.f64()?;
    let longitude = df.column(schema::LONGITUDE)?.f64()?;
    let name = df.column(schema::ESTABLISHMENT_NAME)?.str()?;
    let address = df.column(schema::ESTABLISHMENT_ADDRESS)?.str()?;
    let status = df.column(schema::ESTABLISHMENT_STATUS)?.str()?;
    let severity = df.column(schema::SEVERITY)?.str()?;

    let mut index: HashMap<(u64, u64, &str, &str), usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for idx in 0..df.height() {
        let (Some(lat), Some(lon), Some(row_name), Some(row_address)) = (
            latitude.get(idx),
            longitude.get(idx),
            name.get(idx),
            address.get(idx),
        ) else {
            continue;
        };
        let key = (lat.to_bits(), lon.to_bits(), row_name, row_address);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                latitude: lat,
                longitude: lon,
                name: row_name,
                address: row_address,
                status: status.get(idx).unwrap_or_default(),
                severities: Vec::new(),
            });
            groups.len() - 1
        });
        if let Some(value) = severity.get(idx) {
            groups[slot].severities.push(value);
        }
    }

    let mut points: Vec<HeatmapPoint> = groups
        .into_iter()
        .map(|group| HeatmapPoint {
            latitude: group.latitude,
            longitude: group.longitude,
            establishment_name: group.name.to_string(),
            establishment_address: group.address.to_string(),
            inspection_count: group.severities.len(),
            severity_counts: ranked_counts(group.severities),
            status: group.status.to_string(),
        })
        .collect();
    points.sort_by(|a, b| b.inspection_count.cmp(&a.inspection_count));
    Ok(points)
}
