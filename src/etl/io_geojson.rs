use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde_json::json;
use std::fs;

use electoral_results::geometry::{Circuit, Seccional};

use crate::etl::io_common::write_text_file;
use crate::etl::*;

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

fn property_label(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // Integral floats (`2.0`) are common in shapefile exports.
        JsonValue::Number(n) => n.as_f64().and_then(|f| RawCell::Number(f).as_text()),
        _ => None,
    }
}

fn feature_geometry(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let value = &feature.geometry.as_ref()?.value;
    match geo::Geometry::<f64>::try_from(value) {
        Ok(geo::Geometry::Polygon(p)) => Some(MultiPolygon::new(vec![p])),
        Ok(geo::Geometry::MultiPolygon(mp)) => Some(mp),
        _ => None,
    }
}

/// Reads the circuit boundaries.
///
/// Features without the seccional property or without a polygonal geometry
/// are skipped with a warning.
pub fn read_circuits(path: &Path, property: &str) -> EtlResult<Vec<Circuit>> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    let gj = contents
        .parse::<GeoJson>()
        .context(ParsingGeoJsonSnafu { path: p.clone() })?;
    let features = match gj {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => whatever!("{} holds a bare geometry, not features", p),
    };

    let mut res: Vec<Circuit> = Vec::new();
    for (idx, feature) in features.iter().enumerate() {
        let name = feature
            .property("Circuito")
            .or_else(|| feature.property("circuito"))
            .and_then(property_label);
        let label = match feature.property(property).and_then(property_label) {
            Some(l) => l,
            None => {
                warn!(
                    "read_circuits: feature {} has no property {:?}, skipped",
                    idx, property
                );
                continue;
            }
        };
        let geometry = match feature_geometry(feature) {
            Some(g) => g,
            None => {
                warn!(
                    "read_circuits: feature {} (seccional {:?}) has no polygon, skipped",
                    idx, label
                );
                continue;
            }
        };
        res.push(Circuit {
            seccional_label: label,
            name,
            geometry,
        });
    }
    info!("Read {} circuits from {}", res.len(), p);
    Ok(res)
}

fn seccional_feature(s: &Seccional) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("seccional".to_string(), json!(s.id.to_string()));
    properties.insert("seccional_num".to_string(), json!(s.id.0));
    properties.insert("nombre".to_string(), json!(s.name));
    properties.insert("circuitos".to_string(), json!(s.circuit_count));
    properties.insert("lat".to_string(), json!(s.centroid.map(|c| round6(c.y()))));
    properties.insert("lon".to_string(), json!(s.centroid.map(|c| round6(c.x()))));
    properties.insert("area_km2".to_string(), json!(round6(s.area_km2)));
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&s.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Writes one feature per seccional, in the order of the seccionales.
pub fn write_seccionales(path: &Path, seccionales: &[Seccional]) -> EtlResult<()> {
    let fc = FeatureCollection {
        bbox: None,
        features: seccionales.iter().map(seccional_feature).collect(),
        foreign_members: None,
    };
    let js = serde_json::to_string(&fc).context(SerializingJsonSnafu {})?;
    write_text_file(path, &js)?;
    info!(
        "Wrote {} seccionales to {}",
        seccionales.len(),
        path.display()
    );
    Ok(())
}
