//! Repairing, dissolving and simplifying the circuit polygons.

use geo::orient::Direction;
use geo::{
    Area, BooleanOps, Centroid, CoordsIter, GeodesicArea, LineString, MultiPolygon, Orient, Point,
    Polygon, RemoveRepeatedPoints, SimplifyVwPreserve,
};
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::config::*;

/// The smallest closed ring: a triangle plus the closing point.
const MIN_RING_COORDS: usize = 4;

/// A circuit as read from the boundaries file.
#[derive(PartialEq, Debug, Clone)]
pub struct Circuit {
    /// The raw label of the seccional the circuit belongs to.
    pub seccional_label: String,
    pub name: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// The dissolved boundaries of a seccional.
#[derive(PartialEq, Debug, Clone)]
pub struct Seccional {
    pub id: SeccionalId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub centroid: Option<Point<f64>>,
    pub area_km2: f64,
    pub circuit_count: usize,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct GeometryReport {
    pub circuits: usize,
    /// Circuits whose geometry had to be fixed.
    pub repaired: usize,
    /// Circuits left out, with the reason.
    pub discarded: Vec<(String, String)>,
    pub vertices_before: usize,
    pub vertices_after: usize,
}

fn ring_is_usable(ring: &LineString<f64>) -> bool {
    ring.0.len() >= MIN_RING_COORDS
}

fn clean_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    let p = polygon.remove_repeated_points();
    if !ring_is_usable(p.exterior()) {
        return None;
    }
    let interiors: Vec<LineString<f64>> = p
        .interiors()
        .iter()
        .filter(|r| ring_is_usable(r))
        .cloned()
        .collect();
    Some(Polygon::new(p.exterior().clone(), interiors))
}

/// Fixes a geometry so that it can go through the boolean operations.
///
/// Repeated points and degenerate rings are removed, the rings are oriented
/// and self-intersections are resolved by a union of the geometry with
/// itself. Returns the repaired geometry and whether anything changed.
pub fn repair(geometry: &MultiPolygon<f64>) -> (MultiPolygon<f64>, bool) {
    let cleaned: MultiPolygon<f64> =
        MultiPolygon::new(geometry.iter().filter_map(clean_polygon).collect());
    let mut changed = cleaned.coords_count() != geometry.coords_count();
    if cleaned.0.is_empty() {
        return (cleaned, true);
    }
    let oriented = cleaned.orient(Direction::Default);
    let resolved = oriented.union(&MultiPolygon::new(vec![]));
    // The union only changes the area when some rings crossed each other.
    let before = oriented.unsigned_area();
    let after = resolved.unsigned_area();
    if (after - before).abs() > 1e-9 * before.max(1e-12) {
        debug!("repair: area {} -> {}", before, after);
        changed = true;
    }
    (resolved, changed)
}

/// Topology-preserving simplification.
///
/// `tolerance` is a distance in the units of the coordinates; it is turned
/// into the triangle area threshold of the Visvalingam-Whyatt algorithm. A
/// polygon that would collapse keeps its original rings.
pub fn simplify(geometry: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 {
        return geometry.clone();
    }
    let epsilon = tolerance * tolerance;
    MultiPolygon::new(
        geometry
            .iter()
            .map(|p| {
                let s = p.simplify_vw_preserve(&epsilon);
                if ring_is_usable(s.exterior()) {
                    s
                } else {
                    p.clone()
                }
            })
            .collect(),
    )
}

pub fn vertex_count(geometry: &MultiPolygon<f64>) -> usize {
    geometry.coords_count()
}

/// Groups the circuits by seccional and merges their polygons.
///
/// The seccional label of each circuit goes through the same normalization
/// as the electoral tables. The output is ordered by seccional number.
pub fn dissolve(
    circuits: &[Circuit],
    mappings: &NameMappings,
    tolerance: f64,
) -> Result<(Vec<Seccional>, GeometryReport), ElectoralError> {
    let mut report = GeometryReport {
        circuits: circuits.len(),
        ..Default::default()
    };

    let mut groups: BTreeMap<SeccionalId, Vec<MultiPolygon<f64>>> = BTreeMap::new();
    for c in circuits.iter() {
        let label = c.name.clone().unwrap_or_else(|| c.seccional_label.clone());
        let id = match mappings.normalize_seccional(&c.seccional_label) {
            Ok(id) => id,
            Err(reason) => {
                warn!("dissolve: circuit {:?} left out: {}", label, reason);
                report.discarded.push((label, reason.to_string()));
                continue;
            }
        };
        let (repaired, changed) = repair(&c.geometry);
        if repaired.0.is_empty() {
            warn!("dissolve: circuit {:?} has no usable polygon", label);
            report
                .discarded
                .push((label, "no usable polygon".to_string()));
            continue;
        }
        if changed {
            info!("dissolve: repaired the geometry of circuit {:?}", label);
            report.repaired += 1;
        }
        groups.entry(id).or_default().push(repaired);
    }

    if groups.is_empty() {
        return Err(ElectoralError::NoGeometry);
    }

    let mut res: Vec<Seccional> = Vec::new();
    for (id, parts) in groups.into_iter() {
        let circuit_count = parts.len();
        let merged = parts
            .iter()
            .skip(1)
            .fold(parts[0].clone(), |acc, g| acc.union(g));
        let vertices = vertex_count(&merged);
        let geometry = simplify(&merged, tolerance);
        report.vertices_before += vertices;
        report.vertices_after += vertex_count(&geometry);
        debug!(
            "dissolve: seccional {}: {} circuits, {} polygons, {} -> {} vertices",
            id,
            circuit_count,
            geometry.0.len(),
            vertices,
            vertex_count(&geometry)
        );
        res.push(Seccional {
            id,
            name: id.name(),
            centroid: geometry.centroid(),
            area_km2: geometry.geodesic_area_unsigned() / 1_000_000.0,
            geometry,
            circuit_count,
        });
    }

    info!(
        "Dissolved {} circuits into {} seccionales ({} -> {} vertices)",
        report.circuits,
        res.len(),
        report.vertices_before,
        report.vertices_after
    );
    Ok((res, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::collections::HashMap;

    fn square(x: f64, y: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
            (x: x, y: y),
        ]])
    }

    fn circuit(label: &str, geometry: MultiPolygon<f64>) -> Circuit {
        Circuit {
            seccional_label: label.to_string(),
            name: None,
            geometry,
        }
    }

    fn mappings() -> NameMappings {
        let mut s = HashMap::new();
        s.insert("Seccional 1".to_string(), Some("1".to_string()));
        s.insert("Seccional 2".to_string(), Some("2".to_string()));
        s.insert("Seccional 10".to_string(), Some("10".to_string()));
        NameMappings::from_tables(s, HashMap::new(), HashMap::new()).unwrap()
    }

    #[test]
    fn repair_keeps_valid_polygons() {
        let sq = square(0.0, 0.0, 1.0);
        let (repaired, changed) = repair(&sq);
        assert!(!changed);
        assert_eq!(repaired.0.len(), 1);
        assert!((repaired.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repair_drops_repeated_points_and_degenerate_rings() {
        let with_repeats = MultiPolygon::new(vec![
            polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ],
            polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 5.0, y: 5.0)],
        ]);
        let (repaired, changed) = repair(&with_repeats);
        assert!(changed);
        assert_eq!(repaired.0.len(), 1);
        assert!((repaired.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repair_resolves_self_intersections() {
        // A bowtie: the two lobes cancel out in the signed area.
        let bowtie = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]);
        let (repaired, changed) = repair(&bowtie);
        assert!(changed);
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn repair_of_nothing_is_empty() {
        let flat = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]]);
        let (repaired, changed) = repair(&flat);
        assert!(changed);
        assert!(repaired.0.is_empty());
    }

    #[test]
    fn simplify_removes_collinear_vertices() {
        let p = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let s = simplify(&p, 0.001);
        assert!(vertex_count(&s) < vertex_count(&p));
        assert!((s.unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(simplify(&p, 0.0), p);
    }

    #[test]
    fn dissolve_merges_adjacent_circuits() {
        let circuits = vec![
            circuit("Seccional 10", square(2.0, 0.0, 1.0)),
            circuit("Seccional 1", square(0.0, 0.0, 1.0)),
            circuit("1", square(1.0, 0.0, 1.0)),
            circuit("Seccional 2", square(0.0, 1.0, 1.0)),
            circuit("Seccional 33", square(9.0, 9.0, 1.0)),
        ];
        let (secs, report) = dissolve(&circuits, &mappings(), 0.001).unwrap();
        let ids: Vec<u32> = secs.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 2, 10]);

        let s1 = &secs[0];
        assert_eq!(s1.name, "Seccional 1");
        assert_eq!(s1.circuit_count, 2);
        assert_eq!(s1.geometry.0.len(), 1);
        assert!((s1.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        let c = s1.centroid.unwrap();
        assert!((c.x() - 1.0).abs() < 1e-9 && (c.y() - 0.5).abs() < 1e-9);
        assert!(s1.area_km2 > 0.0);

        assert_eq!(report.circuits, 5);
        assert_eq!(report.discarded.len(), 1);
        assert!(report.vertices_after <= report.vertices_before);
    }

    #[test]
    fn dissolve_without_circuits_fails() {
        let circuits = vec![circuit("nowhere", square(0.0, 0.0, 1.0))];
        assert_eq!(
            dissolve(&circuits, &mappings(), 0.0).unwrap_err(),
            ElectoralError::NoGeometry
        );
    }
}
