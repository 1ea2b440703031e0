// The SQLite reporting database.

use geo::{LineString, MultiPolygon, Polygon};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, BTreeSet};

use electoral_results::geometry::Seccional;

use crate::etl::io_common::ensure_parent_dir;
use crate::etl::*;

const SCHEMA: &str = r#"
DROP VIEW IF EXISTS ganadores;
DROP TABLE IF EXISTS resultados;
DROP TABLE IF EXISTS agrupaciones;
DROP TABLE IF EXISTS seccionales;

CREATE TABLE seccionales (
    id INTEGER PRIMARY KEY,
    nombre TEXT NOT NULL,
    geometry TEXT NOT NULL,
    lat REAL,
    lon REAL,
    area_km2 REAL NOT NULL
);

CREATE TABLE agrupaciones (
    id INTEGER PRIMARY KEY,
    nombre TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL
);

CREATE TABLE resultados (
    id INTEGER PRIMARY KEY,
    anio INTEGER NOT NULL,
    cargo TEXT NOT NULL,
    seccional_id INTEGER NOT NULL REFERENCES seccionales(id),
    agrupacion_id INTEGER NOT NULL REFERENCES agrupaciones(id),
    votos INTEGER NOT NULL,
    porcentaje REAL NOT NULL,
    total_votos INTEGER NOT NULL,
    UNIQUE (anio, seccional_id, agrupacion_id)
);

CREATE INDEX idx_resultados_anio ON resultados(anio);
CREATE INDEX idx_resultados_seccional ON resultados(seccional_id);
CREATE INDEX idx_resultados_agrupacion ON resultados(agrupacion_id);

CREATE VIEW ganadores AS
SELECT r.anio, r.seccional_id, s.nombre AS seccional, a.nombre AS agrupacion,
       a.color, r.votos, r.porcentaje
FROM resultados r
JOIN seccionales s ON s.id = r.seccional_id
JOIN agrupaciones a ON a.id = r.agrupacion_id
WHERE r.id = (
    SELECT r2.id
    FROM resultados r2
    JOIN agrupaciones a2 ON a2.id = r2.agrupacion_id
    WHERE r2.anio = r.anio AND r2.seccional_id = r.seccional_id
    ORDER BY r2.votos DESC, a2.nombre ASC
    LIMIT 1
);
"#;

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DatabaseCounts {
    pub seccionales: usize,
    pub agrupaciones: usize,
    pub resultados: usize,
    pub ganadores: usize,
}

fn ring_wkt(ring: &LineString<f64>) -> String {
    let coords: Vec<String> = ring.0.iter().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("({})", coords.join(", "))
}

fn polygon_wkt(polygon: &Polygon<f64>) -> String {
    let mut rings: Vec<String> = vec![ring_wkt(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_wkt));
    format!("({})", rings.join(", "))
}

pub fn multipolygon_wkt(geometry: &MultiPolygon<f64>) -> String {
    if geometry.0.is_empty() {
        return "MULTIPOLYGON EMPTY".to_string();
    }
    let polygons: Vec<String> = geometry.iter().map(polygon_wkt).collect();
    format!("MULTIPOLYGON ({})", polygons.join(", "))
}

/// Rebuilds the database from scratch.
///
/// Every result must point to a seccional with a geometry. Parties get
/// their ids in alphabetical order so that two runs on the same data produce
/// the same database.
pub fn write_database(
    path: &Path,
    seccionales: &[Seccional],
    results: &[ElectoralResult],
    mappings: &NameMappings,
) -> EtlResult<DatabaseCounts> {
    let p = path.display().to_string();
    let known: BTreeSet<SeccionalId> = seccionales.iter().map(|s| s.id).collect();
    if let Some(r) = results.iter().find(|r| !known.contains(&r.seccional)) {
        return MissingGeometrySnafu {
            seccional: r.seccional.to_string(),
        }
        .fail();
    }

    ensure_parent_dir(path)?;
    let mut conn = Connection::open(path).context(DatabaseSnafu { path: p.clone() })?;
    load(&mut conn, seccionales, results, mappings).context(DatabaseSnafu { path: p.clone() })?;
    let counts = table_counts(&conn).context(DatabaseSnafu { path: p.clone() })?;
    info!("Wrote database {}: {:?}", p, counts);
    Ok(counts)
}

fn load(
    conn: &mut Connection,
    seccionales: &[Seccional],
    results: &[ElectoralResult],
    mappings: &NameMappings,
) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO seccionales(id, nombre, geometry, lat, lon, area_km2) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for s in seccionales.iter() {
            stmt.execute(params![
                s.id.0,
                s.name,
                multipolygon_wkt(&s.geometry),
                s.centroid.map(|c| c.y()),
                s.centroid.map(|c| c.x()),
                s.area_km2
            ])?;
        }
    }

    let parties: BTreeSet<&str> = results.iter().map(|r| r.party.as_str()).collect();
    let mut party_ids: BTreeMap<&str, i64> = BTreeMap::new();
    {
        let mut stmt =
            tx.prepare("INSERT INTO agrupaciones(id, nombre, color) VALUES (?1, ?2, ?3)")?;
        for (idx, party) in parties.iter().enumerate() {
            let id = (idx + 1) as i64;
            stmt.execute(params![id, party, mappings.party_color(party)])?;
            party_ids.insert(*party, id);
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO resultados(id, anio, cargo, seccional_id, agrupacion_id, votos, porcentaje, total_votos) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (idx, r) in results.iter().enumerate() {
            let party_id = party_ids.get(r.party.as_str()).cloned().unwrap_or(0);
            stmt.execute(params![
                (idx + 1) as i64,
                r.year,
                r.office,
                r.seccional.0,
                party_id,
                r.votes as i64,
                r.percentage,
                r.total_votes as i64
            ])?;
        }
    }

    tx.commit()
}

pub fn table_counts(conn: &Connection) -> rusqlite::Result<DatabaseCounts> {
    let count = |table: &str| -> rusqlite::Result<usize> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(n as usize)
    };
    Ok(DatabaseCounts {
        seccionales: count("seccionales")?,
        agrupaciones: count("agrupaciones")?,
        resultados: count("resultados")?,
        ganadores: count("ganadores")?,
    })
}
