use log::{debug, info, warn};

use electoral_results::analysis;
use electoral_results::geometry::{self, GeometryReport};
use electoral_results::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::etl::config_reader::*;

mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod io_geojson;
mod io_sqlite;

/// How many parties the summary lists.
const TOP_PARTIES: usize = 5;

#[derive(Debug, Snafu)]
pub enum EtlError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::Error,
        path: String,
    },
    #[snafu(display("No worksheet or no header row in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error parsing GeoJSON file {path}"))]
    ParsingGeoJson {
        source: geojson::Error,
        path: String,
    },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Database error in {path}"))]
    Database {
        source: rusqlite::Error,
        path: String,
    },
    #[snafu(display("Results found for seccional {seccional}, which has no geometry"))]
    MissingGeometry { seccional: String },
    #[snafu(display("{source}"))]
    Electoral { source: ElectoralError },
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type EtlResult<T> = Result<T, EtlError>;

/// The options of a run that do not come from the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunOptions {
    /// Where to write the summary: a path or `stdout`.
    pub out: Option<String>,
    pub reference: Option<String>,
    pub output_dir: Option<String>,
    pub skip_database: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RunSummary {
    pub records: usize,
    pub seccionales: usize,
    pub clean_csv: PathBuf,
    pub seccionales_geojson: PathBuf,
    pub database: Option<PathBuf>,
    pub summary: JSValue,
}

fn read_sources(config: &EtlConfig) -> EtlResult<Vec<(RawTable, SourceInfo)>> {
    let mut res = Vec::new();
    for src in config.electoral_sources.iter() {
        let path = config.resolve(&src.file_path);
        info!(
            "Attempting to read {} tally {:?} (year {})",
            src.provider,
            path.display(),
            src.year
        );
        let table = match src.provider.as_str() {
            "excel" => io_excel::read_excel_tally(&path, src.worksheet_name.as_deref())?,
            "csv" => io_csv::read_csv_tally(&path)?,
            x => whatever!("Provider not implemented {:?}", x),
        };
        debug!(
            "read_sources: {}: headers {:?}, {} rows",
            table.source,
            table.headers,
            table.rows.len()
        );
        res.push((table, src.source_info()));
    }
    Ok(res)
}

fn build_config_js(config: &EtlConfig) -> JSValue {
    let sources: Vec<JSValue> = config
        .electoral_sources
        .iter()
        .map(|s| {
            json!({
                "file": io_common::simplify_file_name(Path::new(&s.file_path)),
                "provider": s.provider,
                "year": s.year,
                "office": s.source_info().office,
            })
        })
        .collect();
    json!({
        "years": config.years(),
        "sources": sources,
    })
}

fn build_results_js(results: &[ElectoralResult]) -> JSValue {
    let years = analysis::years(results);
    let seccionales: std::collections::BTreeSet<SeccionalId> =
        results.iter().map(|r| r.seccional).collect();
    let parties: std::collections::BTreeSet<&str> =
        results.iter().map(|r| r.party.as_str()).collect();

    let mut votes_by_year = JSMap::new();
    for (y, v) in analysis::votes_by_year(results) {
        votes_by_year.insert(y.to_string(), json!(v));
    }

    let mut winners = JSMap::new();
    for y in years.iter() {
        let ws: Vec<JSValue> = analysis::winners_by_seccional(results, *y)
            .into_iter()
            .map(|w| {
                json!({
                    "seccional": w.seccional,
                    "party": w.party,
                    "votes": w.votes,
                    "percentage": w.percentage,
                })
            })
            .collect();
        winners.insert(y.to_string(), json!(ws));
    }

    let volatility: Vec<JSValue> = years
        .windows(2)
        .map(|w| {
            json!({
                "from": w[0],
                "to": w[1],
                "pedersen": analysis::pedersen_index(results, w[0], w[1]),
            })
        })
        .collect();

    json!({
        "records": results.len(),
        "years": years,
        "seccionales": seccionales.len(),
        "parties": parties.len(),
        "votesByYear": votes_by_year,
        "topParties": analysis::top_parties(results, TOP_PARTIES),
        "winners": winners,
        "volatility": volatility,
    })
}

fn build_normalization_js(report: &NormalizationReport) -> JSValue {
    let skipped: Vec<JSValue> = report
        .skipped_sources
        .iter()
        .map(|(source, missing)| json!({"source": source, "missingColumns": missing}))
        .collect();
    json!({
        "droppedRows": report.dropped.len(),
        "droppedByReason": report.dropped_by_reason(),
        "mergedRows": report.merged_rows,
        "blankRows": report.blank_rows,
        "unmappedParties": report.unmapped_parties,
        "skippedSources": skipped,
    })
}

fn build_geometry_js(seccionales: usize, report: &GeometryReport) -> JSValue {
    json!({
        "circuits": report.circuits,
        "discardedCircuits": report.discarded.len(),
        "repairedCircuits": report.repaired,
        "seccionales": seccionales,
        "verticesBefore": report.vertices_before,
        "verticesAfter": report.vertices_after,
    })
}

fn check_reference(pretty_js_stats: &str, reference_path: &str) -> EtlResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary {}", reference_path);
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        return ReferenceMismatchSnafu {}.fail();
    }
    info!("The summary matches the reference {}", reference_path);
    Ok(())
}

fn output_dir(config: &EtlConfig, options: &RunOptions) -> PathBuf {
    match (&options.output_dir, &config.output_settings.output_directory) {
        (Some(d), _) => PathBuf::from(d),
        (None, Some(d)) => config.resolve(d),
        (None, None) => config.root.clone(),
    }
}

/// Runs the whole pipeline: extraction, transformation and loading.
pub fn run_pipeline(config_path: &str, options: &RunOptions) -> EtlResult<RunSummary> {
    let config = read_config(config_path)?;
    info!(
        "Configuration {}: {} electoral sources, years {:?}",
        config_path,
        config.electoral_sources.len(),
        config.years()
    );
    let mappings = read_mappings(&config)?;

    // Extract
    let sources = read_sources(&config)?;
    let geo_src = &config.geography_source;
    let circuits = io_geojson::read_circuits(
        &config.resolve(&geo_src.file_path),
        geo_src.seccional_property(),
    )?;

    // Transform
    let TransformOutput { results, report } =
        run_transform(&sources, &mappings).context(ElectoralSnafu {})?;
    let (seccionales, geo_report) =
        geometry::dissolve(&circuits, &mappings, geo_src.simplify_tolerance())
            .context(ElectoralSnafu {})?;

    // Load
    let out_dir = output_dir(&config, options);
    let clean_csv = out_dir.join(&config.output_settings.clean_csv);
    io_csv::write_clean_csv(&clean_csv, &results)?;
    let seccionales_geojson = out_dir.join(&config.output_settings.seccionales_geojson);
    io_geojson::write_seccionales(&seccionales_geojson, &seccionales)?;
    let database = match (&config.output_settings.database, options.skip_database) {
        (Some(db), false) => {
            let db_path = out_dir.join(db);
            io_sqlite::write_database(&db_path, &seccionales, &results, &mappings)?;
            Some(db_path)
        }
        (Some(_), true) => {
            info!("Skipping the database");
            None
        }
        (None, _) => None,
    };

    // Summary
    let summary = json!({
        "config": build_config_js(&config),
        "results": build_results_js(&results),
        "normalization": build_normalization_js(&report),
        "geometry": build_geometry_js(seccionales.len(), &geo_report),
    });
    let pretty_js_stats = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu {})?;

    let summary_out: Option<PathBuf> = match (&options.out, &config.output_settings.summary) {
        (Some(o), _) if o == "stdout" => {
            println!("{}", pretty_js_stats);
            None
        }
        (Some(o), _) => Some(PathBuf::from(o)),
        (None, Some(s)) => Some(out_dir.join(s)),
        (None, None) => None,
    };
    if let Some(p) = summary_out {
        io_common::write_text_file(&p, &pretty_js_stats)?;
        info!("Wrote the summary to {}", p.display());
    }

    if let Some(reference_path) = &options.reference {
        check_reference(&pretty_js_stats, reference_path)?;
    }

    Ok(RunSummary {
        records: results.len(),
        seccionales: seccionales.len(),
        clean_csv,
        seccionales_geojson,
        database,
        summary,
    })
}
