use crate::etl::io_common::read_json_file;
use crate::etl::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use std::collections::HashMap;

pub const DEFAULT_OFFICE: &str = "Diputados";
pub const DEFAULT_SECCIONAL_PROPERTY: &str = "Seccional";
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.001;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "cleanCsv")]
    pub clean_csv: String,
    #[serde(rename = "seccionalesGeojson")]
    pub seccionales_geojson: String,
    pub database: Option<String>,
    pub summary: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectoralSource {
    pub provider: String,
    pub year: u32,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
    pub office: Option<String>,
}

impl ElectoralSource {
    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            year: self.year,
            office: self
                .office
                .clone()
                .unwrap_or_else(|| DEFAULT_OFFICE.to_string()),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GeographySource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "seccionalProperty")]
    pub seccional_property: Option<String>,
    #[serde(rename = "simplifyTolerance")]
    pub simplify_tolerance: Option<f64>,
}

impl GeographySource {
    pub fn seccional_property(&self) -> &str {
        self.seccional_property
            .as_deref()
            .unwrap_or(DEFAULT_SECCIONAL_PROPERTY)
    }

    pub fn simplify_tolerance(&self) -> f64 {
        self.simplify_tolerance
            .unwrap_or(DEFAULT_SIMPLIFY_TOLERANCE)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MappingFiles {
    #[serde(rename = "seccionalNames")]
    pub seccional_names: String,
    #[serde(rename = "partyNormalization")]
    pub party_normalization: String,
    #[serde(rename = "partyColors")]
    pub party_colors: String,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "electoralSources")]
    pub electoral_sources: Vec<ElectoralSource>,
    #[serde(rename = "geographySource")]
    pub geography_source: GeographySource,
    pub mappings: MappingFiles,
    /// The directory of the configuration file.
    #[serde(skip)]
    pub root: PathBuf,
}

impl EtlConfig {
    /// Resolves a path of the configuration against the directory of the
    /// configuration file. Absolute paths are kept.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn years(&self) -> Vec<u32> {
        let mut ys: Vec<u32> = self.electoral_sources.iter().map(|s| s.year).collect();
        ys.sort_unstable();
        ys.dedup();
        ys
    }

    fn validate(&self) -> EtlResult<()> {
        if self.electoral_sources.is_empty() {
            whatever!("no electoral source in the configuration");
        }
        for s in self.electoral_sources.iter() {
            match s.provider.as_str() {
                "excel" | "csv" => {}
                x => whatever!("Provider not implemented {:?} (for {})", x, s.file_path),
            }
        }
        let tol = self.geography_source.simplify_tolerance();
        if !tol.is_finite() || tol < 0.0 {
            whatever!("simplifyTolerance must be a non-negative number, got {}", tol);
        }
        Ok(())
    }
}

pub fn read_config(path: &str) -> EtlResult<EtlConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: EtlConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    config.root = Path::new(path)
        .parent()
        .context(MissingParentDirSnafu { path })?
        .to_path_buf();
    config.validate()?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_mappings(config: &EtlConfig) -> EtlResult<NameMappings> {
    let seccionales: HashMap<String, Option<String>> =
        read_json_file(&config.resolve(&config.mappings.seccional_names))?;
    let parties: HashMap<String, String> =
        read_json_file(&config.resolve(&config.mappings.party_normalization))?;
    let colors: HashMap<String, String> =
        read_json_file(&config.resolve(&config.mappings.party_colors))?;
    info!(
        "Mappings: {} seccional labels, {} party names, {} colors",
        seccionales.len(),
        parties.len(),
        colors.len()
    );
    NameMappings::from_tables(seccionales, parties, colors).context(ElectoralSnafu {})
}

/// Reads a reference summary.
pub fn read_summary(path: &str) -> EtlResult<JSValue> {
    let js: JSValue = read_json_file(Path::new(path))?;
    Ok(js)
}
