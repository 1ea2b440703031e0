// ********* Input data structures ***********

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

/// The content of one cell of a tally spreadsheet, as seen by the readers.
///
/// Readers only distinguish between text and numbers: the interpretation of a
/// cell (year, seccional label, vote count) happens during normalization.
#[derive(PartialEq, Debug, Clone)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
}

impl RawCell {
    /// The textual form of the cell, trimmed. Integral numbers are printed
    /// without their fractional part (`3.0` -> `"3"`).
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::Text(s) if s.trim().is_empty() => None,
            RawCell::Text(s) => Some(s.trim().to_string()),
            RawCell::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", *f as i64))
            }
            RawCell::Number(f) => Some(f.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_text().is_none()
    }
}

/// A table read from one electoral source: the first row of the sheet is
/// the header, the other rows are the data.
#[derive(PartialEq, Debug, Clone)]
pub struct RawTable {
    /// A short name for the source, used in the reports.
    pub source: String,
    /// The 1-based line of the header in the file. Sheets whose used range
    /// does not start at the top have their header further down.
    pub header_row: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    /// The line of the file holding the data row `idx`.
    pub fn row_number(&self, idx: usize) -> usize {
        self.header_row + idx + 1
    }
}

/// What the configuration knows about a source independently of its content.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceInfo {
    pub year: u32,
    pub office: String,
}

/// The normalized identifier of a seccional.
///
/// Seccionales are numbered from 1 and ordered numerically. They are written
/// out as strings (`"1"` ... `"14"`).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct SeccionalId(pub u32);

impl SeccionalId {
    pub fn name(&self) -> String {
        format!("Seccional {}", self.0)
    }
}

impl Display for SeccionalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeccionalId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().parse::<u32>()?;
        Ok(SeccionalId(id))
    }
}

impl Serialize for SeccionalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub const DEFAULT_PARTY_COLOR: &str = "#808080";

/// The lookup tables used to canonicalize the names found in the sources.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NameMappings {
    /// Raw seccional label -> canonical id. `None` marks labels whose rows
    /// must be dropped (totals, blank lines).
    pub seccionales: HashMap<String, Option<SeccionalId>>,
    /// Raw party name -> canonical party name.
    pub parties: HashMap<String, String>,
    /// Canonical party name -> display color.
    pub colors: HashMap<String, String>,
}

impl NameMappings {
    pub fn party_color(&self, party: &str) -> &str {
        self.colors
            .get(party)
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_PARTY_COLOR)
    }
}

// ********* Normalized data structures ***********

/// A reference to a row of a source, 1-based as in spreadsheets
/// (the header is row 1).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct RowRef {
    pub source: String,
    pub row: usize,
}

/// A data row after normalization of all its names.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizedRow {
    pub year: u32,
    pub office: String,
    pub seccional: SeccionalId,
    pub party: String,
    pub votes: u64,
    pub origin: RowRef,
}

/// The votes of one party in one seccional for one year, after merging all
/// the rows that normalize to the same key.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PartyTally {
    pub year: u32,
    pub office: String,
    pub seccional: SeccionalId,
    pub party: String,
    pub votes: u64,
}

/// One row of the final dataset. The field order is the column order of the
/// CSV output.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct ElectoralResult {
    #[serde(rename = "anio")]
    pub year: u32,
    #[serde(rename = "cargo")]
    pub office: String,
    pub seccional: SeccionalId,
    #[serde(rename = "agrupacion")]
    pub party: String,
    #[serde(rename = "votos")]
    pub votes: u64,
    #[serde(rename = "total_votos")]
    pub total_votes: u64,
    #[serde(rename = "porcentaje")]
    pub percentage: f64,
}

// ******** Reports *********

/// Why a data row did not make it into the dataset.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum DropReason {
    /// The seccional label is explicitly excluded by the mapping (totals).
    ExcludedSeccional(String),
    /// The seccional label is not known to the mapping.
    UnknownSeccional(String),
    MissingSeccional,
    MissingParty,
    MissingVotes,
    InvalidVotes(String),
    InvalidYear(String),
}

impl DropReason {
    pub fn kind(&self) -> &'static str {
        match self {
            DropReason::ExcludedSeccional(_) => "excludedSeccional",
            DropReason::UnknownSeccional(_) => "unknownSeccional",
            DropReason::MissingSeccional => "missingSeccional",
            DropReason::MissingParty => "missingParty",
            DropReason::MissingVotes => "missingVotes",
            DropReason::InvalidVotes(_) => "invalidVotes",
            DropReason::InvalidYear(_) => "invalidYear",
        }
    }
}

impl Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::ExcludedSeccional(s) => write!(f, "seccional {:?} is excluded", s),
            DropReason::UnknownSeccional(s) => write!(f, "seccional {:?} is not mapped", s),
            DropReason::MissingSeccional => write!(f, "no seccional"),
            DropReason::MissingParty => write!(f, "no party name"),
            DropReason::MissingVotes => write!(f, "no vote count"),
            DropReason::InvalidVotes(s) => write!(f, "invalid vote count {:?}", s),
            DropReason::InvalidYear(s) => write!(f, "invalid year {:?}", s),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DroppedRow {
    pub origin: RowRef,
    pub reason: DropReason,
}

/// Everything the normalization had to drop, merge or guess.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NormalizationReport {
    pub dropped: Vec<DroppedRow>,
    /// Party names that had no entry in the normalization table and were
    /// kept as they are.
    pub unmapped_parties: BTreeSet<String>,
    /// Number of rows folded into another row with the same key.
    pub merged_rows: usize,
    /// Rows without any content. They carry no data and are only counted.
    pub blank_rows: usize,
    /// Sources that could not be used, with the missing columns.
    pub skipped_sources: Vec<(String, Vec<String>)>,
}

impl NormalizationReport {
    pub fn dropped_by_reason(&self) -> BTreeMap<&'static str, usize> {
        let mut res: BTreeMap<&'static str, usize> = BTreeMap::new();
        for d in self.dropped.iter() {
            *res.entry(d.reason.kind()).or_insert(0) += 1;
        }
        res
    }
}

// ******** Errors *********

#[derive(PartialEq, Debug, Clone)]
pub enum ElectoralError {
    /// A source lacks some of the required columns.
    MissingColumns {
        source: String,
        missing: Vec<String>,
    },
    /// A value of the seccional table is not a seccional number.
    InvalidMapping { key: String, value: String },
    /// Two rows with the same key disagree on the office.
    OfficeConflict {
        year: u32,
        seccional: SeccionalId,
        party: String,
        offices: (String, String),
    },
    DuplicateKey {
        year: u32,
        seccional: SeccionalId,
        party: String,
    },
    TotalsMismatch {
        year: u32,
        seccional: SeccionalId,
        expected: u64,
        found: u64,
    },
    PercentageOutOfRange {
        year: u32,
        seccional: SeccionalId,
        party: String,
        percentage: f64,
    },
    /// The votes of a seccional, or of the whole dataset, exceed
    /// [`crate::MAX_VOTES`].
    VoteOverflow { year: u32, seccional: SeccionalId },
    /// No source produced any row.
    NoData,
    /// No circuit could be assigned to a seccional.
    NoGeometry,
}

impl Error for ElectoralError {}

impl Display for ElectoralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectoralError::MissingColumns { source, missing } => {
                write!(f, "source {} is missing columns {:?}", source, missing)
            }
            ElectoralError::InvalidMapping { key, value } => write!(
                f,
                "seccional mapping {:?} -> {:?}: not a seccional number",
                key, value
            ),
            ElectoralError::OfficeConflict {
                year,
                seccional,
                party,
                offices,
            } => write!(
                f,
                "{} / seccional {} / {}: conflicting offices {:?} and {:?}",
                year, seccional, party, offices.0, offices.1
            ),
            ElectoralError::DuplicateKey {
                year,
                seccional,
                party,
            } => write!(
                f,
                "{} / seccional {} / {}: duplicated result",
                year, seccional, party
            ),
            ElectoralError::TotalsMismatch {
                year,
                seccional,
                expected,
                found,
            } => write!(
                f,
                "{} / seccional {}: recorded total {} but the parties add up to {}",
                year, seccional, expected, found
            ),
            ElectoralError::PercentageOutOfRange {
                year,
                seccional,
                party,
                percentage,
            } => write!(
                f,
                "{} / seccional {} / {}: percentage {} out of range",
                year, seccional, party, percentage
            ),
            ElectoralError::VoteOverflow { year, seccional } => write!(
                f,
                "{} / seccional {}: too many votes to be counted",
                year, seccional
            ),
            ElectoralError::NoData => write!(f, "no electoral data left after normalization"),
            ElectoralError::NoGeometry => write!(f, "no circuit could be assigned to a seccional"),
        }
    }
}
