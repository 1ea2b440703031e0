mod config;
pub mod analysis;
pub mod geometry;
pub mod manual;

use log::{debug, info, warn};

use std::collections::{BTreeMap, HashMap, HashSet};

pub use crate::config::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);

    fn checked_add(self, rhs: VoteCount) -> Option<VoteCount> {
        self.0
            .checked_add(rhs.0)
            .filter(|v| *v <= MAX_VOTES)
            .map(VoteCount)
    }
}

static EMPTY_CELL: RawCell = RawCell::Empty;

// **** Column headers ****

pub const COL_YEAR: &str = "anio";
pub const COL_OFFICE: &str = "cargo";
pub const COL_SECCIONAL: &str = "seccional";
pub const COL_PARTY: &str = "agrupacion";
pub const COL_VOTES: &str = "votos";

/// Maps a raw column header onto its canonical name.
///
/// The exports of the different years do not agree on their headers
/// (`diputados` vs `sum_diputados`, `año` with or without a broken encoding).
pub fn normalize_header(header: &str) -> Option<&'static str> {
    let h = header.trim().to_lowercase();
    match h.as_str() {
        "año" | "anio" | "year" => Some(COL_YEAR),
        "diputados" | "sum_diputados" | "votos" => Some(COL_VOTES),
        "agrupacion" | "agrupación" | "partido" => Some(COL_PARTY),
        "seccional" => Some(COL_SECCIONAL),
        "cargo" => Some(COL_OFFICE),
        // 'año' with a mangled 'ñ'
        _ if h.chars().count() == 3 && h.starts_with('a') && h.ends_with('o') => Some(COL_YEAR),
        _ => None,
    }
}

/// The position of the canonical columns in a table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnLayout {
    pub seccional: usize,
    pub party: usize,
    pub votes: usize,
    pub year: Option<usize>,
    pub office: Option<usize>,
}

impl ColumnLayout {
    pub fn detect(source: &str, headers: &[String]) -> Result<ColumnLayout, ElectoralError> {
        let mut found: HashMap<&'static str, usize> = HashMap::new();
        for (idx, h) in headers.iter().enumerate() {
            if let Some(canonical) = normalize_header(h) {
                if found.contains_key(canonical) {
                    debug!(
                        "{}: column {:?} also maps to {:?}, ignored",
                        source, h, canonical
                    );
                } else {
                    found.insert(canonical, idx);
                }
            }
        }
        let missing: Vec<String> = [COL_SECCIONAL, COL_PARTY, COL_VOTES]
            .iter()
            .filter(|c| !found.contains_key(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ElectoralError::MissingColumns {
                source: source.to_string(),
                missing,
            });
        }
        Ok(ColumnLayout {
            seccional: found[COL_SECCIONAL],
            party: found[COL_PARTY],
            votes: found[COL_VOTES],
            year: found.get(COL_YEAR).cloned(),
            office: found.get(COL_OFFICE).cloned(),
        })
    }
}

// **** Name normalization ****

impl NameMappings {
    /// Builds the mappings from the raw lookup tables, checking that the
    /// seccional table only points to seccional numbers.
    pub fn from_tables(
        seccionales: HashMap<String, Option<String>>,
        parties: HashMap<String, String>,
        colors: HashMap<String, String>,
    ) -> Result<NameMappings, ElectoralError> {
        let mut checked: HashMap<String, Option<SeccionalId>> = HashMap::new();
        for (key, value) in seccionales {
            let id = match value {
                None => None,
                Some(v) => match v.parse::<SeccionalId>() {
                    Ok(id) if id.0 > 0 => Some(id),
                    _ => {
                        return Err(ElectoralError::InvalidMapping { key, value: v });
                    }
                },
            };
            checked.insert(key, id);
        }
        Ok(NameMappings {
            seccionales: checked,
            parties,
            colors,
        })
    }

    /// Canonical id of a raw seccional label.
    ///
    /// Labels that are already canonical ids known to the table are accepted
    /// even when the table has no entry for them.
    pub fn normalize_seccional(&self, raw: &str) -> Result<SeccionalId, DropReason> {
        let raw = raw.trim();
        match self.seccionales.get(raw) {
            Some(Some(id)) => Ok(*id),
            Some(None) => Err(DropReason::ExcludedSeccional(raw.to_string())),
            None => match raw.parse::<SeccionalId>() {
                Ok(id) if self.seccionales.values().any(|v| *v == Some(id)) => Ok(id),
                _ => Err(DropReason::UnknownSeccional(raw.to_string())),
            },
        }
    }

    /// Canonical party name, and whether the table knew about it.
    pub fn normalize_party(&self, raw: &str) -> (String, bool) {
        let raw = raw.trim();
        match self.parties.get(raw) {
            Some(p) => (p.clone(), true),
            None => (raw.to_string(), false),
        }
    }
}

/// The largest vote count accepted, for a single row as for any sum of rows.
/// Counts above it cannot be stored in the database.
pub const MAX_VOTES: u64 = i64::MAX as u64;

fn votes_from_float(f: f64) -> Option<u64> {
    // 2^63: every float below it converts exactly to a value <= MAX_VOTES.
    if f >= 0.0 && f.fract() == 0.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as u64)
    } else {
        None
    }
}

/// The vote count of a cell: a non-negative integer, possibly written as an
/// integral float (`"40.0"`).
pub fn parse_votes(cell: &RawCell) -> Result<u64, DropReason> {
    match cell {
        RawCell::Number(f) => {
            votes_from_float(*f).ok_or_else(|| DropReason::InvalidVotes(f.to_string()))
        }
        RawCell::Text(s) if s.trim().is_empty() => Err(DropReason::MissingVotes),
        RawCell::Text(s) => {
            let t = s.trim();
            let parsed = match t.parse::<u64>() {
                Ok(v) => Some(v).filter(|v| *v <= MAX_VOTES),
                Err(_) => t.parse::<f64>().ok().and_then(votes_from_float),
            };
            parsed.ok_or_else(|| DropReason::InvalidVotes(t.to_string()))
        }
        RawCell::Empty => Err(DropReason::MissingVotes),
    }
}

/// The election year of a row. An empty cell falls back to the year of the
/// source.
pub fn parse_year(cell: &RawCell, default_year: u32) -> Result<u32, DropReason> {
    let txt = match cell.as_text() {
        None => return Ok(default_year),
        Some(t) => t,
    };
    match txt.parse::<u32>() {
        Ok(y) if (1900..=2100).contains(&y) => Ok(y),
        _ => Err(DropReason::InvalidYear(txt)),
    }
}

fn normalize_row(
    row: &[RawCell],
    layout: &ColumnLayout,
    info: &SourceInfo,
    mappings: &NameMappings,
    origin: &RowRef,
) -> Result<(NormalizedRow, bool), DropReason> {
    let cell = |idx: usize| row.get(idx).unwrap_or(&EMPTY_CELL);

    let seccional_raw = cell(layout.seccional)
        .as_text()
        .ok_or(DropReason::MissingSeccional)?;
    let seccional = mappings.normalize_seccional(&seccional_raw)?;

    let party_raw = cell(layout.party)
        .as_text()
        .ok_or(DropReason::MissingParty)?;
    let (party, mapped) = mappings.normalize_party(&party_raw);

    let votes = parse_votes(cell(layout.votes))?;

    let year = match layout.year {
        Some(idx) => parse_year(cell(idx), info.year)?,
        None => info.year,
    };
    if year != info.year {
        warn!(
            "{}: row {}: year {} differs from the configured year {}",
            origin.source, origin.row, year, info.year
        );
    }

    let office = layout
        .office
        .and_then(|idx| cell(idx).as_text())
        .unwrap_or_else(|| info.office.clone());

    Ok((
        NormalizedRow {
            year,
            office,
            seccional,
            party,
            votes,
            origin: origin.clone(),
        },
        mapped,
    ))
}

/// Normalizes all the rows of a table.
///
/// Rows that cannot be normalized are recorded in the report, never silently
/// discarded. Fails only when the table lacks one of the required columns.
pub fn normalize_table(
    table: &RawTable,
    info: &SourceInfo,
    mappings: &NameMappings,
    report: &mut NormalizationReport,
) -> Result<Vec<NormalizedRow>, ElectoralError> {
    let layout = ColumnLayout::detect(&table.source, &table.headers)?;
    debug!("normalize_table: {}: layout {:?}", table.source, layout);

    let mut res: Vec<NormalizedRow> = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        let origin = RowRef {
            source: table.source.clone(),
            row: table.row_number(idx),
        };
        if row.iter().all(|c| c.is_empty()) {
            debug!("{}: row {}: blank line", origin.source, origin.row);
            report.blank_rows += 1;
            continue;
        }
        match normalize_row(row, &layout, info, mappings, &origin) {
            Ok((nr, mapped)) => {
                if !mapped && !report.unmapped_parties.contains(&nr.party) {
                    warn!(
                        "{}: row {}: party {:?} has no normalized name, kept as is",
                        origin.source, origin.row, nr.party
                    );
                    report.unmapped_parties.insert(nr.party.clone());
                }
                res.push(nr);
            }
            Err(reason) => {
                warn!("{}: row {}: dropped: {}", origin.source, origin.row, reason);
                report.dropped.push(DroppedRow { origin, reason });
            }
        }
    }
    Ok(res)
}

// **** Aggregation ****

/// Merges the rows that share the same (year, seccional, party) key.
pub fn aggregate(
    rows: &[NormalizedRow],
    report: &mut NormalizationReport,
) -> Result<Vec<PartyTally>, ElectoralError> {
    let mut acc: BTreeMap<(u32, SeccionalId, String), (String, VoteCount)> = BTreeMap::new();
    for r in rows.iter() {
        let key = (r.year, r.seccional, r.party.clone());
        match acc.get_mut(&key) {
            Some((office, count)) => {
                if *office != r.office {
                    return Err(ElectoralError::OfficeConflict {
                        year: r.year,
                        seccional: r.seccional,
                        party: r.party.clone(),
                        offices: (office.clone(), r.office.clone()),
                    });
                }
                info!(
                    "{}: row {}: merged into {} / seccional {} / {}",
                    r.origin.source, r.origin.row, r.year, r.seccional, r.party
                );
                *count = count.checked_add(VoteCount(r.votes)).ok_or(
                    ElectoralError::VoteOverflow {
                        year: r.year,
                        seccional: r.seccional,
                    },
                )?;
                report.merged_rows += 1;
            }
            None => {
                acc.insert(key, (r.office.clone(), VoteCount(r.votes)));
            }
        }
    }
    Ok(acc
        .into_iter()
        .map(|((year, seccional, party), (office, count))| PartyTally {
            year,
            office,
            seccional,
            party,
            votes: count.0,
        })
        .collect())
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Computes the share of each party within its seccional and year.
///
/// The output is sorted by year, seccional, decreasing votes and party name.
/// Fails if the votes of the whole dataset add up to more than [`MAX_VOTES`],
/// which also bounds every total derived from the results.
pub fn calculate_percentages(
    tallies: &[PartyTally],
) -> Result<Vec<ElectoralResult>, ElectoralError> {
    let mut totals: BTreeMap<(u32, SeccionalId), VoteCount> = BTreeMap::new();
    let mut grand_total = VoteCount::EMPTY;
    for t in tallies.iter() {
        let overflow = || ElectoralError::VoteOverflow {
            year: t.year,
            seccional: t.seccional,
        };
        grand_total = grand_total
            .checked_add(VoteCount(t.votes))
            .ok_or_else(overflow)?;
        let e = totals
            .entry((t.year, t.seccional))
            .or_insert(VoteCount::EMPTY);
        *e = e.checked_add(VoteCount(t.votes)).ok_or_else(overflow)?;
    }

    let mut res: Vec<ElectoralResult> = tallies
        .iter()
        .map(|t| {
            let total = totals
                .get(&(t.year, t.seccional))
                .cloned()
                .unwrap_or(VoteCount::EMPTY);
            let percentage = if total == VoteCount::EMPTY {
                0.0
            } else {
                round2(t.votes as f64 / total.0 as f64 * 100.0)
            };
            ElectoralResult {
                year: t.year,
                office: t.office.clone(),
                seccional: t.seccional,
                party: t.party.clone(),
                votes: t.votes,
                total_votes: total.0,
                percentage,
            }
        })
        .collect();
    sort_results(&mut res);
    Ok(res)
}

pub fn sort_results(results: &mut [ElectoralResult]) {
    results.sort_by(|a, b| {
        a.year
            .cmp(&b.year)
            .then(a.seccional.cmp(&b.seccional))
            .then(b.votes.cmp(&a.votes))
            .then(a.party.cmp(&b.party))
    });
}

/// Data-quality checks on a finished dataset: unique keys, conserved totals
/// and percentages within bounds.
pub fn check_results(results: &[ElectoralResult]) -> Result<(), ElectoralError> {
    let mut keys: HashSet<(u32, SeccionalId, &str)> = HashSet::new();
    let mut sums: BTreeMap<(u32, SeccionalId), VoteCount> = BTreeMap::new();
    for r in results.iter() {
        if !keys.insert((r.year, r.seccional, r.party.as_str())) {
            return Err(ElectoralError::DuplicateKey {
                year: r.year,
                seccional: r.seccional,
                party: r.party.clone(),
            });
        }
        if !r.percentage.is_finite() || r.percentage < 0.0 || r.percentage > 100.0 {
            return Err(ElectoralError::PercentageOutOfRange {
                year: r.year,
                seccional: r.seccional,
                party: r.party.clone(),
                percentage: r.percentage,
            });
        }
        let e = sums
            .entry((r.year, r.seccional))
            .or_insert(VoteCount::EMPTY);
        *e = e
            .checked_add(VoteCount(r.votes))
            .ok_or(ElectoralError::VoteOverflow {
                year: r.year,
                seccional: r.seccional,
            })?;
    }
    for r in results.iter() {
        let found = sums
            .get(&(r.year, r.seccional))
            .cloned()
            .unwrap_or(VoteCount::EMPTY);
        if found.0 != r.total_votes {
            return Err(ElectoralError::TotalsMismatch {
                year: r.year,
                seccional: r.seccional,
                expected: r.total_votes,
                found: found.0,
            });
        }
    }
    Ok(())
}

#[derive(PartialEq, Debug, Clone)]
pub struct TransformOutput {
    pub results: Vec<ElectoralResult>,
    pub report: NormalizationReport,
}

/// Runs the whole transformation on the tables of all the sources.
///
/// Arguments:
/// * `sources` the raw tables, with what the configuration says about them
/// * `mappings` the lookup tables for seccionales and parties
///
/// A source without the required columns is skipped (and reported); the
/// transformation fails if no row survives.
pub fn run_transform(
    sources: &[(RawTable, SourceInfo)],
    mappings: &NameMappings,
) -> Result<TransformOutput, ElectoralError> {
    let mut report = NormalizationReport::default();
    let mut rows: Vec<NormalizedRow> = Vec::new();
    for (table, info) in sources.iter() {
        info!(
            "Processing {} ({} rows, year {})",
            table.source,
            table.rows.len(),
            info.year
        );
        match normalize_table(table, info, mappings, &mut report) {
            Ok(mut source_rows) => {
                info!(
                    "Processed {} records for {}",
                    source_rows.len(),
                    table.source
                );
                rows.append(&mut source_rows);
            }
            Err(ElectoralError::MissingColumns { source, missing }) => {
                warn!("Skipping {}: missing columns {:?}", source, missing);
                report.skipped_sources.push((source, missing));
            }
            Err(e) => return Err(e),
        }
    }
    if rows.is_empty() {
        return Err(ElectoralError::NoData);
    }

    let tallies = aggregate(&rows, &mut report)?;
    let results = calculate_percentages(&tallies)?;
    check_results(&results)?;

    info!(
        "Transformed: {} records, {} dropped rows, {} merged rows, {} blank rows",
        results.len(),
        report.dropped.len(),
        report.merged_rows,
        report.blank_rows
    );
    Ok(TransformOutput { results, report })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn mappings() -> NameMappings {
        let seccionales: HashMap<String, Option<String>> = [
            ("Seccional 1", Some("1")),
            ("Seccional 2", Some("2")),
            ("Seccional 10", Some("10")),
            ("Total", None),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
        .collect();
        let parties: HashMap<String, String> = [
            ("JUNTOS POR EL CAMBIO", "Juntos por el Cambio"),
            ("JxC", "Juntos por el Cambio"),
            ("FRENTE DE TODOS", "Frente de Todos"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        NameMappings::from_tables(seccionales, parties, HashMap::new()).unwrap()
    }

    fn info() -> SourceInfo {
        SourceInfo {
            year: 2021,
            office: "Diputados".to_string(),
        }
    }

    fn table(headers: &[&str], rows: Vec<Vec<RawCell>>) -> RawTable {
        RawTable {
            source: "test.xlsx".to_string(),
            header_row: 1,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    fn tally(year: u32, seccional: u32, party: &str, votes: u64) -> PartyTally {
        PartyTally {
            year,
            office: "Diputados".to_string(),
            seccional: SeccionalId(seccional),
            party: party.to_string(),
            votes,
        }
    }

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header(" Año "), Some(COL_YEAR));
        assert_eq!(normalize_header("a\u{fffd}o"), Some(COL_YEAR));
        assert_eq!(normalize_header("sum_diputados"), Some(COL_VOTES));
        assert_eq!(normalize_header("Seccional"), Some(COL_SECCIONAL));
        assert_eq!(normalize_header("agrupacion"), Some(COL_PARTY));
        assert_eq!(normalize_header("circuito"), None);
    }

    #[test]
    fn layout_reports_missing_columns() {
        let headers: Vec<String> = vec!["año".to_string(), "seccional".to_string()];
        let err = ColumnLayout::detect("s", &headers).unwrap_err();
        assert_eq!(
            err,
            ElectoralError::MissingColumns {
                source: "s".to_string(),
                missing: vec!["agrupacion".to_string(), "votos".to_string()]
            }
        );
    }

    #[test]
    fn layout_keeps_first_duplicate() {
        let headers: Vec<String> = ["seccional", "agrupacion", "diputados", "votos"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let layout = ColumnLayout::detect("s", &headers).unwrap();
        assert_eq!(layout.votes, 2);
        assert_eq!(layout.year, None);
    }

    #[test]
    fn seccional_normalization() {
        let m = mappings();
        assert_eq!(m.normalize_seccional("Seccional 10"), Ok(SeccionalId(10)));
        assert_eq!(m.normalize_seccional("2"), Ok(SeccionalId(2)));
        assert_eq!(
            m.normalize_seccional("Total"),
            Err(DropReason::ExcludedSeccional("Total".to_string()))
        );
        assert_eq!(
            m.normalize_seccional("7"),
            Err(DropReason::UnknownSeccional("7".to_string()))
        );
    }

    #[test]
    fn invalid_seccional_mapping_is_rejected() {
        let mut s = HashMap::new();
        s.insert("Seccional 1".to_string(), Some("uno".to_string()));
        let err = NameMappings::from_tables(s, HashMap::new(), HashMap::new()).unwrap_err();
        assert!(matches!(err, ElectoralError::InvalidMapping { .. }));
    }

    #[test]
    fn party_normalization_falls_back_to_identity() {
        let m = mappings();
        assert_eq!(
            m.normalize_party("JxC"),
            ("Juntos por el Cambio".to_string(), true)
        );
        assert_eq!(
            m.normalize_party(" Partido Nuevo "),
            ("Partido Nuevo".to_string(), false)
        );
        assert_eq!(m.party_color("Partido Nuevo"), DEFAULT_PARTY_COLOR);
    }

    #[test]
    fn vote_parsing() {
        assert_eq!(parse_votes(&RawCell::Number(12.0)), Ok(12));
        assert_eq!(parse_votes(&text(" 40 ")), Ok(40));
        assert_eq!(parse_votes(&text("40.0")), Ok(40));
        assert_eq!(parse_votes(&RawCell::Empty), Err(DropReason::MissingVotes));
        assert_eq!(
            parse_votes(&RawCell::Number(-3.0)),
            Err(DropReason::InvalidVotes("-3".to_string()))
        );
        assert_eq!(
            parse_votes(&text("n/a")),
            Err(DropReason::InvalidVotes("n/a".to_string()))
        );
        assert_eq!(
            parse_votes(&text("12.5")),
            Err(DropReason::InvalidVotes("12.5".to_string()))
        );
        assert_eq!(
            parse_votes(&RawCell::Number(12.5)),
            Err(DropReason::InvalidVotes("12.5".to_string()))
        );
    }

    #[test]
    fn huge_vote_counts_are_invalid() {
        assert_eq!(parse_votes(&text("9223372036854775807")), Ok(MAX_VOTES));
        assert_eq!(
            parse_votes(&text("9223372036854775808")),
            Err(DropReason::InvalidVotes("9223372036854775808".to_string()))
        );
        assert_eq!(
            parse_votes(&text("1e19")),
            Err(DropReason::InvalidVotes("1e19".to_string()))
        );
        assert!(matches!(
            parse_votes(&RawCell::Number(1e19)),
            Err(DropReason::InvalidVotes(_))
        ));
    }

    #[test]
    fn vote_sums_never_overflow() {
        let err = calculate_percentages(&[
            tally(2021, 1, "A", MAX_VOTES),
            tally(2021, 1, "B", 1),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ElectoralError::VoteOverflow {
                year: 2021,
                seccional: SeccionalId(1)
            }
        );
        // Fine per seccional, too much for the whole dataset.
        let err = calculate_percentages(&[
            tally(2021, 1, "A", MAX_VOTES),
            tally(2021, 2, "A", MAX_VOTES),
        ])
        .unwrap_err();
        assert!(matches!(err, ElectoralError::VoteOverflow { .. }));

        let origin = RowRef {
            source: "s".to_string(),
            row: 2,
        };
        let row = NormalizedRow {
            year: 2021,
            office: "Diputados".to_string(),
            seccional: SeccionalId(1),
            party: "A".to_string(),
            votes: MAX_VOTES,
            origin,
        };
        let mut report = NormalizationReport::default();
        let err = aggregate(&[row.clone(), row], &mut report).unwrap_err();
        assert!(matches!(err, ElectoralError::VoteOverflow { .. }));
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year(&RawCell::Number(2023.0), 2021), Ok(2023));
        assert_eq!(parse_year(&RawCell::Empty, 2021), Ok(2021));
        assert_eq!(
            parse_year(&text("dos mil"), 2021),
            Err(DropReason::InvalidYear("dos mil".to_string()))
        );
    }

    #[test]
    fn every_row_is_kept_or_reported() {
        init();
        let t = table(
            &["año", "seccional", "agrupacion", "diputados"],
            vec![
                vec![
                    RawCell::Number(2021.0),
                    text("Seccional 1"),
                    text("JxC"),
                    RawCell::Number(10.0),
                ],
                vec![
                    RawCell::Number(2021.0),
                    text("Total"),
                    text("JxC"),
                    RawCell::Number(10.0),
                ],
                vec![
                    RawCell::Number(2021.0),
                    text("Seccional 9"),
                    text("JxC"),
                    RawCell::Number(1.0),
                ],
                vec![
                    RawCell::Number(2021.0),
                    text("Seccional 2"),
                    RawCell::Empty,
                    RawCell::Number(1.0),
                ],
                vec![
                    RawCell::Number(2021.0),
                    text("Seccional 2"),
                    text("Otro"),
                    RawCell::Empty,
                ],
                vec![RawCell::Empty, RawCell::Empty],
                // Short row: the vote cell is missing entirely.
                vec![RawCell::Number(2021.0), text("Seccional 2"), text("Otro")],
            ],
        );
        let mut report = NormalizationReport::default();
        let rows = normalize_table(&t, &info(), &mappings(), &mut report).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].party, "Juntos por el Cambio");
        assert_eq!(rows[0].office, "Diputados");
        assert_eq!(rows[0].origin.row, 2);

        let kinds = report.dropped_by_reason();
        assert_eq!(kinds.get("excludedSeccional"), Some(&1));
        assert_eq!(kinds.get("unknownSeccional"), Some(&1));
        assert_eq!(kinds.get("missingParty"), Some(&1));
        assert_eq!(kinds.get("missingVotes"), Some(&2));
        assert_eq!(report.dropped.len(), 5);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(
            rows.len() + report.dropped.len() + report.blank_rows,
            t.rows.len()
        );
    }

    #[test]
    fn row_year_wins_over_configured_year() {
        init();
        let t = table(
            &["año", "seccional", "agrupacion", "votos"],
            vec![
                vec![
                    RawCell::Number(2019.0),
                    text("Seccional 1"),
                    text("JxC"),
                    RawCell::Number(4.0),
                ],
                vec![
                    RawCell::Empty,
                    text("Seccional 2"),
                    text("JxC"),
                    RawCell::Number(6.0),
                ],
            ],
        );
        let mut report = NormalizationReport::default();
        let rows = normalize_table(&t, &info(), &mappings(), &mut report).unwrap();
        assert!(report.dropped.is_empty());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, 2019);
        assert_eq!(rows[1].year, 2021);
    }

    #[test]
    fn rows_are_numbered_after_the_header() {
        let mut t = table(
            &["seccional", "agrupacion", "votos"],
            vec![vec![text("Seccional 9"), text("JxC"), RawCell::Number(1.0)]],
        );
        t.header_row = 3;
        let mut report = NormalizationReport::default();
        normalize_table(&t, &info(), &mappings(), &mut report).unwrap();
        assert_eq!(report.dropped[0].origin.row, 4);
    }

    #[test]
    fn office_column_overrides_source_office() {
        let t = table(
            &["cargo", "seccional", "agrupacion", "votos"],
            vec![vec![
                text("Senadores"),
                RawCell::Number(1.0),
                text("Nuevo"),
                RawCell::Number(3.0),
            ]],
        );
        let mut report = NormalizationReport::default();
        let rows = normalize_table(&t, &info(), &mappings(), &mut report).unwrap();
        assert_eq!(rows[0].office, "Senadores");
        assert_eq!(rows[0].seccional, SeccionalId(1));
        assert!(report.unmapped_parties.contains("Nuevo"));
    }

    #[test]
    fn aggregation_merges_aliases() {
        let t = table(
            &["seccional", "agrupacion", "votos"],
            vec![
                vec![text("Seccional 1"), text("JxC"), RawCell::Number(10.0)],
                vec![
                    text("Seccional 1"),
                    text("JUNTOS POR EL CAMBIO"),
                    RawCell::Number(5.0),
                ],
            ],
        );
        let mut report = NormalizationReport::default();
        let rows = normalize_table(&t, &info(), &mappings(), &mut report).unwrap();
        let tallies = aggregate(&rows, &mut report).unwrap();
        assert_eq!(tallies, vec![tally(2021, 1, "Juntos por el Cambio", 15)]);
        assert_eq!(report.merged_rows, 1);
    }

    #[test]
    fn aggregation_rejects_office_conflicts() {
        let origin = RowRef {
            source: "s".to_string(),
            row: 2,
        };
        let row = |office: &str| NormalizedRow {
            year: 2021,
            office: office.to_string(),
            seccional: SeccionalId(1),
            party: "A".to_string(),
            votes: 1,
            origin: origin.clone(),
        };
        let mut report = NormalizationReport::default();
        let err = aggregate(&[row("Diputados"), row("Senadores")], &mut report).unwrap_err();
        assert!(matches!(err, ElectoralError::OfficeConflict { .. }));
    }

    #[test]
    fn percentages_and_order() {
        let res = calculate_percentages(&[
            tally(2021, 10, "A", 1),
            tally(2021, 2, "B", 1),
            tally(2021, 2, "A", 1),
            tally(2021, 2, "C", 1),
            tally(2021, 10, "B", 3),
        ])
        .unwrap();
        let keys: Vec<(u32, &str, u64, f64)> = res
            .iter()
            .map(|r| (r.seccional.0, r.party.as_str(), r.total_votes, r.percentage))
            .collect();
        assert_eq!(
            keys,
            vec![
                (2, "A", 3, 33.33),
                (2, "B", 3, 33.33),
                (2, "C", 3, 33.33),
                (10, "B", 4, 75.0),
                (10, "A", 4, 25.0),
            ]
        );
        assert_eq!(check_results(&res), Ok(()));
    }

    #[test]
    fn zero_total_gives_zero_percentage() {
        let res =
            calculate_percentages(&[tally(2023, 1, "A", 0), tally(2023, 1, "B", 0)]).unwrap();
        assert!(res.iter().all(|r| r.percentage == 0.0 && r.total_votes == 0));
    }

    #[test]
    fn checks_detect_broken_totals() {
        let mut res =
            calculate_percentages(&[tally(2021, 1, "A", 6), tally(2021, 1, "B", 4)]).unwrap();
        res[0].votes = 7;
        assert_eq!(
            check_results(&res),
            Err(ElectoralError::TotalsMismatch {
                year: 2021,
                seccional: SeccionalId(1),
                expected: 10,
                found: 11
            })
        );
        let mut dup = calculate_percentages(&[tally(2021, 1, "A", 6)]).unwrap();
        dup.push(dup[0].clone());
        assert!(matches!(
            check_results(&dup),
            Err(ElectoralError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn transform_skips_incomplete_sources() {
        let good = table(
            &["seccional", "agrupacion", "votos"],
            vec![
                vec![text("Seccional 1"), text("JxC"), RawCell::Number(3.0)],
                vec![text("Seccional 1"), text("FRENTE DE TODOS"), RawCell::Number(1.0)],
            ],
        );
        let bad = RawTable {
            source: "broken.xls".to_string(),
            header_row: 1,
            headers: vec!["seccional".to_string()],
            rows: vec![vec![text("Seccional 1")]],
        };
        let out = run_transform(&[(good, info()), (bad, info())], &mappings()).unwrap();
        assert_eq!(out.results.len(), 2);
        assert_eq!(out.results[0].party, "Juntos por el Cambio");
        assert_eq!(out.results[0].percentage, 75.0);
        assert_eq!(out.report.skipped_sources.len(), 1);
        assert_eq!(out.report.skipped_sources[0].0, "broken.xls");
    }

    #[test]
    fn transform_without_rows_fails() {
        let empty = table(&["seccional", "agrupacion", "votos"], vec![]);
        assert_eq!(
            run_transform(&[(empty, info())], &mappings()),
            Err(ElectoralError::NoData)
        );
    }
}
