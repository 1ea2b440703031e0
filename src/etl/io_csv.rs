// Primitives for reading and writing CSV files.

use std::fs::File;

use crate::etl::io_common::{ensure_parent_dir, simplify_file_name, text_cell};
use crate::etl::*;

/// Reads a tally exported as CSV. The first line is the header.
///
/// Exports from spreadsheets are not always valid UTF-8 (the `ñ` of `año`
/// in Latin-1 is common): invalid sequences are replaced, and the header
/// normalization recognizes the mangled form.
pub fn read_csv_tally(path: &Path) -> EtlResult<RawTable> {
    let p = path.display().to_string();
    let mut records = get_records(&p)?;

    let headers: Vec<String> = match records.next() {
        Some(line_r) => {
            let line = line_r.context(CsvLineParseSnafu {
                path: p.clone(),
                lineno: 1_usize,
            })?;
            line.iter()
                .map(|b| String::from_utf8_lossy(b).trim().to_string())
                .collect()
        }
        None => whatever!("empty CSV file {}", p),
    };
    debug!("read_csv_tally: header: {:?}", headers);

    let mut rows: Vec<Vec<RawCell>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {
            path: p.clone(),
            lineno,
        })?;
        let cells: Vec<RawCell> = line
            .iter()
            .map(|b| text_cell(&String::from_utf8_lossy(b)))
            .collect();
        debug!("read_csv_tally: lineno: {:?} row: {:?}", lineno, cells);
        rows.push(cells);
    }
    Ok(RawTable {
        source: simplify_file_name(path),
        header_row: 1,
        headers,
        rows,
    })
}

fn get_records(path: &str) -> EtlResult<csv::ByteRecordsIntoIter<File>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    Ok(rdr.into_byte_records())
}

/// Writes the final dataset, one row per result.
pub fn write_clean_csv(path: &Path, results: &[ElectoralResult]) -> EtlResult<()> {
    let p = path.display().to_string();
    ensure_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path: p.clone() })?;
    for r in results.iter() {
        wtr.serialize(r).context(CsvWriteSnafu { path: p.clone() })?;
    }
    wtr.flush().context(WritingFileSnafu { path: p.clone() })?;
    info!("Wrote {} rows to {}", results.len(), p);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn latin1_header_and_ragged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.csv");
        let mut content: Vec<u8> = Vec::new();
        content.extend_from_slice(b"a\xf1o,seccional,agrupacion,sum_diputados\n");
        content.extend_from_slice(b"2023, Seccional 1 ,LA LIBERTAD AVANZA,50\n");
        content.extend_from_slice(b"2023,TOTAL\n");
        fs::write(&path, content).unwrap();

        let t = read_csv_tally(&path).unwrap();
        assert_eq!(t.source, "tally.csv");
        assert_eq!(t.headers[0], "a\u{fffd}o");
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0][1], RawCell::Text("Seccional 1".to_string()));
        assert_eq!(t.rows[0][3], RawCell::Text("50".to_string()));
        assert_eq!(t.rows[1].len(), 2);
    }

    #[test]
    fn clean_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("clean.csv");
        let results = vec![ElectoralResult {
            year: 2021,
            office: "Diputados".to_string(),
            seccional: SeccionalId(10),
            party: "Frente de Todos".to_string(),
            votes: 150,
            total_votes: 800,
            percentage: 18.75,
        }];
        write_clean_csv(&path, &results).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "anio,cargo,seccional,agrupacion,votos,total_votos,porcentaje\n\
             2021,Diputados,10,Frente de Todos,150,800,18.75\n"
        );
    }
}
