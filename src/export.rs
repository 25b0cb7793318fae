//! CSV export of merged results and summary tables.
//!
//! Files start with a UTF-8 byte order mark so spreadsheet applications
//! detect the encoding of Korean text.

use crate::analysis::{keyword_frequency, source_counts, top_venues, year_counts, DEFAULT_TOP_N};
use crate::error::Result;
use crate::merge::{title_key, CanonicalRecord, CANONICAL_COLUMNS};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Base file name for one export: `results_{title key}_{YYYYmmdd_HHMMSS}`.
pub fn export_file_name(primary_term: &str, at: DateTime<Local>) -> String {
    format!("results_{}_{}", title_key(primary_term), at.format("%Y%m%d_%H%M%S"))
}

/// Write records with a header row, even when there are none.
pub fn write_records<W: Write>(mut writer: W, records: &[CanonicalRecord]) -> Result<()> {
    writer.write_all(UTF8_BOM)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CANONICAL_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write records to `path`.
pub fn write_records_csv(path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    write_records(File::create(path)?, records)?;
    info!(path = %path.display(), count = records.len(), "Saved records");
    Ok(())
}

/// Write a two-column `(label, count)` table to `path`.
pub fn write_count_csv(path: &Path, headers: [&str; 2], rows: &[(String, usize)]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record(headers)?;
    for (label, count) in rows {
        let count = count.to_string();
        wtr.write_record([label.as_str(), count.as_str()])?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Saved summary");
    Ok(())
}

/// Write the merged records and the year, source, venue and keyword
/// summaries into `dir`. Returns the written paths.
pub fn export_all(
    dir: &Path,
    primary_term: &str,
    records: &[CanonicalRecord],
    at: DateTime<Local>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let base = export_file_name(primary_term, at);

    let results_path = dir.join(format!("{}.csv", base));
    write_records_csv(&results_path, records)?;

    let sources: Vec<(String, usize)> = source_counts(records)
        .into_iter()
        .map(|(source, n)| (source.to_string(), n))
        .collect();

    let summaries: [(&str, [&str; 2], Vec<(String, usize)>); 4] = [
        ("years", ["pub_year", "count"], year_counts(records)),
        ("sources", ["source", "count"], sources),
        ("venues", ["venue", "count"], top_venues(records, DEFAULT_TOP_N)),
        ("keywords", ["keyword", "count"], keyword_frequency(records, DEFAULT_TOP_N)),
    ];

    let mut written = vec![results_path];
    for (suffix, headers, rows) in &summaries {
        let path = dir.join(format!("{}_{}.csv", base, suffix));
        write_count_csv(&path, *headers, rows)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge, Source};
    use chrono::TimeZone;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("readable export")
    }

    #[test]
    fn test_empty_merge_still_has_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.csv");
        write_records_csv(&path, &merge(Vec::new(), Vec::new())).expect("write");

        let content = read(&path);
        assert!(content.starts_with('\u{feff}'));
        assert_eq!(
            content.trim_start_matches('\u{feff}').trim_end(),
            CANONICAL_COLUMNS.join(",")
        );
    }

    #[test]
    fn test_records_in_column_order() {
        let mut buffer = Vec::new();
        let record = CanonicalRecord {
            title: "청년 고용, 정책".to_string(),
            abstract_text: "초록".to_string(),
            pub_year: "2021".to_string(),
            identifier: "ART1".to_string(),
            ..CanonicalRecord::empty(Source::Kci)
        };
        write_records(&mut buffer, &[record]).expect("write");

        let content = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = content.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "\"청년 고용, 정책\",,,2021,,,초록,,KCI,,,ART1");
    }

    #[test]
    fn test_file_name() {
        let at = Local
            .with_ymd_and_hms(2025, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous time");
        assert_eq!(export_file_name("청년 고용!", at), "results_청년 고용_20250309_140507");
    }

    #[test]
    fn test_export_all_writes_summaries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let records = vec![CanonicalRecord {
            title: "A".to_string(),
            venue: "노동정책연구".to_string(),
            pub_year: "2020".to_string(),
            keywords: "고용; 임금".to_string(),
            ..CanonicalRecord::empty(Source::Kci)
        }];
        let at = Local
            .with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
            .single()
            .expect("unambiguous time");

        let paths = export_all(dir.path(), "고용", &records, at).expect("export");
        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.exists()));

        let years = read(&dir.path().join("results_고용_20250102_030405_years.csv"));
        assert_eq!(years.trim_start_matches('\u{feff}'), "pub_year,count\n2020,1\n");
    }
}
