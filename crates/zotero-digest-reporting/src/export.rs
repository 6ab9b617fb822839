use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zotero_digest_core::{AnalysisStats, PaperAnalysis};

use crate::ReportError;

/// Byte order mark so spreadsheet applications detect UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// At most this many collection names go into a file name.
const MAX_NAME_PARTS: usize = 3;

const ANALYSIS_HEADER: [&str; 11] = [
    "No",
    "Collection",
    "Title",
    "Translated Title",
    "Authors",
    "Abstract",
    "Innovation Points",
    "Summary",
    "Verdict",
    "Status",
    "Error",
];

const DETAILED_HEADER: [&str; 17] = [
    "No",
    "Collection",
    "Title",
    "Translated Title",
    "Authors",
    "Author Count",
    "Abstract",
    "Abstract Chars",
    "Innovation Points",
    "Innovation Points Chars",
    "Summary",
    "Summary Chars",
    "Verdict",
    "Status",
    "Error",
    "Title Length",
    "Has Translation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Analysis,
    Statistics,
    DetailedReport,
}

impl ReportKind {
    fn stem(self) -> &'static str {
        match self {
            ReportKind::Analysis => "analysis",
            ReportKind::Statistics => "statistics",
            ReportKind::DetailedReport => "detailed_report",
        }
    }
}

/// Keep only alphanumerics and `._-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// `zotero_<kind>[_<c1>_<c2>_<c3>]_<timestamp>.csv`
pub fn report_filename(kind: ReportKind, collection_names: &[String], timestamp: &str) -> String {
    let names: Vec<String> = collection_names
        .iter()
        .take(MAX_NAME_PARTS)
        .map(|n| sanitize_name(n))
        .collect();
    if names.is_empty() {
        format!("zotero_{}_{}.csv", kind.stem(), timestamp)
    } else {
        format!("zotero_{}_{}_{}.csv", kind.stem(), names.join("_"), timestamp)
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn write_pair<W: Write>(
    w: &mut csv::Writer<W>,
    label: &str,
    value: impl std::fmt::Display,
) -> Result<(), csv::Error> {
    w.write_record([label, value.to_string().as_str()])
}

fn char_count(s: &str) -> String {
    s.chars().count().to_string()
}

/// Writes the reports of one run into a directory, all sharing one
/// timestamp.
pub struct ReportWriter {
    output_dir: PathBuf,
    collection_names: Vec<String>,
    timestamp: String,
}

impl ReportWriter {
    /// Create the output directory if needed and fix the timestamp.
    pub fn new(output_dir: &Path, collection_names: &[String]) -> Result<Self, ReportError> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            collection_names: collection_names.to_vec(),
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    pub fn path_for(&self, kind: ReportKind) -> PathBuf {
        self.output_dir
            .join(report_filename(kind, &self.collection_names, &self.timestamp))
    }

    fn create(&self, kind: ReportKind) -> Result<(PathBuf, csv::Writer<File>), ReportError> {
        let path = self.path_for(kind);
        let mut file = File::create(&path)?;
        file.write_all(UTF8_BOM)?;
        let writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
        Ok((path, writer))
    }

    pub fn export_analyses(&self, analyses: &[PaperAnalysis]) -> Result<PathBuf, ReportError> {
        let (path, mut w) = self.create(ReportKind::Analysis)?;
        tracing::info!(count = analyses.len(), path = %path.display(), "exporting analyses");

        w.write_record(ANALYSIS_HEADER)?;
        for (i, a) in analyses.iter().enumerate() {
            w.write_record([
                (i + 1).to_string(),
                a.collection_path.clone(),
                a.title.clone(),
                a.translated_title.clone(),
                a.authors.clone(),
                a.abstract_text.clone(),
                a.innovation_points.clone(),
                a.summary.clone(),
                a.verdict.clone(),
                a.status.label().to_string(),
                a.status.error_message().to_string(),
            ])?;
        }
        w.flush()?;
        Ok(path)
    }

    pub fn export_statistics(&self, analyses: &[PaperAnalysis]) -> Result<PathBuf, ReportError> {
        let (path, mut w) = self.create(ReportKind::Statistics)?;
        let stats = AnalysisStats::from_analyses(analyses);
        tracing::info!(path = %path.display(), "exporting statistics");

        let rate = if stats.total > 0 {
            format!("{:.1}%", stats.success_rate())
        } else {
            "0%".to_string()
        };

        w.write_record(["Metric", "Value"])?;
        write_pair(&mut w, "Total papers", stats.total)?;
        write_pair(&mut w, "Succeeded", stats.succeeded)?;
        write_pair(&mut w, "Failed", stats.failed)?;
        write_pair(&mut w, "Success rate", rate)?;

        w.write_record(["Error types"])?;
        w.write_record(["Error type", "Count"])?;
        for (error, count) in &stats.error_types {
            write_pair(&mut w, error, count)?;
        }

        w.write_record(["Author count distribution"])?;
        w.write_record(["Authors", "Papers"])?;
        for (bucket, count) in &stats.author_buckets {
            write_pair(&mut w, bucket, count)?;
        }
        w.flush()?;
        Ok(path)
    }

    pub fn export_detailed(&self, analyses: &[PaperAnalysis]) -> Result<PathBuf, ReportError> {
        let (path, mut w) = self.create(ReportKind::DetailedReport)?;
        tracing::info!(count = analyses.len(), path = %path.display(), "exporting detailed report");

        w.write_record(DETAILED_HEADER)?;
        for (i, a) in analyses.iter().enumerate() {
            w.write_record([
                (i + 1).to_string(),
                a.collection_path.clone(),
                a.title.clone(),
                a.translated_title.clone(),
                a.authors.clone(),
                a.author_count().to_string(),
                a.abstract_text.clone(),
                char_count(&a.abstract_text),
                a.innovation_points.clone(),
                char_count(&a.innovation_points),
                a.summary.clone(),
                char_count(&a.summary),
                a.verdict.clone(),
                a.status.label().to_string(),
                a.status.error_message().to_string(),
                char_count(&a.title),
                yes_no(!a.translated_title.is_empty()).to_string(),
            ])?;
        }
        w.flush()?;
        Ok(path)
    }
}

/// Write the analysis CSV and, as requested, the statistics and detailed
/// reports. Returns the written paths in that order.
pub fn export_all(
    analyses: &[PaperAnalysis],
    output_dir: &Path,
    collection_names: &[String],
    statistics: bool,
    detailed: bool,
) -> Result<Vec<PathBuf>, ReportError> {
    let writer = ReportWriter::new(output_dir, collection_names)?;
    let mut paths = vec![writer.export_analyses(analyses)?];
    if statistics {
        paths.push(writer.export_statistics(analyses)?);
    }
    if detailed {
        paths.push(writer.export_detailed(analyses)?);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zotero_digest_core::AnalysisStatus;

    fn analysis(title: &str, authors: &str, status: AnalysisStatus) -> PaperAnalysis {
        PaperAnalysis {
            title: title.into(),
            authors: authors.into(),
            collection_path: "ML / Graphs".into(),
            abstract_text: "Abstract, with a comma".into(),
            innovation_points: "First\nSecond".into(),
            summary: "Summary with \"quotes\"".into(),
            status,
            ..Default::default()
        }
    }

    fn sample() -> Vec<PaperAnalysis> {
        vec![
            PaperAnalysis {
                translated_title: "图网络".into(),
                verdict: "Worth reading".into(),
                ..analysis("Graph Networks", "Alan Turing; Ada Lovelace", AnalysisStatus::Success)
            },
            analysis(
                "Broken",
                "Unknown authors",
                AnalysisStatus::Failed {
                    error: "API error (500): boom".into(),
                },
            ),
        ]
    }

    /// Read a report back, checking and skipping the BOM.
    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM), "missing BOM");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(&bytes[UTF8_BOM.len()..]);
        reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn filenames_with_and_without_collections() {
        assert_eq!(
            report_filename(ReportKind::Analysis, &[], "20240101_120000"),
            "zotero_analysis_20240101_120000.csv"
        );
        let names = vec![
            "Machine Learning".to_string(),
            "a/b:c".to_string(),
            "v1.2_x-y".to_string(),
            "Fourth".to_string(),
        ];
        assert_eq!(
            report_filename(ReportKind::DetailedReport, &names, "20240101_120000"),
            "zotero_detailed_report_MachineLearning_abc_v1.2_x-y_20240101_120000.csv"
        );
    }

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_name("深度 学习!"), "深度学习");
    }

    #[test]
    fn analysis_csv_round_trips_awkward_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), &[]).unwrap();
        let path = writer.export_analyses(&sample()).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ANALYSIS_HEADER.map(String::from).to_vec());
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][3], "图网络");
        assert_eq!(rows[1][5], "Abstract, with a comma");
        assert_eq!(rows[1][6], "First\nSecond");
        assert_eq!(rows[1][7], "Summary with \"quotes\"");
        assert_eq!(rows[1][8], "Worth reading");
        assert_eq!(rows[1][9], "success");
        assert_eq!(rows[2][9], "failed");
        assert_eq!(rows[2][10], "API error (500): boom");
    }

    #[test]
    fn statistics_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), &[]).unwrap();
        let rows = read_rows(&writer.export_statistics(&sample()).unwrap());

        let find = |label: &str| {
            rows.iter()
                .find(|r| r[0] == label)
                .map(|r| r[1].clone())
                .unwrap_or_default()
        };
        assert_eq!(find("Total papers"), "2");
        assert_eq!(find("Succeeded"), "1");
        assert_eq!(find("Failed"), "1");
        assert_eq!(find("Success rate"), "50.0%");
        assert_eq!(find("API error (500)"), "1");
        assert_eq!(find("2-3"), "1");
        assert_eq!(find("unknown"), "1");
    }

    #[test]
    fn statistics_sections_follow_each_other_without_filler_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), &[]).unwrap();
        let path = writer.export_statistics(&sample()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        for line in raw.trim_start_matches('\u{feff}').lines() {
            assert!(!line.is_empty() && line != "\"\"", "filler row: {line:?}");
        }

        let rows = read_rows(&path);
        let error_section = rows.iter().position(|r| r[0] == "Error types").unwrap();
        assert_eq!(rows[error_section - 1][0], "Success rate");
        assert_eq!(rows[error_section + 1], vec!["Error type", "Count"]);
        let author_section = rows
            .iter()
            .position(|r| r[0] == "Author count distribution")
            .unwrap();
        assert_eq!(rows[author_section + 1], vec!["Authors", "Papers"]);
    }

    #[test]
    fn empty_statistics_rate() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), &[]).unwrap();
        let rows = read_rows(&writer.export_statistics(&[]).unwrap());
        assert!(rows.iter().any(|r| r[0] == "Success rate" && r[1] == "0%"));
    }

    #[test]
    fn detailed_report_counts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), &[]).unwrap();
        let rows = read_rows(&writer.export_detailed(&sample()).unwrap());

        assert_eq!(rows[0].len(), DETAILED_HEADER.len());
        let first = &rows[1];
        assert_eq!(first[5], "2");
        assert_eq!(first[7], "Abstract, with a comma".chars().count().to_string());
        assert_eq!(first[15], "14");
        assert_eq!(first[16], "yes");
        assert_eq!(rows[2][5], "0");
        assert_eq!(rows[2][16], "no");
    }

    #[test]
    fn export_all_respects_flags_and_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("output");
        let names = vec!["Graphs".to_string()];

        let only = export_all(&sample(), &out, &names, false, false).unwrap();
        assert_eq!(only.len(), 1);
        assert!(only[0].exists());

        let all = export_all(&sample(), &out, &names, true, true).unwrap();
        assert_eq!(all.len(), 3);
        let file_names: Vec<String> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(file_names[0].starts_with("zotero_analysis_Graphs_"));
        assert!(file_names[1].starts_with("zotero_statistics_Graphs_"));
        assert!(file_names[2].starts_with("zotero_detailed_report_Graphs_"));
    }
}
