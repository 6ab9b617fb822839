use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use owo_colors::OwoColorize;
use zotero_digest_core::text::prefix_chars;
use zotero_digest_core::{AnalysisStats, PaperAnalysis};
use zotero_digest_library::{Collection, CollectionTree};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

const TITLE_WIDTH: usize = 60;

pub fn short_title(title: &str) -> String {
    let short = prefix_chars(title, TITLE_WIDTH);
    if short.len() < title.len() {
        format!("{}...", short)
    } else {
        title.to_string()
    }
}

/// What is about to be analyzed.
pub fn print_run_header(
    w: &mut dyn Write,
    database: &Path,
    total: usize,
    model: &str,
    language: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Database: {}", database.display())?;
    if color.enabled() {
        writeln!(
            w,
            "Analyzing {} papers with {} (output language: {})",
            total.to_string().bold(),
            model.cyan(),
            language
        )?;
    } else {
        writeln!(
            w,
            "Analyzing {} papers with {} (output language: {})",
            total, model, language
        )?;
    }
    writeln!(w)?;
    Ok(())
}

/// One line for a finished item, printed above the progress bar.
pub fn item_line(index: usize, total: usize, analysis: &PaperAnalysis, elapsed: Duration, color: ColorMode) -> String {
    let title = short_title(&analysis.title);
    let secs = elapsed.as_secs_f64();
    if analysis.status.is_success() {
        if color.enabled() {
            format!("[{}/{}] {} {} ({:.1}s)", index + 1, total, "ok".green(), title, secs)
        } else {
            format!("[{}/{}] ok {} ({:.1}s)", index + 1, total, title, secs)
        }
    } else {
        let error = analysis.status.error_message();
        if color.enabled() {
            format!(
                "[{}/{}] {} {}: {}",
                index + 1,
                total,
                "failed".red(),
                title,
                error.dimmed()
            )
        } else {
            format!("[{}/{}] failed {}: {}", index + 1, total, title, error)
        }
    }
}

/// Final summary after the batch and export.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &AnalysisStats,
    planned: usize,
    reports: &[PathBuf],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if stats.total < planned {
        let msg = format!(
            "Interrupted: {} of {} papers were analyzed; exporting partial results.",
            stats.total, planned
        );
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }

    if color.enabled() {
        writeln!(w, "{}", "Summary".bold())?;
        writeln!(w, "  Analyzed:  {}", stats.total)?;
        writeln!(w, "  Succeeded: {}", stats.succeeded.to_string().green())?;
        if stats.failed > 0 {
            writeln!(w, "  Failed:    {}", stats.failed.to_string().red())?;
        } else {
            writeln!(w, "  Failed:    {}", stats.failed)?;
        }
    } else {
        writeln!(w, "Summary")?;
        writeln!(w, "  Analyzed:  {}", stats.total)?;
        writeln!(w, "  Succeeded: {}", stats.succeeded)?;
        writeln!(w, "  Failed:    {}", stats.failed)?;
    }
    writeln!(w, "  Success rate: {:.1}%", stats.success_rate())?;

    for (error, count) in &stats.error_types {
        writeln!(w, "    {} x {}", count, error)?;
    }

    if !reports.is_empty() {
        writeln!(w)?;
        writeln!(w, "Reports:")?;
        for path in reports {
            writeln!(w, "  {}", path.display())?;
        }
    }
    Ok(())
}

fn collection_line(c: &Collection, label: &str, color: ColorMode) -> String {
    if color.enabled() {
        format!("{} {} ({} items)", c.key.dimmed(), label, c.item_count)
    } else {
        format!("{} {} ({} items)", c.key, label, c.item_count)
    }
}

/// The whole collection tree, indented by level.
pub fn print_collection_tree(
    w: &mut dyn Write,
    tree: &CollectionTree,
    color: ColorMode,
) -> std::io::Result<()> {
    if tree.is_empty() {
        writeln!(w, "No collections found.")?;
        return Ok(());
    }
    for c in tree.depth_first() {
        let indent = "  ".repeat(c.level);
        writeln!(w, "{}{}", indent, collection_line(c, &c.name, color))?;
    }
    writeln!(w)?;
    writeln!(w, "{} collections. Pass keys to `analyze --collection KEY`.", tree.len())?;
    Ok(())
}

/// Search hits, shown with their full paths.
pub fn print_collection_matches(
    w: &mut dyn Write,
    tree: &CollectionTree,
    term: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    let found = tree.find(term);
    if found.is_empty() {
        writeln!(w, "No collections match \"{}\".", term)?;
        return Ok(());
    }
    for c in &found {
        writeln!(w, "{}", collection_line(c, &tree.path(&c.key), color))?;
    }
    Ok(())
}

/// Sectioned configuration summary.
pub fn print_config(
    w: &mut dyn Write,
    dir: &Path,
    sections: &[(&'static str, Vec<(&'static str, String)>)],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Config directory: {}", dir.display())?;
    for (section, entries) in sections {
        writeln!(w)?;
        if color.enabled() {
            writeln!(w, "{}", section.bold())?;
        } else {
            writeln!(w, "{}", section)?;
        }
        for (key, value) in entries {
            writeln!(w, "  {:<22} {}", key, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zotero_digest_core::AnalysisStatus;

    fn render(f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn coll(key: &str, name: &str, parent: Option<&str>, count: usize) -> Collection {
        Collection {
            collection_id: 0,
            key: key.into(),
            name: name.into(),
            parent_key: parent.map(String::from),
            item_count: count,
            level: 0,
            children: Vec::new(),
        }
    }

    #[test]
    fn short_title_truncates_on_char_boundary() {
        let long = "图".repeat(80);
        let short = short_title(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), TITLE_WIDTH + 3);
        assert_eq!(short_title("Brief"), "Brief");
    }

    #[test]
    fn failed_item_line_has_error() {
        let a = PaperAnalysis {
            title: "Paper".into(),
            status: AnalysisStatus::Failed {
                error: "missing text content".into(),
            },
            ..Default::default()
        };
        let line = item_line(0, 3, &a, Duration::from_millis(1500), ColorMode(false));
        assert_eq!(line, "[1/3] failed Paper: missing text content");
    }

    #[test]
    fn tree_is_indented() {
        let tree = CollectionTree::from_collections(vec![
            coll("A", "Machine Learning", None, 4),
            coll("B", "Graphs", Some("A"), 2),
        ]);
        let out = render(|w| print_collection_tree(w, &tree, ColorMode(false)));
        assert!(out.contains("A Machine Learning (4 items)\n  B Graphs (2 items)\n"));
    }

    #[test]
    fn matches_show_full_path() {
        let tree = CollectionTree::from_collections(vec![
            coll("A", "Machine Learning", None, 4),
            coll("B", "Graphs", Some("A"), 2),
        ]);
        let out = render(|w| print_collection_matches(w, &tree, "graph", ColorMode(false)));
        assert_eq!(out, "B Machine Learning / Graphs (2 items)\n");
        let none = render(|w| print_collection_matches(w, &tree, "zzz", ColorMode(false)));
        assert!(none.starts_with("No collections match"));
    }

    #[test]
    fn summary_mentions_interruption() {
        let stats = AnalysisStats {
            total: 1,
            succeeded: 1,
            ..Default::default()
        };
        let out = render(|w| print_summary(w, &stats, 3, &[], ColorMode(false)));
        assert!(out.contains("Interrupted: 1 of 3"));
        assert!(out.contains("Success rate: 100.0%"));
    }
}
