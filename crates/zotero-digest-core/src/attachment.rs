//! Mapping Zotero attachment rows to files on disk.

use std::path::{Path, PathBuf};

use crate::{Attachment, LibraryItem};

const STORAGE_PREFIX: &str = "storage:";

/// Resolve an attachment to an existing file.
///
/// Stored files (`storage:<name>`) live under
/// `<data_dir>/storage/<attachment key>/<name>`; anything else is a linked
/// file path. Returns `None` when the path is missing or the file does not
/// exist.
pub fn resolve_attachment_path(attachment: &Attachment, data_dir: Option<&Path>) -> Option<PathBuf> {
    let raw = attachment.path.as_deref()?;

    let full = if let Some(relative) = raw.strip_prefix(STORAGE_PREFIX) {
        let data_dir = data_dir?;
        if attachment.key.is_empty() {
            tracing::debug!(title = %attachment.title, "stored attachment has no key");
            return None;
        }
        data_dir.join("storage").join(&attachment.key).join(relative)
    } else {
        PathBuf::from(raw)
    };

    tracing::debug!(path = %full.display(), "resolved attachment path");
    full.exists().then_some(full)
}

/// Existing PDF attachments of an item, in attachment order.
pub fn pdf_candidates(item: &LibraryItem, data_dir: Option<&Path>) -> Vec<PathBuf> {
    item.attachments
        .iter()
        .filter(|a| a.is_pdf())
        .filter_map(|a| {
            let resolved = resolve_attachment_path(a, data_dir);
            if resolved.is_none() {
                tracing::debug!(
                    item = %item.key,
                    attachment = %a.key,
                    path = a.path.as_deref().unwrap_or(""),
                    "PDF attachment not found on disk"
                );
            }
            resolved
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(key: &str, path: Option<&str>, content_type: &str) -> Attachment {
        Attachment {
            key: key.into(),
            title: "Full Text PDF".into(),
            path: path.map(String::from),
            content_type: Some(content_type.into()),
        }
    }

    #[test]
    fn stored_attachment_uses_attachment_key() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("storage").join("ABCD1234").join("paper.pdf");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let a = attachment("ABCD1234", Some("storage:paper.pdf"), "application/pdf");
        assert_eq!(resolve_attachment_path(&a, Some(dir.path())), Some(file));
    }

    #[test]
    fn stored_attachment_needs_data_dir() {
        let a = attachment("ABCD1234", Some("storage:paper.pdf"), "application/pdf");
        assert_eq!(resolve_attachment_path(&a, None), None);
    }

    #[test]
    fn stored_attachment_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let a = attachment("", Some("storage:paper.pdf"), "application/pdf");
        assert_eq!(resolve_attachment_path(&a, Some(dir.path())), None);
    }

    #[test]
    fn linked_attachment_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("linked.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let a = attachment("K", Some(file.to_str().unwrap()), "application/pdf");
        assert_eq!(resolve_attachment_path(&a, None), Some(file));
    }

    #[test]
    fn missing_file_or_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = attachment("K", Some("storage:gone.pdf"), "application/pdf");
        assert_eq!(resolve_attachment_path(&a, Some(dir.path())), None);
        let b = attachment("K", None, "application/pdf");
        assert_eq!(resolve_attachment_path(&b, Some(dir.path())), None);
    }

    #[test]
    fn candidates_filter_non_pdf_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        for (key, name) in [("AAA", "a.pdf"), ("BBB", "b.html"), ("DDD", "d.pdf")] {
            let f = dir.path().join("storage").join(key).join(name);
            std::fs::create_dir_all(f.parent().unwrap()).unwrap();
            std::fs::write(&f, b"x").unwrap();
        }
        let item = LibraryItem {
            key: "ITEM".into(),
            attachments: vec![
                attachment("AAA", Some("storage:a.pdf"), "application/pdf"),
                attachment("BBB", Some("storage:b.html"), "text/html"),
                attachment("CCC", Some("storage:c.pdf"), "application/pdf"),
                attachment("DDD", Some("storage:d.pdf"), "application/pdf"),
            ],
            ..Default::default()
        };
        let found = pdf_candidates(&item, Some(dir.path()));
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("AAA/a.pdf"));
        assert!(found[1].ends_with("DDD/d.pdf"));
    }
}
