//! Read-only access to a local Zotero library.
//!
//! Reads regular items (everything except notes, attachments, annotations and
//! trashed items) from `zotero.sqlite` together with their fields, creators,
//! tags, child attachments, child notes and collection paths.

mod collections;
mod items;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, ErrorCode, OpenFlags};
use thiserror::Error;
use zotero_digest_core::LibraryItem;

pub use collections::{Collection, CollectionTree, PATH_SEPARATOR};

/// File name of the Zotero database inside the data directory.
pub const DATABASE_FILE: &str = "zotero.sqlite";

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zotero database not found: {0}")]
    NotFound(PathBuf),
    #[error("could not find a Zotero database (searched {searched:?}); pass its path explicitly")]
    NotDetected { searched: Vec<PathBuf> },
}

/// Places a Zotero database is commonly found, in search order.
pub fn database_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("Zotero").join(DATABASE_FILE));
    }
    if let Some(appdata) = std::env::var_os("APPDATA") {
        candidates.push(PathBuf::from(appdata).join("Zotero").join("Zotero").join(DATABASE_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("Documents").join("Zotero").join(DATABASE_FILE));
        candidates.push(home.join(".zotero").join(DATABASE_FILE));
    }
    candidates
}

/// Auto-detect the Zotero database.
pub fn locate_database() -> Result<PathBuf, LibraryError> {
    let searched = database_candidates();
    match searched.iter().find(|p| p.is_file()) {
        Some(found) => {
            tracing::info!(path = %found.display(), "found Zotero database");
            Ok(found.clone())
        }
        None => Err(LibraryError::NotDetected { searched }),
    }
}

fn open_read_only(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn check_readable(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// An open Zotero database.
pub struct Library {
    conn: Connection,
    path: PathBuf,
    data_dir: Option<PathBuf>,
    has_trash: bool,
    /// Holds the copy when the live database was locked.
    _snapshot: Option<tempfile::TempDir>,
}

impl Library {
    /// Open a database read-only. A database locked by a running Zotero is
    /// copied to a temporary snapshot which is read instead.
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if !path.is_file() {
            return Err(LibraryError::NotFound(path.to_path_buf()));
        }
        let data_dir = path.parent().map(Path::to_path_buf);

        let conn = open_read_only(path)?;
        let (conn, snapshot) = match check_readable(&conn) {
            Ok(()) => (conn, None),
            Err(e) if is_locked(&e) => {
                drop(conn);
                tracing::warn!(path = %path.display(), "database is locked, reading a snapshot copy");
                let dir = tempfile::tempdir()?;
                let copy = dir.path().join(DATABASE_FILE);
                std::fs::copy(path, &copy)?;
                let conn = open_read_only(&copy)?;
                check_readable(&conn)?;
                (conn, Some(dir))
            }
            Err(e) => return Err(e.into()),
        };

        let has_trash = table_exists(&conn, "deletedItems")?;
        tracing::info!(path = %path.display(), snapshot = snapshot.is_some(), "opened Zotero database");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            data_dir,
            has_trash,
            _snapshot: snapshot,
        })
    }

    /// Wrap an existing connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection, data_dir: Option<PathBuf>) -> Result<Self, LibraryError> {
        let has_trash = table_exists(&conn, "deletedItems")?;
        Ok(Self {
            conn,
            path: PathBuf::new(),
            data_dir,
            has_trash,
            _snapshot: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the database and its `storage/` folder.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// All collections with their direct regular-item counts.
    pub fn collections(&self) -> Result<CollectionTree, LibraryError> {
        items::load_collections(&self.conn, self.has_trash)
    }

    /// All regular items, newest first.
    pub fn items(&self) -> Result<Vec<LibraryItem>, LibraryError> {
        let tree = self.collections()?;
        items::load_items(&self.conn, self.has_trash, &tree, &[])
    }

    /// Regular items filed in any of `keys`, newest first, each once.
    pub fn items_in_collections(&self, keys: &[String]) -> Result<Vec<LibraryItem>, LibraryError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let tree = self.collections()?;
        for key in keys {
            if tree.get(key).is_none() {
                tracing::warn!(key = %key, "unknown collection key");
            }
        }
        items::load_items(&self.conn, self.has_trash, &tree, keys)
    }
}
