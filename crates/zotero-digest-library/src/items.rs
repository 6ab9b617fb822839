//! SQL queries against the Zotero schema.

use std::collections::HashMap;

use rusqlite::{Connection, params_from_iter};
use zotero_digest_core::{Attachment, Creator, LibraryItem};

use crate::LibraryError;
use crate::collections::{Collection, CollectionTree};

/// Item types that are never analyzed on their own.
const NON_REGULAR_TYPES: &str = "('note', 'attachment', 'annotation')";

/// `WHERE` condition selecting regular, non-trashed items aliased `i` / `it`.
fn regular_item_condition(has_trash: bool) -> String {
    let mut cond = format!("it.typeName NOT IN {}", NON_REGULAR_TYPES);
    if has_trash {
        cond.push_str(" AND i.itemID NOT IN (SELECT itemID FROM deletedItems)");
    }
    cond
}

pub(crate) fn load_collections(conn: &Connection, has_trash: bool) -> Result<CollectionTree, LibraryError> {
    let mut stmt = conn.prepare(
        "SELECT c.collectionID, c.key, c.collectionName, pc.key
         FROM collections c
         LEFT JOIN collections pc ON c.parentCollectionID = pc.collectionID
         ORDER BY c.collectionName",
    )?;
    let mut collections = stmt
        .query_map([], |row| {
            Ok(Collection {
                collection_id: row.get(0)?,
                key: row.get(1)?,
                name: row.get(2)?,
                parent_key: row.get(3)?,
                item_count: 0,
                level: 0,
                children: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let count_sql = format!(
        "SELECT ci.collectionID, COUNT(DISTINCT ci.itemID)
         FROM collectionItems ci
         JOIN items i ON ci.itemID = i.itemID
         JOIN itemTypes it ON i.itemTypeID = it.itemTypeID
         WHERE {}
         GROUP BY ci.collectionID",
        regular_item_condition(has_trash)
    );
    let mut stmt = conn.prepare(&count_sql)?;
    let counts: HashMap<i64, usize> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .map(|r| r.map(|(id, n)| (id, n.max(0) as usize)))
        .collect::<Result<_, _>>()?;

    for c in &mut collections {
        c.item_count = counts.get(&c.collection_id).copied().unwrap_or(0);
    }

    tracing::debug!(count = collections.len(), "loaded collections");
    Ok(CollectionTree::from_collections(collections))
}

/// Load regular items, optionally restricted to the given collection keys.
pub(crate) fn load_items(
    conn: &Connection,
    has_trash: bool,
    tree: &CollectionTree,
    collection_keys: &[String],
) -> Result<Vec<LibraryItem>, LibraryError> {
    let condition = regular_item_condition(has_trash);
    let sql = if collection_keys.is_empty() {
        format!(
            "SELECT i.itemID, i.key, it.typeName, i.dateAdded, i.dateModified
             FROM items i
             JOIN itemTypes it ON i.itemTypeID = it.itemTypeID
             WHERE {condition}
             ORDER BY i.dateAdded DESC, i.itemID DESC"
        )
    } else {
        let placeholders = vec!["?"; collection_keys.len()].join(", ");
        format!(
            "SELECT DISTINCT i.itemID, i.key, it.typeName, i.dateAdded, i.dateModified
             FROM items i
             JOIN itemTypes it ON i.itemTypeID = it.itemTypeID
             JOIN collectionItems ci ON i.itemID = ci.itemID
             JOIN collections c ON ci.collectionID = c.collectionID
             WHERE c.key IN ({placeholders}) AND {condition}
             ORDER BY i.dateAdded DESC, i.itemID DESC"
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let mut items = stmt
        .query_map(params_from_iter(collection_keys.iter()), |row| {
            Ok(LibraryItem {
                item_id: row.get(0)?,
                key: row.get(1)?,
                type_name: row.get(2)?,
                date_added: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                date_modified: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                ..Default::default()
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for item in &mut items {
        enrich(conn, tree, item)?;
    }

    tracing::info!(count = items.len(), "loaded library items");
    Ok(items)
}

fn enrich(conn: &Connection, tree: &CollectionTree, item: &mut LibraryItem) -> Result<(), LibraryError> {
    let id = item.item_id;

    let mut stmt = conn.prepare_cached(
        "SELECT f.fieldName, v.value
         FROM itemData d
         JOIN fields f ON d.fieldID = f.fieldID
         JOIN itemDataValues v ON d.valueID = v.valueID
         WHERE d.itemID = ?1",
    )?;
    item.fields = stmt
        .query_map([id], |row| {
            // Values are loosely typed in Zotero; numbers are read as text.
            let value: rusqlite::types::Value = row.get(1)?;
            let text = match value {
                rusqlite::types::Value::Text(s) => s,
                rusqlite::types::Value::Integer(n) => n.to_string(),
                rusqlite::types::Value::Real(f) => f.to_string(),
                _ => String::new(),
            };
            Ok((row.get::<_, String>(0)?, text))
        })?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT c.firstName, c.lastName, ct.creatorType
         FROM itemCreators ic
         JOIN creators c ON ic.creatorID = c.creatorID
         JOIN creatorTypes ct ON ic.creatorTypeID = ct.creatorTypeID
         WHERE ic.itemID = ?1
         ORDER BY ic.orderIndex",
    )?;
    item.creators = stmt
        .query_map([id], |row| {
            Ok(Creator {
                first_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                last_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                creator_type: row.get(2)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM itemTags itg JOIN tags t ON itg.tagID = t.tagID
         WHERE itg.itemID = ?1 ORDER BY t.name",
    )?;
    item.tags = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT i.key, v.value, ia.path, ia.contentType
         FROM itemAttachments ia
         JOIN items i ON ia.itemID = i.itemID
         LEFT JOIN itemData d ON d.itemID = i.itemID
             AND d.fieldID = (SELECT fieldID FROM fields WHERE fieldName = 'title')
         LEFT JOIN itemDataValues v ON d.valueID = v.valueID
         WHERE ia.parentItemID = ?1
         ORDER BY i.itemID",
    )?;
    item.attachments = stmt
        .query_map([id], |row| {
            Ok(Attachment {
                key: row.get(0)?,
                title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                path: row.get(2)?,
                content_type: row.get(3)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT n.note FROM itemNotes n WHERE n.parentItemID = ?1 ORDER BY n.itemID",
    )?;
    item.notes = stmt
        .query_map([id], |row| row.get::<_, Option<String>>(0))?
        .filter_map(|r| r.transpose())
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT c.key FROM collectionItems ci
         JOIN collections c ON ci.collectionID = c.collectionID
         WHERE ci.itemID = ?1",
    )?;
    let keys: Vec<String> = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    let mut paths: Vec<String> = keys
        .iter()
        .map(|k| tree.path(k))
        .filter(|p| !p.is_empty())
        .collect();
    paths.sort();
    paths.dedup();
    item.collection_paths = paths;

    Ok(())
}
