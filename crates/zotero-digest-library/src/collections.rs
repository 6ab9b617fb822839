//! Collection hierarchy.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Separator between collection names in a full path.
pub const PATH_SEPARATOR: &str = " / ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub collection_id: i64,
    pub key: String,
    pub name: String,
    pub parent_key: Option<String>,
    /// Regular items filed directly in this collection.
    pub item_count: usize,
    /// Depth below a root collection (roots are 0).
    pub level: usize,
    /// Keys of child collections, sorted by name.
    pub children: Vec<String>,
}

/// All collections of a library, indexed by key.
#[derive(Debug, Clone, Default)]
pub struct CollectionTree {
    by_key: HashMap<String, Collection>,
    roots: Vec<String>,
}

/// Sibling and search-result order: by name, then key.
fn by_name(a: &Collection, b: &Collection) -> Ordering {
    a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key))
}

impl CollectionTree {
    /// Link collections into a tree. Collections whose parent is unknown are
    /// treated as roots.
    pub fn from_collections(collections: Vec<Collection>) -> Self {
        let mut by_key: HashMap<String, Collection> = collections
            .into_iter()
            .map(|mut c| {
                c.children.clear();
                c.level = 0;
                (c.key.clone(), c)
            })
            .collect();

        let mut roots = Vec::new();
        let mut links = Vec::new();
        for c in by_key.values() {
            match c.parent_key.as_deref() {
                Some(parent) if parent != c.key && by_key.contains_key(parent) => {
                    links.push((parent.to_string(), c.key.clone()))
                }
                _ => roots.push(c.key.clone()),
            }
        }
        for (parent, child) in links {
            if let Some(p) = by_key.get_mut(&parent) {
                p.children.push(child);
            }
        }

        let order = |a: &String, b: &String| match (by_key.get(a), by_key.get(b)) {
            (Some(x), Some(y)) => by_name(x, y),
            _ => a.cmp(b),
        };
        roots.sort_by(order);
        let sorted: Vec<(String, Vec<String>)> = by_key
            .values()
            .filter(|c| c.children.len() > 1)
            .map(|c| {
                let mut children = c.children.clone();
                children.sort_by(order);
                (c.key.clone(), children)
            })
            .collect();
        for (key, children) in sorted {
            if let Some(c) = by_key.get_mut(&key) {
                c.children = children;
            }
        }

        // Assign levels top-down; anything unreachable from a root (a cycle)
        // keeps level 0.
        let mut stack: Vec<(String, usize)> = roots.iter().map(|k| (k.clone(), 0)).collect();
        while let Some((key, level)) = stack.pop() {
            if let Some(c) = by_key.get_mut(&key) {
                c.level = level;
                stack.extend(c.children.iter().map(|k| (k.clone(), level + 1)));
            }
        }

        Self { by_key, roots }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Collection> {
        self.by_key.get(key)
    }

    pub fn roots(&self) -> Vec<&Collection> {
        self.roots.iter().filter_map(|k| self.by_key.get(k)).collect()
    }

    pub fn children(&self, key: &str) -> Vec<&Collection> {
        self.get(key)
            .map(|c| c.children.iter().filter_map(|k| self.by_key.get(k)).collect())
            .unwrap_or_default()
    }

    /// All collections, parents before children, siblings by name.
    pub fn depth_first(&self) -> Vec<&Collection> {
        let mut out = Vec::with_capacity(self.by_key.len());
        let mut stack: Vec<&str> = self.roots.iter().rev().map(String::as_str).collect();
        while let Some(key) = stack.pop() {
            if let Some(c) = self.by_key.get(key) {
                out.push(c);
                stack.extend(c.children.iter().rev().map(String::as_str));
            }
        }
        out
    }

    /// Full path of a collection, e.g. "Machine Learning / Graphs".
    /// Empty for unknown keys.
    pub fn path(&self, key: &str) -> String {
        let mut names = Vec::new();
        let mut current = self.by_key.get(key);
        while let Some(c) = current {
            names.push(c.name.as_str());
            if names.len() > self.by_key.len() {
                break;
            }
            current = c.parent_key.as_deref().and_then(|p| self.by_key.get(p));
        }
        names.reverse();
        names.join(PATH_SEPARATOR)
    }

    /// Collections whose name contains `term`, case-insensitively, by name.
    pub fn find(&self, term: &str) -> Vec<&Collection> {
        let term = term.to_lowercase();
        let mut found: Vec<&Collection> = self
            .by_key
            .values()
            .filter(|c| c.name.to_lowercase().contains(&term))
            .collect();
        found.sort_by(|a, b| by_name(a, b));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coll(key: &str, name: &str, parent: Option<&str>) -> Collection {
        Collection {
            collection_id: 0,
            key: key.into(),
            name: name.into(),
            parent_key: parent.map(String::from),
            item_count: 0,
            level: 0,
            children: Vec::new(),
        }
    }

    fn tree() -> CollectionTree {
        CollectionTree::from_collections(vec![
            coll("C", "Graphs", Some("A")),
            coll("A", "Machine Learning", None),
            coll("D", "Attention", Some("A")),
            coll("E", "Sparse", Some("C")),
            coll("B", "Books", None),
        ])
    }

    #[test]
    fn roots_and_children_sorted_by_name() {
        let t = tree();
        let roots: Vec<&str> = t.roots().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(roots, vec!["Books", "Machine Learning"]);
        let kids: Vec<&str> = t.children("A").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(kids, vec!["Attention", "Graphs"]);
    }

    #[test]
    fn levels_and_paths() {
        let t = tree();
        assert_eq!(t.get("E").unwrap().level, 2);
        assert_eq!(t.path("E"), "Machine Learning / Graphs / Sparse");
        assert_eq!(t.path("B"), "Books");
        assert_eq!(t.path("missing"), "");
    }

    #[test]
    fn depth_first_order() {
        let t = tree();
        let order: Vec<&str> = t.depth_first().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "D", "C", "E"]);
    }

    #[test]
    fn find_is_case_insensitive() {
        let t = tree();
        let hits: Vec<&str> = t.find("GRAPH").iter().map(|c| c.key.as_str()).collect();
        assert_eq!(hits, vec!["C"]);
        assert!(t.find("nothing").is_empty());
    }

    #[test]
    fn tree_and_search_share_ordering() {
        let t = CollectionTree::from_collections(vec![
            coll("K1", "zeta", None),
            coll("K2", "Zeta", None),
            coll("K3", "alpha", None),
            coll("K4", "Zeta", None),
        ]);
        let roots: Vec<&str> = t.roots().iter().map(|c| c.key.as_str()).collect();
        let hits: Vec<&str> = t.find("").iter().map(|c| c.key.as_str()).collect();
        assert_eq!(roots, vec!["K2", "K4", "K3", "K1"]);
        assert_eq!(hits, roots);
    }

    #[test]
    fn orphan_becomes_root() {
        let t = CollectionTree::from_collections(vec![coll("X", "Orphan", Some("gone"))]);
        assert_eq!(t.roots().len(), 1);
        assert_eq!(t.path("X"), "Orphan");
    }

    #[test]
    fn parent_cycle_terminates() {
        let t = CollectionTree::from_collections(vec![
            coll("A", "One", Some("B")),
            coll("B", "Two", Some("A")),
        ]);
        assert!(t.roots().is_empty());
        assert!(!t.path("A").is_empty());
    }
}
