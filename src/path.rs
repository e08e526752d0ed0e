//! Component L: Path Resolver.
//!
//! Splits a `/`- or `\`-separated path into segments and walks them against
//! successive directory child lists. Grounded on the teacher's
//! `Dir::find`/`find_by_name` dispatch (`dir.rs`), generalized to accept
//! either separator and to case-fold via [`crate::name::names_equal`]
//! instead of an exact-match-only comparison.

use alloc::vec::Vec;

/// Split a path into non-empty segments, accepting both `/` and `\` as
/// separators and ignoring repeated/empty ones (`//` collapses, a lone
/// separator resolves to zero segments i.e. the root itself).
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

/// Resolve `path` starting from `root`, calling `children_of` to obtain each
/// directory's child list on demand (keeps this module free of any device/
/// cache dependency — `Volume` supplies the lookup closure).
///
/// `children_of(current)` returns `None` if `current` is not a directory
/// (can't descend further), `Some(children)` otherwise.
pub fn resolve<T: Clone>(
    root: &T,
    path: &str,
    mut children_of: impl FnMut(&T) -> Option<Vec<T>>,
    mut name_of: impl FnMut(&T) -> alloc::string::String,
) -> Option<T> {
    let segments = split_segments(path);
    let mut current = root.clone();
    for segment in segments {
        let children = children_of(&current)?;
        let mut found = None;
        for child in children {
            if crate::name::names_equal(&name_of(&child), segment, true) {
                found = Some(child);
                break;
            }
        }
        current = found?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_separators_and_ignores_empties() {
        assert_eq!(split_segments("/a/b"), alloc::vec!["a", "b"]);
        assert_eq!(split_segments("\\a\\\\b\\"), alloc::vec!["a", "b"]);
        assert_eq!(split_segments("/"), Vec::<&str>::new());
        assert_eq!(split_segments("//"), Vec::<&str>::new());
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Node {
        name: alloc::string::String,
        children: Option<Vec<Node>>,
    }

    fn leaf(name: &str) -> Node {
        Node { name: name.into(), children: None }
    }

    fn dir(name: &str, children: Vec<Node>) -> Node {
        Node { name: name.into(), children: Some(children) }
    }

    #[test]
    fn resolves_nested_path_case_insensitively() {
        let root = dir(
            "/",
            alloc::vec![dir("A", alloc::vec![leaf("B")])],
        );
        let found = resolve(
            &root,
            "/a/b",
            |n| n.children.clone(),
            |n| n.name.clone(),
        );
        assert_eq!(found.map(|n| n.name), Some(alloc::string::String::from("B")));
    }

    #[test]
    fn missing_segment_returns_none() {
        let root = dir("/", alloc::vec![leaf("B")]);
        let found = resolve(&root, "/missing", |n| n.children.clone(), |n| n.name.clone());
        assert!(found.is_none());
    }

    #[test]
    fn lone_separator_resolves_to_root() {
        let root = dir("/", alloc::vec![leaf("B")]);
        let found = resolve(&root, "/", |n| n.children.clone(), |n| n.name.clone());
        assert_eq!(found, Some(root));
    }
}
