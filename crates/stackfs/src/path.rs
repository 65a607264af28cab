//! Canonical virtual paths.
//!
//! Every backend keys its entries by a canonical path: absolute, `/`-separated,
//! no `.` or `..` segments, no trailing slash except for the root itself.

use std::path::Path;

/// The root directory.
pub const ROOT: &str = "/";

/// Normalize a caller-supplied path into its canonical form.
///
/// The path is treated as absolute even without a leading `/`, so `tmp` and `/tmp`
/// name the same entry. `..` at the root stays at the root.
pub fn normalize(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Parent of a canonical path. The root is its own parent.
pub fn parent(canonical: &str) -> &str {
    match canonical.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &canonical[..idx],
    }
}

/// Last segment of a canonical path; `/` for the root.
pub fn base_name(canonical: &str) -> &str {
    if canonical == ROOT {
        return ROOT;
    }
    canonical
        .rsplit('/')
        .next()
        .unwrap_or(canonical)
}

/// Join a child name onto a canonical directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// True if `candidate` lies strictly inside `ancestor`.
pub fn is_strict_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return candidate != ROOT;
    }
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate.as_bytes()[ancestor.len()] == b'/'
}

/// Every non-root prefix of a canonical path, nearest the root first.
///
/// `/a/b/c` yields `["/a", "/a/b", "/a/b/c"]`.
pub fn lineage(canonical: &str) -> Vec<&str> {
    canonical
        .match_indices('/')
        .skip(1)
        .map(|(idx, _)| &canonical[..idx])
        .chain((canonical != ROOT).then_some(canonical))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("", "/")]
    #[case::dot(".", "/")]
    #[case::dotdot("..", "/")]
    #[case::relative("tmp", "/tmp")]
    #[case::absolute("/tmp", "/tmp")]
    #[case::trailing_slash("/a/b/", "/a/b")]
    #[case::double_slash("//a//b", "/a/b")]
    #[case::inner_dot("a/./b", "/a/b")]
    #[case::inner_dotdot("a/b/../c", "/a/c")]
    #[case::escape_root("/../../etc", "/etc")]
    fn test_normalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(Path::new(input)), expected);
    }

    #[rstest]
    #[case::root("/", "/")]
    #[case::top("/a", "/")]
    #[case::nested("/a/b/c", "/a/b")]
    fn test_parent(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parent(input), expected);
    }

    #[test]
    fn test_base_name_and_join() {
        assert_eq!(base_name("/"), "/");
        assert_eq!(base_name("/a/b"), "b");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[rstest]
    #[case::child("/a/b", "/a", true)]
    #[case::deep("/a/b/c", "/a", true)]
    #[case::same("/a", "/a", false)]
    #[case::sibling_prefix("/ab", "/a", false)]
    #[case::under_root("/a", "/", true)]
    #[case::root_itself("/", "/", false)]
    fn test_is_strict_descendant(#[case] candidate: &str, #[case] ancestor: &str, #[case] expected: bool) {
        assert_eq!(is_strict_descendant(candidate, ancestor), expected);
    }

    #[test]
    fn test_lineage() {
        assert_eq!(lineage("/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(lineage("/a"), vec!["/a"]);
        assert!(lineage("/").is_empty());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[a-z./]{0,24}") {
            let once = normalize(Path::new(&raw));
            let twice = normalize(Path::new(&once));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalized_paths_are_canonical(raw in "[a-z./]{0,24}") {
            let canonical = normalize(Path::new(&raw));
            prop_assert!(canonical.starts_with('/'));
            prop_assert!(canonical == "/" || !canonical.ends_with('/'));
            for segment in canonical.split('/').skip(1) {
                prop_assert!(segment != "." && segment != ".." );
            }
        }

        #[test]
        fn parent_of_join_is_dir(name in "[a-z]{1,8}", depth in 0usize..4) {
            let mut dir = ROOT.to_string();
            for _ in 0..depth {
                dir = join(&dir, "d");
            }
            let child = join(&dir, &name);
            prop_assert_eq!(parent(&child), dir.as_str());
            prop_assert_eq!(base_name(&child), name.as_str());
        }
    }
}
