//! Path normalization helpers.
//!
//! Archive paths are POSIX-style strings anchored at the library root. Every
//! path other than the root itself has exactly one spelling, with a leading
//! separator: `media/cats` and `/media/cats` both normalize to `/media/cats`.
//! The root is the empty string; `"."` and `"/"` are accepted on input and
//! normalized to it. A path never escapes the root.

use crate::error::{ErrorKind, Result};

/// The normalized spelling of the library root.
pub const ROOT: &str = "";

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Normalizes a path.
///
/// - Both `/` and `\` are treated as separators and emitted as `/`.
/// - Empty and `.` segments are dropped, `..` pops the previous segment.
/// - Trailing separators are stripped.
/// - A leading separator is added if missing.
///
/// Returns [`InvalidPath`](ErrorKind::InvalidPath) for paths that climb
/// above the root or contain null bytes.
///
/// # Examples
///
/// ```
/// use librarian_fsal::path::normalize;
/// assert_eq!(normalize("media//cats/./fluffy.jpg").unwrap(), "/media/cats/fluffy.jpg");
/// assert_eq!(normalize("/media/cats/").unwrap(), "/media/cats");
/// assert_eq!(normalize(".").unwrap(), "");
/// assert!(normalize("../etc/passwd").is_err());
/// ```
pub fn normalize(path: impl AsRef<str>) -> Result<String> {
    let raw = path.as_ref();
    if raw.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
    }
    let mut segments = Vec::new();
    for segment in raw.split(SEPARATORS) {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
                }
            },
            normal => segments.push(normal),
        }
    }
    if segments.is_empty() {
        return Ok(ROOT.to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Returns the parent of a normalized path. The parent of a top-level entry
/// (and of the root itself) is the root.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => ROOT,
    }
}

/// Returns the final component of a normalized path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Resolves `relative` against the directory `base`.
///
/// A rooted `relative` ignores `base` entirely.
pub fn join(base: &str, relative: &str) -> Result<String> {
    if base.is_empty() || relative.starts_with(SEPARATORS) {
        return normalize(relative);
    }
    normalize(format!("{base}/{relative}"))
}

/// Returns every ancestor of a normalized path from the root down, including
/// the path itself.
///
/// ```
/// use librarian_fsal::path::ancestors;
/// assert_eq!(ancestors("/media/cats"), vec!["", "/media", "/media/cats"]);
/// assert_eq!(ancestors(""), vec![""]);
/// ```
pub fn ancestors(path: &str) -> Vec<String> {
    let mut chain = vec![ROOT.to_string()];
    if path.is_empty() {
        return chain;
    }
    for (index, _) in path.match_indices('/').filter(|(index, _)| *index > 0) {
        chain.push(path[..index].to_string());
    }
    chain.push(path.to_string());
    chain
}

/// Returns the lower-cased extension of the final component, without the dot.
/// Dotfiles such as `.dirinfo` have no extension.
pub fn extension(path: &str) -> Option<String> {
    let name = basename(path);
    match name.rfind('.') {
        None | Some(0) => None,
        Some(index) => Some(name[index + 1..].to_ascii_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("media/cats/fluffy.jpg", "/media/cats/fluffy.jpg")]
    #[case("media//cats", "/media/cats")]
    #[case("a/./b/./c", "/a/b/c")]
    #[case("a/b/..", "/a")]
    #[case("a/b/c/", "/a/b/c")]
    #[case("/media/cats", "/media/cats")]
    #[case("//media///cats//", "/media/cats")]
    #[case("a\\b\\c", "/a/b/c")]
    #[case("", "")]
    #[case(".", "")]
    #[case("./", "")]
    #[case("/", "")]
    fn test_normalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap(), expected);
    }

    #[rstest]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("/..")]
    #[case("a\0b")]
    fn test_normalize_rejects(#[case] input: &str) {
        let err = normalize(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[rstest]
    #[case("/media/cats/fluffy.jpg", "/media/cats", "fluffy.jpg")]
    #[case("/media", "", "media")]
    #[case("/a/b", "/a", "b")]
    #[case("", "", "")]
    fn test_dirname_and_basename(#[case] path: &str, #[case] dir: &str, #[case] base: &str) {
        assert_eq!(dirname(path), dir);
        assert_eq!(basename(path), base);
    }

    #[test]
    fn test_one_spelling_per_path() {
        for spelling in ["media/cats", "/media/cats", "//media/cats/", "media\\cats", "./media/cats"] {
            assert_eq!(normalize(spelling).unwrap(), "/media/cats");
        }
        assert_eq!(join(ROOT, "media").unwrap(), normalize("/media").unwrap());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/site", "css/main.css").unwrap(), "/site/css/main.css");
        assert_eq!(join("/site/pages", "../img/a.png").unwrap(), "/site/img/a.png");
        assert_eq!(join("", "a.png").unwrap(), "/a.png");
        assert_eq!(join("/site", "/static/a.js").unwrap(), "/static/a.js");
        assert!(join("/site", "../../x").is_err());
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/c.mp3"), vec!["", "/a", "/a/b", "/a/b/c.mp3"]);
        assert_eq!(ancestors("/media/cats/fluffy.jpg"), vec!["", "/media", "/media/cats", "/media/cats/fluffy.jpg"]);
        assert_eq!(ancestors("/top"), vec!["", "/top"]);
        assert_eq!(ancestors(""), vec![""]);
    }

    #[rstest]
    #[case("photo.JPG", Some("jpg"))]
    #[case("a/b/index.html", Some("html"))]
    #[case("archive.tar.gz", Some("gz"))]
    #[case("a/.dirinfo", None)]
    #[case("README", None)]
    fn test_extension(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(extension(path).as_deref(), expected);
    }
}
