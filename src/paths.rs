//! Path and filename handling for downloaded archives and ledger lookups.
//!
//! Install paths can be spelled differently across OS calls (case, separator
//! style), so ledger comparisons go through `normalize_for_lookup`. Archive
//! filenames are derived from signed download URLs, which carry query-string
//! signatures that must never leak into the filesystem.

use std::path::{Component, Path, PathBuf};

/// Characters that are illegal in filenames on at least one supported platform.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strip characters that cannot appear in a filename.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Derive a local archive filename from a resolved download URL.
///
/// Takes the basename of the URL path with query and fragment stripped,
/// sanitized for the filesystem. Signed URLs sometimes end in a bare slash
/// or an opaque token; when derivation yields nothing usable, fall back to a
/// timestamp-based name so the download can still proceed.
pub fn derive_archive_name(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    // Skip the scheme+authority so a hostname is never mistaken for a filename
    let path = match without_query.find("://") {
        Some(idx) => {
            let rest = &without_query[idx + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => without_query,
    };

    let basename = path.rsplit('/').next().unwrap_or("");
    let sanitized = sanitize_file_name(basename);

    if sanitized.is_empty() {
        format!("livery-{}.zip", chrono::Utc::now().timestamp())
    } else {
        sanitized
    }
}

/// Folder name for an installed livery: the archive filename minus extension.
pub fn folder_name_from_archive(archive_name: &str) -> String {
    Path::new(archive_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| archive_name.to_string())
}

/// Normalize a path string for lookups and comparisons (lowercase, forward
/// slashes, trailing separator trimmed).
pub fn normalize_for_lookup(path: &str) -> String {
    path.to_lowercase()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_string()
}

/// Check whether two paths refer to the same location (case-insensitive,
/// separator-agnostic).
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    normalize_for_lookup(&a.to_string_lossy()) == normalize_for_lookup(&b.to_string_lossy())
}

/// Sanitize an archive entry path to prevent path traversal.
/// Returns None if the path is unsafe (contains `..` or is absolute).
pub fn sanitize_relative_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}
            Component::ParentDir => return None,
            Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_strips_query_and_keeps_basename() {
        assert_eq!(
            derive_archive_name("https://cdn.example.com/pkg/abc123-boeing-737-4k.zip?sig=xyz"),
            "abc123-boeing-737-4k.zip"
        );
    }

    #[test]
    fn test_derive_strips_fragment() {
        assert_eq!(
            derive_archive_name("https://cdn.example.com/a/b/livery.zip#part"),
            "livery.zip"
        );
    }

    #[test]
    fn test_derive_falls_back_on_empty_basename() {
        let name = derive_archive_name("https://cdn.example.com/pkg/");
        assert!(name.starts_with("livery-"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn test_derive_never_returns_hostname() {
        let name = derive_archive_name("https://cdn.example.com");
        assert!(name.starts_with("livery-"), "got {}", name);
    }

    #[test]
    fn test_sanitize_removes_illegal_chars() {
        assert_eq!(sanitize_file_name("a<b>c:d\"e/f\\g|h?i*j.zip"), "abcdefghij.zip");
        assert_eq!(sanitize_file_name("  plain.zip  "), "plain.zip");
    }

    #[test]
    fn test_folder_name_strips_extension() {
        assert_eq!(folder_name_from_archive("abc123-boeing-737-4k.zip"), "abc123-boeing-737-4k");
        assert_eq!(folder_name_from_archive("noext"), "noext");
    }

    #[test]
    fn test_paths_equal_case_and_separator_insensitive() {
        assert!(paths_equal(
            Path::new("C:\\Community\\PMDG-737-4K"),
            Path::new("c:/community/pmdg-737-4k/"),
        ));
        assert!(!paths_equal(
            Path::new("/community/pmdg-737-4k"),
            Path::new("/community/pmdg-737-8k"),
        ));
    }

    #[test]
    fn test_sanitize_relative_path_rejects_traversal() {
        assert!(sanitize_relative_path(Path::new("../evil.txt")).is_none());
        assert!(sanitize_relative_path(Path::new("/abs/path")).is_none());
        assert_eq!(
            sanitize_relative_path(Path::new("./sub/file.txt")),
            Some(PathBuf::from("sub/file.txt"))
        );
    }
}
