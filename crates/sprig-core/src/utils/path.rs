//! Path utilities for safe file system operations.
//!
//! Archive entries and manifest-relative paths must never escape the
//! directory they are resolved against.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                // A leading .. is kept so escapes stay visible
                match components.last() {
                    Some(Component::Normal(_)) => {
                        components.pop();
                    },
                    _ => components.push(component),
                }
            },
            other => components.push(other),
        }
    }

    components.iter().collect()
}

/// Check if a relative path stays inside its base directory
pub fn is_safe_path(path: &Path) -> bool {
    if path.is_absolute() {
        return false;
    }

    let mut depth = 0i32;

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            },
            Component::Normal(_) => depth += 1,
            // Root and drive prefixes
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        let path = Path::new("./src/../lib/./file.rs");
        assert_eq!(normalize_path(path), Path::new("lib/file.rs"));
        assert_eq!(normalize_path(Path::new("../a")), Path::new("../a"));
    }

    #[test]
    fn test_is_safe_path() {
        assert!(is_safe_path(Path::new("lib/net45/Json.dll")));
        assert!(is_safe_path(Path::new("./content/readme.txt")));
        assert!(is_safe_path(Path::new("a/../b")));
        assert!(!is_safe_path(Path::new("a/../../b")));
        assert!(!is_safe_path(Path::new("../../../etc/passwd")));
        assert!(!is_safe_path(Path::new("/absolute/path")));
    }
}
