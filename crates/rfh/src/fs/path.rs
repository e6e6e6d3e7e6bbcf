//! Splitting share-qualified paths.

use std::fmt::Display;
use std::str::FromStr;

use super::FileError;

/// A path split into the share it lives on and the path within that share.
///
/// Accepted forms, with `\` or `/` as separators:
/// - `share\dir\file`
/// - `\\host\share\dir\file`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncPath {
    share: String,
    path: String,
}

impl UncPath {
    /// The share component, `\\host\share` or `share`.
    pub fn share(&self) -> &str {
        &self.share
    }

    /// Path of the object relative to the share root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last component of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('\\').next().unwrap_or_default()
    }
}

impl FromStr for UncPath {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('/', "\\");
        let has_host = normalized.starts_with("\\\\");

        let mut segments = normalized
            .split('\\')
            .filter(|segment| !segment.is_empty() && *segment != ".");

        let share = match has_host {
            true => match (segments.next(), segments.next()) {
                (Some(host), Some(share)) => format!("\\\\{}\\{}", host, share),
                _ => return Err(FileError::InvalidPath(s.to_owned())),
            },
            false => match segments.next() {
                Some(share) => share.to_owned(),
                None => return Err(FileError::InvalidPath(s.to_owned())),
            },
        };

        let path = segments.collect::<Vec<_>>().join("\\");
        if path.is_empty() {
            return Err(FileError::InvalidPath(s.to_owned()));
        }

        Ok(Self { share, path })
    }
}

impl Display for UncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\\{}", self.share, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_relative() {
        let p: UncPath = "docs\\reports\\q1.txt".parse().unwrap();
        assert_eq!(p.share(), "docs");
        assert_eq!(p.path(), "reports\\q1.txt");
        assert_eq!(p.name(), "q1.txt");
    }

    #[test]
    fn test_host_qualified() {
        let p: UncPath = "\\\\fileserver\\docs\\q1.txt".parse().unwrap();
        assert_eq!(p.share(), "\\\\fileserver\\docs");
        assert_eq!(p.path(), "q1.txt");
        assert_eq!(p.to_string(), "\\\\fileserver\\docs\\q1.txt");

        let p: UncPath = "//fileserver/docs/a/./b".parse().unwrap();
        assert_eq!(p.share(), "\\\\fileserver\\docs");
        assert_eq!(p.path(), "a\\b");
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["", "docs", "docs\\", "\\\\fileserver", "\\\\fileserver\\docs"] {
            assert!(
                matches!(bad.parse::<UncPath>(), Err(FileError::InvalidPath(_))),
                "{:?} should not parse",
                bad
            );
        }
    }
}
