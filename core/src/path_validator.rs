//! Allowlist-based path containment with a symlink-chain check (§4.1).
//!
//! Two independent checks have to pass: the resolved path must be a prefix
//! match under one of the allowed roots, and no component of the *original*
//! path, walked from the matched root downward, may be a symlink that
//! escapes that root. The walk never looks above the matched root — on
//! systems where the root itself sits behind a symlink (`/var` ->
//! `/private/var` on macOS) that would produce false positives.

use std::path::Path;
use std::path::PathBuf;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct PathValidator {
    allowed_roots: Vec<PathBuf>,
}

impl PathValidator {
    /// Resolves each configured root once at construction time; a root that
    /// does not exist yet is kept as given; `validate` still requires
    /// children to exist relative to it.
    pub fn new<I, P>(allowed_roots: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = allowed_roots
            .into_iter()
            .map(|p| canonicalize_best_effort(p.as_ref()))
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { allowed_roots: roots })
    }

    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf, CoreError> {
        let original = expand_home(path.as_ref());
        let resolved = canonicalize_best_effort(&original)
            .map_err(|e| CoreError::InvalidPath(format!("could not resolve path: {e}")))?;

        let matching_root = self
            .allowed_roots
            .iter()
            .find(|root| resolved.starts_with(root))
            .ok_or_else(|| {
                CoreError::InvalidPath(format!(
                    "path {} is not within allowed directories",
                    resolved.display()
                ))
            })?;

        self.check_symlink_chain(&original, matching_root)?;

        Ok(resolved)
    }

    /// Walks `original`'s components relative to `matching_root`, resolving
    /// and re-checking containment at every symlinked component.
    fn check_symlink_chain(&self, original: &Path, matching_root: &Path) -> Result<(), CoreError> {
        let canonical_original = canonicalize_best_effort(original)
            .map_err(|e| CoreError::InvalidPath(format!("could not resolve path: {e}")))?;
        let relative = canonical_original
            .strip_prefix(matching_root)
            .unwrap_or(Path::new(""));

        let mut current = matching_root.to_path_buf();
        for component in relative.components() {
            current.push(component);
            let metadata = match std::fs::symlink_metadata(&current) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.file_type().is_symlink() {
                let target = canonicalize_best_effort(&current).map_err(|e| {
                    CoreError::InvalidPath(format!("could not resolve symlink: {e}"))
                })?;
                if !self.allowed_roots.iter().any(|root| target.starts_with(root)) {
                    return Err(CoreError::InvalidPath(format!(
                        "path {} is not within allowed directories",
                        current.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// `Path::canonicalize` requires the path to exist. For paths that do not
/// yet exist (e.g. a `write_file` target), resolve the deepest existing
/// ancestor and rejoin the remainder lexically.
fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    match absolute.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => {
            let mut existing = absolute.clone();
            let mut remainder = Vec::new();
            while !existing.exists() {
                match existing.file_name() {
                    Some(name) => {
                        remainder.push(name.to_owned());
                        existing.pop();
                    }
                    None => break,
                }
            }
            let mut resolved = existing.canonicalize()?;
            for part in remainder.into_iter().rev() {
                resolved.push(part);
            }
            Ok(normalize_lexically(&resolved))
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
