//! Filesystem sandboxing for the built-in file tools.
//!
//! Relative paths resolve against the workspace. The resolved path must not
//! sit under a forbidden prefix (e.g. `~/.ssh`, `/etc`) and must sit under one
//! of the allowed roots. With no roots configured the workspace is the only one.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Workspace-relative path policy shared by the file tools.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    workspace: PathBuf,
    allowed_roots: Vec<String>,
    forbidden_paths: Vec<String>,
}

impl PathPolicy {
    /// An empty `allowed_roots` confines paths to the workspace.
    pub fn new(
        workspace: impl Into<PathBuf>,
        allowed_roots: Vec<String>,
        forbidden_paths: Vec<String>,
    ) -> Self {
        let workspace = workspace.into();
        let allowed_roots = if allowed_roots.is_empty() {
            vec![workspace.to_string_lossy().into_owned()]
        } else {
            allowed_roots
        };
        Self {
            workspace,
            allowed_roots,
            forbidden_paths,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Whether an already-resolved absolute path sits under a forbidden prefix.
    pub fn is_forbidden(&self, path: &Path) -> bool {
        self.forbidden_paths.iter().any(|prefix| is_under(path, prefix))
    }

    /// Whether an already-resolved absolute path may be touched: not
    /// forbidden and under an allowed root. Used to prune directory walks.
    pub fn permits(&self, path: &Path) -> bool {
        !self.is_forbidden(path) && self.allowed_roots.iter().any(|root| is_under(path, root))
    }

    /// Resolve `raw` against the workspace and validate it.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathValidationError> {
        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace.join(candidate)
        };
        if has_parent_component(candidate) {
            return Err(PathValidationError::PathTraversal { path: raw.into() });
        }
        check(raw, &joined, &self.allowed_roots, &self.forbidden_paths)
    }
}

/// Validate that an absolute or cwd-relative path is safe to access.
///
/// Checks:
/// 1. No `..` components
/// 2. The path is canonicalized (the nearest existing ancestor, for paths
///    that do not exist yet)
/// 3. The path is not under a forbidden prefix
/// 4. The path is under an allowed root, if any are specified
///
/// Returns the resolved path on success.
pub fn validate_path(
    path: &str,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    if has_parent_component(Path::new(path)) {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }
    check(path, Path::new(path), allowed_roots, forbidden_paths)
}

fn check(
    raw: &str,
    path: &Path,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let canonical = canonicalize_lenient(path).map_err(|reason| {
        PathValidationError::CanonicalizeFailed {
            path: raw.into(),
            reason,
        }
    })?;

    for forbidden in forbidden_paths {
        if is_under(&canonical, forbidden) {
            return Err(PathValidationError::ForbiddenPath {
                path: raw.into(),
                pattern: forbidden.clone(),
            });
        }
    }

    if !allowed_roots.is_empty() && !allowed_roots.iter().any(|root| is_under(&canonical, root)) {
        return Err(PathValidationError::OutsideAllowedRoots { path: raw.into() });
    }

    Ok(canonical)
}

fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Whether `path` equals or sits below `prefix` (tilde-expanded, and
/// canonicalized when it exists so symlinked roots like `/tmp` compare equal).
fn is_under(path: &Path, prefix: &str) -> bool {
    let expanded = PathBuf::from(expand_tilde(prefix));
    if path.starts_with(&expanded) {
        return true;
    }
    match expanded.canonicalize() {
        Ok(resolved) => path.starts_with(resolved),
        Err(_) => false,
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest, so
/// paths that are about to be created still resolve symlinks.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, String> {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if existing.as_os_str().is_empty() || existing.exists() {
            break;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }

    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir().map_err(|e| e.to_string())?
    } else {
        existing.canonicalize().map_err(|e| e.to_string())?
    };
    Ok(tail.into_iter().rev().fold(base, |acc, part| acc.join(part)))
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Ok(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Result<String, std::env::VarError> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(dir: &Path) -> PathPolicy {
        PathPolicy::new(dir, Vec::new(), vec!["/etc".into(), "~/.ssh".into()])
    }

    #[test]
    fn valid_path_no_restrictions() {
        assert!(validate_path("/home/user/project/file.txt", &[], &[]).is_ok());
    }

    #[test]
    fn path_traversal_blocked() {
        let result = validate_path("../../../etc/passwd", &[], &[]);
        assert!(matches!(result, Err(PathValidationError::PathTraversal { .. })));
    }

    #[test]
    fn path_traversal_mid_path_blocked() {
        assert!(validate_path("/home/user/../../../etc/passwd", &[], &[]).is_err());
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert!(validate_path("/srv/data/..hidden", &[], &[]).is_ok());
    }

    #[test]
    fn forbidden_path_blocked() {
        let forbidden = vec!["/etc".into(), "/root".into()];
        match validate_path("/etc/passwd", &[], &forbidden) {
            Err(PathValidationError::ForbiddenPath { pattern, .. }) => assert_eq!(pattern, "/etc"),
            other => panic!("Expected ForbiddenPath, got: {other:?}"),
        }
    }

    #[test]
    fn forbidden_prefix_matches_whole_components() {
        let forbidden = vec!["/etc".into()];
        assert!(validate_path("/etcetera/notes.txt", &[], &forbidden).is_ok());
    }

    #[test]
    fn allowed_roots_enforced() {
        let allowed = vec!["/home/user/workspace".into()];
        assert!(validate_path("/home/user/workspace/src/main.rs", &allowed, &[]).is_ok());
        assert!(matches!(
            validate_path("/home/other/secret.txt", &allowed, &[]),
            Err(PathValidationError::OutsideAllowedRoots { .. })
        ));
    }

    #[test]
    fn forbidden_with_tilde_expansion() {
        let forbidden = vec!["~/.ssh".into(), "~/.gnupg".into()];
        if let Ok(home) = home_dir() {
            let ssh_path = format!("{home}/.ssh/id_rsa");
            assert!(validate_path(&ssh_path, &[], &forbidden).is_err());
        }
    }

    #[test]
    fn forbidden_takes_precedence_over_allowed() {
        let allowed = vec!["/home/user".into()];
        let forbidden = vec!["/home/user/.ssh".into()];
        assert!(validate_path("/home/user/.ssh/id_rsa", &allowed, &forbidden).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.R"), "x <- 1").unwrap();

        let resolved = policy(dir.path()).resolve("a.R").unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("a.R"));
    }

    #[test]
    fn missing_parents_still_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = policy(dir.path()).resolve("out/nested/report.md").unwrap();
        assert!(resolved.ends_with("out/nested/report.md"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn workspace_root_can_be_the_allowed_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let policy = PathPolicy::new(dir.path(), vec![root], Vec::new());
        assert!(policy.resolve("notes.txt").is_ok());
        assert!(matches!(
            policy.resolve("/var/log/syslog"),
            Err(PathValidationError::OutsideAllowedRoots { .. })
        ));
    }

    #[test]
    fn empty_roots_confine_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path(), Vec::new(), Vec::new());
        assert!(policy.resolve("notes.txt").is_ok());
        assert!(matches!(
            policy.resolve("/dev/zero"),
            Err(PathValidationError::OutsideAllowedRoots { .. })
        ));
    }

    #[test]
    fn forbidden_subtree_is_not_permitted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("secret")).unwrap();
        let secret = root.join("secret").to_string_lossy().into_owned();
        let policy = PathPolicy::new(&root, Vec::new(), vec![secret]);

        assert!(policy.is_forbidden(&root.join("secret/key.txt")));
        assert!(!policy.permits(&root.join("secret")));
        assert!(policy.permits(&root.join("src/main.R")));
        assert!(!policy.permits(Path::new("/var/log/syslog")));
    }

    #[test]
    fn relative_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            policy(dir.path()).resolve("../outside.txt"),
            Err(PathValidationError::PathTraversal { .. })
        ));
    }
}
