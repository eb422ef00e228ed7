use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// First commit that touched a path: `(timestamp, author)`.
///
/// Paths without history report `(0.0, "")`.
pub trait GitMetadata: Send + Sync {
    fn first_commit(&self, path: &Path) -> (f64, String);
}

/// Lookup that never finds any history.
pub struct NoGit;

impl GitMetadata for NoGit {
    fn first_commit(&self, _path: &Path) -> (f64, String) {
        (0.0, String::new())
    }
}

/// Lookup backed by the `git` executable.
pub struct GitCommand {
    program: PathBuf,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            program: which::which("git").unwrap_or_else(|_| PathBuf::from("git")),
        }
    }
}

impl GitCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn log(&self, repo: &Path, relative: &Path, follow: bool) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .arg("-C")
            .arg(repo)
            .args(["log", "--reverse", "--format=%at%x09%an"]);

        if follow {
            command.arg("--follow");
        }

        if relative.as_os_str().is_empty() {
            debug!(repo = %repo.display(), "reading whole repository history");
        } else {
            command.arg("--").arg(relative);
        }

        let output = command.output().ok()?;
        if !output.status.success() {
            return None;
        }

        String::from_utf8(output.stdout).ok()
    }
}

impl GitMetadata for GitCommand {
    fn first_commit(&self, path: &Path) -> (f64, String) {
        let Some(repo) = find_repository(path) else {
            return (0.0, String::new());
        };

        let relative = path.strip_prefix(&repo).unwrap_or(path);
        let follow = path.is_file();

        self.log(&repo, relative, follow)
            .and_then(|log| parse_log_line(log.lines().next()?))
            .unwrap_or_else(|| (0.0, String::new()))
    }
}

/// Nearest ancestor of `path` (itself included) holding a `.git` directory.
pub fn find_repository(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| candidate.join(".git").is_dir())
        .map(Path::to_path_buf)
}

fn parse_log_line(line: &str) -> Option<(f64, String)> {
    let (timestamp, author) = line.split_once('\t')?;
    let timestamp = timestamp.trim().parse::<f64>().ok()?;
    Some((timestamp, author.trim().to_string()))
}
