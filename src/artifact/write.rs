use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::artifact::{RenderedArtifact, WriteError};

/// Permissions a written artifact should end up with
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    /// Job scripts are chmod 755 after writing
    Executable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    /// Set when the content was written but the script couldn't be made executable
    pub permission_warning: Option<String>,
}

/// Create or overwrite `path` with `content`
///
/// The parent directory must already exist. Failing to set the executable bit is not an error:
/// sbatch reads the script itself, so it is only logged and returned in the outcome.
pub fn write_artifact(path: &Path, content: &str, mode: FileMode) -> Result<WriteOutcome, WriteError> {
    fs::write(path, content.as_bytes()).map_err(|source| WriteError { path: path.to_path_buf(), source })?;

    let permission_warning = match mode {
        FileMode::Regular => None,
        FileMode::Executable => make_executable(path).err().map(|err| {
            warn!("Wrote {} but can't make it executable: {}", path.display(), err);
            err.to_string()
        }),
    };

    Ok(WriteOutcome { path: path.to_path_buf(), permission_warning })
}

impl RenderedArtifact {
    /// Write into `dir` under the artifact's own file name
    pub fn write_to(&self, dir: &Path) -> Result<WriteOutcome, WriteError> {
        let path = dir.join(&self.file_name);
        info!("Writing {} to {}", self.kind, path.display());
        write_artifact(&path, &self.content, self.mode)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
