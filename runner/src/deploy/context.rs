//! Build context assembly
//!
//! Packs the build file and a working tree into a tar archive inside a
//! per-deployment temporary directory. The directory lives exactly as long as
//! the [`BuildContext`] value.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::ContextAssemblyError;
use crate::utils::deployment_name;

/// Name the build file is stored under at the archive root
pub const BUILD_FILE_NAME: &str = "Dockerfile";

const ARCHIVE_NAME: &str = "context.tar";

/// A file recorded in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// An assembled build context backed by temporary storage
#[derive(Debug)]
pub struct BuildContext {
    dir: TempDir,
    archive_path: PathBuf,
    entries: Vec<ContextEntry>,
}

impl BuildContext {
    /// Temporary directory holding the archive
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Archive entries in insertion order, build file first
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Read the whole archive for upload
    pub async fn read_archive(&self) -> io::Result<Bytes> {
        let data = tokio::fs::read(&self.archive_path).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the temporary storage now instead of on drop
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), "Failed to remove build context: {}", e);
        } else {
            debug!(path = %path.display(), "Removed build context");
        }
    }
}

/// Assemble a build context from `working_tree` and the build file text.
///
/// Any file that cannot be read aborts assembly with the offending path.
pub async fn assemble(
    working_tree: &Path,
    dockerfile: &str,
    deployment_id: &str,
) -> Result<BuildContext, ContextAssemblyError> {
    let tree = working_tree.to_owned();
    let dockerfile = dockerfile.to_owned();
    let prefix = format!("runway-{}-", deployment_name(deployment_id));

    spawn_blocking(move || assemble_sync(&tree, &dockerfile, &prefix))
        .await
        .map_err(|e| ContextAssemblyError {
            path: working_tree.to_owned(),
            source: io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?
}

fn assemble_sync(
    tree: &Path,
    dockerfile: &str,
    prefix: &str,
) -> Result<BuildContext, ContextAssemblyError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|source| ContextAssemblyError {
            path: std::env::temp_dir(),
            source,
        })?;

    let archive_path = dir.path().join(ARCHIVE_NAME);
    let archive_err = |source: io::Error| ContextAssemblyError {
        path: archive_path.clone(),
        source,
    };

    let file = File::create(&archive_path).map_err(archive_err)?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);

    let mut entries = Vec::new();

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, BUILD_FILE_NAME, dockerfile.as_bytes())
        .map_err(archive_err)?;
    entries.push(ContextEntry {
        path: PathBuf::from(BUILD_FILE_NAME),
        size: dockerfile.len() as u64,
    });

    for entry in WalkDir::new(tree).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ContextAssemblyError {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| tree.to_path_buf()),
            source: e.into(),
        })?;

        let path = entry.path();
        let relative = match path.strip_prefix(tree) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };

        // The supplied build file replaces any in the tree
        if relative == Path::new(BUILD_FILE_NAME) {
            continue;
        }

        let read_err = |source: io::Error| ContextAssemblyError {
            path: path.to_path_buf(),
            source,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&relative, path).map_err(read_err)?;
        } else if file_type.is_symlink() {
            builder
                .append_path_with_name(path, &relative)
                .map_err(read_err)?;
        } else {
            let mut file = File::open(path).map_err(read_err)?;
            let size = file.metadata().map_err(read_err)?.len();
            builder.append_file(&relative, &mut file).map_err(read_err)?;
            entries.push(ContextEntry {
                path: relative,
                size,
            });
        }
    }

    builder
        .into_inner()
        .and_then(|file| file.sync_all())
        .map_err(archive_err)?;

    debug!(
        archive = %archive_path.display(),
        files = entries.len(),
        "Assembled build context"
    );

    Ok(BuildContext {
        dir,
        archive_path,
        entries,
    })
}
