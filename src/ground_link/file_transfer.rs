use super::ground_messages::{DownstreamContent, FileChunk, FileMetadata};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{} does not exist!", .0.display())]
    NotFound(PathBuf),
    #[error("{} does not point to a directory!", .0.display())]
    NotADirectory(PathBuf),
    #[error("{} does not point to a file!", .0.display())]
    NotAFile(PathBuf),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip failure: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// A named blob ready to be streamed to ground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transfer {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Transfer {
    pub(crate) async fn file(path: &Path) -> Result<Self, TransferError> {
        if !path.exists() {
            return Err(TransferError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(TransferError::NotAFile(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { name: file_name(path), bytes })
    }

    /// Zips the folder on a blocking thread.
    pub(crate) async fn folder(path: &Path) -> Result<Self, TransferError> {
        if !path.exists() {
            return Err(TransferError::NotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(TransferError::NotADirectory(path.to_path_buf()));
        }
        let root = path.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || zip_folder(&root))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        Ok(Self { name: format!("{}.zip", file_name(path)), bytes })
    }

    /// Metadata frame followed by the content in chunks of [`CHUNK_SIZE`].
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn into_frames(self) -> Vec<DownstreamContent> {
        let chunks = self.bytes.chunks(CHUNK_SIZE).count() as u32;
        let mut frames = vec![DownstreamContent::FileMetadata(FileMetadata {
            name: self.name,
            size: self.bytes.len() as u64,
            chunks,
        })];
        frames.extend(self.bytes.chunks(CHUNK_SIZE).enumerate().map(|(index, data)| {
            DownstreamContent::FileChunk(FileChunk { index: index as u32, data: data.to_vec() })
        }));
        frames
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| "transfer".to_string(), |n| n.to_string_lossy().into_owned())
}

pub(crate) fn zip_folder(root: &Path) -> Result<Vec<u8>, TransferError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(fs::DirEntry::path);
        for entry in entries {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                zip.add_directory(relative, options)?;
                pending.push(path);
            } else {
                zip.start_file(relative, options)?;
                zip.write_all(&fs::read(&path)?)?;
            }
        }
    }
    Ok(zip.finish()?.into_inner())
}
