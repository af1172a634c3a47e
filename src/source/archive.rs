use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::info;
use walkdir::WalkDir;

use crate::error::SourceError;

const CONTENT_XML: &str = "content.xml";

/// An export directory ready to read. For ZIP input this owns the
/// extraction directory, which is removed on drop unless kept.
#[derive(Debug)]
pub struct SourceDir {
    root: PathBuf,
    _extracted: Option<TempDir>,
}

impl SourceDir {
    /// Directory that holds `content.xml`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_xml(&self) -> PathBuf {
        self.root.join(CONTENT_XML)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }
}

/// Resolve `input` (a directory or a `.zip`) to the directory holding
/// `content.xml`. `keep_extracted` leaves a ZIP's extraction on disk.
pub fn open_input(input: &Path, keep_extracted: bool) -> Result<SourceDir, SourceError> {
    if !input.exists() {
        return Err(SourceError::MissingInput(input.to_path_buf()));
    }

    if input.is_dir() {
        return Ok(SourceDir {
            root: locate_content_root(input)?,
            _extracted: None,
        });
    }

    let is_zip = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(SourceError::UnsupportedInput(input.to_path_buf()));
    }

    let temp = tempfile::Builder::new()
        .prefix("vlp2ss-")
        .tempdir()
        .map_err(|source| SourceError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
    extract_zip(input, temp.path())?;
    let root = locate_content_root(temp.path())?;

    let extracted = if keep_extracted {
        let kept = temp.keep();
        info!("Keeping extracted files in {}", kept.display());
        None
    } else {
        Some(temp)
    };

    Ok(SourceDir {
        root,
        _extracted: extracted,
    })
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), SourceError> {
    info!("Extracting {} ...", archive.display());
    let file = File::open(archive).map_err(|source| SourceError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file)?;
    let entries = zip.len();
    zip.extract(dest)?;
    info!("Extracted {} entries", entries);
    Ok(())
}

/// `dir` itself when it holds `content.xml`, otherwise the first nested
/// directory that does (exports are often zipped inside a top folder).
fn locate_content_root(dir: &Path) -> Result<PathBuf, SourceError> {
    if dir.join(CONTENT_XML).is_file() {
        return Ok(dir.to_path_buf());
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == CONTENT_XML)
        .and_then(|e| e.path().parent().map(Path::to_path_buf))
        .ok_or_else(|| SourceError::MissingContentXml(dir.to_path_buf()))
}
