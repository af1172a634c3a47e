use std::path::PathBuf;

use thiserror::Error;

/// Failures while locating or reading a VLP export.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input path does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("input must be a ZIP file or a directory: {0}")]
    UnsupportedInput(PathBuf),

    #[error("content.xml not found in {0}")]
    MissingContentXml(PathBuf),

    #[error("no <Manual> root element in content.xml")]
    MissingRoot,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed VLP XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to extract archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Failures talking to the ScreenSteps API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint}: request failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint}: API returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: still rate limited after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("{endpoint}: unexpected response body: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
