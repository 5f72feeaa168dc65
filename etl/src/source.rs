//! Source record stream boundary: retrieve the raw extract.
//!
//! Only bytes come out of here; decoding and row splitting live in
//! [`crate::parser`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SourceError, SourceResult};
use crate::logs::{log_info, log_success};

/// Public Washington State EV population extract.
pub const DEFAULT_SOURCE_URL: &str = "https://data.wa.gov/api/views/f6w7-q2d2/rows.csv";

/// Where the raw extract comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SourceLocation {
    Url(String),
    File(PathBuf),
}

impl SourceLocation {
    pub async fn fetch(&self) -> SourceResult<Vec<u8>> {
        match self {
            SourceLocation::Url(url) => fetch_url(url).await,
            SourceLocation::File(path) => read_file(path).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceLocation::Url(url) => url.clone(),
            SourceLocation::File(path) => path.display().to_string(),
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation::Url(DEFAULT_SOURCE_URL.to_string())
    }
}

/// Download the extract. Any non-success status fails the run.
pub async fn fetch_url(url: &str) -> SourceResult<Vec<u8>> {
    log_info(format!("Downloading data from: {}", url));

    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    log_success(format!("Downloaded {} bytes", bytes.len()));
    Ok(bytes.to_vec())
}

pub async fn read_file(path: &Path) -> SourceResult<Vec<u8>> {
    log_info(format!("Reading data from: {}", path.display()));
    let bytes = tokio::fs::read(path).await?;
    log_success(format!("Read {} bytes", bytes.len()));
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_file_location() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Make,Model\nTESLA,MODEL 3\n").unwrap();

        let location = SourceLocation::File(file.path().to_path_buf());
        let bytes = location.fetch().await.unwrap();
        assert!(bytes.starts_with(b"Make,Model"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let location = SourceLocation::File(PathBuf::from("/nonexistent/ev.csv"));
        assert!(matches!(location.fetch().await, Err(SourceError::Io(_))));
    }

    #[test]
    fn test_default_location_is_public_extract() {
        assert_eq!(
            SourceLocation::default(),
            SourceLocation::Url(DEFAULT_SOURCE_URL.to_string())
        );
    }
}
