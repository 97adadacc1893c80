//! Overlay dataset fetching.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use geojson::{FeatureCollection, GeoJson};
use log::debug;

/// Failure to obtain or decode one dataset. Always recoverable per layer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Transport { url: String, message: String },
    #[error("{path} is not a GeoJSON FeatureCollection: {message}")]
    Parse { path: String, message: String },
}

/// Parses `bytes` as a GeoJSON `FeatureCollection`.
pub fn parse_feature_collection(path: &str, bytes: &[u8]) -> Result<FeatureCollection, FetchError> {
    let parse_error = |message: String| FetchError::Parse {
        path: path.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
    match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
        Ok(_) => Err(parse_error("expected a FeatureCollection".into())),
        Err(e) => Err(parse_error(e.to_string())),
    }
}

/// Where overlay files and icon assets are fetched from, by relative path.
pub trait DatasetSource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError>;

    fn fetch_collection(&self, path: &str) -> Result<FeatureCollection, FetchError> {
        let bytes = self.fetch_bytes(path)?;
        parse_feature_collection(path, &bytes)
    }
}

/// Datasets stored below a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DatasetSource for DirectorySource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let full = self.root.join(path);
        debug!("reading {}", full.display());
        std::fs::read(&full).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(full.display().to_string())
            } else {
                FetchError::Io {
                    path: full.display().to_string(),
                    source,
                }
            }
        })
    }
}

/// Datasets served over HTTP below a base URL.
#[derive(Clone)]
pub struct HttpSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::agent(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches("./"))
    }
}

impl DatasetSource for HttpSource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.url(path);
        debug!("GET {url}");
        match self.agent.get(&url).call() {
            Ok(response) => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|source| FetchError::Io {
                        path: url.clone(),
                        source,
                    })?;
                Ok(bytes)
            }
            Err(ureq::Error::Status(404, _)) => Err(FetchError::NotFound(url)),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status { url, status }),
            Err(e) => Err(FetchError::Transport {
                url,
                message: e.to_string(),
            }),
        }
    }
}

/// Datasets held in memory, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), contents.into());
    }

    pub fn with(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn remove(&mut self, path: &str) {
        self.files.remove(path);
    }
}

impl DatasetSource for MemorySource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }
}
