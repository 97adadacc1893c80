//! File input and output helpers: overlay datasets, the local cache slot and
//! terrain samples.

pub mod cache;
pub mod dataset;

pub use cache::{CacheSlot, FileCache, MemoryCache};
pub use dataset::{DatasetSource, DirectorySource, FetchError, HttpSource, MemorySource};

use std::fs::File;
use std::io::{self, Read, Write};

use crate::geometry::Point3;

/// Reads a file to string.
pub fn read_to_string(path: &str) -> io::Result<String> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Writes a string to a file, replacing any existing contents.
pub fn write_string(path: &str, contents: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())
}

/// Parses `lng,lat,elevation` lines. Blank lines and lines starting with `#`
/// are ignored.
pub fn parse_elevation_samples(contents: &str) -> io::Result<Vec<Point3>> {
    let mut pts = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {}: expected lng,lat,elevation", idx + 1),
            ));
        }
        let mut values = [0.0; 3];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part.trim().parse::<f64>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: {}", idx + 1, e),
                )
            })?;
        }
        pts.push(Point3::new(values[0], values[1], values[2]));
    }
    Ok(pts)
}

/// Reads terrain samples from a CSV file of `lng,lat,elevation` rows.
pub fn read_elevation_samples(path: &str) -> io::Result<Vec<Point3>> {
    parse_elevation_samples(&read_to_string(path)?)
}
