use crate::domain::errors::MetricError;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, MetricError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MetricError::Decode(format!("gzip: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| MetricError::Decode(format!("gzip: {}", e)))
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, MetricError> {
    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| MetricError::Decode(format!("gunzip: {}", e)))?;
    Ok(decoded)
}
