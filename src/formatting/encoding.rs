use std::io::prelude::*;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::Error;

const COMPRESS_THRESHOLD: usize = 1024;

const RAW: u8 = 0;
const COMPRESSED: u8 = 1;

/// Compact byte form of a saved mark array: one flag byte, then the JSON
/// bytes, gzip-compressed past [`COMPRESS_THRESHOLD`].
pub(crate) fn encode<M: Serialize>(marks: &[M]) -> Vec<u8> {
    let json = serde_json::to_vec(marks).unwrap();
    if json.len() > COMPRESS_THRESHOLD {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        let compressed = encoder.finish().unwrap();
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(COMPRESSED);
        out.extend_from_slice(&compressed);
        out
    } else {
        let mut out = Vec::with_capacity(json.len() + 1);
        out.push(RAW);
        out.extend_from_slice(&json);
        out
    }
}

pub(crate) fn decode<M: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<M>, Error> {
    let (&flag, body) = bytes.split_first().ok_or(Error::DecodeError)?;
    let json = match flag {
        RAW => body.to_vec(),
        COMPRESSED => {
            let mut decoder = GzDecoder::new(body);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|_| Error::DecodeError)?;
            out
        }
        _ => return Err(Error::DecodeError),
    };
    serde_json::from_slice(&json).map_err(|_| Error::DecodeError)
}
