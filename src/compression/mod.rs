// src/compression/mod.rs
//! Archive decompression for repository Packages indexes
//!
//! Repositories publish their Packages index in any of five container
//! formats. Every codec here turns an archive on disk into a plain file on
//! disk through a bounded buffer; gzip is the one exception and inflates in
//! memory under a hard ceiling.
//!
//! Output is staged in a temporary file next to the destination and only
//! renamed into place once the stream has ended cleanly.

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Largest inflated size accepted from a gzip archive (256 MiB)
pub const MAX_GZIP_INFLATED: u64 = 256 * 1024 * 1024;

/// Read size for streaming codecs (64 KiB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Gzip member magic: `1f 8b`
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompression errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to open {codec} archive {path}: {source}")]
    Open {
        codec: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to create output next to {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("Corrupt or truncated {codec} stream: {source}")]
    Corrupt {
        codec: &'static str,
        source: io::Error,
    },

    #[error("Failed to write decompressed {codec} data: {source}")]
    Write {
        codec: &'static str,
        source: io::Error,
    },

    #[error("Inflated {codec} data exceeds the {limit} byte ceiling")]
    TooLarge { codec: &'static str, limit: u64 },

    #[error("Failed to move decompressed output to {path}: {source}")]
    Persist { path: PathBuf, source: io::Error },
}

/// Supported archive codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Zstandard (.zst)
    Zstd,
    /// XZ container (.xz)
    Xz,
    /// bzip2 (.bz2)
    Bzip2,
    /// Legacy LZMA-alone (.lzma)
    Lzma,
    /// Gzip or raw zlib (.gz)
    Gzip,
}

impl Codec {
    /// Detect the codec from a file name or URL suffix
    ///
    /// Returns `None` for an uncompressed file.
    pub fn from_extension(path: &str) -> Option<Self> {
        if path.ends_with(".zst") {
            Some(Self::Zstd)
        } else if path.ends_with(".xz") {
            Some(Self::Xz)
        } else if path.ends_with(".bz2") {
            Some(Self::Bzip2)
        } else if path.ends_with(".lzma") {
            Some(Self::Lzma)
        } else if path.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    /// File extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zstd => ".zst",
            Self::Xz => ".xz",
            Self::Bzip2 => ".bz2",
            Self::Lzma => ".lzma",
            Self::Gzip => ".gz",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Xz => "xz",
            Self::Bzip2 => "bzip2",
            Self::Lzma => "lzma",
            Self::Gzip => "gzip",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decompress `source` into `dest` using `codec`
///
/// Returns the number of decompressed bytes written. On success the source
/// archive is removed; on failure it is left in place and `dest` is not
/// touched.
pub fn decompress(codec: Codec, source: &Path, dest: &Path) -> Result<u64, CodecError> {
    let input = File::open(source).map_err(|e| CodecError::Open {
        codec: codec.name(),
        path: source.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::with_capacity(CHUNK_SIZE, input);

    let staging_dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(staging_dir).map_err(|e| CodecError::Create {
        path: dest.to_path_buf(),
        source: e,
    })?;

    let written = match codec {
        Codec::Gzip => inflate_gzip(reader, staged.as_file_mut(), MAX_GZIP_INFLATED)?,
        Codec::Xz => stream_into(XzDecoder::new_multi_decoder(reader), staged.as_file_mut(), codec)?,
        Codec::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(|e| {
                CodecError::Corrupt {
                    codec: codec.name(),
                    source: e.into(),
                }
            })?;
            stream_into(XzDecoder::new_stream(reader, stream), staged.as_file_mut(), codec)?
        }
        Codec::Bzip2 => stream_into(
            bzip2::read::MultiBzDecoder::new(reader),
            staged.as_file_mut(),
            codec,
        )?,
        Codec::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader).map_err(|e| {
                CodecError::Corrupt {
                    codec: codec.name(),
                    source: e,
                }
            })?;
            stream_into(decoder, staged.as_file_mut(), codec)?
        }
    };

    staged.as_file_mut().flush().map_err(|e| CodecError::Write {
        codec: codec.name(),
        source: e,
    })?;
    staged.persist(dest).map_err(|e| CodecError::Persist {
        path: dest.to_path_buf(),
        source: e.error,
    })?;

    if let Err(e) = fs::remove_file(source) {
        warn!("Failed to remove archive {}: {}", source.display(), e);
    }

    debug!(
        "Decompressed {} archive {} -> {} ({} bytes)",
        codec,
        source.display(),
        dest.display(),
        written
    );
    Ok(written)
}

/// Copy a decoder into `out` one chunk at a time
fn stream_into<R: Read>(mut decoder: R, out: &mut File, codec: Codec) -> Result<u64, CodecError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let read = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CodecError::Corrupt {
                    codec: codec.name(),
                    source: e,
                });
            }
        };

        out.write_all(&buffer[..read]).map_err(|e| CodecError::Write {
            codec: codec.name(),
            source: e,
        })?;
        written += read as u64;
    }

    Ok(written)
}

/// Inflate a gzip (or bare zlib) archive in one pass, failing past `limit`
fn inflate_gzip<R: BufRead>(mut reader: R, out: &mut File, limit: u64) -> Result<u64, CodecError> {
    let codec = Codec::Gzip.name();
    let is_gzip = reader
        .fill_buf()
        .map_err(|e| CodecError::Corrupt { codec, source: e })?
        .starts_with(&GZIP_MAGIC);

    let decoder: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(reader))
    } else {
        Box::new(ZlibDecoder::new(reader))
    };

    let mut inflated = Vec::new();
    decoder
        .take(limit + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| CodecError::Corrupt { codec, source: e })?;

    if inflated.len() as u64 > limit {
        return Err(CodecError::TooLarge { codec, limit });
    }

    out.write_all(&inflated)
        .map_err(|e| CodecError::Write { codec, source: e })?;
    Ok(inflated.len() as u64)
}
