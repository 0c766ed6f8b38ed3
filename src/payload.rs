//! Payload format for self-contained installers
//!
//! The payload is appended to the end of the setforge executable and holds
//! everything the installer personality needs: the manifest, the converted
//! icon, and the archived install tree.
//!
//! ## Format
//!
//! ```text
//! [Stub Executable]
//! [Payload Header]
//!   - Magic: "SFPK" (4 bytes)
//!   - Version: u32 LE (4 bytes)
//!   - Meta Length: u64 LE (8 bytes)
//!   - Archive Length: u64 LE (8 bytes)
//! [Meta] (JSON, zstd compressed)
//! [Archive] (tar, compressed per the manifest: zstd | gzip | none)
//! [Footer]
//!   - Payload Start Offset: u64 LE (8 bytes)
//!   - Magic: "SFPK" (4 bytes)
//! ```
//!
//! The meta block is always zstd so the reader can open it before learning
//! the archive's compression scheme from it.
//!
//! ## Content Hash
//!
//! The meta includes a BLAKE3 hash over the staged files, verified after
//! extraction so a truncated or tampered payload fails loudly instead of
//! producing a partial install.

use crate::collector::StagedFile;
use crate::error::{SetupError, SetupResult};
use crate::manifest::{CompressionKind, Manifest};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

/// Magic bytes for payload identification
pub const PAYLOAD_MAGIC: &[u8; 4] = b"SFPK";

/// Current payload format version
pub const PAYLOAD_VERSION: u32 = 1;

/// Footer size in bytes (offset: 8 + magic: 4)
const FOOTER_SIZE: u64 = 12;

/// Payload contents assembled at build time
#[derive(Debug, Clone)]
pub struct Payload {
    /// The manifest the installer personality runs from
    pub manifest: Manifest,
    /// Content hash (BLAKE3) of all staged files
    /// Format: 16 hex chars (first 64 bits of the hash)
    pub content_hash: String,
    /// Converted application icon (ICO bytes)
    pub icon: Option<Vec<u8>>,
    /// Staged install tree
    pub files: Vec<StagedFile>,
}

impl Payload {
    /// Create a payload for a manifest
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            content_hash: String::new(),
            icon: None,
            files: Vec::new(),
        }
    }

    /// Attach the staged install tree
    pub fn with_files(mut self, files: Vec<StagedFile>) -> Self {
        self.files = files;
        self
    }

    /// Attach the converted icon bytes
    pub fn with_icon(mut self, icon: Option<Vec<u8>>) -> Self {
        self.icon = icon;
        self
    }

    /// Compute and set the content hash from the staged files
    ///
    /// Returns the hash string (16 hex chars).
    pub fn compute_content_hash(&mut self) -> String {
        let short_hash = hash_files(&self.files);
        self.content_hash = short_hash.clone();
        short_hash
    }

    /// Get the content hash, computing it if not already set
    pub fn get_content_hash(&mut self) -> String {
        if self.content_hash.is_empty() {
            self.compute_content_hash();
        }
        self.content_hash.clone()
    }

    /// Total uncompressed size of the staged files
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.contents.len() as u64).sum()
    }
}

/// Hash a file set down to 16 hex chars
///
/// Files are hashed sorted by destination so staging order does not
/// change the hash. The installer recomputes this over the extracted
/// files to verify the archive survived transport.
pub fn hash_files(files: &[StagedFile]) -> String {
    let mut hasher = blake3::Hasher::new();

    let mut sorted: Vec<_> = files.iter().collect();
    sorted.sort_by(|a, b| a.dest.cmp(&b.dest));

    for file in &sorted {
        hasher.update(file.dest.as_bytes());
        hasher.update(&[0]); // Separator
        hasher.update(&(file.contents.len() as u64).to_le_bytes());
        hasher.update(&file.contents);
    }

    let hash = hasher.finalize();
    format!(
        "{:016x}",
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap_or([0u8; 8]))
    )
}

/// Metadata stored in the payload (manifest + integrity fields)
///
/// This is what gets serialized to JSON; the staged files travel in the
/// tar archive instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadMeta {
    /// The embedded manifest
    #[serde(flatten)]
    pub manifest: Manifest,
    /// Content hash (BLAKE3) of all staged files
    pub content_hash: String,
    /// Archive compression scheme
    pub compression: CompressionKind,
    /// Build timestamp (unix seconds)
    pub created_unix: u64,
    /// Converted application icon (ICO bytes)
    #[serde(default)]
    #[serde(with = "serde_bytes_base64")]
    pub icon: Option<Vec<u8>>,
    /// Destinations installed only when not already present
    #[serde(default)]
    pub keep_existing: Vec<String>,
}

/// Serde helper module for serializing Option<Vec<u8>> as base64
mod serde_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Writer for appending a payload to a stub executable
pub struct PayloadWriter;

impl PayloadWriter {
    /// Append a payload to an executable
    ///
    /// The stub's own bytes are left untouched; everything is written after
    /// the original EOF. The content hash is computed first if unset.
    pub fn write(exe_path: &Path, payload: &Payload) -> SetupResult<()> {
        let mut payload = payload.clone();
        let content_hash = payload.get_content_hash();
        let kind = payload.manifest.build.compression;
        let level = payload.manifest.compression_level();

        let file = File::options().append(true).open(exe_path)?;
        let mut writer = BufWriter::new(file);

        // Current end of file is where the payload starts
        let payload_start = writer.seek(SeekFrom::End(0))?;

        let meta = PayloadMeta {
            manifest: payload.manifest.clone(),
            content_hash: content_hash.clone(),
            compression: kind,
            created_unix: unix_now(),
            icon: payload.icon.clone(),
            keep_existing: payload
                .files
                .iter()
                .filter(|f| f.keep_existing)
                .map(|f| f.dest.clone())
                .collect(),
        };
        let meta_json = serde_json::to_vec(&meta)?;

        // Meta is always zstd; the archive scheme lives inside it
        let meta_compressed = zstd::encode_all(&meta_json[..], 3)
            .map_err(|e| SetupError::Compression(e.to_string()))?;

        let archive_tar = Self::create_archive(&payload.files)?;
        let archive_compressed = compress(&archive_tar, kind, level)?;

        // Write header
        writer.write_all(PAYLOAD_MAGIC)?;
        writer.write_all(&PAYLOAD_VERSION.to_le_bytes())?;
        writer.write_all(&(meta_compressed.len() as u64).to_le_bytes())?;
        writer.write_all(&(archive_compressed.len() as u64).to_le_bytes())?;

        // Write data
        writer.write_all(&meta_compressed)?;
        writer.write_all(&archive_compressed)?;

        // Write footer
        writer.write_all(&payload_start.to_le_bytes())?;
        writer.write_all(PAYLOAD_MAGIC)?;

        writer.flush()?;

        // Sync before anything else touches the artifact
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;
        drop(file);

        tracing::info!(
            "Payload written: meta={} bytes, archive={} bytes ({:?}), hash={}, app={}",
            meta_compressed.len(),
            archive_compressed.len(),
            kind,
            content_hash,
            payload.manifest.package.name
        );

        Ok(())
    }

    /// Create a tar archive from the staged files
    fn create_archive(files: &[StagedFile]) -> SetupResult<Vec<u8>> {
        let mut archive = tar::Builder::new(Vec::new());

        for file in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(file.contents.len() as u64);
            header.set_mode(if file.mode == 0 { 0o644 } else { file.mode });
            // append_data writes the path, emitting a GNU long-name
            // record when it does not fit the 100-byte header field
            archive.append_data(&mut header, &file.dest, &file.contents[..])?;
        }

        archive
            .into_inner()
            .map_err(|e| SetupError::Compression(e.to_string()))
    }
}

/// Reader for extracting a payload from an executable
pub struct PayloadReader;

impl PayloadReader {
    /// Check if a file carries a payload
    pub fn is_packed(path: &Path) -> SetupResult<bool> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < FOOTER_SIZE {
            return Ok(false);
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;

        let mut offset_bytes = [0u8; 8];
        let mut magic = [0u8; 4];
        reader.read_exact(&mut offset_bytes)?;
        reader.read_exact(&mut magic)?;

        Ok(&magic == PAYLOAD_MAGIC)
    }

    /// Read only the payload metadata (cheap: footer, header, meta block)
    pub fn read_meta(path: &Path) -> SetupResult<Option<PayloadMeta>> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < FOOTER_SIZE {
            return Ok(None);
        }

        let mut reader = BufReader::with_capacity(64 * 1024, file);
        let Some((meta, _archive_len)) = Self::read_meta_inner(&mut reader)? else {
            return Ok(None);
        };
        Ok(Some(meta))
    }

    /// Read the full payload, staged files included
    pub fn read(path: &Path) -> SetupResult<Option<Payload>> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < FOOTER_SIZE {
            return Ok(None);
        }

        let mut reader = BufReader::with_capacity(64 * 1024, file);
        let Some((meta, archive_len)) = Self::read_meta_inner(&mut reader)? else {
            return Ok(None);
        };

        let read_start = Instant::now();
        let mut archive_compressed = vec![0u8; archive_len];
        reader.read_exact(&mut archive_compressed)?;

        let files = Self::extract_files_streaming(&archive_compressed, meta.compression)?;
        tracing::debug!(
            "Archive: {} bytes compressed -> {} files in {:?}",
            archive_len,
            files.len(),
            read_start.elapsed()
        );

        let keep = &meta.keep_existing;
        let files = files
            .into_iter()
            .map(|(dest, mode, contents)| StagedFile {
                keep_existing: keep.contains(&dest),
                dest,
                mode,
                contents,
            })
            .collect();

        Ok(Some(Payload {
            manifest: meta.manifest,
            content_hash: meta.content_hash,
            icon: meta.icon,
            files,
        }))
    }

    /// Shared footer + header + meta parsing. Returns `None` for files
    /// without a payload; malformed payloads are errors.
    fn read_meta_inner(
        reader: &mut BufReader<File>,
    ) -> SetupResult<Option<(PayloadMeta, usize)>> {
        // Read footer
        reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut offset_bytes = [0u8; 8];
        let mut magic = [0u8; 4];
        reader.read_exact(&mut offset_bytes)?;
        reader.read_exact(&mut magic)?;

        if &magic != PAYLOAD_MAGIC {
            return Ok(None);
        }

        let payload_start = u64::from_le_bytes(offset_bytes);

        // Seek to payload start and read header
        reader.seek(SeekFrom::Start(payload_start))?;

        let mut header_magic = [0u8; 4];
        let mut version_bytes = [0u8; 4];
        let mut meta_len_bytes = [0u8; 8];
        let mut archive_len_bytes = [0u8; 8];

        reader.read_exact(&mut header_magic)?;
        reader.read_exact(&mut version_bytes)?;
        reader.read_exact(&mut meta_len_bytes)?;
        reader.read_exact(&mut archive_len_bytes)?;

        if &header_magic != PAYLOAD_MAGIC {
            return Err(SetupError::InvalidPayload(
                "Invalid header magic".to_string(),
            ));
        }

        let version = u32::from_le_bytes(version_bytes);
        if version != PAYLOAD_VERSION {
            return Err(SetupError::InvalidPayload(format!(
                "Unsupported version: {} (expected {})",
                version, PAYLOAD_VERSION
            )));
        }

        let meta_len = u64::from_le_bytes(meta_len_bytes) as usize;
        let archive_len = u64::from_le_bytes(archive_len_bytes) as usize;

        let mut meta_compressed = vec![0u8; meta_len];
        reader.read_exact(&mut meta_compressed)?;

        let meta_json = zstd::decode_all(&meta_compressed[..])
            .map_err(|e| SetupError::Compression(e.to_string()))?;
        let meta: PayloadMeta = serde_json::from_slice(&meta_json)?;

        tracing::debug!(
            "Meta: {} bytes compressed -> {} bytes, hash {}",
            meta_len,
            meta_json.len(),
            meta.content_hash
        );

        Ok(Some((meta, archive_len)))
    }

    /// Extract files from the archive with a streaming decoder
    ///
    /// Avoids holding both the compressed and decompressed archive in
    /// memory at once. Returns (dest, mode, contents) tuples.
    fn extract_files_streaming(
        compressed: &[u8],
        kind: CompressionKind,
    ) -> SetupResult<Vec<(String, u32, Vec<u8>)>> {
        let decoder = archive_reader(compressed, kind)?;

        let mut archive = tar::Archive::new(decoder);
        let mut out = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().replace('\\', "/");
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut contents)?;
            out.push((path, mode, contents));
        }

        Ok(out)
    }

    /// Get the stub size (bytes before the payload)
    pub fn original_size(path: &Path) -> SetupResult<Option<u64>> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < FOOTER_SIZE {
            return Ok(None);
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;

        let mut offset_bytes = [0u8; 8];
        let mut magic = [0u8; 4];
        reader.read_exact(&mut offset_bytes)?;
        reader.read_exact(&mut magic)?;

        if &magic != PAYLOAD_MAGIC {
            return Ok(None);
        }

        Ok(Some(u64::from_le_bytes(offset_bytes)))
    }
}

/// Compress an archive per the configured scheme
fn compress(data: &[u8], kind: CompressionKind, level: i32) -> SetupResult<Vec<u8>> {
    match kind {
        CompressionKind::Zstd => {
            zstd::encode_all(data, level).map_err(|e| SetupError::Compression(e.to_string()))
        }
        CompressionKind::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(
                Vec::new(),
                flate2::Compression::new(level.clamp(0, 9) as u32),
            );
            encoder.write_all(data)?;
            encoder
                .finish()
                .map_err(|e| SetupError::Compression(e.to_string()))
        }
        CompressionKind::None => Ok(data.to_vec()),
    }
}

/// Streaming reader over a compressed archive
fn archive_reader<'a>(data: &'a [u8], kind: CompressionKind) -> SetupResult<Box<dyn Read + 'a>> {
    match kind {
        CompressionKind::Zstd => {
            let decoder = zstd::stream::Decoder::new(data)
                .map_err(|e| SetupError::Compression(e.to_string()))?;
            Ok(Box::new(decoder))
        }
        CompressionKind::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(data))),
        CompressionKind::None => Ok(Box::new(data)),
    }
}

/// Seconds since the unix epoch, 0 when the clock is unusable
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
