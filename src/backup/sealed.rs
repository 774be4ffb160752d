//! Passphrase-sealed archives
//!
//! A sealed archive is the magic header [`SEAL_MAGIC`] followed by a JSON
//! document holding the key derivation parameters and the AES-256-GCM
//! encryption of the complete ZIP archive.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::crypto::{decrypt, derive_key, encrypt, EncryptedData, KeyDerivationParams, SecureString};
use crate::error::{ReceiptsError, ReceiptsResult};

/// First bytes of every sealed archive
pub const SEAL_MAGIC: &[u8; 8] = b"RCPTSEAL";

/// Version of the sealed envelope
const SEAL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SealedArchive {
    version: u32,
    key_params: KeyDerivationParams,
    payload: EncryptedData,
}

/// Whether the file at `path` starts with the seal magic
pub fn is_sealed(path: &Path) -> ReceiptsResult<bool> {
    let mut file = File::open(path).map_err(|e| ReceiptsError::source(path.display(), &e))?;
    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == SEAL_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(ReceiptsError::source(path.display(), &e)),
    }
}

/// Encrypt the archive at `archive` into `output`
pub fn seal_archive(
    archive: &Path,
    output: &mut impl Write,
    passphrase: &SecureString,
) -> ReceiptsResult<()> {
    let plaintext = fs::read(archive).map_err(|e| ReceiptsError::source(archive.display(), &e))?;

    let key_params = KeyDerivationParams::new();
    let key = derive_key(passphrase, &key_params)?;
    let sealed = SealedArchive {
        version: SEAL_VERSION,
        key_params,
        payload: encrypt(&plaintext, &key)?,
    };

    output
        .write_all(SEAL_MAGIC)
        .map_err(|e| ReceiptsError::destination("sealed archive", &e))?;
    serde_json::to_writer(&mut *output, &sealed).map_err(|e| {
        ReceiptsError::DestinationUnwritable(format!("Failed to write sealed archive: {}", e))
    })?;
    output
        .flush()
        .map_err(|e| ReceiptsError::destination("sealed archive", &e))?;
    Ok(())
}

/// Decrypt a sealed archive into a temporary ZIP file next to it
///
/// The temporary file is deleted when the returned handle is dropped.
pub fn open_sealed(path: &Path, passphrase: &SecureString) -> ReceiptsResult<NamedTempFile> {
    let bytes = fs::read(path).map_err(|e| ReceiptsError::source(path.display(), &e))?;
    let body = bytes
        .strip_prefix(SEAL_MAGIC.as_slice())
        .ok_or_else(|| ReceiptsError::ArchiveCorrupt("Not a sealed archive".to_string()))?;

    let sealed: SealedArchive = serde_json::from_slice(body)
        .map_err(|e| ReceiptsError::ArchiveCorrupt(format!("Invalid sealed archive: {}", e)))?;
    if sealed.version != SEAL_VERSION {
        return Err(ReceiptsError::Encryption(format!(
            "Unsupported sealed archive version: {}",
            sealed.version
        )));
    }

    let key = derive_key(passphrase, &sealed.key_params)?;
    let plaintext = decrypt(&sealed.payload, &key)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".receipts-unsealed-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| ReceiptsError::destination(parent.display(), &e))?;
    temp.write_all(&plaintext)?;
    temp.flush()?;
    Ok(temp)
}
