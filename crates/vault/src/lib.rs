//! # The Vault: Signed Extension Container Parsing
//!
//! Browser-extension stores distribute packages wrapped in a signed container
//! (`.crx`). The container is a small little-endian header followed by a plain
//! zip payload; this crate locates that payload.
//!
//! ## Layout
//! | Offset | CRX2                 | CRX3                     |
//! |--------|----------------------|--------------------------|
//! | 0..4   | magic `Cr24`         | magic `Cr24`             |
//! | 4..8   | version = 2          | version = 3              |
//! | 8..12  | public key length    | header length            |
//! | 12..16 | signature length     | (header starts here)     |
//!
//! Payload offset is `16 + key_len + sig_len` for CRX2 and `12 + header_len`
//! for CRX3. Signatures are not checked: the payload is compared against what
//! the build pipeline certified, not against the store's key.

/// The 4-byte magic every container starts with.
pub const CRX_MAGIC: &[u8; 4] = b"Cr24";

const V2_HEADER_LEN: usize = 16;
const V3_HEADER_PREFIX_LEN: usize = 12;

/// Errors from container parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("not a signed extension container (bad magic)")]
    BadMagic,
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),
    #[error("container truncated: header needs {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
}

/// Parsed fixed header of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u32,
    /// Byte offset at which the embedded archive begins.
    pub payload_offset: usize,
}

fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32, ContainerError> {
    let end = offset + 4;
    let slice = bytes.get(offset..end).ok_or(ContainerError::Truncated {
        needed: end,
        actual: bytes.len(),
    })?;
    let mut word = [0u8; 4];
    word.copy_from_slice(slice);
    Ok(u32::from_le_bytes(word))
}

fn add_len(base: usize, len: u32, actual: usize) -> Result<usize, ContainerError> {
    base.checked_add(len as usize)
        .ok_or(ContainerError::Truncated {
            needed: usize::MAX,
            actual,
        })
}

/// Validates the magic and version and computes the payload offset.
///
/// # Errors
/// - [`ContainerError::BadMagic`] when the first four bytes are not `Cr24`.
/// - [`ContainerError::UnsupportedVersion`] for anything but 2 or 3.
/// - [`ContainerError::Truncated`] when the header or declared lengths run
///   past the end of the buffer.
pub fn parse_header(bytes: &[u8]) -> Result<ContainerHeader, ContainerError> {
    if bytes.get(..4) != Some(&CRX_MAGIC[..]) {
        return Err(ContainerError::BadMagic);
    }
    let version = read_u32_le(bytes, 4)?;
    let payload_offset = match version {
        2 => {
            let key_len = read_u32_le(bytes, 8)?;
            let sig_len = read_u32_le(bytes, 12)?;
            let with_key = add_len(V2_HEADER_LEN, key_len, bytes.len())?;
            add_len(with_key, sig_len, bytes.len())?
        }
        3 => {
            let header_len = read_u32_le(bytes, 8)?;
            add_len(V3_HEADER_PREFIX_LEN, header_len, bytes.len())?
        }
        other => return Err(ContainerError::UnsupportedVersion(other)),
    };
    if payload_offset > bytes.len() {
        return Err(ContainerError::Truncated {
            needed: payload_offset,
            actual: bytes.len(),
        });
    }
    Ok(ContainerHeader {
        version,
        payload_offset,
    })
}

/// Returns the embedded archive: everything from the payload offset to the end.
pub fn extract_payload(bytes: &[u8]) -> Result<&[u8], ContainerError> {
    let header = parse_header(bytes)?;
    Ok(&bytes[header.payload_offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crx3(header: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(CRX_MAGIC);
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(header);
        out.extend_from_slice(payload);
        out
    }

    fn crx2(key: &[u8], sig: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(CRX_MAGIC);
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(&(sig.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(sig);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_v3_payload_offset() {
        for header_len in [0usize, 1, 7, 64, 300] {
            let header = vec![0xAB; header_len];
            let payload = b"PK\x03\x04payload-bytes";
            let bytes = crx3(&header, payload);

            let parsed = parse_header(&bytes).unwrap();
            assert_eq!(parsed.version, 3);
            assert_eq!(parsed.payload_offset, 12 + header_len);
            assert_eq!(extract_payload(&bytes).unwrap(), &payload[..]);
        }
    }

    #[test]
    fn test_v2_payload_offset() {
        let payload = b"PK\x03\x04zip";
        let bytes = crx2(&[1u8; 5], &[2u8; 9], payload);
        let parsed = parse_header(&bytes).unwrap();
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.payload_offset, 16 + 5 + 9);
        assert_eq!(extract_payload(&bytes).unwrap(), &payload[..]);
    }

    #[test]
    fn test_empty_payload_is_allowed() {
        let bytes = crx3(b"hdr", b"");
        assert_eq!(extract_payload(&bytes).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = crx3(b"hdr", b"PK");
        bytes[0] = b'X';
        assert_eq!(extract_payload(&bytes), Err(ContainerError::BadMagic));
        assert_eq!(extract_payload(b""), Err(ContainerError::BadMagic));
        assert_eq!(extract_payload(b"PK\x03\x04"), Err(ContainerError::BadMagic));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = crx3(b"hdr", b"PK");
        bytes[4..8].copy_from_slice(&4u32.to_le_bytes());
        assert_eq!(
            extract_payload(&bytes),
            Err(ContainerError::UnsupportedVersion(4))
        );
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(matches!(
            extract_payload(b"Cr24\x03\x00"),
            Err(ContainerError::Truncated { .. })
        ));

        let mut bytes = crx3(b"hdr", b"PK");
        bytes[8..12].copy_from_slice(&1000u32.to_le_bytes());
        assert_eq!(
            extract_payload(&bytes),
            Err(ContainerError::Truncated {
                needed: 1012,
                actual: bytes.len()
            })
        );
    }
}
