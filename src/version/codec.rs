use crate::LogicalVersion;
use crate::Result;
use crate::VersionError;

const HEADER_LEN: usize = 2;

/// A persisted record whose body layout depends on the logical version.
///
/// Every record is stored as a 2-byte big-endian version header followed by
/// the body for that version.
pub trait VersionedRecord: Sized {
    fn encode_body(
        &self,
        version: LogicalVersion,
    ) -> Result<Vec<u8>>;

    fn decode_body(
        version: LogicalVersion,
        body: &[u8],
    ) -> Result<Self>;
}

pub fn encode_versioned<R: VersionedRecord>(
    record: &R,
    version: LogicalVersion,
) -> Result<Vec<u8>> {
    let body = record.encode_body(version)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&version.0.to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Version a persisted record was written in, without decoding its body
pub fn peek_version(bytes: &[u8]) -> Result<LogicalVersion> {
    if bytes.len() < HEADER_LEN {
        return Err(VersionError::Truncated(bytes.len()).into());
    }
    Ok(LogicalVersion(u16::from_be_bytes([bytes[0], bytes[1]])))
}

/// Decodes a record written in any version in `[MIN_SUPPORTED, max_readable]`
pub fn decode_versioned<R: VersionedRecord>(
    bytes: &[u8],
    max_readable: LogicalVersion,
) -> Result<(LogicalVersion, R)> {
    let version = peek_version(bytes)?;
    if version > max_readable {
        return Err(VersionError::Unsupported {
            found: version.0,
            supported: max_readable.0,
        }
        .into());
    }
    if version < LogicalVersion::MIN_SUPPORTED {
        return Err(VersionError::Obsolete(version.0).into());
    }
    let record = R::decode_body(version, &bytes[HEADER_LEN..])?;
    Ok((version, record))
}
