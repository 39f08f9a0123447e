use serde::Deserialize;
use serde::Serialize;

use crate::decode_versioned;
use crate::encode_versioned;
use crate::CoordinatorError;
use crate::Error;
use crate::LogicalVersion;
use crate::Result;
use crate::VersionError;
use crate::VersionedRecord;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: u32,
    note: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SampleV5 {
    id: u32,
}

impl VersionedRecord for Sample {
    fn encode_body(
        &self,
        version: LogicalVersion,
    ) -> Result<Vec<u8>> {
        if version >= LogicalVersion::V6 {
            Ok(bincode::serialize(self)?)
        } else {
            Ok(bincode::serialize(&SampleV5 { id: self.id })?)
        }
    }

    fn decode_body(
        version: LogicalVersion,
        body: &[u8],
    ) -> Result<Self> {
        if version >= LogicalVersion::V6 {
            Ok(bincode::deserialize(body)?)
        } else {
            let v5: SampleV5 = bincode::deserialize(body)?;
            Ok(Sample { id: v5.id, note: None })
        }
    }
}

#[test]
fn test_header_carries_version() {
    let bytes = encode_versioned(&Sample { id: 1, note: None }, LogicalVersion::V5).unwrap();
    assert_eq!(&bytes[..2], &[0, 5]);
}

#[test]
fn test_legacy_layout_drops_new_fields() {
    let record = Sample {
        id: 9,
        note: Some("reason".into()),
    };

    let bytes = encode_versioned(&record, LogicalVersion::V5).unwrap();
    let (version, decoded): (_, Sample) = decode_versioned(&bytes, LogicalVersion::V6).unwrap();

    assert_eq!(version, LogicalVersion::V5);
    assert_eq!(decoded, Sample { id: 9, note: None });
}

#[test]
fn test_newer_record_is_unsupported() {
    let bytes = encode_versioned(&Sample { id: 1, note: None }, LogicalVersion::V6).unwrap();

    let result: Result<(LogicalVersion, Sample)> = decode_versioned(&bytes, LogicalVersion::V5);
    assert!(matches!(
        result,
        Err(Error::Coordinator(CoordinatorError::Version(VersionError::Unsupported {
            found: 6,
            supported: 5
        })))
    ));
}

#[test]
fn test_obsolete_and_truncated_records_are_rejected() {
    let result: Result<(LogicalVersion, Sample)> = decode_versioned(&[0, 4, 1], LogicalVersion::V6);
    assert!(matches!(
        result,
        Err(Error::Coordinator(CoordinatorError::Version(VersionError::Obsolete(4))))
    ));

    let result: Result<(LogicalVersion, Sample)> = decode_versioned(&[0], LogicalVersion::V6);
    assert!(matches!(
        result,
        Err(Error::Coordinator(CoordinatorError::Version(VersionError::Truncated(1))))
    ));
}
