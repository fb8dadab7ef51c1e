//! The cipher boundary between records and wire frames.
//!
//! The platform enciphers every record before it goes on the wire. The
//! algorithm is not part of this crate: the session only needs something
//! that implements [`Cipher`], injected by the owner. The one rule every
//! implementation must keep is the frame header: bytes 2..4 of the output
//! hold the total frame length, because the reader splits the stream on
//! it before deciphering.
//!
//! [`PlainCipher`] is the identity transform plus a version byte and a
//! checksum. It is what tests and local servers speak.

use clublink_transport::FRAME_HEADER_LEN;

use crate::{PacketReader, ProtocolError, Record};

/// Converts plaintext records to wire frames and back.
///
/// `Send + Sync + 'static` so one instance can be shared by the sender
/// and dispatch tasks of a session.
pub trait Cipher: Send + Sync + 'static {
    /// Enciphers a complete record (as produced by
    /// [`PacketBuilder::finish`](crate::PacketBuilder::finish)).
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if `record` is not a well-formed record.
    fn encrypt(&self, record: &[u8]) -> Result<Vec<u8>, ProtocolError>;

    /// Deciphers one complete frame into its command and payload.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] for frames that fail to verify.
    fn decrypt(&self, frame: &[u8]) -> Result<Record, ProtocolError>;
}

/// Version byte stamped by [`PlainCipher`].
pub const PLAIN_VERSION: u8 = 0x01;

/// Unenciphered frames with an additive checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCipher;

impl PlainCipher {
    /// Bitwise NOT of the wrapping sum of every byte after the header.
    pub fn checksum(body: &[u8]) -> u8 {
        !body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
    }
}

impl Cipher for PlainCipher {
    fn encrypt(&self, record: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let reader = PacketReader::load(record)?;
        if reader.len() != record.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: reader.len(),
                actual: record.len(),
            });
        }
        let mut frame = record.to_vec();
        frame[0] = PLAIN_VERSION;
        frame[1] = Self::checksum(&frame[FRAME_HEADER_LEN..]);
        Ok(frame)
    }

    fn decrypt(&self, frame: &[u8]) -> Result<Record, ProtocolError> {
        let reader = PacketReader::load(frame)?;
        if reader.len() != frame.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: reader.len(),
                actual: frame.len(),
            });
        }
        if reader.version() != PLAIN_VERSION {
            return Err(ProtocolError::UnsupportedVersion(reader.version()));
        }
        let actual = Self::checksum(&frame[FRAME_HEADER_LEN..]);
        if reader.checksum() != actual {
            return Err(ProtocolError::Checksum {
                expected: reader.checksum(),
                actual,
            });
        }
        Record::parse(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PacketBuilder;

    fn record() -> Vec<u8> {
        let mut b = PacketBuilder::new();
        b.set_command(12, 2);
        b.push_u32(1001).unwrap();
        b.push_u32(42).unwrap();
        b.pad_to(12).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_encrypt_stamps_version_and_checksum() {
        let frame = PlainCipher.encrypt(&record()).unwrap();
        assert_eq!(frame[0], PLAIN_VERSION);
        assert_eq!(frame[1], PlainCipher::checksum(&frame[4..]));
        assert_eq!(&frame[2..], &record()[2..]);
    }

    #[test]
    fn test_decrypt_recovers_record() {
        let frame = PlainCipher.encrypt(&record()).unwrap();
        let rec = PlainCipher.decrypt(&frame).unwrap();
        assert_eq!((rec.main, rec.sub), (12, 2));
        assert_eq!(rec.payload.len(), 12);
        assert_eq!(rec.reader().read_u32(4).unwrap(), 42);
    }

    #[test]
    fn test_decrypt_corrupted_body_fails_checksum() {
        let mut frame = PlainCipher.encrypt(&record()).unwrap();
        frame[10] ^= 0xFF;
        assert!(matches!(
            PlainCipher.decrypt(&frame),
            Err(ProtocolError::Checksum { .. })
        ));
    }

    #[test]
    fn test_decrypt_wrong_version_is_rejected() {
        let mut frame = PlainCipher.encrypt(&record()).unwrap();
        frame[0] = 0x02;
        assert_eq!(
            PlainCipher.decrypt(&frame).unwrap_err(),
            ProtocolError::UnsupportedVersion(0x02)
        );
    }

    #[test]
    fn test_encrypt_trailing_bytes_is_length_mismatch() {
        let mut rec = record();
        rec.push(0);
        assert!(matches!(
            PlainCipher.encrypt(&rec),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }
}
