//! Fixed-layout binary records.
//!
//! A record is the plaintext form of one command:
//!
//! ```text
//! ┌─────────┬──────────┬────────────┬────────────┬────────────┬─────────────┐
//! │ version │ checksum │ length u16 │ main   u16 │ sub    u16 │ payload ... │
//! └─────────┴──────────┴────────────┴────────────┴────────────┴─────────────┘
//!   0         1          2..4         4..6         6..8         8..length
//! ```
//!
//! All integers are little-endian. Strings are fixed-width UTF-16LE,
//! zero-padded. Version and checksum are left zero by the builder; the
//! [`Cipher`](crate::Cipher) fills them in.

use byteorder::{ByteOrder, LittleEndian};
use clublink_transport::{FRAME_HEADER_LEN, MAX_FRAME_LEN};

use crate::cmd::CommandId;
use crate::ProtocolError;

/// Bytes before the payload: frame header plus main/sub command IDs.
pub const RECORD_HEADER_LEN: usize = FRAME_HEADER_LEN + 4;

/// Largest record the 16-bit length field can describe.
pub const MAX_RECORD_LEN: usize = MAX_FRAME_LEN;

/// Serializes one command into a record.
///
/// ```rust
/// use clublink_protocol::{PacketBuilder, PacketReader};
///
/// let mut b = PacketBuilder::new();
/// b.set_command(12, 1);
/// b.push_u32(7)?.push_str("house", 16)?.pad_to(24)?;
/// let bytes = b.finish()?;
/// assert_eq!(bytes.len(), 24 + 8);
///
/// let r = PacketReader::load(&bytes)?;
/// assert_eq!(r.read_u32(0)?, 7);
/// assert_eq!(r.read_str(4, 16)?, "house");
/// # Ok::<(), clublink_protocol::ProtocolError>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    /// Creates an empty builder. Call [`set_command`](Self::set_command) first.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    /// Resets the builder and starts a new record for `main`/`sub`.
    ///
    /// Writes a zeroed frame header as a placeholder for the length that
    /// [`finish`](Self::finish) fills in.
    pub fn set_command(&mut self, main: u16, sub: u16) -> &mut Self {
        self.buf.clear();
        self.buf.resize(RECORD_HEADER_LEN, 0);
        LittleEndian::write_u16(&mut self.buf[4..6], main);
        LittleEndian::write_u16(&mut self.buf[6..8], sub);
        self
    }

    /// Shorthand for [`set_command`](Self::set_command) with a [`CommandId`].
    pub fn command(&mut self, id: CommandId) -> &mut Self {
        self.set_command(id.main, id.sub)
    }

    /// Bytes pushed after the record header so far.
    pub fn payload_len(&self) -> usize {
        self.buf.len().saturating_sub(RECORD_HEADER_LEN)
    }

    /// Grows the buffer by `width` zeroed bytes and returns them.
    fn reserve(&mut self, width: usize) -> Result<&mut [u8], ProtocolError> {
        if self.buf.len() < RECORD_HEADER_LEN {
            return Err(ProtocolError::MissingCommand);
        }
        let start = self.buf.len();
        let end = start + width;
        if end > MAX_RECORD_LEN {
            return Err(ProtocolError::Overflow {
                needed: end,
                capacity: MAX_RECORD_LEN,
            });
        }
        self.buf.resize(end, 0);
        Ok(&mut self.buf[start..end])
    }

    pub fn push_u8(&mut self, value: u8) -> Result<&mut Self, ProtocolError> {
        self.reserve(1)?[0] = value;
        Ok(self)
    }

    pub fn push_u16(&mut self, value: u16) -> Result<&mut Self, ProtocolError> {
        LittleEndian::write_u16(self.reserve(2)?, value);
        Ok(self)
    }

    pub fn push_u32(&mut self, value: u32) -> Result<&mut Self, ProtocolError> {
        LittleEndian::write_u32(self.reserve(4)?, value);
        Ok(self)
    }

    pub fn push_i32(&mut self, value: i32) -> Result<&mut Self, ProtocolError> {
        LittleEndian::write_i32(self.reserve(4)?, value);
        Ok(self)
    }

    pub fn push_u64(&mut self, value: u64) -> Result<&mut Self, ProtocolError> {
        LittleEndian::write_u64(self.reserve(8)?, value);
        Ok(self)
    }

    pub fn push_i64(&mut self, value: i64) -> Result<&mut Self, ProtocolError> {
        LittleEndian::write_i64(self.reserve(8)?, value);
        Ok(self)
    }

    /// Appends `value` as a fixed-width UTF-16LE field of `width` bytes.
    ///
    /// The field always keeps at least one NUL code unit. Longer strings
    /// are truncated to `width / 2 - 1` code units, never splitting a
    /// surrogate pair; see [`encode_fixed_str`].
    ///
    /// # Errors
    /// [`ProtocolError::InvalidWidth`] for a zero or odd `width`.
    pub fn push_str(&mut self, value: &str, width: usize) -> Result<&mut Self, ProtocolError> {
        let field = encode_fixed_str(value, width)?;
        self.reserve(width)?.copy_from_slice(&field);
        Ok(self)
    }

    /// Zero-fills the payload up to exactly `payload_size` bytes.
    ///
    /// Every command has a fixed payload size the server checks; this is
    /// the last call before [`finish`](Self::finish).
    ///
    /// # Errors
    /// [`ProtocolError::PayloadExceedsLayout`] if more than `payload_size`
    /// bytes were already pushed.
    pub fn pad_to(&mut self, payload_size: usize) -> Result<&mut Self, ProtocolError> {
        let len = self.payload_len();
        if len > payload_size {
            return Err(ProtocolError::PayloadExceedsLayout {
                len,
                declared: payload_size,
            });
        }
        self.reserve(payload_size - len)?;
        Ok(self)
    }

    /// Writes the total length into the header and returns the record.
    ///
    /// The builder is left empty; call `set_command` again to reuse it.
    pub fn finish(&mut self) -> Result<Vec<u8>, ProtocolError> {
        if self.buf.len() < RECORD_HEADER_LEN {
            return Err(ProtocolError::MissingCommand);
        }
        let len = self.buf.len() as u16;
        LittleEndian::write_u16(&mut self.buf[2..4], len);
        Ok(std::mem::take(&mut self.buf))
    }
}

/// Encodes `value` into a zero-padded UTF-16LE field of `width` bytes.
///
/// Strings that would fill the whole field are truncated so that one NUL
/// terminator remains. If the cut lands between the halves of a surrogate
/// pair, the lone high surrogate is dropped too.
///
/// # Errors
/// [`ProtocolError::InvalidWidth`] for a zero or odd `width`.
pub fn encode_fixed_str(value: &str, width: usize) -> Result<Vec<u8>, ProtocolError> {
    if width == 0 || width % 2 != 0 {
        return Err(ProtocolError::InvalidWidth(width));
    }
    let max_units = width / 2 - 1;
    let mut units: Vec<u16> = value.encode_utf16().take(max_units + 1).collect();
    if units.len() > max_units {
        units.truncate(max_units);
        if units
            .last()
            .is_some_and(|u| (0xD800..=0xDBFF).contains(u))
        {
            units.pop();
        }
    }

    let mut field = vec![0u8; width];
    for (i, unit) in units.iter().enumerate() {
        LittleEndian::write_u16(&mut field[i * 2..i * 2 + 2], *unit);
    }
    Ok(field)
}

/// Reads fields out of a record.
///
/// Offsets passed to the `read_*` accessors are relative to the payload,
/// matching the layouts in the `cmd` module.
#[derive(Debug, Clone, Copy)]
pub struct PacketReader<'a> {
    version: u8,
    checksum: u8,
    len: usize,
    main: u16,
    sub: u16,
    payload: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Parses the record header of `buf` and exposes its payload.
    ///
    /// `buf` may be longer than the record; bytes past the declared
    /// length are ignored.
    ///
    /// # Errors
    /// [`ProtocolError::Truncated`] when `buf` is shorter than the header or
    /// the declared length, and [`ProtocolError::LengthMismatch`] when the
    /// declared length is shorter than the record header.
    pub fn load(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: RECORD_HEADER_LEN,
                len: buf.len(),
            });
        }
        let len = LittleEndian::read_u16(&buf[2..4]) as usize;
        if len < RECORD_HEADER_LEN {
            return Err(ProtocolError::LengthMismatch {
                declared: len,
                actual: buf.len(),
            });
        }
        if buf.len() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                len: buf.len(),
            });
        }
        Ok(Self {
            version: buf[0],
            checksum: buf[1],
            len,
            main: LittleEndian::read_u16(&buf[4..6]),
            sub: LittleEndian::read_u16(&buf[6..8]),
            payload: &buf[RECORD_HEADER_LEN..len],
        })
    }

    /// Wraps a bare payload (no header), as handed out by a [`Record`].
    pub fn from_payload(payload: &'a [u8]) -> Self {
        Self {
            version: 0,
            checksum: 0,
            len: payload.len() + RECORD_HEADER_LEN,
            main: 0,
            sub: 0,
            payload,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Total record length from the header.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn command(&self) -> CommandId {
        CommandId::new(self.main, self.sub)
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Borrows `width` payload bytes at `offset`.
    pub fn bytes(&self, offset: usize, width: usize) -> Result<&'a [u8], ProtocolError> {
        offset
            .checked_add(width)
            .and_then(|end| self.payload.get(offset..end))
            .ok_or(ProtocolError::OutOfBounds {
                offset,
                width,
                len: self.payload.len(),
            })
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, ProtocolError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, ProtocolError> {
        Ok(LittleEndian::read_u16(self.bytes(offset, 2)?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, ProtocolError> {
        Ok(LittleEndian::read_u32(self.bytes(offset, 4)?))
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32, ProtocolError> {
        Ok(LittleEndian::read_i32(self.bytes(offset, 4)?))
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64, ProtocolError> {
        Ok(LittleEndian::read_u64(self.bytes(offset, 8)?))
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64, ProtocolError> {
        Ok(LittleEndian::read_i64(self.bytes(offset, 8)?))
    }

    /// Decodes a fixed-width UTF-16LE field, stopping at the first NUL.
    ///
    /// Unpaired surrogates are replaced with U+FFFD.
    pub fn read_str(&self, offset: usize, width: usize) -> Result<String, ProtocolError> {
        if width % 2 != 0 {
            return Err(ProtocolError::InvalidWidth(width));
        }
        let raw = self.bytes(offset, width)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|&u| u != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Reads a string field that runs to the end of the payload, capped at
    /// `max_width` bytes. Used for trailing free-text fields.
    pub fn read_tail_str(&self, offset: usize, max_width: usize) -> Result<String, ProtocolError> {
        let available = self.payload.len().saturating_sub(offset);
        let width = available.min(max_width) & !1;
        if width == 0 {
            return Ok(String::new());
        }
        self.read_str(offset, width)
    }
}

/// A decoded record: command IDs plus an owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub main: u16,
    pub sub: u16,
    pub payload: Vec<u8>,
}

impl Record {
    /// Copies the command and payload out of a plaintext record.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        let r = PacketReader::load(buf)?;
        Ok(Self {
            main: r.main,
            sub: r.sub,
            payload: r.payload.to_vec(),
        })
    }

    pub fn command(&self) -> CommandId {
        CommandId::new(self.main, self.sub)
    }

    /// A reader over this record's payload.
    pub fn reader(&self) -> PacketReader<'_> {
        let mut r = PacketReader::from_payload(&self.payload);
        r.main = self.main;
        r.sub = self.sub;
        r
    }
}
