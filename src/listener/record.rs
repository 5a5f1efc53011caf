//! Decoding of raw inotify records.
//!
//! Layout of one record (native endian):
//!
//! ```text
//! +--------+--------+--------+----------+----------------------+
//! | wd i32 | mask   | cookie | name_len | name (name_len bytes)|
//! +--------+--------+--------+----------+----------------------+
//! ```
//!
//! The kernel pads `name` with NULs; padding is trimmed here.

use crate::watch::{EventMask, WatchError, WatchHandle};

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 16;

/// Longest filename the kernel reports, plus its terminating NUL.
pub const NAME_MAX: usize = 256;

/// Smallest read buffer guaranteed to hold one record.
pub const MIN_BUFFER_LEN: usize = HEADER_LEN + NAME_MAX;

/// One decoded kernel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub mask: EventMask,
    pub cookie: u32,
    /// Empty for meta records (queue overflow, ignored, self events).
    pub name: String,
}

impl RawEvent {
    pub fn is_meta(&self) -> bool {
        self.name.is_empty()
    }

    pub fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_ne_bytes(word)
}

/// Decode one record from the front of `buf`.
///
/// Returns the record and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(RawEvent, usize), WatchError> {
    if buf.len() < HEADER_LEN {
        return Err(WatchError::MalformedRecord {
            reason: format!("{} bytes left, header needs {HEADER_LEN}", buf.len()),
        });
    }

    let handle = WatchHandle(read_u32(buf, 0) as i32);
    let mask = EventMask::from_bits_retain(read_u32(buf, 4));
    let cookie = read_u32(buf, 8);
    let name_len = read_u32(buf, 12) as usize;

    let remaining = buf.len() - HEADER_LEN;
    if name_len > remaining {
        return Err(WatchError::MalformedRecord {
            reason: format!("name_len {name_len} exceeds remaining {remaining} bytes"),
        });
    }

    let raw_name = &buf[HEADER_LEN..HEADER_LEN + name_len];
    let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let name = String::from_utf8_lossy(&raw_name[..end]).into_owned();

    Ok((
        RawEvent {
            handle,
            mask,
            cookie,
            name,
        },
        HEADER_LEN + name_len,
    ))
}

/// Iterator over the records in one read.
///
/// Stops after the first malformed record; the rest of the buffer cannot be
/// resynchronised.
#[derive(Debug)]
pub struct Records<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<RawEvent, WatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }

        match decode(self.buf) {
            Ok((event, consumed)) => {
                self.buf = &self.buf[consumed..];
                Some(Ok(event))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Encode a record the way the kernel lays it out. Test helper.
#[cfg(test)]
pub(crate) fn encode(handle: i32, mask: EventMask, cookie: u32, name: &str) -> Vec<u8> {
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() + 1).next_multiple_of(4)
    };

    let mut out = Vec::with_capacity(HEADER_LEN + padded);
    out.extend_from_slice(&handle.to_ne_bytes());
    out.extend_from_slice(&mask.bits().to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(padded as u32).to_ne_bytes());
    out.extend_from_slice(name.as_bytes());
    out.resize(HEADER_LEN + padded, 0);
    out
}
