//! Primitive big-endian encoding
//!
//! Writers append to a `Vec<u8>`; `Reader` walks a byte slice and fails with
//! `ProtocolError::Truncated` instead of returning short data.

use crate::error::{ProtocolError, Result};
use std::io::{Cursor, Read};
use tessera_common::Rid;

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(if value { 1 } else { 0 });
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_rid(out: &mut Vec<u8>, rid: &Rid) {
    write_i32(out, rid.cluster_id);
    write_i64(out, rid.position);
}

/// Length-prefixed byte array
pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

/// Length-prefixed byte array where length -1 encodes null
pub fn write_nullable_bytes(out: &mut Vec<u8>, bytes: Option<&[u8]>) -> Result<()> {
    match bytes {
        Some(bytes) => write_bytes(out, bytes),
        None => {
            write_i32(out, -1);
            Ok(())
        }
    }
}

pub fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    write_bytes(out, s.as_bytes())
}

/// Count prefix for a list or byte array
pub fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = i32::try_from(len).map_err(|_| ProtocolError::LengthOverflow(len))?;
    write_i32(out, len);
    Ok(())
}

/// Sequential reader over an encoded buffer
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Number of bytes not consumed yet
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    /// Fail if any input is left over
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }

    fn read_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| ProtocolError::Truncated(what))?;
        Ok(buf)
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.read_array::<1>(what)?[0])
    }

    pub fn read_bool(&mut self, what: &'static str) -> Result<bool> {
        match self.read_u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(ProtocolError::InvalidTag { what, tag }),
        }
    }

    pub fn read_i32(&mut self, what: &'static str) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array(what)?))
    }

    pub fn read_i64(&mut self, what: &'static str) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array(what)?))
    }

    pub fn read_u64(&mut self, what: &'static str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array(what)?))
    }

    pub fn read_rid(&mut self, what: &'static str) -> Result<Rid> {
        let cluster_id = self.read_i32(what)?;
        let position = self.read_i64(what)?;
        Ok(Rid::new(cluster_id, position))
    }

    /// Read a list count; negative counts are malformed
    pub fn read_len(&mut self, what: &'static str) -> Result<usize> {
        let len = self.read_i32(what)?;
        usize::try_from(len).map_err(|_| ProtocolError::InvalidLength(len))
    }

    pub fn read_bytes(&mut self, what: &'static str) -> Result<Vec<u8>> {
        let len = self.read_len(what)?;
        self.read_exact_vec(len, what)
    }

    pub fn read_nullable_bytes(&mut self, what: &'static str) -> Result<Option<Vec<u8>>> {
        match self.read_i32(what)? {
            -1 => Ok(None),
            len if len < 0 => Err(ProtocolError::InvalidLength(len)),
            len => self.read_exact_vec(len as usize, what).map(Some),
        }
    }

    pub fn read_string(&mut self, what: &'static str) -> Result<String> {
        let bytes = self.read_bytes(what)?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8(what))
    }

    fn read_exact_vec(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>> {
        // Reject lengths past the end before allocating
        if len > self.remaining() {
            return Err(ProtocolError::Truncated(what));
        }
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| ProtocolError::Truncated(what))?;
        Ok(buf)
    }
}
