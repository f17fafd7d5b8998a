//! Little-endian framing helpers for engine files.

use crate::error::{CoreError, CoreResult};

/// Cursor over a byte slice; every read returns `None` past the end.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    pub(crate) fn u16(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Option<u64> {
        self.array().map(u64::from_le_bytes)
    }

    /// Reads a `u32` length followed by that many bytes.
    pub(crate) fn blob(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.u32()?).ok()?;
        self.bytes(len)
    }

    /// Reads a `u16` length followed by that many UTF-8 bytes.
    pub(crate) fn name(&mut self) -> Option<&'a str> {
        let len = usize::from(self.u16()?);
        std::str::from_utf8(self.bytes(len)?).ok()
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Some(out)
    }
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Writes a `u32` length prefix and the bytes.
pub(crate) fn put_blob(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CoreError::invalid_operation(format!(
            "{} bytes exceed the record size limit",
            bytes.len()
        ))
    })?;
    put_u32(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Writes a `u16` length prefix and the UTF-8 bytes of a map name.
pub(crate) fn put_name(buf: &mut Vec<u8>, name: &str) -> CoreResult<()> {
    let len = u16::try_from(name.len()).map_err(|_| {
        CoreError::invalid_operation(format!("map name of {} bytes is too long", name.len()))
    })?;
    put_u16(buf, len);
    buf.extend_from_slice(name.as_bytes());
    Ok(())
}
