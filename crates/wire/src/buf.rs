//! Bounds-checked primitive reads and writes.
//!
//! `bytes::Buf` panics when asked for more bytes than remain, which is not an
//! option when the bytes come from another process. These helpers turn a short
//! payload into a [`CodecError::Truncated`] instead.

use bytes::{Buf, BufMut};

use crate::error::CodecError;

pub(crate) fn ensure(src: &impl Buf, field: &'static str, needed: usize) -> Result<(), CodecError> {
    if src.remaining() < needed {
        return Err(CodecError::Truncated {
            field,
            needed,
            remaining: src.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(src: &mut impl Buf, field: &'static str) -> Result<u8, CodecError> {
    ensure(&*src, field, 1)?;
    Ok(src.get_u8())
}

pub(crate) fn get_u32(src: &mut impl Buf, field: &'static str) -> Result<u32, CodecError> {
    ensure(&*src, field, 4)?;
    Ok(src.get_u32())
}

pub(crate) fn get_i32(src: &mut impl Buf, field: &'static str) -> Result<i32, CodecError> {
    ensure(&*src, field, 4)?;
    Ok(src.get_i32())
}

pub(crate) fn get_bool(src: &mut impl Buf, field: &'static str) -> Result<bool, CodecError> {
    Ok(get_u8(src, field)? != 0)
}

pub(crate) fn get_string(src: &mut impl Buf, field: &'static str) -> Result<String, CodecError> {
    let len = get_u32(src, field)? as usize;
    ensure(&*src, field, len)?;
    let mut bytes = vec![0u8; len];
    src.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field })
}

pub(crate) fn put_bool(dst: &mut impl BufMut, value: bool) {
    dst.put_u8(u8::from(value));
}

pub(crate) fn put_string(
    dst: &mut impl BufMut,
    field: &'static str,
    value: &str,
) -> Result<(), CodecError> {
    let len = u32::try_from(value.len()).map_err(|_| CodecError::LengthOverflow {
        field,
        len: value.len(),
    })?;
    dst.put_u32(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}
