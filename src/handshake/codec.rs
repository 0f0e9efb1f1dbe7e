//! Low-level length-prefixed vector encoding shared by every handshake
//! message body (RFC 5246 §4.3's `opaque foo<lo..hi>` vectors). Hand-rolled
//! over `byteorder`/`Read`/`Write` rather than derived through `serde`,
//! matching the reader/writer idiom other DTLS implementations in the wild
//! use for this exact vector format.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::Error;

pub fn read_u24<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 3];
    r.read_exact(&mut buf)?;
    Ok(((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32))
}

pub fn write_u24<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u8((v >> 16) as u8)?;
    w.write_u8((v >> 8) as u8)?;
    w.write_u8(v as u8)
}

/// Reads an `opaque vec<0..2^8-1>`.
pub fn read_vec_u8<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u8()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_vec_u8<W: Write>(w: &mut W, v: &[u8]) -> Result<(), Error> {
    if v.len() > u8::MAX as usize {
        return Err(Error::MalformedMessage("vector exceeds u8 length bound".to_string()));
    }
    w.write_u8(v.len() as u8)?;
    w.write_all(v)?;
    Ok(())
}

/// Reads an `opaque vec<0..2^16-1>`.
pub fn read_vec_u16<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_vec_u16<W: Write>(w: &mut W, v: &[u8]) -> Result<(), Error> {
    if v.len() > u16::MAX as usize {
        return Err(Error::MalformedMessage("vector exceeds u16 length bound".to_string()));
    }
    w.write_u16::<BigEndian>(v.len() as u16)?;
    w.write_all(v)?;
    Ok(())
}

/// Reads an `opaque vec<0..2^24-1>`.
pub fn read_vec_u24<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u24(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_vec_u24<W: Write>(w: &mut W, v: &[u8]) -> Result<(), Error> {
    if v.len() > 0x00FF_FFFF {
        return Err(Error::MalformedMessage("vector exceeds u24 length bound".to_string()));
    }
    write_u24(w, v.len() as u32)?;
    w.write_all(v)?;
    Ok(())
}

/// Reads a list of fixed-size items behind a u8 byte-length prefix
/// (e.g. `CipherSuite cipher_suites<2..2^8-2>` read two bytes at a time).
pub fn read_u16_list_u8<R: Read>(r: &mut R) -> io::Result<Vec<u16>> {
    let bytes = read_vec_u8(r)?;
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut cursor = bytes.as_slice();
    while !cursor.is_empty() {
        out.push(cursor.read_u16::<BigEndian>()?);
    }
    Ok(out)
}

pub fn write_u16_list_u8<W: Write>(w: &mut W, items: &[u16]) -> Result<(), Error> {
    let mut bytes = Vec::with_capacity(items.len() * 2);
    for &item in items {
        bytes.write_u16::<BigEndian>(item)?;
    }
    write_vec_u8(w, &bytes)
}

/// Reads a list of fixed-size items behind a u16 byte-length prefix
/// (used for `CipherSuite cipher_suites<2..2^16-2>` in `ClientHello`).
pub fn read_u16_list_u16<R: Read>(r: &mut R) -> io::Result<Vec<u16>> {
    let bytes = read_vec_u16(r)?;
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut cursor = bytes.as_slice();
    while !cursor.is_empty() {
        out.push(cursor.read_u16::<BigEndian>()?);
    }
    Ok(out)
}

pub fn write_u16_list_u16<W: Write>(w: &mut W, items: &[u16]) -> Result<(), Error> {
    let mut bytes = Vec::with_capacity(items.len() * 2);
    for &item in items {
        bytes.write_u16::<BigEndian>(item)?;
    }
    write_vec_u16(w, &bytes)
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;
    use std::io::Cursor;

    use super::*;

    #[test]
    fn u24_round_trips_known_values() {
        for &(hex_str, value) in &[("000000", 0u32), ("0000ff", 255), ("ffffff", 0x00FF_FFFF), ("01e240", 123456)] {
            let raw = hex::decode(hex_str).unwrap();
            let decoded = read_u24(&mut Cursor::new(&raw)).unwrap();
            assert_eq!(decoded, value);

            let mut out = Vec::new();
            write_u24(&mut out, value).unwrap();
            assert_eq!(out, raw);
        }
    }

    #[quickcheck]
    fn u24_round_trip_property(value: u32) -> bool {
        let value = value & 0x00FF_FFFF;
        let mut buf = Vec::new();
        write_u24(&mut buf, value).unwrap();
        read_u24(&mut Cursor::new(&buf)).unwrap() == value
    }

    #[quickcheck]
    fn vec_u16_round_trip_property(bytes: Vec<u8>) -> bool {
        if bytes.len() > u16::MAX as usize {
            return true;
        }
        let mut buf = Vec::new();
        write_vec_u16(&mut buf, &bytes).unwrap();
        read_vec_u16(&mut Cursor::new(&buf)).unwrap() == bytes
    }

    #[test]
    fn vec_u8_rejects_oversized_input() {
        let oversized = vec![0u8; u8::MAX as usize + 1];
        assert!(write_vec_u8(&mut Vec::new(), &oversized).is_err());
    }
}
