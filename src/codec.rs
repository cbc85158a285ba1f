//! Shared length-prefixed, big-endian primitives used by every hand-rolled
//! wire format in this crate (snapshot encoding in [`crate::tree::snapshot`],
//! RPC payload encoding in [`crate::rpc::wire`]). Grounded in the teacher's
//! `byteorder`-based `serializer`/`parser` modules rather than a derive
//! macro: no `serde`+`bincode` here, by design (see DESIGN.md).

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub fn write_u64(dest: &mut dyn Write, n: u64) -> io::Result<()> {
    dest.write_u64::<BigEndian>(n)
}

pub fn read_u64(src: &mut dyn Read) -> io::Result<u64> {
    src.read_u64::<BigEndian>()
}

pub fn write_u32(dest: &mut dyn Write, n: u32) -> io::Result<()> {
    dest.write_u32::<BigEndian>(n)
}

pub fn read_u32(src: &mut dyn Read) -> io::Result<u32> {
    src.read_u32::<BigEndian>()
}

pub fn write_u8(dest: &mut dyn Write, n: u8) -> io::Result<()> {
    dest.write_u8(n)
}

pub fn read_u8(src: &mut dyn Read) -> io::Result<u8> {
    src.read_u8()
}

pub fn write_bool(dest: &mut dyn Write, b: bool) -> io::Result<()> {
    write_u8(dest, if b { 1 } else { 0 })
}

pub fn read_bool(src: &mut dyn Read) -> io::Result<bool> {
    Ok(read_u8(src)? != 0)
}

pub fn write_bytes(dest: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    let len: u32 = bytes
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds u32"))?;
    write_u32(dest, len)?;
    dest.write_all(bytes)
}

pub fn read_bytes(src: &mut dyn Read) -> io::Result<Vec<u8>> {
    let len = read_u32(src)? as usize;
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_string(dest: &mut dyn Write, s: &str) -> io::Result<()> {
    write_bytes(dest, s.as_bytes())
}

pub fn read_string(src: &mut dyn Read) -> io::Result<String> {
    let bytes = read_bytes(src)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_option_string(dest: &mut dyn Write, s: Option<&str>) -> io::Result<()> {
    match s {
        Some(s) => {
            write_bool(dest, true)?;
            write_string(dest, s)
        }
        None => write_bool(dest, false),
    }
}

pub fn read_option_string(src: &mut dyn Read) -> io::Result<Option<String>> {
    if read_bool(src)? {
        Ok(Some(read_string(src)?))
    } else {
        Ok(None)
    }
}
