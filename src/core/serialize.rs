// Binary codec for persisted ledger records

use crate::core::Hash256;
use crate::error::{LedgerError, Result};
use std::io::{self, Cursor, Read, Write};

/// Types that round-trip through the ledger store
pub trait Serializable: Sized {
    /// Write the encoding into `writer`
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Read one value from `reader`
    fn decode<R: Read>(reader: &mut R) -> Result<Self>;

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.encode(&mut buf);
        buf
    }

    /// Decode a complete record, rejecting trailing bytes
    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let value = Self::decode(&mut cursor)?;
        if cursor.position() as usize != data.len() {
            return Err(LedgerError::Corruption(format!(
                "{} trailing bytes after record",
                data.len() - cursor.position() as usize
            )));
        }
        Ok(value)
    }
}

/// Write a variable-length integer (VarInt)
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => {
            writer.write_all(&[value as u8])?;
        }
        0xfd..=0xffff => {
            writer.write_all(&[0xfd])?;
            writer.write_all(&(value as u16).to_le_bytes())?;
        }
        0x10000..=0xffffffff => {
            writer.write_all(&[0xfe])?;
            writer.write_all(&(value as u32).to_le_bytes())?;
        }
        _ => {
            writer.write_all(&[0xff])?;
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0..=0xfc => Ok(first_byte[0] as u64),
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes)?;
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    write_varint(writer, data.len() as u64)?;
    writer.write_all(data)?;
    Ok(())
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)?;
    let mut data = Vec::new();
    // `take` bounds the allocation by what the reader actually holds
    Read::take(&mut *reader, len).read_to_end(&mut data)?;
    if data.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, data.len()),
        ));
    }
    Ok(data)
}

/// Read an element count, bounded so corrupt input cannot trigger huge allocations
pub fn read_count<R: Read + ?Sized>(reader: &mut R) -> Result<usize> {
    const MAX_COUNT: u64 = 1 << 20;
    let count = read_varint(reader).map_err(LedgerError::corruption)?;
    if count > MAX_COUNT {
        return Err(LedgerError::Corruption(format!("element count {} too large", count)));
    }
    Ok(count as usize)
}

/// Write an optional hash: empty for `None`, 32 bytes otherwise
pub fn write_opt_hash<W: Write>(writer: &mut W, hash: Option<&Hash256>) -> io::Result<()> {
    match hash {
        Some(hash) => write_var_bytes(writer, hash.as_bytes()),
        None => write_var_bytes(writer, &[]),
    }
}

pub fn read_opt_hash<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Hash256>> {
    let bytes = read_var_bytes(reader).map_err(LedgerError::corruption)?;
    if bytes.is_empty() {
        Ok(None)
    } else {
        Hash256::from_slice(&bytes).map(Some)
    }
}

pub fn read_array<R: Read + ?Sized, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes).map_err(LedgerError::corruption)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_small() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 100).unwrap();
        assert_eq!(buf, vec![100]);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_varint(&mut cursor).unwrap(), 100);
    }

    #[test]
    fn test_varint_widths() {
        for (value, len) in [(1000u64, 3usize), (100_000, 5), (1 << 40, 9)] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            assert_eq!(buf.len(), len);

            let mut cursor = Cursor::new(buf);
            assert_eq!(read_varint(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_var_bytes_truncated() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, b"hello world").unwrap();
        buf.truncate(5);

        let mut cursor = Cursor::new(buf);
        assert!(read_var_bytes(&mut cursor).is_err());
    }

    #[test]
    fn test_opt_hash() {
        let mut buf = Vec::new();
        write_opt_hash(&mut buf, None).unwrap();
        write_opt_hash(&mut buf, Some(&Hash256::new([9; 32]))).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_opt_hash(&mut cursor).unwrap(), None);
        assert_eq!(read_opt_hash(&mut cursor).unwrap(), Some(Hash256::new([9; 32])));
    }

    #[test]
    fn test_read_count_rejects_huge() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::MAX).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_count(&mut cursor), Err(LedgerError::Corruption(_))));
    }
}
