//! Network NBT as embedded in chunk, join and block entity packets.
//!
//! Everything is uncompressed big-endian. Compounds nest at most [`MAX_DEPTH`] levels so a
//! hostile server cannot exhaust the stack.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use thiserror::Error;

pub const MAX_DEPTH: usize = 512;

/// Upper bound for speculative `Vec` capacity taken from a length prefix.
const PREALLOC_LIMIT: usize = 4096;

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("IO error while reading NBT: {0}")]
    Io(#[from] io::Error),

    #[error("invalid tag type {0}")]
    InvalidTagType(u8),

    #[error("negative length {0}")]
    NegativeLength(i32),

    #[error("NBT nested deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("NBT string is not valid UTF-8")]
    InvalidString,

    #[error("string of {0} bytes does not fit an NBT string")]
    StringTooLong(usize),
}

pub type NbtResult<T> = Result<T, NbtError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    Compound(HashMap<String, Tag>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn type_id(&self) -> u8 {
        match self {
            Tag::End => 0,
            Tag::Byte(_) => 1,
            Tag::Short(_) => 2,
            Tag::Int(_) => 3,
            Tag::Long(_) => 4,
            Tag::Float(_) => 5,
            Tag::Double(_) => 6,
            Tag::ByteArray(_) => 7,
            Tag::String(_) => 8,
            Tag::List(_) => 9,
            Tag::Compound(_) => 10,
            Tag::IntArray(_) => 11,
            Tag::LongArray(_) => 12,
        }
    }

    /// Builds a compound from `(name, tag)` pairs.
    pub fn compound<K: Into<String>>(entries: impl IntoIterator<Item = (K, Tag)>) -> Tag {
        Tag::Compound(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Reads a named tag. A lone `TAG_End` yields `("", Tag::End)`, which is how the protocol
    /// encodes an absent compound.
    pub fn read<R: Read>(reader: &mut R) -> NbtResult<(String, Tag)> {
        read_named(reader, 0)
    }

    /// Reads the payload of a tag whose type id is already known.
    pub fn read_payload<R: Read>(reader: &mut R, type_id: u8) -> NbtResult<Tag> {
        read_payload(reader, type_id, 0)
    }

    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> NbtResult<()> {
        writer.write_u8(self.type_id())?;

        if !matches!(self, Tag::End) {
            write_string(writer, name)?;
        }

        self.write_payload(writer)
    }

    pub fn write_payload<W: Write>(&self, writer: &mut W) -> NbtResult<()> {
        match self {
            Tag::End => {}
            Tag::Byte(v) => writer.write_i8(*v)?,
            Tag::Short(v) => writer.write_i16::<BigEndian>(*v)?,
            Tag::Int(v) => writer.write_i32::<BigEndian>(*v)?,
            Tag::Long(v) => writer.write_i64::<BigEndian>(*v)?,
            Tag::Float(v) => writer.write_f32::<BigEndian>(*v)?,
            Tag::Double(v) => writer.write_f64::<BigEndian>(*v)?,
            Tag::ByteArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &b in v {
                    writer.write_i8(b)?;
                }
            }
            Tag::String(v) => write_string(writer, v)?,
            Tag::List(v) => {
                // An empty list is typed TAG_End
                writer.write_u8(v.first().map_or(0, Tag::type_id))?;
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for tag in v {
                    tag.write_payload(writer)?;
                }
            }
            Tag::Compound(v) => {
                for (name, tag) in v {
                    tag.write(writer, name)?;
                }
                writer.write_u8(0)?;
            }
            Tag::IntArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &i in v {
                    writer.write_i32::<BigEndian>(i)?;
                }
            }
            Tag::LongArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &l in v {
                    writer.write_i64::<BigEndian>(l)?;
                }
            }
        }
        Ok(())
    }

    /// Looks up `key` when this is a compound.
    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.as_compound().and_then(|map| map.get(key))
    }

    pub fn as_compound(&self) -> Option<&HashMap<String, Tag>> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Tag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tag::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Tag::Short(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Tag::Byte(n) => Some(*n),
            _ => None,
        }
    }

    /// Byte tags double as booleans.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_i8().map(|b| b != 0)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tag::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Tag::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_long_array(&self) -> Option<&[i64]> {
        match self {
            Tag::LongArray(v) => Some(v),
            _ => None,
        }
    }
}

fn read_named<R: Read>(reader: &mut R, depth: usize) -> NbtResult<(String, Tag)> {
    let type_id = reader.read_u8()?;
    if type_id == 0 {
        return Ok((String::new(), Tag::End));
    }

    let name = read_string(reader)?;
    let tag = read_payload(reader, type_id, depth)?;
    Ok((name, tag))
}

fn read_payload<R: Read>(reader: &mut R, type_id: u8, depth: usize) -> NbtResult<Tag> {
    if depth > MAX_DEPTH {
        return Err(NbtError::TooDeep);
    }

    let tag = match type_id {
        0 => Tag::End,
        1 => Tag::Byte(reader.read_i8()?),
        2 => Tag::Short(reader.read_i16::<BigEndian>()?),
        3 => Tag::Int(reader.read_i32::<BigEndian>()?),
        4 => Tag::Long(reader.read_i64::<BigEndian>()?),
        5 => Tag::Float(reader.read_f32::<BigEndian>()?),
        6 => Tag::Double(reader.read_f64::<BigEndian>()?),
        7 => {
            let length = read_length(reader)?;
            let mut bytes = vec![0u8; length];
            reader.read_exact(&mut bytes)?;
            Tag::ByteArray(bytes.into_iter().map(|b| b as i8).collect())
        }
        8 => Tag::String(read_string(reader)?),
        9 => {
            let list_type = reader.read_u8()?;
            let length = read_length(reader)?;
            if list_type > 12 {
                return Err(NbtError::InvalidTagType(list_type));
            }
            let mut list = Vec::with_capacity(length.min(PREALLOC_LIMIT));
            for _ in 0..length {
                list.push(read_payload(reader, list_type, depth + 1)?);
            }
            Tag::List(list)
        }
        10 => {
            let mut compound = HashMap::new();
            loop {
                let (name, tag) = read_named(reader, depth + 1)?;
                if let Tag::End = tag {
                    break;
                }
                compound.insert(name, tag);
            }
            Tag::Compound(compound)
        }
        11 => {
            let length = read_length(reader)?;
            let mut ints = Vec::with_capacity(length.min(PREALLOC_LIMIT));
            for _ in 0..length {
                ints.push(reader.read_i32::<BigEndian>()?);
            }
            Tag::IntArray(ints)
        }
        12 => {
            let length = read_length(reader)?;
            let mut longs = Vec::with_capacity(length.min(PREALLOC_LIMIT));
            for _ in 0..length {
                longs.push(reader.read_i64::<BigEndian>()?);
            }
            Tag::LongArray(longs)
        }
        other => return Err(NbtError::InvalidTagType(other)),
    };
    Ok(tag)
}

fn read_length<R: Read>(reader: &mut R) -> NbtResult<usize> {
    let length = reader.read_i32::<BigEndian>()?;
    if length < 0 {
        return Err(NbtError::NegativeLength(length));
    }
    Ok(length as usize)
}

fn read_string<R: Read>(reader: &mut R) -> NbtResult<String> {
    let length = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| NbtError::InvalidString)
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> NbtResult<()> {
    let length = u16::try_from(value.len()).map_err(|_| NbtError::StringTooLong(value.len()))?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}
