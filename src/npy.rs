use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::io::{self, Read, Write};
use thiserror::Error;

// Constants from the NumPy .npy format description
const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGNMENT: usize = 64;
// magic (6) + version (2) + v1 header length (2)
const V1_PREAMBLE_LEN: usize = 10;

/// Errors from decoding or encoding `.npy` arrays.
#[derive(Error, Debug)]
pub enum NpyError {
    /// The magic string was not found
    #[error("Unrecognized file format (missing NUMPY magic)")]
    UnrecognizedFileFormat,
    #[error("Unsupported format version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    /// The header dictionary could not be parsed
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Unsupported dtype '{0}'")]
    UnsupportedDtype(String),
    /// Fewer bytes than the shape requires
    #[error("Array data truncated: expected {expected} elements")]
    Truncated { expected: usize },
    /// Bytes left over after the declared data
    #[error("{0} unexpected bytes after array data")]
    TrailingData(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// Element type described by the `descr` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    endianness: Endianness,
    kind: ScalarKind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Dtype, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());

        let mut chars = descr.chars();
        let endianness = match chars.next() {
            // '|' means byte order is irrelevant, '=' is native; both read fine as little endian
            Some('<') | Some('|') | Some('=') => Endianness::Little,
            Some('>') => Endianness::Big,
            _ => return Err(unsupported()),
        };
        let kind = match chars.next() {
            Some('b') => ScalarKind::Bool,
            Some('i') => ScalarKind::Int,
            Some('u') => ScalarKind::UInt,
            Some('f') => ScalarKind::Float,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;

        let valid = match kind {
            ScalarKind::Bool => size == 1,
            ScalarKind::Int | ScalarKind::UInt => matches!(size, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(size, 4 | 8),
        };
        if !valid {
            return Err(unsupported());
        }

        Ok(Dtype {
            endianness,
            kind,
            size,
        })
    }
}

/// Parsed header dictionary
#[derive(Debug, Clone, PartialEq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    /// Element count, or `None` if the shape overflows `usize`
    fn num_elements(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |count, dim| count.checked_mul(*dim))
    }
}

/// Element types that can be written to a `.npy` file.
pub trait NpyElement: Copy {
    /// Little-endian `descr` string for this type
    const DESCR: &'static str;

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()>;
}

impl NpyElement for f64 {
    const DESCR: &'static str = "<f8";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }
}

impl NpyElement for i64 {
    const DESCR: &'static str = "<i8";

    fn write_le<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_i64::<LittleEndian>(self)
    }
}

/// Reads a complete `.npy` stream, widening every element to `f64`.
///
/// Any shape is accepted. Fortran-ordered data is returned with the matching
/// memory layout, so logical indexing is the same as in NumPy.
pub fn read_array<R: Read>(reader: &mut R) -> Result<ArrayD<f64>, NpyError> {
    let header = read_header(reader)?;
    let num_elements = header.num_elements().ok_or_else(|| {
        NpyError::InvalidHeader(format!("shape {:?} is too large", header.shape))
    })?;

    let dtype = header.dtype;
    let values = match dtype.endianness {
        Endianness::Little => read_elements::<LittleEndian, R>(reader, dtype, num_elements)?,
        Endianness::Big => read_elements::<BigEndian, R>(reader, dtype, num_elements)?,
    };

    check_end_of_data(reader)?;

    let shape = IxDyn(&header.shape);
    let array = if header.fortran_order {
        ArrayD::from_shape_vec(shape.f(), values)
    } else {
        ArrayD::from_shape_vec(shape, values)
    };
    array.map_err(|e| NpyError::InvalidHeader(e.to_string()))
}

/// Writes a one-dimensional array as a version 1.0 `.npy` stream.
pub fn write_array<W, T, I>(writer: &mut W, values: I) -> Result<(), NpyError>
where
    W: Write,
    T: NpyElement,
    I: ExactSizeIterator<Item = T>,
{
    let header = format_header(T::DESCR, values.len());

    writer.write_all(NPY_MAGIC)?;
    writer.write_u8(1)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(header.as_bytes())?;

    for value in values {
        value.write_le(writer)?;
    }

    Ok(())
}

/// Helper function to read the preamble and the header dictionary
fn read_header<R: Read>(reader: &mut R) -> Result<Header, NpyError> {
    check_magic(reader)?;

    let major = reader.read_u8()?;
    let minor = reader.read_u8()?;

    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let mut raw = Vec::new();
    reader.by_ref().take(header_len as u64).read_to_end(&mut raw)?;
    if raw.len() < header_len {
        return Err(NpyError::InvalidHeader(format!(
            "expected {} header bytes, found {}",
            header_len,
            raw.len()
        )));
    }

    // Versions 1 and 2 are latin-1, version 3 is UTF-8; the keys we need are ASCII in both
    let text = String::from_utf8_lossy(&raw);
    parse_header(&text)
}

/// Helper function to check the magic string that identifies .npy files
fn check_magic<R: Read>(reader: &mut R) -> Result<(), NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => NpyError::UnrecognizedFileFormat,
        _ => NpyError::Io(e),
    })?;
    if &magic != NPY_MAGIC {
        return Err(NpyError::UnrecognizedFileFormat);
    }
    Ok(())
}

/// Helper function to parse the Python dict literal in the header
///
/// Example: `{'descr': '<f8', 'fortran_order': False, 'shape': (11,), }`
fn parse_header(text: &str) -> Result<Header, NpyError> {
    let text = text.trim();
    if !text.starts_with('{') || !text.ends_with('}') {
        return Err(NpyError::InvalidHeader(format!("not a dictionary: {}", text)));
    }

    let descr_value = field_value(text, "descr")?;
    let descr = descr_value
        .strip_prefix('\'')
        .and_then(|rest| rest.split('\'').next())
        .ok_or_else(|| NpyError::InvalidHeader(format!("bad descr: {}", descr_value)))?;
    let dtype = Dtype::parse(descr)?;

    let fortran_value = field_value(text, "fortran_order")?;
    let fortran_order = if fortran_value.starts_with("True") {
        true
    } else if fortran_value.starts_with("False") {
        false
    } else {
        return Err(NpyError::InvalidHeader(format!(
            "bad fortran_order: {}",
            fortran_value
        )));
    };

    let shape_value = field_value(text, "shape")?;
    let shape = parse_shape(shape_value)?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

/// Helper function returning the text right after `'key':`
fn field_value<'a>(text: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let quoted = format!("'{}'", key);
    let start = text
        .find(&quoted)
        .ok_or_else(|| NpyError::InvalidHeader(format!("missing key '{}'", key)))?;
    let rest = text[start + quoted.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| NpyError::InvalidHeader(format!("missing ':' after '{}'", key)))?;
    Ok(rest.trim_start())
}

/// Helper function to parse a shape tuple such as `()`, `(5,)` or `(2, 3)`
fn parse_shape(value: &str) -> Result<Vec<usize>, NpyError> {
    let bad_shape = || NpyError::InvalidHeader(format!("bad shape: {}", value));

    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(bad_shape)?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        // Python 2 era files may carry a long suffix
        .map(|dim| dim.trim_end_matches('L').parse::<usize>().map_err(|_| bad_shape()))
        .collect()
}

/// Helper function to read `count` elements of `dtype` and widen them to f64
fn read_elements<B: ByteOrder, R: Read>(
    reader: &mut R,
    dtype: Dtype,
    count: usize,
) -> Result<Vec<f64>, NpyError> {
    let byte_len = count.checked_mul(dtype.size).ok_or_else(|| {
        NpyError::InvalidHeader(format!("{} elements of {} bytes overflow", count, dtype.size))
    })?;

    // Read everything in one operation, then decode; the buffer only grows with bytes present
    let mut buffer = Vec::new();
    reader.by_ref().take(byte_len as u64).read_to_end(&mut buffer)?;
    if buffer.len() < byte_len {
        return Err(NpyError::Truncated { expected: count });
    }

    let values = buffer
        .chunks_exact(dtype.size)
        .map(|bytes| match (dtype.kind, dtype.size) {
            (ScalarKind::Bool, _) => f64::from(u8::from(bytes[0] != 0)),
            (ScalarKind::Int, 1) => f64::from(bytes[0] as i8),
            (ScalarKind::Int, 2) => f64::from(B::read_i16(bytes)),
            (ScalarKind::Int, 4) => f64::from(B::read_i32(bytes)),
            (ScalarKind::Int, _) => B::read_i64(bytes) as f64,
            (ScalarKind::UInt, 1) => f64::from(bytes[0]),
            (ScalarKind::UInt, 2) => f64::from(B::read_u16(bytes)),
            (ScalarKind::UInt, 4) => f64::from(B::read_u32(bytes)),
            (ScalarKind::UInt, _) => B::read_u64(bytes) as f64,
            (ScalarKind::Float, 4) => f64::from(B::read_f32(bytes)),
            (ScalarKind::Float, _) => B::read_f64(bytes),
        })
        .collect();

    Ok(values)
}

/// Helper function to check end of data
///
/// Leftover bytes mean the header does not describe the file.
fn check_end_of_data<R: Read>(reader: &mut R) -> Result<(), NpyError> {
    let bytes_remaining = io::copy(reader, &mut io::sink())?;
    if bytes_remaining != 0 {
        return Err(NpyError::TrailingData(bytes_remaining));
    }
    Ok(())
}

/// Helper function to build a padded version 1.0 header
///
/// Padding makes the data start on a 64-byte boundary and the header always
/// ends with a newline.
fn format_header(descr: &str, len: usize) -> String {
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({},), }}",
        descr, len
    );
    let unpadded = V1_PREAMBLE_LEN + header.len() + 1;
    let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}
