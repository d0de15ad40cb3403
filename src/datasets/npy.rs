//! Minimal reader and writer for numpy `.npy` arrays (C order, little-endian
//! or byte-sized dtypes), as shipped with CIFAR-C and CIFAR-10H.

use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    U8,
    I32,
    I64,
    F32,
    F64,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Dtype> {
        match descr {
            "|u1" | "<u1" => Ok(Dtype::U8),
            "<i4" => Ok(Dtype::I32),
            "<i8" => Ok(Dtype::I64),
            "<f4" => Ok(Dtype::F32),
            "<f8" => Ok(Dtype::F64),
            other => Err(Error::Parse(format!("unsupported npy dtype {other}"))),
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::I32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::F64 => 8,
        }
    }
}

/// A decoded array. `bytes` is kept for `u8` arrays so images are not widened
/// until a sample is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub values: NpyData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NpyData {
    Bytes(Vec<u8>),
    Floats(Vec<f64>),
}

impl NpyArray {
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every element widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match &self.values {
            NpyData::Bytes(b) => b.iter().map(|&v| v as f64).collect(),
            NpyData::Floats(f) => f.clone(),
        }
    }
}

pub fn read_npy(path: impl AsRef<Path>) -> Result<NpyArray> {
    parse_npy(&std::fs::read(path)?)
}

pub fn parse_npy(bytes: &[u8]) -> Result<NpyArray> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(Error::Parse("not an npy file (bad magic)".into()));
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(Error::Parse("truncated npy header".into()));
            }
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => return Err(Error::Parse(format!("unsupported npy version {v}"))),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| Error::Parse("truncated npy header".into()))?;

    let dtype = Dtype::parse(&dict_value(header, "descr")?.trim_matches('\''))?;
    if dict_value(header, "fortran_order")? != "False" {
        return Err(Error::Parse("fortran-ordered npy arrays are not supported".into()));
    }
    let shape = parse_shape(&dict_value(header, "shape")?)?;
    let count: usize = shape.iter().product();
    let payload = bytes
        .get(data_start..data_start + count * dtype.size())
        .ok_or_else(|| Error::Parse(format!("npy payload shorter than shape {shape:?}")))?;

    let values = match dtype {
        Dtype::U8 => NpyData::Bytes(payload.to_vec()),
        Dtype::I32 => NpyData::Floats(
            payload.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64).collect(),
        ),
        Dtype::I64 => NpyData::Floats(
            payload
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64)
                .collect(),
        ),
        Dtype::F32 => NpyData::Floats(
            payload.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64).collect(),
        ),
        Dtype::F64 => NpyData::Floats(
            payload
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
    };
    Ok(NpyArray { shape, values })
}

/// Writes a version 1.0 `.npy` file (`|u1` for bytes, `<f8` for floats).
pub fn write_npy(path: impl AsRef<Path>, array: &NpyArray) -> Result<()> {
    let descr = match array.values {
        NpyData::Bytes(_) => "|u1",
        NpyData::Floats(_) => "<f8",
    };
    let shape = match array.shape.as_slice() {
        [single] => format!("({single},)"),
        dims => format!("({})", dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")),
    };
    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    // magic + version + length prefix + header + newline is a multiple of 64
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    out.write_all(MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&(header.len() as u16).to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    match &array.values {
        NpyData::Bytes(b) => out.write_all(b)?,
        NpyData::Floats(f) => {
            for v in f {
                out.write_all(&v.to_le_bytes())?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn dict_value(header: &str, key: &str) -> Result<String> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .map(|i| i + needle.len())
        .ok_or_else(|| Error::Parse(format!("npy header has no {key}")))?;
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find(',')
    }
    .ok_or_else(|| Error::Parse(format!("malformed {key} in npy header")))?;
    Ok(rest[..end].trim().to_string())
}

fn parse_shape(text: &str) -> Result<Vec<usize>> {
    text.trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| Error::Parse(format!("bad npy dimension {s}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npy");
        let arr = NpyArray { shape: vec![2, 3], values: NpyData::Floats(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]) };
        write_npy(&path, &arr).unwrap();
        assert_eq!(read_npy(&path).unwrap(), arr);

        let bytes = NpyArray { shape: vec![4], values: NpyData::Bytes(vec![1, 2, 3, 4]) };
        write_npy(&path, &bytes).unwrap();
        assert_eq!(read_npy(&path).unwrap().to_f64(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_npy(b"not numpy at all").is_err());
    }
}
