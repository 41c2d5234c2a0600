//! Named-array container in the MATLAB level-5 MAT-file layout.
//!
//! Numeric matrices of any class are read (converted to `f64`), in either byte
//! order, including small-element tags. Names starting with `__` are dropped.
//! Writing always produces little-endian, uncompressed `double` matrices, with
//! 0-d values stored as 1x1 and 1-d arrays as 1xN rows.
//!
//! Compressed (`miCOMPRESSED`) elements, as written by MATLAB's default
//! `save`, are inflated with `flate2` and decoded in place. The level 7.3
//! variant is an HDF5 file; it is read through the `hdf5` feature and
//! reported as unsupported without it.

use crate::prelude::{SignalError, SignalResult};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use flate2::read::ZlibDecoder;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Mapping of variable names to arrays.
pub type NamedArrays = BTreeMap<String, ArrayD<f64>>;

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_DOUBLE_CLASS: u32 = 6;
const MX_UINT64_CLASS: u32 = 15;
const COMPLEX_FLAG: u32 = 0x0800;

/// Writes `arrays` to `path`, replacing any existing file.
pub fn save(path: &Path, arrays: &NamedArrays) -> SignalResult<()> {
    let bytes = encode(arrays).map_err(|message| SignalError::io(path, "encoding", message))?;
    fs::write(path, bytes).map_err(|err| SignalError::io(path, "writing", err))
}

/// Reads every numeric variable from `path`.
pub fn load(path: &Path) -> SignalResult<NamedArrays> {
    let bytes = fs::read(path).map_err(|err| SignalError::io(path, "reading", err))?;
    #[cfg(feature = "hdf5")]
    {
        if is_hdf5_container(&bytes) {
            return hdf5_container::load(path);
        }
    }
    decode(&bytes).map_err(|message| SignalError::io(path, "decoding", message))
}

pub fn encode(arrays: &NamedArrays) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: scancore {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    out.extend_from_slice(&text);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");

    for (name, array) in arrays {
        if name.is_empty() || !name.is_ascii() {
            return Err(format!("variable name '{name}' must be non-empty ASCII"));
        }
        encode_matrix(&mut out, name, array)?;
    }
    Ok(out)
}

fn encode_matrix(out: &mut Vec<u8>, name: &str, array: &ArrayD<f64>) -> Result<(), String> {
    let dims: Vec<usize> = match array.ndim() {
        0 => vec![1, 1],
        1 => vec![1, array.len()],
        _ => array.shape().to_vec(),
    };

    let mut body = Vec::new();
    write_element(&mut body, MI_UINT32, &{
        let mut flags = MX_DOUBLE_CLASS.to_le_bytes().to_vec();
        flags.extend_from_slice(&0u32.to_le_bytes());
        flags
    });
    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for &dim in &dims {
        let dim = i32::try_from(dim).map_err(|_| format!("dimension {dim} of '{name}' too large"))?;
        dim_bytes.extend_from_slice(&dim.to_le_bytes());
    }
    write_element(&mut body, MI_INT32, &dim_bytes);
    write_element(&mut body, MI_INT8, name.as_bytes());

    // Column-major order: iterating the reversed-axes view walks the first axis fastest.
    let mut data = Vec::with_capacity(array.len() * 8);
    for value in array.t().iter() {
        data.extend_from_slice(&value.to_le_bytes());
    }
    write_element(&mut body, MI_DOUBLE, &data);

    let len = u32::try_from(body.len()).map_err(|_| format!("variable '{name}' too large"))?;
    out.extend_from_slice(&MI_MATRIX.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(())
}

fn write_element(out: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(out.len() + padding(payload.len()), 0);
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn is_hdf5_container(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN
        && (bytes.starts_with(b"MATLAB 7.3")
            || bytes[124..126] == 0x0200u16.to_le_bytes()
            || bytes[124..126] == 0x0200u16.to_be_bytes())
}

pub fn decode(bytes: &[u8]) -> Result<NamedArrays, String> {
    if bytes.len() < HEADER_LEN {
        return Err("file shorter than the 128-byte header".into());
    }
    if is_hdf5_container(bytes) {
        return Err(
            "MAT 7.3 (HDF5-based) containers need scancore's `hdf5` feature".into(),
        );
    }
    let big_endian = match &bytes[126..128] {
        b"IM" => false,
        b"MI" => true,
        _ => return Err("missing MAT-file endian indicator".into()),
    };

    let mut arrays = NamedArrays::new();
    decode_elements(&bytes[HEADER_LEN..], big_endian, &mut arrays, 0)?;
    Ok(arrays)
}

fn decode_elements(
    bytes: &[u8],
    big_endian: bool,
    arrays: &mut NamedArrays,
    depth: usize,
) -> Result<(), String> {
    let mut cursor = Cursor {
        bytes,
        pos: 0,
        big_endian,
    };
    while cursor.pos + 8 <= bytes.len() {
        let element = cursor.element()?;
        match element.data_type {
            MI_MATRIX => {
                if let Some((name, array)) = decode_matrix(element.payload, big_endian)? {
                    if !name.starts_with("__") {
                        arrays.insert(name, array);
                    }
                }
            }
            // A compressed element wraps exactly one matrix; nesting is malformed.
            MI_COMPRESSED if depth == 0 => {
                let inflated = inflate(element.payload)?;
                decode_elements(&inflated, big_endian, arrays, depth + 1)?;
            }
            MI_COMPRESSED => return Err("nested compressed MAT element".into()),
            other => log::debug!("skipping top-level MAT element of type {other}"),
        }
    }
    Ok(())
}

fn inflate(payload: &[u8]) -> Result<Vec<u8>, String> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(payload)
        .read_to_end(&mut inflated)
        .map_err(|err| format!("inflating compressed element: {err}"))?;
    Ok(inflated)
}

struct Element<'a> {
    data_type: u32,
    payload: &'a [u8],
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> Result<u32, String> {
        let bytes = self.bytes;
        let raw: [u8; 4] = bytes
            .get(self.pos..self.pos + 4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or("unexpected end of data while reading a tag")?;
        self.pos += 4;
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    fn element(&mut self) -> Result<Element<'a>, String> {
        let bytes = self.bytes;
        let first = self.u32()?;
        let small_len = (first >> 16) as usize;
        if small_len != 0 {
            // Small data element: type and length packed in one word, data in the next.
            if small_len > 4 {
                return Err(format!("small element claims {small_len} bytes"));
            }
            let start = self.pos;
            self.pos += 4;
            let payload = bytes
                .get(start..start + small_len)
                .ok_or("unexpected end of data in small element")?;
            return Ok(Element {
                data_type: first & 0xffff,
                payload,
            });
        }
        let len = self.u32()? as usize;
        let start = self.pos;
        let payload = bytes
            .get(start..start + len)
            .ok_or_else(|| format!("element of {len} bytes runs past end of data"))?;
        // Compressed elements are not padded to the 8-byte boundary.
        self.pos = start + len;
        if first != MI_COMPRESSED {
            self.pos += padding(len);
        }
        Ok(Element {
            data_type: first,
            payload,
        })
    }
}

fn decode_matrix(payload: &[u8], big_endian: bool) -> Result<Option<(String, ArrayD<f64>)>, String> {
    if payload.is_empty() {
        return Ok(None);
    }
    let mut cursor = Cursor {
        bytes: payload,
        pos: 0,
        big_endian,
    };

    let flags = cursor.element()?;
    let flag_word = numeric_values(flags.data_type, flags.payload, big_endian)?
        .first()
        .copied()
        .ok_or("matrix without array flags")? as u32;
    let class = flag_word & 0xff;

    let dims: Vec<usize> = {
        let element = cursor.element()?;
        numeric_values(element.data_type, element.payload, big_endian)?
            .into_iter()
            .map(|d| {
                if d < 0.0 || d.fract() != 0.0 || d > u32::MAX as f64 {
                    Err(format!("invalid matrix dimension {d}"))
                } else {
                    Ok(d as usize)
                }
            })
            .collect::<Result<_, _>>()?
    };

    let name_element = cursor.element()?;
    let name = String::from_utf8_lossy(name_element.payload)
        .trim_end_matches('\0')
        .to_string();

    if !(MX_DOUBLE_CLASS..=MX_UINT64_CLASS).contains(&class) {
        log::debug!("skipping non-numeric MAT variable '{name}' (class {class})");
        return Ok(None);
    }
    if flag_word & COMPLEX_FLAG != 0 {
        log::warn!("skipping complex MAT variable '{name}'");
        return Ok(None);
    }

    let real = cursor.element()?;
    let values = numeric_values(real.data_type, real.payload, big_endian)?;
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| format!("dimensions {dims:?} of '{name}' overflow"))?;
    if values.len() != expected {
        return Err(format!(
            "variable '{name}' holds {} values for dimensions {dims:?}",
            values.len()
        ));
    }
    let array = ArrayD::from_shape_vec(IxDyn(&dims).f(), values)
        .map_err(|err| format!("variable '{name}': {err}"))?;
    Ok(Some((name, array)))
}

fn numeric_values(data_type: u32, payload: &[u8], big_endian: bool) -> Result<Vec<f64>, String> {
    macro_rules! convert {
        ($ty:ty) => {{
            const WIDTH: usize = std::mem::size_of::<$ty>();
            payload
                .chunks_exact(WIDTH)
                .map(|chunk| {
                    let mut raw = [0u8; WIDTH];
                    raw.copy_from_slice(chunk);
                    let value = if big_endian {
                        <$ty>::from_be_bytes(raw)
                    } else {
                        <$ty>::from_le_bytes(raw)
                    };
                    value as f64
                })
                .collect()
        }};
    }

    Ok(match data_type {
        MI_INT8 => convert!(i8),
        MI_UINT8 => convert!(u8),
        MI_INT16 => convert!(i16),
        MI_UINT16 => convert!(u16),
        MI_INT32 => convert!(i32),
        MI_UINT32 => convert!(u32),
        MI_SINGLE => convert!(f32),
        MI_DOUBLE => convert!(f64),
        MI_INT64 => convert!(i64),
        MI_UINT64 => convert!(u64),
        other => return Err(format!("unsupported numeric data type {other}")),
    })
}

/// Accepts shapes `[n]`, `[1, n]` and `[n, 1]`.
pub fn as_vector(name: &str, array: &ArrayD<f64>) -> SignalResult<Vec<f64>> {
    let non_singleton = array.shape().iter().filter(|&&d| d > 1).count();
    if non_singleton > 1 {
        return Err(SignalError::InvalidShape(format!(
            "'{name}' must be a vector, got shape {:?}",
            array.shape()
        )));
    }
    Ok(array.iter().copied().collect())
}

/// Accepts any array holding exactly one value.
pub fn as_scalar(name: &str, array: &ArrayD<f64>) -> SignalResult<f64> {
    match array.len() {
        1 => Ok(array.iter().copied().next().unwrap_or_default()),
        len => Err(SignalError::InvalidShape(format!(
            "'{name}' must be a scalar, got {len} values"
        ))),
    }
}

#[cfg(feature = "hdf5")]
mod hdf5_container {
    use super::NamedArrays;
    use crate::prelude::{SignalError, SignalResult};
    use std::path::Path;

    /// Reads every numeric top-level dataset. MATLAB stores column-major data,
    /// so HDF5 reports the dimensions reversed; reversing the axes restores them.
    pub(super) fn load(path: &Path) -> SignalResult<NamedArrays> {
        let fail = |err: hdf5::Error| SignalError::io(path, "decoding", err);
        let file = hdf5::File::open(path).map_err(fail)?;
        let mut arrays = NamedArrays::new();
        for name in file.member_names().map_err(fail)? {
            if name.starts_with('#') || name.starts_with("__") {
                continue;
            }
            let Ok(dataset) = file.dataset(&name) else {
                log::debug!("skipping non-dataset HDF5 member '{name}'");
                continue;
            };
            match dataset.read_dyn::<f64>() {
                Ok(array) => {
                    arrays.insert(name, array.reversed_axes());
                }
                Err(err) => log::debug!("skipping non-numeric HDF5 dataset '{name}': {err}"),
            }
        }
        Ok(arrays)
    }
}
