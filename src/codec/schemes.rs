//! Compression schemes applied to a chunk's value slots.
//!
//! Null slots hold the relation's sentinels and are encoded like any other value; the
//! validity bitmap travels separately in the chunk header.

use bytes::{Buf, BufMut};

use crate::errors::{ChunkpackError, Result};
use crate::relation::{ColumnType, InputValues};
use crate::utils::string_pool::StringPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Uncompressed,
    /// Every slot holds the same value.
    OneValue,
    /// (value, run length) pairs; numeric columns only.
    Rle,
    /// Distinct strings once, then one code per row.
    Dictionary,
}

impl Scheme {
    pub fn tag(self) -> u8 {
        match self {
            Scheme::Uncompressed => 0,
            Scheme::OneValue => 1,
            Scheme::Rle => 2,
            Scheme::Dictionary => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Scheme> {
        match tag {
            0 => Some(Scheme::Uncompressed),
            1 => Some(Scheme::OneValue),
            2 => Some(Scheme::Rle),
            3 => Some(Scheme::Dictionary),
            _ => None,
        }
    }

    /// Schemes worth trying for a column type, cheapest first.
    pub fn candidates(column_type: ColumnType) -> &'static [Scheme] {
        match column_type {
            ColumnType::Integer | ColumnType::Double => {
                &[Scheme::Uncompressed, Scheme::OneValue, Scheme::Rle]
            }
            ColumnType::String => &[Scheme::Uncompressed, Scheme::OneValue, Scheme::Dictionary],
            ColumnType::Skip => &[],
        }
    }
}

/// Encodes `values` with `scheme`, or `Ok(None)` when the scheme does not apply to the data.
///
/// Fails with [`ChunkpackError::CorruptChunk`] when a length or offset does not fit the
/// 32-bit fields of the payload layout.
pub fn encode(scheme: Scheme, values: &InputValues<'_>) -> Result<Option<Vec<u8>>> {
    let payload = match (scheme, *values) {
        (Scheme::Uncompressed, InputValues::Integer(v)) => Some(encode_plain(v, |out, x| out.put_i32_le(*x))),
        (Scheme::Uncompressed, InputValues::Double(v)) => Some(encode_plain(v, |out, x| out.put_f64_le(*x))),
        (Scheme::Uncompressed, InputValues::String(v)) => {
            Some(encode_string_array(v.iter().map(String::as_str), v.len())?)
        }
        (Scheme::OneValue, InputValues::Integer(v)) => {
            one_value(v, |a, b| a == b).map(|x| x.to_le_bytes().to_vec())
        }
        (Scheme::OneValue, InputValues::Double(v)) => {
            one_value(v, |a, b| a.to_bits() == b.to_bits()).map(|x| x.to_le_bytes().to_vec())
        }
        (Scheme::OneValue, InputValues::String(v)) => match one_value(v, |a, b| a == b) {
            Some(s) => {
                let mut out = Vec::with_capacity(4 + s.len());
                out.put_u32_le(checked_u32(s.len(), "one-value string")?);
                out.put_slice(s.as_bytes());
                Some(out)
            }
            None => None,
        },
        (Scheme::Rle, InputValues::Integer(v)) => Some(encode_runs(v, |a, b| a == b, |out, x| out.put_i32_le(*x))?),
        (Scheme::Rle, InputValues::Double(v)) => {
            Some(encode_runs(v, |a, b| a.to_bits() == b.to_bits(), |out, x| out.put_f64_le(*x))?)
        }
        (Scheme::Dictionary, InputValues::String(v)) => Some(encode_dictionary(v)?),
        _ => None,
    };
    Ok(payload)
}

/// Narrows a length or offset to the `u32` stored in payloads and chunk headers.
pub(crate) fn checked_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| corrupt(format!("{} of {} exceeds the u32 range", what, value)))
}

/// Decodes a scheme payload of `tuple_count` rows into the viewer layout of the column type.
///
/// Returns `requires_copy`: `true` when strings were decoded into the pointer layout.
pub fn decode(
    scheme: Scheme,
    column_type: ColumnType,
    payload: &[u8],
    tuple_count: usize,
    out: &mut Vec<u8>,
) -> Result<bool> {
    out.clear();
    match (scheme, column_type) {
        (Scheme::Uncompressed, ColumnType::Integer) => copy_fixed(payload, tuple_count, 4, out),
        (Scheme::Uncompressed, ColumnType::Double) => copy_fixed(payload, tuple_count, 8, out),
        (Scheme::Uncompressed, ColumnType::String) => {
            check_string_array(payload, tuple_count)?;
            out.extend_from_slice(payload);
            Ok(false)
        }
        (Scheme::OneValue, ColumnType::Integer) => repeat_fixed(payload, tuple_count, 4, out),
        (Scheme::OneValue, ColumnType::Double) => repeat_fixed(payload, tuple_count, 8, out),
        (Scheme::OneValue, ColumnType::String) => {
            let mut buf = payload;
            let len = take_u32(&mut buf, "one-value string length")? as usize;
            if buf.remaining() != len {
                return Err(corrupt(format!(
                    "one-value string declares {} bytes, payload has {}",
                    len,
                    buf.remaining()
                )));
            }
            out.reserve(tuple_count * 8 + len);
            for _ in 0..tuple_count {
                out.put_u32_le(0);
                out.put_u32_le(len as u32);
            }
            out.put_slice(buf);
            Ok(true)
        }
        (Scheme::Rle, ColumnType::Integer) => decode_runs(payload, tuple_count, 4, out),
        (Scheme::Rle, ColumnType::Double) => decode_runs(payload, tuple_count, 8, out),
        (Scheme::Dictionary, ColumnType::String) => decode_dictionary(payload, tuple_count, out),
        (scheme, column_type) => Err(corrupt(format!(
            "scheme {:?} cannot hold {} values",
            scheme, column_type
        ))),
    }
}

fn corrupt(reason: String) -> ChunkpackError {
    ChunkpackError::CorruptChunk(reason)
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(corrupt(format!("payload ends before {}", what)));
    }
    Ok(buf.get_u32_le())
}

fn encode_plain<T>(values: &[T], put: impl Fn(&mut Vec<u8>, &T)) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * std::mem::size_of::<T>());
    for value in values {
        put(&mut out, value);
    }
    out
}

fn one_value<T>(values: &[T], eq: impl Fn(&T, &T) -> bool) -> Option<&T> {
    let first = values.first()?;
    values.iter().all(|v| eq(first, v)).then_some(first)
}

fn encode_runs<T>(values: &[T], eq: impl Fn(&T, &T) -> bool, put: impl Fn(&mut Vec<u8>, &T)) -> Result<Vec<u8>> {
    let mut runs: Vec<(&T, u32)> = Vec::new();
    for value in values {
        match runs.last_mut() {
            Some((last, len)) if eq(*last, value) => *len += 1,
            _ => runs.push((value, 1)),
        }
    }
    let mut out = Vec::with_capacity(4 + runs.len() * (std::mem::size_of::<T>() + 4));
    out.put_u32_le(checked_u32(runs.len(), "run count")?);
    for (value, len) in runs {
        put(&mut out, value);
        out.put_u32_le(len);
    }
    Ok(out)
}

fn encode_string_array<'a>(values: impl Iterator<Item = &'a str> + Clone, count: usize) -> Result<Vec<u8>> {
    let data_len: usize = values.clone().map(str::len).sum();
    // offsets only grow, so checking the final one covers every row
    checked_u32(data_len, "string data")?;
    let mut out = Vec::with_capacity((count + 1) * 4 + data_len);
    let mut offset = 0u32;
    out.put_u32_le(offset);
    for value in values.clone() {
        offset += value.len() as u32;
        out.put_u32_le(offset);
    }
    for value in values {
        out.put_slice(value.as_bytes());
    }
    Ok(out)
}

fn encode_dictionary(values: &[String]) -> Result<Vec<u8>> {
    let mut pool = StringPool::new();
    let codes: Vec<u32> = values.iter().map(|v| pool.intern(v)).collect();

    let mut out = Vec::with_capacity(4 + (pool.len() + 1) * 4 + pool.data_bytes() + codes.len() * 4);
    out.put_u32_le(checked_u32(pool.len(), "dictionary size")?);
    out.extend_from_slice(&encode_string_array(pool.iter(), pool.len())?);
    for code in codes {
        out.put_u32_le(code);
    }
    Ok(out)
}

fn copy_fixed(payload: &[u8], tuple_count: usize, width: usize, out: &mut Vec<u8>) -> Result<bool> {
    if payload.len() != tuple_count * width {
        return Err(corrupt(format!(
            "expected {} bytes for {} slots, found {}",
            tuple_count * width,
            tuple_count,
            payload.len()
        )));
    }
    out.extend_from_slice(payload);
    Ok(false)
}

fn repeat_fixed(payload: &[u8], tuple_count: usize, width: usize, out: &mut Vec<u8>) -> Result<bool> {
    if payload.len() != width {
        return Err(corrupt(format!(
            "one-value payload should be {} bytes, found {}",
            width,
            payload.len()
        )));
    }
    out.reserve(tuple_count * width);
    for _ in 0..tuple_count {
        out.extend_from_slice(payload);
    }
    Ok(false)
}

fn decode_runs(payload: &[u8], tuple_count: usize, width: usize, out: &mut Vec<u8>) -> Result<bool> {
    let mut buf = payload;
    let run_count = take_u32(&mut buf, "run count")? as usize;
    if buf.remaining() != run_count * (width + 4) {
        return Err(corrupt(format!(
            "{} runs need {} bytes, found {}",
            run_count,
            run_count * (width + 4),
            buf.remaining()
        )));
    }
    out.reserve(tuple_count * width);
    let mut rows = 0usize;
    for _ in 0..run_count {
        let len = u32::from_le_bytes([buf[width], buf[width + 1], buf[width + 2], buf[width + 3]]) as usize;
        rows += len;
        if rows > tuple_count {
            return Err(corrupt(format!("runs cover more than {} rows", tuple_count)));
        }
        for _ in 0..len {
            out.extend_from_slice(&buf[..width]);
        }
        buf.advance(width + 4);
    }
    if rows != tuple_count {
        return Err(corrupt(format!("runs cover {} of {} rows", rows, tuple_count)));
    }
    Ok(false)
}

/// Validates an offset-indexed string array and returns the length of its data section.
fn check_string_array(payload: &[u8], count: usize) -> Result<usize> {
    let header = (count + 1) * 4;
    if payload.len() < header {
        return Err(corrupt(format!(
            "string array of {} rows is shorter than its offsets",
            count
        )));
    }
    let mut offsets = &payload[..header];
    let mut previous = offsets.get_u32_le();
    if previous != 0 {
        return Err(corrupt("string array does not start at offset 0".to_string()));
    }
    for _ in 0..count {
        let next = offsets.get_u32_le();
        if next < previous {
            return Err(corrupt("string array offsets decrease".to_string()));
        }
        previous = next;
    }
    let data_len = payload.len() - header;
    if previous as usize != data_len {
        return Err(corrupt(format!(
            "string array ends at {} but carries {} data bytes",
            previous, data_len
        )));
    }
    Ok(data_len)
}

fn decode_dictionary(payload: &[u8], tuple_count: usize, out: &mut Vec<u8>) -> Result<bool> {
    let mut buf = payload;
    let dict_count = take_u32(&mut buf, "dictionary size")? as usize;
    let codes_len = tuple_count * 4;
    if buf.remaining() < codes_len {
        return Err(corrupt("dictionary payload shorter than its codes".to_string()));
    }
    let (dictionary, mut codes) = buf.split_at(buf.len() - codes_len);
    let data_len = check_string_array(dictionary, dict_count)?;
    let header = (dict_count + 1) * 4;

    let slot = |code: usize| -> (u32, u32) {
        let at = code * 4;
        let start = u32::from_le_bytes([dictionary[at], dictionary[at + 1], dictionary[at + 2], dictionary[at + 3]]);
        let end = u32::from_le_bytes([dictionary[at + 4], dictionary[at + 5], dictionary[at + 6], dictionary[at + 7]]);
        (start, end - start)
    };

    out.reserve(codes_len * 2 + data_len);
    for row in 0..tuple_count {
        let code = codes.get_u32_le() as usize;
        if code >= dict_count {
            return Err(corrupt(format!(
                "row {} refers to dictionary entry {} of {}",
                row, code, dict_count
            )));
        }
        let (offset, len) = slot(code);
        out.put_u32_le(offset);
        out.put_u32_le(len);
    }
    out.extend_from_slice(&dictionary[header..]);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::viewers::{read_f64_slot, read_i32_slot, StringViewer};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidate_schemes_cover_every_data_type() {
        for t in [ColumnType::Integer, ColumnType::Double, ColumnType::String] {
            assert!(Scheme::candidates(t).contains(&Scheme::Uncompressed));
        }
        assert!(Scheme::candidates(ColumnType::Skip).is_empty());
    }

    #[test]
    fn test_rle_integers_decode_to_fixed_slots() {
        let values = vec![7, 7, 7, i32::MIN, 0, 0];
        let payload = encode(Scheme::Rle, &InputValues::Integer(&values)).unwrap().unwrap();
        let mut out = Vec::new();
        let requires_copy = decode(Scheme::Rle, ColumnType::Integer, &payload, values.len(), &mut out).unwrap();
        assert!(!requires_copy);
        let decoded: Vec<i32> = (0..values.len()).map(|i| read_i32_slot(&out, i).unwrap()).collect();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_one_value_rejects_varied_input() {
        let values = vec![1.5, 1.5, 2.5];
        assert!(encode(Scheme::OneValue, &InputValues::Double(&values)).unwrap().is_none());

        let same = vec![-0.0, -0.0];
        let payload = encode(Scheme::OneValue, &InputValues::Double(&same)).unwrap().unwrap();
        let mut out = Vec::new();
        decode(Scheme::OneValue, ColumnType::Double, &payload, 2, &mut out).unwrap();
        assert!(read_f64_slot(&out, 1).unwrap().is_sign_negative());
    }

    #[test]
    fn test_dictionary_strings_use_pointer_layout() {
        let values = strings(&["red", "", "blue", "red", "red"]);
        let payload = encode(Scheme::Dictionary, &InputValues::String(&values)).unwrap().unwrap();
        let mut out = Vec::new();
        let requires_copy = decode(Scheme::Dictionary, ColumnType::String, &payload, values.len(), &mut out).unwrap();
        assert!(requires_copy);
        let viewer = StringViewer::new(&out, values.len(), requires_copy).unwrap();
        for (row, expected) in values.iter().enumerate() {
            assert_eq!(viewer.get(row).unwrap(), expected);
        }
    }

    #[test]
    fn test_uncompressed_strings_keep_offset_layout() {
        let values = strings(&["a", "bc", "", "déjà vu"]);
        let payload = encode(Scheme::Uncompressed, &InputValues::String(&values)).unwrap().unwrap();
        let mut out = Vec::new();
        let requires_copy = decode(Scheme::Uncompressed, ColumnType::String, &payload, values.len(), &mut out).unwrap();
        assert!(!requires_copy);
        let viewer = StringViewer::new(&out, values.len(), requires_copy).unwrap();
        assert_eq!(viewer.get(3).unwrap(), "déjà vu");
        assert_eq!(viewer.get(2).unwrap(), "");
    }

    #[test]
    fn test_truncated_payload_is_reported() {
        let values = vec![1, 2, 3];
        let payload = encode(Scheme::Rle, &InputValues::Integer(&values)).unwrap().unwrap();
        let mut out = Vec::new();
        let err = decode(Scheme::Rle, ColumnType::Integer, &payload[..payload.len() - 1], 3, &mut out).unwrap_err();
        assert!(matches!(err, ChunkpackError::CorruptChunk(_)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_lengths_are_reported() {
        assert_eq!(checked_u32(u32::MAX as usize, "string data").unwrap(), u32::MAX);
        let err = checked_u32(u32::MAX as usize + 1, "string data").unwrap_err();
        assert!(matches!(err, ChunkpackError::CorruptChunk(_)));
        assert!(err.to_string().contains("string data of 4294967296"));
    }
}
