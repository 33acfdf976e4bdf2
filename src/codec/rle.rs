use super::Compressor;
use crate::error::{Error, Result};

const MAX_RUN: u16 = u16::MAX;

/// Generic run-length encoding over raw bytes, per SPEC_FULL §4.6: a run is
/// at most 65,535 elements, encoded as the value byte followed by a
/// big-endian `u16` run length.
pub struct RleCompressor;

impl Compressor for RleCompressor {
    fn compress(&self, input: &[u8], _level: i32, out: &mut Vec<u8>) -> Result<usize> {
        out.clear();
        encode_runs(input, out);
        Ok(out.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        decode_runs(input, out)?;
        if out.len() != expected_size {
            return Err(Error::SizeMismatch {
                expected: expected_size,
                actual: out.len(),
            });
        }
        Ok(())
    }
}

fn encode_runs(input: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < input.len() {
        let value = input[i];
        let mut run_len: u32 = 1;
        while i + (run_len as usize) < input.len()
            && input[i + run_len as usize] == value
            && run_len < u32::from(MAX_RUN)
        {
            run_len += 1;
        }
        out.push(value);
        out.extend_from_slice(&(run_len as u16).to_be_bytes());
        i += run_len as usize;
    }
}

fn decode_runs(input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut i = 0;
    while i < input.len() {
        if i + 3 > input.len() {
            return Err(Error::Truncated("rle record cut short".into()));
        }
        let value = input[i];
        let run_len = u16::from_be_bytes([input[i + 1], input[i + 2]]);
        out.resize(out.len() + run_len as usize, value);
        i += 3;
    }
    Ok(())
}

/// Coordinate-aware RLE. Cells arrive interleaved (`dims` columns of
/// `elem_size` bytes per cell); per SPEC_FULL §4.6, the dimension that
/// varies fastest under the configured cell order is incompressible and is
/// stored verbatim, while the remaining, slow-varying dimensions are
/// regrouped into per-dimension columns and run-length encoded at element
/// granularity. Layout: `[count: u32][fast dim column, verbatim][runs of
/// the other dims, one column after another]`.
///
/// `row_major` picks which dimension is "fast" per `cellorder::CellOrder`:
/// row-major varies the *last* dimension fastest, column-major the first.
pub struct CoordRleCompressor {
    row_major: bool,
    dims: usize,
    elem_size: usize,
}

impl CoordRleCompressor {
    /// `dims` and `elem_size` describe the coordinate tile's layout: `dims`
    /// columns of `elem_size` bytes, interleaved one cell at a time.
    #[must_use]
    pub fn new(row_major: bool, dims: usize, elem_size: usize) -> Self {
        Self { row_major, dims, elem_size }
    }

    fn fast_dim(&self) -> usize {
        if self.row_major {
            self.dims.saturating_sub(1)
        } else {
            0
        }
    }
}

impl Compressor for CoordRleCompressor {
    fn compress(&self, input: &[u8], _level: i32, out: &mut Vec<u8>) -> Result<usize> {
        out.clear();
        if self.dims == 0 || self.elem_size == 0 {
            out.extend_from_slice(&0u32.to_le_bytes());
            encode_elem_runs(input, self.elem_size.max(1), out);
            return Ok(out.len());
        }
        let stride = self.dims * self.elem_size;
        if stride == 0 || input.len() % stride != 0 {
            return Err(Error::StrideMismatch {
                stride,
                len: input.len(),
            });
        }
        let n = input.len() / stride;
        let fast = self.fast_dim();

        out.extend_from_slice(&(n as u32).to_le_bytes());
        for cell in 0..n {
            let start = cell * stride + fast * self.elem_size;
            out.extend_from_slice(&input[start..start + self.elem_size]);
        }

        let mut rest = Vec::with_capacity(input.len() - n * self.elem_size);
        for dim in 0..self.dims {
            if dim == fast {
                continue;
            }
            for cell in 0..n {
                let start = cell * stride + dim * self.elem_size;
                rest.extend_from_slice(&input[start..start + self.elem_size]);
            }
        }
        encode_elem_runs(&rest, self.elem_size, out);
        Ok(out.len())
    }

    fn decompress(&self, input: &[u8], expected_size: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        if input.len() < 4 {
            return Err(Error::Truncated("coordinate RLE count prefix".into()));
        }
        let n = u32::from_le_bytes(input[0..4].try_into().expect("4 bytes")) as usize;
        if self.dims == 0 || self.elem_size == 0 {
            decode_elem_runs(&input[4..], self.elem_size.max(1), out)?;
            if out.len() != expected_size {
                return Err(Error::SizeMismatch {
                    expected: expected_size,
                    actual: out.len(),
                });
            }
            return Ok(());
        }
        let fast = self.fast_dim();
        let elem_size = self.elem_size;
        let verbatim_len = n * elem_size;
        if input.len() < 4 + verbatim_len {
            return Err(Error::Truncated("coordinate RLE verbatim column".into()));
        }
        let fast_col = &input[4..4 + verbatim_len];
        let mut rest = Vec::new();
        decode_elem_runs(&input[4 + verbatim_len..], elem_size, &mut rest)?;
        let other_dims = self.dims - 1;
        if rest.len() != other_dims * n * elem_size {
            return Err(Error::SizeMismatch {
                expected: other_dims * n * elem_size,
                actual: rest.len(),
            });
        }

        let stride = self.dims * elem_size;
        out.resize(n * stride, 0);
        for cell in 0..n {
            let dst = cell * stride + fast * elem_size;
            out[dst..dst + elem_size].copy_from_slice(&fast_col[cell * elem_size..(cell + 1) * elem_size]);
        }
        let mut rest_idx = 0;
        for dim in 0..self.dims {
            if dim == fast {
                continue;
            }
            for cell in 0..n {
                let dst = cell * stride + dim * elem_size;
                out[dst..dst + elem_size].copy_from_slice(&rest[rest_idx..rest_idx + elem_size]);
                rest_idx += elem_size;
            }
        }

        if out.len() != expected_size {
            return Err(Error::SizeMismatch {
                expected: expected_size,
                actual: out.len(),
            });
        }
        Ok(())
    }
}

/// Run-length encodes `data` at `elem_size`-byte granularity: each run is
/// `[count: u32 LE][elem_size bytes]`. Unlike `encode_runs`, a run spans
/// repeated *elements*, not repeated individual bytes, so it collapses
/// repeated multi-byte coordinate values instead of only repeated bytes.
fn encode_elem_runs(data: &[u8], elem_size: usize, out: &mut Vec<u8>) {
    if elem_size == 0 {
        return;
    }
    let mut i = 0;
    while i < data.len() {
        let elem = &data[i..i + elem_size];
        let mut run: u32 = 1;
        let mut j = i + elem_size;
        while j + elem_size <= data.len() && &data[j..j + elem_size] == elem && run < u32::MAX {
            run += 1;
            j += elem_size;
        }
        out.extend_from_slice(&run.to_le_bytes());
        out.extend_from_slice(elem);
        i = j;
    }
}

fn decode_elem_runs(data: &[u8], elem_size: usize, out: &mut Vec<u8>) -> Result<()> {
    if elem_size == 0 {
        return Ok(());
    }
    let mut i = 0;
    while i < data.len() {
        if i + 4 + elem_size > data.len() {
            return Err(Error::Truncated("coordinate rle record cut short".into()));
        }
        let run = u32::from_le_bytes(data[i..i + 4].try_into().expect("4 bytes"));
        let elem = &data[i + 4..i + 4 + elem_size];
        for _ in 0..run {
            out.extend_from_slice(elem);
        }
        i += 4 + elem_size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_roundtrips_repetitive_data() {
        let data = [1u8, 1, 1, 1, 2, 2, 3, 3, 3, 3, 3];
        let c = RleCompressor;
        let mut compressed = Vec::new();
        c.compress(&data, 0, &mut compressed).expect("compress");
        // 3 runs, 3 bytes each
        assert_eq!(compressed.len(), 9);
        let mut out = Vec::new();
        c.decompress(&compressed, data.len(), &mut out)
            .expect("decompress");
        assert_eq!(out, data);
    }

    #[test]
    fn rle_handles_long_runs_by_splitting() {
        let data = vec![7u8; 70_000];
        let c = RleCompressor;
        let mut compressed = Vec::new();
        c.compress(&data, 0, &mut compressed).expect("compress");
        assert_eq!(compressed.len(), 6); // two records of 3 bytes each
        let mut out = Vec::new();
        c.decompress(&compressed, data.len(), &mut out)
            .expect("decompress");
        assert_eq!(out, data);
    }

    #[test]
    fn coord_rle_roundtrips() {
        // 2 dims, 1-byte elements, 3 cells: col-major means dim 0 is fast.
        let c = CoordRleCompressor::new(false, 2, 1);
        let data = [5u8, 9, 5, 9, 5, 1];
        let mut compressed = Vec::new();
        c.compress(&data, 0, &mut compressed).expect("compress");
        let mut out = Vec::new();
        c.decompress(&compressed, data.len(), &mut out)
            .expect("decompress");
        assert_eq!(out, data);
    }

    #[test]
    fn coord_rle_preserves_fast_dimension_verbatim() {
        // Row-major: last dim (index 1) is fast and left untouched.
        let row = CoordRleCompressor::new(true, 2, 4);
        let data: Vec<u8> = [0i32, 10, 0, 11, 0, 12]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut out = Vec::new();
        row.compress(&data, 0, &mut out).expect("compress");
        // count (4) + 3 verbatim i32s (12) + one run record for dim 0 (4 + 4)
        assert_eq!(out.len(), 4 + 12 + 8);
        let fast_col = &out[4..16];
        let expected_fast: Vec<u8> = [10i32, 11, 12].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(fast_col, expected_fast.as_slice());
    }
}
