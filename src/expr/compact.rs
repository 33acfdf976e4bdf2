//! Post-filter compaction: rewrites per-attribute buffers in place to keep
//! only the cells a predicate accepted, per SPEC_FULL §4.8.

use crate::fragment::AttributeData;

/// Compacts `data` down to the cells at `keep` (sorted ascending indices
/// into the original cell sequence), left-shifting survivors and, for
/// variable attributes, re-basing offsets against the compacted payload.
pub fn compact_attribute(data: &AttributeData, keep: &[usize]) -> AttributeData {
    match data {
        AttributeData::Fixed(bytes) => {
            if keep.is_empty() {
                return AttributeData::Fixed(Vec::new());
            }
            let elem = bytes.len() / keep.iter().max().map_or(1, |m| m + 1).max(1);
            let mut out = Vec::with_capacity(keep.len() * elem);
            for &i in keep {
                out.extend_from_slice(&bytes[i * elem..(i + 1) * elem]);
            }
            AttributeData::Fixed(out)
        }
        AttributeData::Variable { data, offsets } => {
            let mut out_data = Vec::new();
            let mut out_offsets = Vec::with_capacity(keep.len());
            for &i in keep {
                let start = offsets[i] as usize;
                let end = offsets.get(i + 1).map_or(data.len(), |&o| o as usize);
                out_offsets.push(out_data.len() as u64);
                out_data.extend_from_slice(&data[start..end]);
            }
            AttributeData::Variable { data: out_data, offsets: out_offsets }
        }
    }
}

/// Compacts every attribute in `attrs` plus the parallel `coords` slice down
/// to `keep`.
pub fn compact_cells(
    coords: &[Vec<i64>],
    attrs: &std::collections::BTreeMap<String, AttributeData>,
    keep: &[usize],
) -> (Vec<Vec<i64>>, std::collections::BTreeMap<String, AttributeData>) {
    let out_coords = keep.iter().map(|&i| coords[i].clone()).collect();
    let out_attrs = attrs
        .iter()
        .map(|(name, data)| (name.clone(), compact_attribute(data, keep)))
        .collect();
    (out_coords, out_attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compacts_fixed_attribute() {
        let data = AttributeData::Fixed(vec![1, 2, 3, 4, 5, 6]); // 3 cells of 2 bytes
        let out = compact_attribute(&data, &[0, 2]);
        match out {
            AttributeData::Fixed(bytes) => assert_eq!(bytes, vec![1, 2, 5, 6]),
            _ => panic!("expected fixed"),
        }
    }

    #[test]
    fn compacts_variable_attribute_and_rebases_offsets() {
        let data = AttributeData::Variable {
            data: b"foobarbaz".to_vec(),
            offsets: vec![0, 3, 6],
        };
        let out = compact_attribute(&data, &[0, 2]);
        match out {
            AttributeData::Variable { data, offsets } => {
                assert_eq!(data, b"foobaz");
                assert_eq!(offsets, vec![0, 3]);
            }
            _ => panic!("expected variable"),
        }
    }
}
