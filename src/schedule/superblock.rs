//! Greedy super-block grouping of populated blocks

use super::lut::{SddLut, SuperBlockGroup, SuperBlockRecord, to_i32};
use crate::error::Result;
use crate::sparse::BlockLayout;

/// Largest power of two not above `n` (`n >= 1`)
fn prev_power_of_two(n: usize) -> usize {
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Group populated blocks into `pack × pack` squares, largest first
///
/// For each `pack` from `start_width` (rounded down to a power of two)
/// down to 1, every depth slice is scanned in row-major order of the
/// square's top-left corner, and each fully populated square with no
/// block claimed by an earlier square is claimed. Groups that claim nothing
/// are omitted. The `pack = 1` pass claims whatever is left, so every
/// populated block ends up in exactly one square.
pub fn superblock(layout: &BlockLayout, start_width: usize) -> Result<SddLut> {
    let [depth, rows, cols] = layout.shape();
    let mut claimed = vec![false; depth * rows * cols];
    let flat = |z: usize, h: usize, w: usize| (z * rows + h) * cols + w;

    let mut groups = Vec::new();
    let mut pack = prev_power_of_two(start_width.max(1));
    loop {
        let mut records = Vec::new();
        for z in 0..depth {
            for i in 0..(rows + 1).saturating_sub(pack) {
                for j in 0..(cols + 1).saturating_sub(pack) {
                    let free = (0..pack).all(|bm| {
                        (0..pack).all(|bn| {
                            layout.is_set(z, i + bm, j + bn) && !claimed[flat(z, i + bm, j + bn)]
                        })
                    });
                    if !free {
                        continue;
                    }
                    for bm in 0..pack {
                        for bn in 0..pack {
                            let (h, w) = (i + bm, j + bn);
                            claimed[flat(z, h, w)] = true;
                            let slot = layout.storage_index(z, h, w).unwrap_or_default();
                            records.push(SuperBlockRecord {
                                depth: to_i32(z, "depth")?,
                                block_row: to_i32(h, "block row")?,
                                block_col: to_i32(w, "block column")?,
                                slot: to_i32(slot, "block slot")?,
                            });
                        }
                    }
                }
            }
        }
        if !records.is_empty() {
            groups.push(SuperBlockGroup { pack, records });
        }
        if pack == 1 {
            break;
        }
        pack /= 2;
    }

    Ok(SddLut { groups })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prev_power_of_two() {
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(8), 8);
        assert_eq!(prev_power_of_two(12), 8);
    }

    #[test]
    fn test_full_square_becomes_one_task() {
        let layout = BlockLayout::from_slice(&[1u8; 4], &[2, 2]).unwrap();
        let lut = superblock(&layout, 8).unwrap();
        assert_eq!(lut.groups.len(), 1);
        assert_eq!(lut.groups[0].pack, 2);
        assert_eq!(lut.groups[0].width(), 1);
        let slots: Vec<i32> = lut.groups[0].records.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_diagonal_falls_back_to_single_blocks() {
        let layout = BlockLayout::from_slice(&[1u8, 0, 0, 1], &[2, 2]).unwrap();
        let lut = superblock(&layout, 8).unwrap();
        assert_eq!(lut.groups.len(), 1);
        assert_eq!(lut.groups[0].pack, 1);
        assert_eq!(lut.n_blocks(), 2);
        assert_eq!(lut.groups[0].records[1].block_row, 1);
        assert_eq!(lut.groups[0].records[1].block_col, 1);
    }

    #[test]
    fn test_every_block_claimed_once() {
        #[rustfmt::skip]
        let data = [
            1u8, 1, 1, 0,
            1, 1, 1, 1,
            0, 1, 1, 1,
            1, 0, 1, 1,
        ];
        let layout = BlockLayout::from_slice(&data, &[1, 4, 4]).unwrap();
        let lut = superblock(&layout, 4).unwrap();
        assert_eq!(lut.n_blocks(), layout.nnz());

        let mut slots: Vec<i32> = lut
            .groups
            .iter()
            .flat_map(|g| g.records.iter().map(|r| r.slot))
            .collect();
        slots.sort_unstable();
        assert_eq!(slots, (0..layout.nnz() as i32).collect::<Vec<_>>());
        assert!(lut.groups.windows(2).all(|w| w[0].pack > w[1].pack));
    }
}
