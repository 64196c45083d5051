//! Schedule builder for the sparse-output mode

use super::lut::SddLut;
use super::superblock::superblock;
use crate::error::{Error, Result};
use crate::sparse::BlockLayout;
use tracing::debug;

/// Build the super-block schedule of a sparse output
///
/// The starting grouping factor is `superblock_span / block`, so super-blocks
/// never exceed `superblock_span` elements per side.
pub fn build_sdd_lut(layout: &BlockLayout, block: usize, superblock_span: usize) -> Result<SddLut> {
    if block == 0 {
        return Err(Error::config("block size must be positive"));
    }
    let start_width = (superblock_span / block).max(1);
    let lut = superblock(layout, start_width)?;
    debug!(
        block,
        start_width,
        groups = lut.groups.len(),
        n_blocks = lut.n_blocks(),
        "built sparse-output schedule"
    );
    Ok(lut)
}
