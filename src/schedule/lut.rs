//! Typed lookup tables driving the tile kernels

use crate::error::{Error, Result};
use bytemuck::{Pod, Zeroable};

/// Header of one dense-output task
///
/// `offset` is an index into [`DenseLut::increments`] (pair units).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct TaskHeader {
    /// First increment pair of the task
    pub offset: i32,
    /// Reduction length in elements (`segment size × block`)
    pub reduction_len: i32,
    /// Output block column (or row) written by the task
    pub column: i32,
    /// Layout depth slice
    pub depth: i32,
    /// Shared lock id, 0 when the task owns its tile
    pub lock_id: i32,
    /// Number of tasks sharing `lock_id`
    pub max_tasks: i32,
}

/// Pointer advance for one reduction step
///
/// The first pair of a task holds absolute starts instead: the dense offset
/// in elements and the sparse offset in blocks.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Increment {
    /// Dense operand advance along the reduction axis (elements)
    pub dense: i32,
    /// Sparse operand advance (elements of block storage)
    pub sparse: i32,
}

/// One output block of a super-block task
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct SuperBlockRecord {
    /// Layout depth slice
    pub depth: i32,
    /// Block row of this cell
    pub block_row: i32,
    /// Block column of this cell
    pub block_col: i32,
    /// Storage position of the output block
    pub slot: i32,
}

/// Schedule for the dense-output kernels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseLut {
    /// One header per task
    pub headers: Vec<TaskHeader>,
    /// Increment pairs, terminated by one all-zero sentinel
    pub increments: Vec<Increment>,
    /// Static rank of each task among the tasks sharing its lock
    pub lock_ranks: Vec<u32>,
    /// Largest lock id in use
    pub num_locks: u32,
    /// Block size the table was built for
    pub block: usize,
    /// Reduction step in elements
    pub step: usize,
    /// Whether tasks were grouped by layout rows
    pub trans: bool,
}

impl DenseLut {
    /// Number of tasks
    #[inline]
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Increment pair at `index`, or an internal error when out of range
    #[inline]
    pub fn increment(&self, index: usize) -> Result<Increment> {
        self.increments.get(index).copied().ok_or_else(|| {
            Error::internal(format!(
                "increment index {index} out of range ({} pairs)",
                self.increments.len()
            ))
        })
    }

    /// Flat 32-bit table: header zone then increment zone
    ///
    /// Header offsets are rewritten to absolute word positions
    /// (`6 · width + 2 · pair`).
    pub fn to_words(&self) -> Vec<i32> {
        let base = 6 * self.width() as i32;
        let mut words = Vec::with_capacity(6 * self.width() + 2 * self.increments.len());
        for h in &self.headers {
            words.extend_from_slice(&[
                base + 2 * h.offset,
                h.reduction_len,
                h.column,
                h.depth,
                h.lock_id,
                h.max_tasks,
            ]);
        }
        words.extend_from_slice(bytemuck::cast_slice(&self.increments));
        words
    }

    /// Bytes of [`Self::to_words`]
    pub fn as_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.to_words()).to_vec()
    }
}

/// Super-block tasks of one grouping factor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuperBlockGroup {
    /// Blocks per super-block side
    pub pack: usize,
    /// `pack²` records per task, row-major within the task
    pub records: Vec<SuperBlockRecord>,
}

impl SuperBlockGroup {
    /// Number of tasks
    #[inline]
    pub fn width(&self) -> usize {
        self.records.len() / (self.pack * self.pack)
    }

    /// Records of task `task`
    pub fn task(&self, task: usize) -> &[SuperBlockRecord] {
        let n = self.pack * self.pack;
        &self.records[task * n..(task + 1) * n]
    }

    /// Flat 32-bit table (four words per record)
    pub fn to_words(&self) -> Vec<i32> {
        bytemuck::cast_slice(&self.records).to_vec()
    }
}

/// Schedule for the sparse-output kernel
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SddLut {
    /// Groups by decreasing `pack`
    pub groups: Vec<SuperBlockGroup>,
}

impl SddLut {
    /// Total tasks over all groups
    pub fn width(&self) -> usize {
        self.groups.iter().map(SuperBlockGroup::width).sum()
    }

    /// Output blocks (`Σ width · pack²`)
    pub fn n_blocks(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    /// Bytes of every group's table, concatenated
    pub fn as_bytes(&self) -> Vec<u8> {
        self.groups
            .iter()
            .flat_map(|g| bytemuck::cast_slice::<SuperBlockRecord, u8>(&g.records).to_vec())
            .collect()
    }
}

/// Schedule of one kernel launch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeLut {
    /// Super-block table for a sparse output
    SparseOutput(SddLut),
    /// Segment table for a dense output
    DenseOutput(DenseLut),
}

impl ModeLut {
    /// Largest lock id in use (always 0 for sparse output)
    pub fn num_locks(&self) -> u32 {
        match self {
            Self::SparseOutput(_) => 0,
            Self::DenseOutput(lut) => lut.num_locks,
        }
    }

    /// Number of tasks per batch entry and tile
    pub fn width(&self) -> usize {
        match self {
            Self::SparseOutput(lut) => lut.width(),
            Self::DenseOutput(lut) => lut.width(),
        }
    }

    /// Raw table bytes
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Self::SparseOutput(lut) => lut.as_bytes(),
            Self::DenseOutput(lut) => lut.as_bytes(),
        }
    }
}

/// Convert a table value to `i32`
pub(crate) fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::config(format!("{what} {value} does not fit in i32")))
}

/// Convert a signed table value to `i32`
pub(crate) fn signed_to_i32(value: i64, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::config(format!("{what} {value} does not fit in i32")))
}
