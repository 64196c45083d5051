//! Load balancing of per-column reduction lengths into segments

/// Partition of reduction work into segments
///
/// All five vectors have one entry per segment. Segments of the same column
/// are adjacent and appear in reduction order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segments {
    /// Number of blocks each segment reduces
    pub sizes: Vec<usize>,
    /// Owning column (or row) of each segment
    pub columns: Vec<usize>,
    /// Shared lock id, 0 when the column was not split
    pub lock_ids: Vec<u32>,
    /// Number of segments sharing the lock, 0 when unlocked
    pub max_tasks: Vec<u32>,
    /// Exclusive prefix sum of `sizes`
    pub offsets: Vec<usize>,
}

impl Segments {
    /// Number of segments
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Whether there are no segments
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Largest lock id handed out (0 when nothing is locked)
    pub fn max_lock_id(&self) -> u32 {
        self.lock_ids.iter().copied().max().unwrap_or(0)
    }
}

/// Split reduction lengths into segments of at most `max(sizes)` blocks
///
/// See [`load_balance_capped`] for the splitting rules.
pub fn load_balance(sizes: &[usize]) -> Segments {
    load_balance_capped(sizes, None)
}

/// Split reduction lengths into segments of at most `seg_max` blocks
///
/// `seg_max` is `max(sizes)`, lowered to `cap` when given. With
/// `seg_min = max(ceil(seg_max / 4), 4)`, a column of length `L`:
///
/// - yields one unlocked segment of `L` when `L < seg_min`;
/// - otherwise yields `L / seg_max` segments of `seg_max`, plus one segment
///   for the remainder when it reaches `seg_min` (smaller remainders are
///   folded into the last full segment).
///
/// Columns that end up with more than one segment share a fresh 1-based
/// lock id. An all-zero or empty input produces no segments.
pub fn load_balance_capped(sizes: &[usize], cap: Option<usize>) -> Segments {
    let largest = sizes.iter().copied().max().unwrap_or(0);
    if largest == 0 {
        return Segments::default();
    }
    let seg_max = cap.map_or(largest, |c| largest.min(c.max(1)));
    let seg_min = seg_max.div_ceil(4).max(4);

    let mut out = Segments::default();
    let mut num_locks = 0u32;
    for (column, &len) in sizes.iter().enumerate() {
        let start = out.sizes.len();
        if len < seg_min {
            out.sizes.push(len);
        } else {
            let (d, r) = (len / seg_max, len % seg_max);
            out.sizes.extend(std::iter::repeat_n(seg_max, d));
            if r >= seg_min {
                out.sizes.push(r);
            } else if let Some(last) = out.sizes[start..].last_mut() {
                *last += r;
            }
        }

        let count = out.sizes.len() - start;
        let (lock, max_tasks) = if count > 1 {
            num_locks += 1;
            (num_locks, count as u32)
        } else {
            (0, 0)
        };
        out.columns.extend(std::iter::repeat_n(column, count));
        out.lock_ids.extend(std::iter::repeat_n(lock, count));
        out.max_tasks.extend(std::iter::repeat_n(max_tasks, count));
    }

    let mut acc = 0;
    out.offsets = out
        .sizes
        .iter()
        .map(|&s| {
            let off = acc;
            acc += s;
            off
        })
        .collect();
    out
}
