//! CPU client: parallel task dispatch

use crate::error::{Error, Result};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "rayon")]
use std::sync::Arc;

/// Parallelism knobs for tile execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelismConfig {
    /// Number of worker threads (default: None = rayon's global pool)
    pub num_threads: Option<usize>,

    /// Minimum number of tile tasks handed to one worker at a time (default: 1)
    pub min_len: usize,
}

impl Default for ParallelismConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_len: 1,
        }
    }
}

impl ParallelismConfig {
    /// Run every task on the calling thread
    pub fn sequential() -> Self {
        Self {
            num_threads: Some(1),
            ..Default::default()
        }
    }

    /// Use a dedicated pool with `n` threads
    pub fn with_threads(n: usize) -> Self {
        Self {
            num_threads: Some(n),
            ..Default::default()
        }
    }
}

/// CPU client for tile task dispatch
#[derive(Clone, Debug)]
pub struct CpuClient {
    config: ParallelismConfig,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl CpuClient {
    /// Create a client with the given parallelism configuration
    pub fn new(config: ParallelismConfig) -> Result<Self> {
        if config.num_threads == Some(0) {
            return Err(Error::config("num_threads must be at least 1"));
        }
        if config.min_len == 0 {
            return Err(Error::config("min_len must be at least 1"));
        }

        #[cfg(feature = "rayon")]
        let pool = match config.num_threads {
            Some(n) if n > 1 => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("blocksparse-{i}"))
                    .build()
                    .map_err(|e| Error::config(format!("failed to build thread pool: {e}")))?,
            )),
            _ => None,
        };

        Ok(Self {
            config,
            #[cfg(feature = "rayon")]
            pool,
        })
    }

    /// Parallelism configuration of this client
    pub fn config(&self) -> &ParallelismConfig {
        &self.config
    }

    /// Minimum tasks per worker chunk
    #[inline]
    pub fn rayon_min_len(&self) -> usize {
        self.config.min_len
    }

    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    fn is_sequential(&self) -> bool {
        self.config.num_threads == Some(1)
    }

    /// Run `f` inside this client's thread pool (or the global one)
    #[cfg(feature = "rayon")]
    pub fn install_parallelism<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Evaluate `task(i)` for every `i in 0..n`, in parallel when enabled
    ///
    /// Results are returned in task order regardless of execution order.
    pub fn map_tasks<R, F>(&self, n: usize, task: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            if !self.is_sequential() && n > 1 {
                let min_len = self.rayon_min_len();
                return self.install_parallelism(|| {
                    (0..n)
                        .into_par_iter()
                        .with_min_len(min_len)
                        .map(&task)
                        .collect()
                });
            }
        }

        (0..n).map(task).collect()
    }
}

impl Default for CpuClient {
    fn default() -> Self {
        Self {
            config: ParallelismConfig::default(),
            #[cfg(feature = "rayon")]
            pool: None,
        }
    }
}
