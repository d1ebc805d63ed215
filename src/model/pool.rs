//! Reusable step-vector and batch arenas
//!
//! Each operator owns one [`VectorPool`]. `next()` hands batches of step
//! vectors to the parent; the parent consumes each step and returns it via
//! [`VectorPool::put_step_vector`], then the batch via
//! [`VectorPool::put_vectors`]. Reuse keeps the hot loop allocation-free
//! after warm-up; the pool tracks outstanding step vectors so tests can
//! assert the leak-free discipline.

use std::sync::atomic::{AtomicIsize, Ordering};

use parking_lot::Mutex;

use crate::model::step_vector::StepVector;
use crate::types::Timestamp;

/// Arena of step vectors and batches for one operator
#[derive(Debug, Default)]
pub struct VectorPool {
    inner: Mutex<PoolInner>,
    outstanding: AtomicIsize,
}

#[derive(Debug)]
struct PoolInner {
    step_size: usize,
    vectors: Vec<StepVector>,
    batches: Vec<Vec<StepVector>>,
}

impl Default for PoolInner {
    fn default() -> Self {
        Self {
            step_size: 0,
            vectors: Vec::new(),
            batches: Vec::new(),
        }
    }
}

impl VectorPool {
    /// Create a pool sizing step vectors for `step_size` samples
    pub fn new(step_size: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                step_size,
                vectors: Vec::new(),
                batches: Vec::new(),
            }),
            outstanding: AtomicIsize::new(0),
        }
    }

    /// Change the expected samples-per-step; affects future acquisitions
    pub fn set_step_size(&self, step_size: usize) {
        self.inner.lock().step_size = step_size;
    }

    /// Acquire an empty batch
    pub fn get_vector_batch(&self) -> Vec<StepVector> {
        self.inner
            .lock()
            .batches
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(16))
    }

    /// Return a batch; any step vectors still inside are recycled too
    pub fn put_vectors(&self, mut batch: Vec<StepVector>) {
        let mut inner = self.inner.lock();
        for mut sv in batch.drain(..) {
            sv.clear();
            inner.vectors.push(sv);
            self.outstanding.fetch_sub(1, Ordering::Relaxed);
        }
        inner.batches.push(batch);
    }

    /// Acquire a step vector for timestamp `t`
    pub fn get_step_vector(&self, t: Timestamp) -> StepVector {
        let mut inner = self.inner.lock();
        let step_size = inner.step_size;
        let mut sv = inner.vectors.pop().unwrap_or_default();
        drop(inner);
        if sv.samples.capacity() < step_size {
            sv.samples.reserve(step_size - sv.samples.capacity());
            sv.sample_ids.reserve(step_size.saturating_sub(sv.sample_ids.capacity()));
        }
        sv.t = t;
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        sv
    }

    /// Return a consumed step vector
    pub fn put_step_vector(&self, mut sv: StepVector) {
        sv.clear();
        self.inner.lock().vectors.push(sv);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// Step vectors currently checked out and not yet returned
    pub fn outstanding(&self) -> isize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_vector_roundtrip_reuses_allocation() {
        let pool = VectorPool::new(8);
        let mut sv = pool.get_step_vector(100);
        sv.append_sample(0, 1.0);
        let cap = sv.samples.capacity();
        pool.put_step_vector(sv);

        let sv2 = pool.get_step_vector(200);
        assert_eq!(sv2.t, 200);
        assert!(sv2.is_empty());
        assert_eq!(sv2.samples.capacity(), cap);
    }

    #[test]
    fn test_outstanding_accounting() {
        let pool = VectorPool::new(4);
        let a = pool.get_step_vector(0);
        let b = pool.get_step_vector(1);
        assert_eq!(pool.outstanding(), 2);
        pool.put_step_vector(a);
        assert_eq!(pool.outstanding(), 1);

        let mut batch = pool.get_vector_batch();
        batch.push(b);
        pool.put_vectors(batch);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_batch_roundtrip() {
        let pool = VectorPool::new(4);
        let mut batch = pool.get_vector_batch();
        batch.push(pool.get_step_vector(0));
        pool.put_vectors(batch);

        let batch2 = pool.get_vector_batch();
        assert!(batch2.is_empty());
    }

    #[test]
    fn test_step_size_applies_to_acquisition() {
        let pool = VectorPool::new(0);
        pool.set_step_size(32);
        let sv = pool.get_step_vector(0);
        assert!(sv.samples.capacity() >= 32);
    }
}
