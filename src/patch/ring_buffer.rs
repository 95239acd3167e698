//! Fixed-capacity sample ring buffers.
//!
//! [`RingBuffer`] is owned by one side and overwrites in place.
//! [`split_ring`] hands out a producer and a consumer over shared storage
//! for use across threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, RingBuffer as Overwrite, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// A fixed-capacity circular buffer that never blocks and never grows.
///
/// Storage is allocated once in [`RingBuffer::new`]. When a push does not fit,
/// the oldest unread samples are discarded so the producer never waits; the
/// number of discarded samples is tracked in [`RingBuffer::overflowed`].
///
/// # Example
///
/// ```
/// use audio_patchbay::RingBuffer;
///
/// let mut ring = RingBuffer::<f32>::new(4);
/// ring.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
///
/// let mut out = [0.0; 4];
/// assert_eq!(ring.pop(&mut out, false), 4);
/// assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
/// ```
pub struct RingBuffer<T> {
    inner: HeapRb<T>,
    overflowed: u64,
}

impl<T: Copy> RingBuffer<T> {
    /// Creates a ring buffer holding up to `capacity` samples (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: HeapRb::new(capacity.max(1)),
            overflowed: 0,
        }
    }

    /// Writes samples, discarding the oldest unread data if space runs out.
    ///
    /// Returns the number of samples written, which is `samples.len()`
    /// clamped to the capacity. When more than `capacity` samples are pushed
    /// at once only the most recent `capacity` of them are kept.
    pub fn push(&mut self, samples: &[T]) -> usize {
        let capacity = self.capacity();
        let kept = if samples.len() > capacity {
            self.overflowed += (samples.len() - capacity) as u64;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let vacant = self.inner.vacant_len();
        if kept.len() > vacant {
            self.overflowed += (kept.len() - vacant) as u64;
        }

        self.inner.push_slice_overwrite(kept);
        kept.len()
    }

    /// Copies up to `dst.len()` samples out of the buffer.
    ///
    /// With `use_latest` set and more samples queued than requested, the
    /// oldest excess is skipped first so the most recent audio is returned.
    pub fn pop(&mut self, dst: &mut [T], use_latest: bool) -> usize {
        if use_latest {
            let queued = self.inner.occupied_len();
            if queued > dst.len() {
                self.inner.skip(queued - dst.len());
            }
        }
        self.inner.pop_slice(dst)
    }

    /// Copies the most recent `dst.len()` samples without consuming them.
    ///
    /// Returns the number of samples copied; when fewer are queued, the
    /// copied samples fill the front of `dst`.
    pub fn copy_latest(&self, dst: &mut [T]) -> usize {
        let (head, tail) = self.inner.as_slices();
        let queued = head.len() + tail.len();
        let count = dst.len().min(queued);
        let skip = queued - count;

        for (slot, sample) in dst
            .iter_mut()
            .zip(head.iter().chain(tail.iter()).skip(skip))
        {
            *slot = *sample;
        }
        count
    }

    /// Returns the number of queued samples.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Returns the fixed capacity in samples.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Returns the total number of samples discarded by overflow.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Discards all queued samples.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("available", &self.inner.occupied_len())
            .field("capacity", &self.inner.capacity())
            .field("overflowed", &self.overflowed)
            .finish()
    }
}

/// Creates a producer/consumer pair over a ring holding `capacity` samples.
///
/// Neither half locks. Oldest-discard is carried by the consumer: before
/// every read it skips whatever exceeds `capacity`, counting the skipped
/// samples as overflow. Storage is twice `capacity` so the producer keeps
/// writing while the consumer catches up; a consumer that stops reading
/// for longer than that loses incoming samples instead, which are counted
/// the same way.
pub(crate) fn split_ring<T: Copy>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    let capacity = capacity.max(1);
    let (producer, consumer) = HeapRb::<T>::new(capacity * 2).split();
    let overflowed = Arc::new(AtomicU64::new(0));
    (
        RingProducer {
            inner: producer,
            capacity,
            overflowed: overflowed.clone(),
        },
        RingConsumer {
            inner: consumer,
            capacity,
            overflowed,
        },
    )
}

/// Write half of a [`split_ring`].
pub(crate) struct RingProducer<T> {
    inner: HeapProd<T>,
    capacity: usize,
    overflowed: Arc<AtomicU64>,
}

impl<T: Copy> RingProducer<T> {
    /// Writes samples without waiting on the consumer.
    ///
    /// Returns the number of samples enqueued. At most `capacity` are
    /// accepted per call, the most recent ones.
    pub(crate) fn push(&mut self, samples: &[T]) -> usize {
        let kept = if samples.len() > self.capacity {
            self.discard(samples.len() - self.capacity);
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let vacant = self.inner.vacant_len();
        let kept = if kept.len() > vacant {
            self.discard(kept.len() - vacant);
            &kept[kept.len() - vacant..]
        } else {
            kept
        };
        self.inner.push_slice(kept)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records `samples` dropped before reaching the ring.
    pub(crate) fn discard(&self, samples: usize) {
        self.overflowed.fetch_add(samples as u64, Ordering::Relaxed);
    }
}

/// Read half of a [`split_ring`].
pub(crate) struct RingConsumer<T> {
    inner: HeapCons<T>,
    capacity: usize,
    overflowed: Arc<AtomicU64>,
}

impl<T: Copy> RingConsumer<T> {
    /// Copies up to `dst.len()` samples out, oldest first.
    ///
    /// Samples beyond the ring's capacity are discarded first. With
    /// `use_latest`, any remaining excess over `dst.len()` is skipped too.
    pub(crate) fn pop(&mut self, dst: &mut [T], use_latest: bool) -> usize {
        let excess = self.inner.occupied_len().saturating_sub(self.capacity);
        if excess > 0 {
            let skipped = self.inner.skip(excess);
            self.overflowed.fetch_add(skipped as u64, Ordering::Relaxed);
        }
        if use_latest {
            let queued = self.inner.occupied_len();
            if queued > dst.len() {
                self.inner.skip(queued - dst.len());
            }
        }
        self.inner.pop_slice(dst)
    }

    /// Returns the number of samples the next pop can return.
    pub(crate) fn available(&self) -> usize {
        self.inner.occupied_len().min(self.capacity)
    }

    /// Returns the samples discarded on either side so far.
    pub(crate) fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_conserves_order() {
        let mut ring = RingBuffer::<i32>::new(16);
        assert_eq!(ring.push(&[1, 2, 3]), 3);
        assert_eq!(ring.push(&[4, 5]), 2);
        assert_eq!(ring.push(&[6, 7, 8, 9, 10]), 5);

        let mut out = [0; 16];
        let n = ring.pop(&mut out, false);

        assert_eq!(n, 10);
        assert_eq!(&out[..n], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(ring.overflowed(), 0);
    }

    #[test]
    fn test_overflow_keeps_most_recent() {
        let mut ring = RingBuffer::<i32>::new(8);
        let samples: Vec<i32> = (0..20).collect();
        for chunk in samples.chunks(3) {
            ring.push(chunk);
        }

        let mut out = [0; 8];
        assert_eq!(ring.pop(&mut out, false), 8);
        assert_eq!(out, [12, 13, 14, 15, 16, 17, 18, 19]);
        assert_eq!(ring.overflowed(), 12);
    }

    #[test]
    fn test_oversized_single_push() {
        let mut ring = RingBuffer::<i32>::new(4);
        assert_eq!(ring.push(&[1, 2, 3, 4, 5, 6, 7]), 4);

        let mut out = [0; 4];
        ring.pop(&mut out, false);
        assert_eq!(out, [4, 5, 6, 7]);
    }

    #[test]
    fn test_pop_use_latest_skips_oldest() {
        let mut ring = RingBuffer::<i32>::new(16);
        ring.push(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0; 2];
        assert_eq!(ring.pop(&mut out, true), 2);
        assert_eq!(out, [5, 6]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_pop_partial() {
        let mut ring = RingBuffer::<i32>::new(16);
        ring.push(&[1, 2, 3, 4]);

        let mut out = [0; 2];
        assert_eq!(ring.pop(&mut out, false), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(ring.available(), 2);
    }

    #[test]
    fn test_copy_latest_does_not_consume() {
        let mut ring = RingBuffer::<i32>::new(4);
        ring.push(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0; 3];
        assert_eq!(ring.copy_latest(&mut out), 3);
        assert_eq!(out, [4, 5, 6]);
        assert_eq!(ring.available(), 4);
    }

    #[test]
    fn test_copy_latest_short() {
        let mut ring = RingBuffer::<i32>::new(8);
        ring.push(&[7, 8]);

        let mut out = [0; 4];
        assert_eq!(ring.copy_latest(&mut out), 2);
        assert_eq!(&out[..2], &[7, 8]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let ring = RingBuffer::<f32>::new(0);
        assert_eq!(ring.capacity(), 1);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::<f32>::new(8);
        ring.push(&[1.0; 5]);
        ring.clear();
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_split_ring_keeps_order() {
        let (mut producer, mut consumer) = split_ring::<i32>(8);
        assert_eq!(producer.push(&[1, 2, 3]), 3);
        assert_eq!(producer.push(&[4, 5]), 2);

        let mut out = [0; 8];
        assert_eq!(consumer.pop(&mut out, false), 5);
        assert_eq!(&out[..5], &[1, 2, 3, 4, 5]);
        assert_eq!(consumer.overflowed(), 0);
    }

    #[test]
    fn test_split_ring_consumer_discards_oldest() {
        let (mut producer, mut consumer) = split_ring::<i32>(4);
        producer.push(&[1, 2, 3]);
        producer.push(&[4, 5, 6]);
        assert_eq!(consumer.available(), 4);

        let mut out = [0; 4];
        assert_eq!(consumer.pop(&mut out, false), 4);
        assert_eq!(out, [3, 4, 5, 6]);
        assert_eq!(consumer.overflowed(), 2);
    }

    #[test]
    fn test_split_ring_oversized_push_keeps_newest() {
        let (mut producer, mut consumer) = split_ring::<i32>(4);
        assert_eq!(producer.push(&[1, 2, 3, 4, 5, 6, 7]), 4);
        assert_eq!(producer.capacity(), 4);

        let mut out = [0; 4];
        consumer.pop(&mut out, false);
        assert_eq!(out, [4, 5, 6, 7]);
        assert_eq!(consumer.overflowed(), 3);
    }

    #[test]
    fn test_split_ring_stalled_consumer_counts_dropped_input() {
        let (mut producer, consumer) = split_ring::<i32>(2);
        assert_eq!(producer.push(&[1, 2]), 2);
        assert_eq!(producer.push(&[3, 4]), 2);
        assert_eq!(producer.push(&[5, 6]), 0);
        assert_eq!(consumer.overflowed(), 2);
    }

    #[test]
    fn test_split_ring_use_latest() {
        let (mut producer, mut consumer) = split_ring::<i32>(8);
        producer.push(&[1, 2, 3, 4, 5]);

        let mut out = [0; 2];
        assert_eq!(consumer.pop(&mut out, true), 2);
        assert_eq!(out, [4, 5]);
        assert_eq!(consumer.available(), 0);
    }
}
