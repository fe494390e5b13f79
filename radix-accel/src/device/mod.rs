//! Accelerator device and stream model.
//!
//! Work is issued onto per-device execution streams; issuing returns to the
//! caller and completion is only observable through [`Stream::synchronize`]
//! (or [`DeviceStreams::synchronize`]). Operations issued to the same stream
//! execute in issuing order; streams of different devices have no relative
//! ordering and must be synchronized explicitly when a cross-device
//! dependency exists.
//!
//! This crate ships a software device model: commands complete on the
//! issuing thread (batch work fans out over a thread pool), and the
//! asynchronous contract is kept at the API surface so that a real
//! accelerator backend can sit behind the same calls. Synchronization still
//! has one observable effect here: it services the stream's deferred
//! host-release queue, the mechanism by which a freshly uploaded lookup
//! table's host copy is kept alive until its device transfer has completed.

pub mod vec;

pub use vec::DeviceVec;

use std::any::Any;
use std::sync::Mutex;

/// Aborts the current operation with a diagnostic. Launch and usage faults
/// are not recoverable at this layer and are never retried.
macro_rules! launch_abort {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*);
        panic!($($arg)*);
    }};
}
pub(crate) use launch_abort;

/// Index of one accelerator device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceIndex(pub u32);

impl DeviceIndex {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// One in-order execution stream bound to a device.
pub struct Stream {
    device_index: DeviceIndex,
    deferred_host_releases: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl Stream {
    fn new(device_index: DeviceIndex) -> Self {
        Self {
            device_index,
            deferred_host_releases: Mutex::new(Vec::new()),
        }
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    /// Keeps `buffer` alive until the next synchronization point of this
    /// stream, at which point it is dropped.
    ///
    /// Used for host-side staging buffers whose device transfer has been
    /// issued but not yet observed complete; releasing through the stream
    /// cannot race with a subsequent reuse of the host allocation.
    pub fn defer_host_release(&self, buffer: Box<dyn Any + Send>) {
        match self.deferred_host_releases.lock() {
            Ok(mut queue) => queue.push(buffer),
            Err(_) => launch_abort!(
                "device error: stream on device {} is poisoned, a previous launch panicked",
                self.device_index.get()
            ),
        }
    }

    /// Blocks until every command issued on this stream has completed, then
    /// drops the deferred host buffers in issuing order.
    pub fn synchronize(&self) {
        let drained = match self.deferred_host_releases.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => launch_abort!(
                "device error: stream on device {} is poisoned, a previous launch panicked",
                self.device_index.get()
            ),
        };
        drop(drained);
    }
}

/// The set of streams an operation runs on, one per device of the index set.
///
/// All operations of the engine complete on the first stream except the
/// lookup-table application pipeline and the block primitives, which may
/// partition their block batch across the full set.
pub struct DeviceStreams {
    streams: Vec<Stream>,
    pub device_indexes: Vec<DeviceIndex>,
}

impl DeviceStreams {
    /// One stream on a single chosen device.
    pub fn new_single(device_index: DeviceIndex) -> Self {
        Self {
            streams: vec![Stream::new(device_index)],
            device_indexes: vec![device_index],
        }
    }

    /// One stream on each of devices `0..device_count`.
    pub fn new_multi(device_count: u32) -> Self {
        assert!(device_count > 0, "at least one device is required");
        let device_indexes: Vec<DeviceIndex> = (0..device_count).map(DeviceIndex).collect();
        let streams = device_indexes.iter().map(|&i| Stream::new(i)).collect();
        Self {
            streams,
            device_indexes,
        }
    }

    pub fn stream(&self, index: usize) -> &Stream {
        &self.streams[index]
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Synchronize every stream of the set.
    pub fn synchronize(&self) {
        for stream in &self.streams {
            stream.synchronize();
        }
    }

    /// Synchronize the stream of one device of the set.
    pub fn synchronize_one(&self, index: usize) {
        self.streams[index].synchronize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DropProbe(Arc<AtomicBool>);

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn deferred_host_release_happens_at_synchronize() {
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        let dropped = Arc::new(AtomicBool::new(false));
        streams
            .stream(0)
            .defer_host_release(Box::new(DropProbe(dropped.clone())));
        assert!(!dropped.load(Ordering::SeqCst));
        streams.synchronize();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn multi_device_sets_enumerate_indexes() {
        let streams = DeviceStreams::new_multi(4);
        assert_eq!(streams.len(), 4);
        assert_eq!(streams.stream(3).device_index(), DeviceIndex(3));
    }
}
