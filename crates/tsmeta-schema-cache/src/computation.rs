//! Caller-side sink for [`SchemaCache::compute`](crate::SchemaCache::compute).

use tsmeta_common::MeasurementSchema;

/// Receives cached schema for a batch of measurements under one device.
///
/// Implementations must not call back into the cache.
pub trait SchemaComputation {
    /// Alignment of the device, reported once, on the first hit
    fn compute_device(&mut self, aligned: bool);

    /// Schema of the measurement at `index` in the requested batch
    fn compute_measurement(&mut self, index: usize, name: &str, schema: &MeasurementSchema);
}
