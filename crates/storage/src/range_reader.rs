//! Byte-range access to remote objects.

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use cropwatch_common::CropwatchResult;

/// Random access to the bytes of one object.
///
/// Implementations must serve each call with a request for exactly the given
/// range; nothing here downloads a whole object.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// The address this reader was opened for.
    fn href(&self) -> &str;

    /// Total object size in bytes.
    async fn size(&self) -> CropwatchResult<u64>;

    /// Read `range` (end exclusive).
    async fn read_range(&self, range: Range<u64>) -> CropwatchResult<Bytes>;
}
