use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random-access byte source for raster files.
///
/// The GeoTIFF reader only ever needs the header, one IFD and the handful of
/// tiles covering a request, so it reads ranges instead of whole files.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Identifier used in log messages (the file path for local files).
    fn identifier(&self) -> &str;

    /// Read several `(offset, len)` ranges in order.
    ///
    /// Ranges that start where the previous one ends are fetched with one
    /// read. Tiles along a raster row are usually laid out back to back.
    async fn read_ranges(&self, ranges: &[(u64, usize)]) -> Result<Vec<Bytes>, IoError> {
        let mut out = Vec::with_capacity(ranges.len());
        let mut first = 0;
        while first < ranges.len() {
            let start = ranges[first].0;
            let mut end = start + ranges[first].1 as u64;
            let mut last = first + 1;
            while last < ranges.len() && ranges[last].0 == end {
                end += ranges[last].1 as u64;
                last += 1;
            }

            let block = self.read_exact_at(start, (end - start) as usize).await?;
            for &(offset, len) in &ranges[first..last] {
                let from = (offset - start) as usize;
                out.push(block.slice(from..from + len));
            }
            first = last;
        }
        Ok(out)
    }
}
