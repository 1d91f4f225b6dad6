//! Optional acceleration pass over rendered pixels.
//!
//! The pass moves pixel data through SIMD lanes on the rayon pool and back.
//! It must leave every pixel value unchanged: only the execution path differs.

use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use super::types::RasterPage;

/// Set to any value to disable the acceleration path
pub const DISABLE_ACCEL_ENV: &str = "PAGERIP_DISABLE_ACCEL";

/// Rows below this count are processed on the calling thread
const PARALLEL_MIN_ROWS: usize = 64;

/// A transform applied to a rendered page before encoding
pub trait PixelTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, page: &mut RasterPage);
}

/// Widening SIMD round trip, parallel over rows
#[derive(Debug, Default)]
pub struct SimdRoundTrip;

impl PixelTransform for SimdRoundTrip {
    fn name(&self) -> &'static str {
        "simd-round-trip"
    }

    fn apply(&self, page: &mut RasterPage) {
        let row_bytes = page.row_bytes();
        if row_bytes == 0 || page.pixels.is_empty() {
            return;
        }

        if (page.height_px as usize) < PARALLEL_MIN_ROWS {
            for row in page.pixels.chunks_mut(row_bytes) {
                simd_lanes::round_trip_row(row);
            }
            return;
        }

        page.pixels
            .par_chunks_mut(row_bytes)
            .for_each(simd_lanes::round_trip_row);
    }
}

mod simd_lanes {
    use wide::u16x8;

    /// Upload eight bytes at a time into 16-bit lanes and read them back
    #[inline]
    pub fn round_trip_row(row: &mut [u8]) {
        // Tail bytes (fewer than eight) never leave host memory.
        for chunk in row.chunks_exact_mut(8) {
            let lanes = u16x8::new([
                u16::from(chunk[0]),
                u16::from(chunk[1]),
                u16::from(chunk[2]),
                u16::from(chunk[3]),
                u16::from(chunk[4]),
                u16::from(chunk[5]),
                u16::from(chunk[6]),
                u16::from(chunk[7]),
            ]);
            for (dst, lane) in chunk.iter_mut().zip(lanes.to_array()) {
                *dst = lane as u8;
            }
        }
    }
}

/// The acceleration path for this process, if one is usable
#[must_use]
pub fn probe() -> Option<Arc<dyn PixelTransform>> {
    if std::env::var_os(DISABLE_ACCEL_ENV).is_some() {
        debug!("Acceleration disabled by {DISABLE_ACCEL_ENV}");
        return None;
    }
    Some(Arc::new(SimdRoundTrip))
}
