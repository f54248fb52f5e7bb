//! Page-organised monochrome framebuffer with per-page change tracking.
//!
//! The layout mirrors SSD1306-style display RAM: the panel is split into pages
//! of 8 rows, and each byte holds one column of a page with the top row in bit 0.
//! All drawing targets this RAM buffer; a flush then only has to send the column
//! span of each page that actually changed.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Rows per display page.
pub const PAGE_HEIGHT: u32 = 8;

/// Inclusive range of columns within one page that changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySpan {
    pub start: usize,
    pub end: usize,
}

impl DirtySpan {
    fn expand(&mut self, column: usize) {
        self.start = self.start.min(column);
        self.end = self.end.max(column);
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Heap-allocated 1 bit per pixel framebuffer implementing
/// `DrawTarget<Color = BinaryColor>`.
///
/// Drawing through `DrawTarget` clips silently at the panel edges; use
/// [`FrameBuffer::try_set_pixel`] to detect out-of-bounds coordinates.
pub struct FrameBuffer {
    width: usize,
    height: usize,
    buffer: Vec<u8>,
    dirty: Vec<Option<DirtySpan>>,
}

impl FrameBuffer {
    /// Allocate a blank framebuffer. `height` is rounded up to whole pages.
    pub fn new(width: u32, height: u32) -> Self {
        let pages = height.div_ceil(PAGE_HEIGHT) as usize;
        Self {
            width: width as usize,
            height: height as usize,
            buffer: vec![0; width as usize * pages],
            dirty: vec![None; pages],
        }
    }

    pub fn page_count(&self) -> usize {
        self.dirty.len()
    }

    /// Column bytes of one page.
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        let start = page.checked_mul(self.width)?;
        self.buffer.get(start..start.checked_add(self.width)?)
    }

    /// Raw buffer, page after page.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn dirty_span(&self, page: usize) -> Option<DirtySpan> {
        self.dirty.get(page).copied().flatten()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(Option::is_some)
    }

    pub fn mark_page_clean(&mut self, page: usize) {
        if let Some(span) = self.dirty.get_mut(page) {
            *span = None;
        }
    }

    /// Mark every column of every page as changed.
    pub fn mark_all_dirty(&mut self) {
        let full = DirtySpan {
            start: 0,
            end: self.width.saturating_sub(1),
        };
        self.dirty.iter_mut().for_each(|span| *span = Some(full));
    }

    /// Set every pixel to `on` and mark the whole panel dirty.
    pub fn fill(&mut self, on: bool) {
        self.buffer.fill(if on { 0xFF } else { 0x00 });
        self.mark_all_dirty();
    }

    /// Set one pixel. Returns `false` without touching the buffer when the
    /// coordinate lies outside the panel.
    pub fn try_set_pixel(&mut self, x: u32, y: u32, on: bool) -> bool {
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return false;
        }
        self.set(x, y, on);
        true
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<bool> {
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.buffer[(y / 8) * self.width + x] & (1 << (y % 8)) != 0)
    }

    /// Write a single in-bounds pixel, expanding the page's dirty span only if
    /// the byte changed.
    #[inline]
    fn set(&mut self, x: usize, y: usize, on: bool) {
        let page = y / 8;
        let idx = page * self.width + x;
        let mask = 1u8 << (y % 8);
        let byte = if on {
            self.buffer[idx] | mask
        } else {
            self.buffer[idx] & !mask
        };
        if self.buffer[idx] != byte {
            self.buffer[idx] = byte;
            match self.dirty[page] {
                Some(ref mut span) => span.expand(x),
                None => self.dirty[page] = Some(DirtySpan { start: x, end: x }),
            }
        }
    }

    fn in_bounds(&self, point: Point) -> Option<(usize, usize)> {
        let (x, y) = (point.x, point.y);
        (x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height)
            .then_some((x as usize, y as usize))
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if let Some((x, y)) = self.in_bounds(coord) {
                self.set(x, y, color.is_on());
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        let on = color.is_on();
        for y in area.top_left.y..=bottom_right.y {
            for x in area.top_left.x..=bottom_right.x {
                self.set(x as usize, y as usize, on);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color.is_on());
        Ok(())
    }
}
