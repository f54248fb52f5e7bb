//! Monochrome display support: a page-organised framebuffer and the SSD1306
//! controller driver that flushes it.

pub mod framebuffer;
#[cfg(feature = "display-ssd1306")]
pub mod ssd1306;

pub use framebuffer::{DirtySpan, FrameBuffer};
