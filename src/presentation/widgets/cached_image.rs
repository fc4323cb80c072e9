//! Image view backed by a load session.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Position, Rect},
    style::{Color, Style},
    widgets::{Block, Paragraph, Widget},
};
use tokio::sync::watch;

use crate::application::services::{ImageLoadSession, PublishedImage};
use crate::domain::entities::SessionPhase;

const UPPER_HALF_BLOCK: char = '\u{2580}';

/// Image slot that follows a URL and shows a placeholder until the image is ready.
///
/// Rendering reads the last published value; it never waits on the cache.
pub struct CachedImage {
    session: ImageLoadSession,
    image_rx: watch::Receiver<PublishedImage>,
    url: Option<String>,
    placeholder: String,
}

impl CachedImage {
    /// Creates an empty view driving `session`.
    #[must_use]
    pub fn new(session: ImageLoadSession) -> Self {
        let image_rx = session.subscribe();
        Self {
            session,
            image_rx,
            url: None,
            placeholder: "Loading image...".to_string(),
        }
    }

    /// Sets the placeholder text.
    #[must_use]
    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = text.into();
        self
    }

    /// Changes the displayed URL. Requests are only re-issued on change.
    pub fn set_url(&mut self, url: Option<&str>) {
        if self.url.as_deref() == url {
            return;
        }
        self.url = url.map(str::to_string);
        self.session.set_target(url);
    }

    /// Re-requests the current URL after a failure.
    pub fn retry(&self) {
        if self.session.phase().is_failed() {
            self.session.set_target(self.url.as_deref());
        }
    }

    /// Returns the URL this view follows.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the image to show, if any.
    #[must_use]
    pub fn current_image(&self) -> Option<Arc<DynamicImage>> {
        self.image_rx.borrow().clone()
    }

    /// Returns true once an image is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.image_rx.borrow().is_some()
    }

    /// Returns the session phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Waits until the published image changes.
    /// Returns false if the session is gone.
    pub async fn changed(&mut self) -> bool {
        self.image_rx.changed().await.is_ok()
    }
}

impl std::fmt::Debug for CachedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedImage")
            .field("url", &self.url)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Widget for &CachedImage {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        match self.current_image() {
            Some(image) => render_half_blocks(&image, area, buf),
            None => {
                let text = if self.session.phase().is_failed() {
                    "Image unavailable"
                } else {
                    self.placeholder.as_str()
                };
                Paragraph::new(text)
                    .style(Style::default().fg(Color::DarkGray))
                    .alignment(Alignment::Center)
                    .block(Block::bordered())
                    .render(area, buf);
            }
        }
    }
}

/// Largest size with the image's aspect ratio that fits `max_w` x `max_h`.
fn fit(img_w: u32, img_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let (iw, ih, mw, mh) = (
        u64::from(img_w),
        u64::from(img_h),
        u64::from(max_w),
        u64::from(max_h),
    );
    let (w, h) = if iw * mh <= ih * mw {
        (iw * mh / ih, mh)
    } else {
        (mw, ih * mw / iw)
    };
    (
        u32::try_from(w).unwrap_or(max_w).clamp(1, max_w),
        u32::try_from(h).unwrap_or(max_h).clamp(1, max_h),
    )
}

/// Maps cell coordinate `pos` in `0..cells` onto `0..pixels`.
fn scale(pos: u32, pixels: u32, cells: u32) -> u32 {
    let mapped = u64::from(pos) * u64::from(pixels) / u64::from(cells);
    u32::try_from(mapped).map_or(pixels - 1, |p| p.min(pixels - 1))
}

/// Draws two pixel rows per cell using the upper half block glyph.
fn render_half_blocks(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    let (w, h) = fit(
        img_w,
        img_h,
        u32::from(area.width),
        u32::from(area.height) * 2,
    );

    let sample = |x: u32, y: u32| {
        let px = image.get_pixel(scale(x, img_w, w), scale(y, img_h, h));
        Color::Rgb(px[0], px[1], px[2])
    };

    for row in 0..h.div_ceil(2) {
        for col in 0..w {
            let top = sample(col, row * 2);
            let bottom = if row * 2 + 1 < h {
                sample(col, row * 2 + 1)
            } else {
                Color::Reset
            };
            // `w` and `h / 2` are bounded by the area, so these fit in u16
            let position = Position::new(
                area.x + u16::try_from(col).unwrap_or(u16::MAX),
                area.y + u16::try_from(row).unwrap_or(u16::MAX),
            );
            if let Some(cell) = buf.cell_mut(position) {
                cell.set_char(UPPER_HALF_BLOCK).set_fg(top).set_bg(bottom);
            }
        }
    }
}
