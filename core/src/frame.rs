//! Captured pixel buffers and the frame source boundary.
//!
//! Window capture itself lives outside the engine; anything that can produce
//! an RGBA buffer implements [`FrameSource`]. A missing frame means "skip
//! this cycle", never an error.

use std::collections::VecDeque;
use std::sync::Mutex;

use argus_types::Rgb;
use async_trait::async_trait;

use crate::error::FrameError;
use crate::lock;

/// Sub-rectangle of a window to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Tightly packed RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a single color.
    pub fn solid(width: u32, height: u32, color: Rgb) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[color.r, color.g, color.b, 255]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let i = self.offset(x, y)?;
        Some(Rgb::new(self.data[i], self.data[i + 1], self.data[i + 2]))
    }

    /// Returns false if `(x, y)` is outside the frame.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) -> bool {
        let Some(i) = self.offset(x, y) else {
            return false;
        };
        self.data[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, 255]);
        true
    }

    /// Paint `[start_x, end_x)` on row `y`, clipped to the frame.
    pub fn fill_span(&mut self, y: u32, start_x: u32, end_x: u32, color: Rgb) {
        for x in start_x..end_x.min(self.width) {
            self.set_pixel(x, y, color);
        }
    }

    /// Average color of the box of half-width `radius` around `(cx, cy)`,
    /// clipped to the frame. `None` if the centre itself is out of bounds.
    pub fn region_average(&self, cx: u32, cy: u32, radius: u32) -> Option<Rgb> {
        self.offset(cx, cy)?;
        if radius == 0 {
            return self.pixel(cx, cy);
        }

        let x0 = cx.saturating_sub(radius);
        let y0 = cy.saturating_sub(radius);
        let x1 = cx.saturating_add(radius).min(self.width - 1);
        let y1 = cy.saturating_add(radius).min(self.height - 1);

        let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(p) = self.pixel(x, y) {
                    r += p.r as u64;
                    g += p.g as u64;
                    b += p.b as u64;
                    n += 1;
                }
            }
        }

        (n > 0).then(|| Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8))
    }

    /// Pixels of `[start_x, end_x)` on row `y`; positions outside the frame are skipped.
    pub fn row_span(&self, y: u32, start_x: u32, end_x: u32) -> impl Iterator<Item = Rgb> + '_ {
        (start_x..end_x).filter_map(move |x| self.pixel(x, y))
    }
}

/// Produces frames for one client window.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self, region: Option<CaptureRegion>) -> Option<Frame>;
}

/// Always returns the same frame.
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    frame: Frame,
}

impl StaticFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn capture(&self, _region: Option<CaptureRegion>) -> Option<Frame> {
        Some(self.frame.clone())
    }
}

/// Hands out a fixed sequence of captures, then repeats the last one.
///
/// `None` entries simulate capture failures.
#[derive(Debug, Default)]
pub struct ScriptedFrameSource {
    script: Mutex<VecDeque<Option<Frame>>>,
    last: Mutex<Option<Frame>>,
}

impl ScriptedFrameSource {
    pub fn new(script: impl IntoIterator<Item = Option<Frame>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    pub fn push(&self, frame: Option<Frame>) {
        lock(&self.script).push_back(frame);
    }
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn capture(&self, _region: Option<CaptureRegion>) -> Option<Frame> {
        let next = lock(&self.script).pop_front();
        match next {
            Some(Some(frame)) => {
                *lock(&self.last) = Some(frame.clone());
                Some(frame)
            }
            Some(None) => None,
            None => lock(&self.last).clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let err = Frame::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, FrameError::BufferSize { expected: 16, .. }));
    }

    #[test]
    fn region_average_clips_at_edges() {
        let mut frame = Frame::solid(4, 4, Rgb::BLACK);
        frame.set_pixel(0, 0, Rgb::new(200, 100, 40));
        // box around (0,0) with radius 1 covers (0..=1, 0..=1): 4 pixels
        assert_eq!(frame.region_average(0, 0, 1), Some(Rgb::new(50, 25, 10)));
        assert_eq!(frame.region_average(4, 0, 1), None);
    }

    #[test]
    fn row_span_skips_out_of_bounds() {
        let mut frame = Frame::solid(5, 1, Rgb::BLACK);
        frame.fill_span(0, 3, 10, Rgb::WHITE);
        let span: Vec<_> = frame.row_span(0, 2, 8).collect();
        assert_eq!(span, vec![Rgb::BLACK, Rgb::WHITE, Rgb::WHITE]);
    }

    #[tokio::test]
    async fn scripted_source_repeats_last_frame() {
        let a = Frame::solid(1, 1, Rgb::WHITE);
        let source = ScriptedFrameSource::new([Some(a.clone()), None]);
        assert_eq!(source.capture(None).await, Some(a.clone()));
        assert_eq!(source.capture(None).await, None);
        assert_eq!(source.capture(None).await, Some(a));
    }
}
