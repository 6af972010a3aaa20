//! Input image providers and the capture fallback policy.

mod capture;
#[cfg(feature = "camera")]
mod nokhwa_backend;
mod pattern;
#[cfg(all(feature = "screen", unix, not(target_os = "macos")))]
mod x11_screen;

pub use capture::{CaptureBackend, CaptureConfig, CaptureSource, ThreadedCapture};
#[cfg(feature = "camera")]
pub use nokhwa_backend::{CameraInfo, NokhwaCapture};
pub use pattern::PatternSource;
#[cfg(all(feature = "screen", unix, not(target_os = "macos")))]
pub use x11_screen::X11Screen;

use crate::frame::SourceFrame;
use tracing::info;

/// Anything that can supply the current input image.
///
/// `try_grab` is a best-effort poll: it must return promptly and reports a
/// transient failure as `None` rather than blocking.
pub trait SourceProvider {
    fn try_grab(&mut self) -> Option<SourceFrame>;
}

/// Where the image currently in the base texture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    Capture,
    Pattern,
}

/// What the frame driver has to do with the base texture this frame.
#[derive(Debug, PartialEq, Eq)]
pub enum SourceUpdate<'a> {
    /// New content; upload it.
    Upload { frame: &'a SourceFrame, origin: FrameOrigin },
    /// The base texture already holds the image to show.
    Keep,
}

/// Capture first, then the last good capture, then the synthetic pattern.
pub struct FrameSource {
    capture: Option<Box<dyn SourceProvider>>,
    fallback: PatternSource,
    last_capture: Option<SourceFrame>,
    showing: Option<FrameOrigin>,
}

impl FrameSource {
    pub fn new(capture: Option<Box<dyn SourceProvider>>, fallback: PatternSource) -> Self {
        Self {
            capture,
            fallback,
            last_capture: None,
            showing: None,
        }
    }

    /// Polls the capture provider once and decides what to display.
    pub fn acquire(&mut self) -> SourceUpdate<'_> {
        if let Some(frame) = self.capture.as_mut().and_then(|capture| capture.try_grab()) {
            if self.showing != Some(FrameOrigin::Capture) {
                info!("Displaying captured frames ({}x{})", frame.width, frame.height);
            }
            self.showing = Some(FrameOrigin::Capture);
            let frame = self.last_capture.insert(frame);
            return SourceUpdate::Upload {
                frame,
                origin: FrameOrigin::Capture,
            };
        }

        if self.last_capture.is_some() || self.showing == Some(FrameOrigin::Pattern) {
            return SourceUpdate::Keep;
        }

        info!("No captured frame available, showing the test pattern");
        self.showing = Some(FrameOrigin::Pattern);
        SourceUpdate::Upload {
            frame: self.fallback.frame(),
            origin: FrameOrigin::Pattern,
        }
    }

    pub fn showing(&self) -> Option<FrameOrigin> {
        self.showing
    }

    /// The image that should be on screen after the last `acquire`.
    pub fn current(&self) -> Option<&SourceFrame> {
        match self.showing? {
            FrameOrigin::Capture => self.last_capture.as_ref(),
            FrameOrigin::Pattern => Some(self.fallback.frame()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of grabs.
    struct Scripted(VecDeque<Option<SourceFrame>>);

    impl SourceProvider for Scripted {
        fn try_grab(&mut self) -> Option<SourceFrame> {
            self.0.pop_front().flatten()
        }
    }

    fn scripted(frames: Vec<Option<SourceFrame>>) -> Option<Box<dyn SourceProvider>> {
        Some(Box::new(Scripted(frames.into())))
    }

    #[test]
    fn without_capture_the_pattern_is_uploaded_once() {
        let mut source = FrameSource::new(None, PatternSource::gradient(4, 4));
        match source.acquire() {
            SourceUpdate::Upload { frame, origin } => {
                assert_eq!(origin, FrameOrigin::Pattern);
                assert_eq!(frame.size(), (4, 4));
            }
            SourceUpdate::Keep => panic!("first frame must upload"),
        }
        assert_eq!(source.acquire(), SourceUpdate::Keep);
        assert_eq!(source.showing(), Some(FrameOrigin::Pattern));
    }

    #[test]
    fn failed_grab_keeps_previous_capture() {
        let red = SourceFrame::solid(2, 2, [255, 0, 0, 255]);
        let mut source = FrameSource::new(scripted(vec![Some(red.clone()), None]), PatternSource::gradient(4, 4));

        assert!(matches!(source.acquire(), SourceUpdate::Upload { origin: FrameOrigin::Capture, .. }));
        assert_eq!(source.acquire(), SourceUpdate::Keep);
        assert_eq!(source.current(), Some(&red));
        assert_eq!(source.showing(), Some(FrameOrigin::Capture));
    }

    #[test]
    fn capture_recovers_after_pattern() {
        let blue = SourceFrame::solid(8, 8, [0, 0, 255, 255]);
        let mut source = FrameSource::new(scripted(vec![None, None, Some(blue.clone())]), PatternSource::gradient(4, 4));

        assert!(matches!(source.acquire(), SourceUpdate::Upload { origin: FrameOrigin::Pattern, .. }));
        assert_eq!(source.acquire(), SourceUpdate::Keep);
        match source.acquire() {
            SourceUpdate::Upload { frame, origin } => {
                assert_eq!(origin, FrameOrigin::Capture);
                assert_eq!(frame, &blue);
            }
            SourceUpdate::Keep => panic!("capture should replace the pattern"),
        }
    }
}
