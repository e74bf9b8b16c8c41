//! Screen capture for threat scans.
//!
//! Captures come back as PNG bytes; the dispatcher base64-encodes them before
//! they are sent to the API.

use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbaImage};
use thiserror::Error;

/// Pause before capturing so the UI can hide the conversation.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// One display known to the capture backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub index: usize,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureTarget {
    /// The primary display
    #[default]
    FullScreen,
    /// A display picked by the user, by index into [`ScreenCapture::displays`]
    Display(usize),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no displays available")]
    NoDisplays,
    #[error("unknown display: {0}")]
    UnknownDisplay(usize),
    #[error("capture failed: {0}")]
    Backend(String),
    #[error("could not encode screenshot: {0}")]
    Encode(String),
}

/// Screenshot provider.
///
/// Both methods block; callers run them off the UI task.
pub trait ScreenCapture: Send + Sync {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    fn capture_png(&self, target: CaptureTarget) -> Result<Vec<u8>, CaptureError>;
}

/// Real capture backend built on the `screenshots` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCapture;

impl SystemCapture {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenCapture for SystemCapture {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        let screens = screenshots::Screen::all()
            .map_err(|e| CaptureError::Backend(format!("screen enumeration failed: {e}")))?;

        Ok(screens
            .iter()
            .enumerate()
            .map(|(index, screen)| DisplayInfo {
                index,
                name: format!("Display {}", index + 1),
                width: screen.display_info.width,
                height: screen.display_info.height,
                is_primary: screen.display_info.is_primary,
            })
            .collect())
    }

    fn capture_png(&self, target: CaptureTarget) -> Result<Vec<u8>, CaptureError> {
        let screens = screenshots::Screen::all()
            .map_err(|e| CaptureError::Backend(format!("screen enumeration failed: {e}")))?;
        if screens.is_empty() {
            return Err(CaptureError::NoDisplays);
        }

        let screen = match target {
            CaptureTarget::FullScreen => screens
                .iter()
                .find(|screen| screen.display_info.is_primary)
                .or_else(|| screens.first())
                .ok_or(CaptureError::NoDisplays)?,
            CaptureTarget::Display(index) => screens
                .get(index)
                .ok_or(CaptureError::UnknownDisplay(index))?,
        };

        let captured = screen
            .capture()
            .map_err(|e| CaptureError::Backend(format!("screen capture failed: {e}")))?;
        let width = captured.width();
        let height = captured.height();

        encode_png(width, height, captured.into_raw())
    }
}

/// Encode raw RGBA pixels as PNG
pub fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>, CaptureError> {
    let image = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        CaptureError::Encode(format!("pixel buffer does not match {width}x{height}"))
    })?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(png)
}

pub fn to_base64(png: &[u8]) -> String {
    STANDARD.encode(png)
}
