//! OLED panel presenter.

use airbuddy_hw::{Framebuffer, OledDevice, OLED_HEIGHT, OLED_WIDTH};
use anyhow::Result;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Presenter, Screen};
use crate::rendering::{Canvas, TextRenderer};

const SMALL: f32 = 10.0;
const BODY: f32 = 12.0;
const LARGE: f32 = 22.0;
const BAR: f32 = 14.0;
/// Spacing for plain text pages.
const LINE_PITCH: i32 = 16;

/// One positioned line of text.
#[derive(Debug, Clone, PartialEq)]
struct TextLine {
    y: i32,
    size: f32,
    text: String,
    centered: bool,
}

impl TextLine {
    fn centered(y: i32, size: f32, text: impl Into<String>) -> Self {
        Self {
            y,
            size,
            text: text.into(),
            centered: true,
        }
    }

    fn left(y: i32, size: f32, text: impl Into<String>) -> Self {
        Self {
            y,
            size,
            text: text.into(),
            centered: false,
        }
    }
}

/// Places a screen's text on the 128x64 panel.
fn layout(screen: &Screen) -> Vec<TextLine> {
    match screen {
        Screen::Booting { filled } => vec![
            TextLine::centered(0, LARGE, "airBuddy"),
            TextLine::centered(36, BAR, super::booter::bar(*filled)),
        ],
        Screen::Busy { .. } => {
            let lines = screen.lines();
            let top = (OLED_HEIGHT as i32 - lines.len() as i32 * BODY as i32) / 2;
            lines
                .into_iter()
                .enumerate()
                .map(|(i, line)| TextLine::centered(top + i as i32 * BODY as i32, BODY, line))
                .collect()
        }
        Screen::Metric {
            label,
            value,
            freshness,
        } => vec![
            TextLine::left(0, BODY, label.as_str()),
            TextLine::centered(20, LARGE, value.as_str()),
            TextLine::centered(50, SMALL, *freshness),
        ],
        Screen::Face { rating, freshness } => vec![
            TextLine::centered(4, LARGE, super::face_for(*rating)),
            TextLine::centered(32, BODY, rating.as_str()),
            TextLine::centered(50, SMALL, *freshness),
        ],
        _ => screen
            .lines()
            .into_iter()
            .enumerate()
            .map(|(i, line)| TextLine::left(i as i32 * LINE_PITCH, BODY, line))
            .collect(),
    }
}

struct PanelInner {
    canvas: Canvas,
    framebuffer: Framebuffer,
    device: Option<OledDevice>,
    flush_failing: bool,
}

/// Renders screens with a TrueType font and pushes them to the OLED.
///
/// Without a device it still renders, so the web preview keeps working.
pub struct PanelPresenter {
    font: TextRenderer,
    inner: Mutex<PanelInner>,
}

impl PanelPresenter {
    pub fn new(font: TextRenderer, device: Option<OledDevice>) -> Result<Self> {
        if device.is_none() {
            info!("No OLED attached, rendering headless");
        }
        Ok(Self {
            font,
            inner: Mutex::new(PanelInner {
                canvas: Canvas::new(OLED_WIDTH as u32, OLED_HEIGHT as u32)?,
                framebuffer: Framebuffer::new(),
                device,
                flush_failing: false,
            }),
        })
    }
}

impl Presenter for PanelPresenter {
    fn show(&self, screen: &Screen) {
        let mut inner = self.inner.lock().unwrap();
        let PanelInner {
            canvas,
            framebuffer,
            device,
            flush_failing,
        } = &mut *inner;

        canvas.clear();
        for line in layout(screen) {
            if line.centered {
                canvas.draw_text_centered(&self.font, line.y, &line.text, line.size);
            } else {
                canvas.draw_text(&self.font, 0, line.y, &line.text, line.size);
            }
        }

        let Some(device) = device.as_mut() else {
            return;
        };
        if let Err(e) = canvas.render_to_framebuffer(framebuffer) {
            warn!("Failed to convert frame: {}", e);
            return;
        }
        match device.flush(framebuffer) {
            Ok(()) => {
                if std::mem::take(flush_failing) {
                    info!("OLED recovered");
                }
            }
            Err(e) => {
                if *flush_failing {
                    debug!("OLED flush failed: {}", e);
                } else {
                    warn!("OLED flush failed: {}", e);
                    *flush_failing = true;
                }
            }
        }
    }

    fn snapshot_png(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        match inner.canvas.to_png() {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Failed to encode screen PNG: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Rating;
    use crate::rendering::SYSTEM_FONT;

    #[test]
    fn test_metric_layout() {
        let lines = layout(&Screen::Metric {
            label: "eCO2".into(),
            value: "612 ppm".into(),
            freshness: "cached",
        });
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TextLine::left(0, BODY, "eCO2"));
        assert_eq!(lines[1].text, "612 ppm");
        assert!(lines[1].centered);
        assert_eq!(lines[2].text, "cached");
    }

    #[test]
    fn test_face_layout() {
        let lines = layout(&Screen::Face {
            rating: Rating::VeryGood,
            freshness: "just now",
        });
        assert_eq!(lines[0].text, "(^_^)");
        assert_eq!(lines[1].text, "Very good");
    }

    #[test]
    fn test_busy_layout_is_vertically_centered() {
        let lines = layout(&Screen::Busy { frame: 4 });
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].y, (64 - 36) / 2);
        assert_eq!(lines[2].y, lines[0].y + 24);
    }

    #[test]
    fn test_boot_layout() {
        let lines = layout(&Screen::Booting { filled: 12 });
        assert_eq!(lines[0].text, "airBuddy");
        assert_eq!(lines[1].text, "█".repeat(12));
        assert!(lines[1].centered);
    }

    #[test]
    fn test_text_page_layout() {
        let lines = layout(&Screen::Settings {
            lines: vec!["a".into(), "b".into(), "c".into()],
        });
        let ys: Vec<i32> = lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![0, 16, 32]);
    }

    #[test]
    #[ignore] // Requires the DejaVu fonts package
    fn test_headless_snapshot() {
        let font = TextRenderer::from_file(SYSTEM_FONT).unwrap();
        let presenter = PanelPresenter::new(font, None).unwrap();
        presenter.show(&Screen::Booting { filled: 6 });
        let png = presenter.snapshot_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
