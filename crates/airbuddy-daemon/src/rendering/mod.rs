//! Rendering module for the panel canvas and text.

#![allow(dead_code)]

mod canvas;
mod text;

pub use canvas::Canvas;
pub use text::TextRenderer;

#[cfg(test)]
pub(crate) use text::tests::SYSTEM_FONT;
