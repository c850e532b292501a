//! Pipeline stages for cell-to-PNG rendering.
//!
//! Each submodule implements exactly one transformation step. The text
//! stages are pure functions over strings; only [`render`] touches the
//! filesystem or spawns processes.
//!
//! ## Data Flow
//!
//! ```text
//! cell text ──▶ assemble ──▶ document ──▶ render ──▶ {row}.png
//!               (vault, math,  (standalone  (xelatex, magick
//!                escape)        class)       or pdfium + fit)
//! ```
//!
//! 1. [`vault`]: hold math spans and intentional markup aside while a
//!    pass rewrites the rest
//! 2. [`math`]: repair the interior of one `$...$` span
//! 3. [`escape`]: make prose safe for LaTeX
//! 4. [`assemble`]: run the text passes in order and join lines
//! 5. [`document`]: wrap the body in a standalone document
//! 6. [`fit`]: place a rendered page on the exact output canvas
//! 7. [`render`]: compile, rasterize with fallbacks, verify, copy

pub mod assemble;
pub mod document;
pub mod escape;
pub mod fit;
pub mod math;
pub mod render;
pub mod vault;
