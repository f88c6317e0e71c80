//! Pipeline stages for PDF-to-scan conversion.
//!
//! Each submodule implements exactly one step. Keeping them separate makes
//! each independently testable and lets the rasteriser be swapped without
//! touching the effect stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ scan (effects…) ──▶ assemble
//! (URL/path) (pdfium)   (8 stages)          (lopdf)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL
//! 2. [`render`]   — rasterise pages behind the [`render::PageRasterizer`] trait
//! 3. [`scan`]     — run the eight effect stages on one page, seeded
//! 4. [`effects`]  — the individual stages as pure image functions
//! 5. [`assemble`] — embed each page image in a fresh PDF, in input order

pub mod assemble;
pub mod effects;
pub mod input;
pub mod render;
pub mod scan;
