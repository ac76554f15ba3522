//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements one step; [`crate::convert`] drives them in order.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ metadata ──▶ diagrams ──▶ html ──▶ pdf
//! (read)    (title,…)    (mmdc)       (pandoc)  (chrome)
//!                  ▲
//!                fence (tokenizer shared by metadata and diagrams)
//! ```
//!
//! 1. [`input`]    — validate and load the source file
//! 2. [`metadata`] — title, author, email, abstract; optional list fix-ups
//! 3. [`fence`]    — split text into prose, code blocks and Mermaid blocks
//! 4. [`diagrams`] — render each Mermaid block and splice in an `<img>`
//! 5. [`html`]     — Pandoc to standalone HTML with the print stylesheet
//! 6. [`pdf`]      — headless Chrome print, validated and moved into place

pub mod diagrams;
pub mod fence;
pub mod html;
pub mod input;
pub mod metadata;
pub mod pdf;
