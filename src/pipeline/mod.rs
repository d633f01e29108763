//! Pipeline stages for converting one input file.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the runner in [`crate::batch`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ ocr ──▶ render
//! (walk/read) (base64)  (HTTP)  (Markdown file)
//! ```
//!
//! 1. [`input`]: enumerate the input root and read file bytes
//! 2. [`encode`]: wrap bytes in a `data:` URL document reference
//! 3. [`ocr`]: the OCR capability trait and its HTTP client
//! 4. [`render`]: assemble `## Page N` sections and write them atomically

pub mod encode;
pub mod input;
pub mod ocr;
pub mod render;
