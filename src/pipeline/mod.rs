//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on
//! its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ (render ──▶ encode) ──▶ llm ──▶ postprocess
//! (base64)   (image/pdf)    (PDF page 1 → PNG)    (model)  (JSON)
//! ```
//!
//! 1. [`input`]       — decode the base64 upload, resolve its MIME type
//! 2. [`normalize`]   — classify image vs PDF, apply the PDF policy
//! 3. [`render`]      — rasterise page one via pdfium (`spawn_blocking`)
//! 4. [`encode`]      — PNG-encode the rendered page
//! 5. [`llm`]         — backend trait and retry/backoff loop; the
//!    [`gemini`] and [`provider`] modules implement the trait
//! 6. [`postprocess`] — strip fences and parse the answer as JSON

pub mod encode;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod provider;
pub mod render;
