//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own with stand-in programs in place of the real toolchain.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ render ──▶ rewrite ──▶ produce
//! (paths)   (fences)   (mermaid)  (![](…))   (md-to-pdf │ pandoc)
//! ```
//!
//! 1. [`input`]   — absolute-path checks, derived output path, readability
//! 2. [`extract`] — locate fenced diagram blocks and their byte spans
//! 3. [`render`]  — one diagram-renderer invocation per block, in the
//!    [`workdir`] scratch directory
//! 4. [`rewrite`] — swap each block's span for an image reference and
//!    persist the intermediate document
//! 5. [`produce`] — primary PDF renderer, falling back to the converter
//!
//! [`command`] is the shared subprocess runner used by stages 3 and 5.

pub mod command;
pub mod extract;
pub mod input;
pub mod produce;
pub mod render;
pub mod rewrite;
pub mod workdir;
