//! `blockgram_core` is the engine behind [blockgram](https://github.com/ifiokjr/blockgram). It parses documents made of HTML interleaved with block delimiter comments into a tree of typed blocks, serializes that tree back to canonical markup, validates stored markup against what each block would render today and migrates blocks written by older versions of a block type.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Document
//!   → Lexer (finds `<!-- block:… -->` delimiter comments)
//!   → Parser (builds the raw block tree with an explicit stack)
//!   → Matcher (resolves attributes from the delimiter JSON and the inner markup)
//!   → Validator (compares stored markup with the block's render output)
//!   → Migrator (tries deprecated variants when validation fails)
//!   → Serializer (writes canonical delimiter-wrapped markup)
//! ```
//!
//! Raw HTML, markdown and shortcode text enter through [`ingest_raw_html`],
//! which cleans the markup and maps each top-level element to a block.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loaded from `blockgram.toml`.
//! - [`library`]: The built-in `core/*` block types.
//! - [`dom`] and [`selector`]: A small fragment DOM and the CSS selector subset attribute schemas use.
//! - [`html_tokenizer`]: The HTML tokenizer shared by the DOM and the validator.
//! - [`filters`]: DOM filters used during ingestion.
//! - [`shortcode`]: Bracket shortcode parsing.
//!
//! ## Key Types
//!
//! - [`RawBlockNode`]: A block as written in the document.
//! - [`ParsedBlock`]: A block with resolved attributes and a validation verdict.
//! - [`BlockType`]: The schema, render function and deprecations of a kind of block.
//! - [`BlockTypeRegistry`]: Lookup of block types by name.
//! - [`RichText`]: Text with formatting spans kept apart.
//!
//! ## Quick Start
//!
//! ```rust
//! use blockgram_core::library::core_registry;
//! use blockgram_core::parse_and_validate;
//! use blockgram_core::serialize;
//!
//! let registry = core_registry();
//! let document = "<!-- block:paragraph -->\n<p>Hello</p>\n<!-- /block:paragraph -->";
//! let blocks = parse_and_validate(document, &registry);
//!
//! assert!(blocks[0].is_valid);
//! assert_eq!(serialize(&blocks, &registry), document);
//! ```

pub use config::*;
pub use engine::*;
pub use error::*;
pub use ingest::*;
pub use parser::*;
pub use position::*;
pub use rich_text::*;
pub use schema::*;
pub use serializer::*;
pub use validation::*;

pub mod config;
pub mod dom;
mod engine;
pub mod entities;
#[allow(unused_assignments)]
mod error;
pub mod filters;
pub mod html_tokenizer;
mod ingest;
pub(crate) mod lexer;
pub mod library;
pub mod matcher;
pub mod migration;
mod parser;
mod position;
mod rich_text;
mod schema;
pub mod selector;
mod serializer;
pub mod shortcode;
pub(crate) mod tokens;
mod validation;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
