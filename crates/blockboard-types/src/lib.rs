//! Document and identity types for blockboard.
//!
//! This crate is the leaf of the workspace: the JSON block document that is
//! committed to a branch and mirrored into a chat message, the selectors used
//! to address blocks within it, and the small typed identifiers that name
//! branches, commits, and messages. It does no I/O.
//!
//! # Overview
//!
//! ```text
//! Branch (BranchName) ← the document's address
//!     └── head commit (CommitId)
//!           └── blocks.json → Document
//!                 └── Block (block_id) ← addressed by BlockSelector
//!                       └── Field pairs: label at 2k, value at 2k+1
//!
//! Chat message (MessageRef = channel + ts) ← projection of the Document
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Document`]      | Ordered blocks, lossless JSON round trip     |
//! | [`Block`]         | Addressable group of label/value fields      |
//! | [`Field`]         | One text slot (unknown keys preserved)       |
//! | [`BlockSelector`] | Exact id or compiled pattern                 |
//! | [`FieldIndex`]    | One field pair, or every value slot          |
//! | [`BranchName`]    | Branch holding one document                  |
//! | [`CommitId`]      | Resolved commit of a branch head             |
//! | [`MessageRef`]    | Chat message address (channel + ts)          |
//! |-------------------|----------------------------------------------|

pub mod document;
pub mod ids;
pub mod selector;

pub use document::{Block, Document, DocumentError, Field};
pub use ids::{BranchName, BranchNameError, CommitId, MessageRef};
pub use selector::{BlockSelector, FieldIndex, SelectorError};
