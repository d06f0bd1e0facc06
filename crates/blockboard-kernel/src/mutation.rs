//! Pure document mutation.
//!
//! A [`Mutation`] rewrites value slots of the selected blocks and reports
//! whether anything actually changed. It does no I/O and never touches its
//! input, so the update loop can re-run it against every freshly fetched
//! base without accumulating side effects.

use regex::Regex;

use blockboard_types::{BlockSelector, Document, Field, FieldIndex};

/// Precondition failures. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("no block matches selector {selector}")]
    NoMatchingBlock { selector: String },

    #[error("block '{block_id}' is missing fields")]
    MissingFields { block_id: String },

    #[error("field pair {pair} of block '{block_id}' is out of range (block has {len} fields)")]
    FieldIndexOutOfRange {
        block_id: String,
        pair: usize,
        len: usize,
    },

    #[error("invalid guard pattern '{pattern}': {source}")]
    InvalidGuard {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result of applying a [`Mutation`].
#[derive(Debug, Clone)]
pub struct Mutated {
    pub document: Document,
    /// False when the output is deeply equal to the input.
    pub changed: bool,
}

/// Rewrite value slots of the selected blocks to `value`.
#[derive(Debug, Clone)]
pub struct Mutation {
    selector: BlockSelector,
    index: FieldIndex,
    value: String,
    guard: Option<Regex>,
}

impl Mutation {
    pub fn new(selector: BlockSelector, index: FieldIndex, value: impl Into<String>) -> Self {
        Self {
            selector,
            index,
            value: value.into(),
            guard: None,
        }
    }

    /// Only rewrite slots whose current text matches `guard`.
    pub fn with_guard(mut self, guard: Regex) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Compile and attach a guard pattern.
    pub fn with_guard_pattern(self, pattern: &str) -> Result<Self, MutationError> {
        let guard = Regex::new(pattern).map_err(|source| MutationError::InvalidGuard {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self.with_guard(guard))
    }

    pub fn selector(&self) -> &BlockSelector {
        &self.selector
    }

    pub fn index(&self) -> FieldIndex {
        self.index
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Apply to `document`, returning the new document and whether it differs.
    pub fn apply(&self, document: &Document) -> Result<Mutated, MutationError> {
        let targets = document.select(&self.selector);
        if targets.is_empty() {
            return Err(MutationError::NoMatchingBlock {
                selector: self.selector.to_string(),
            });
        }

        let mut next = document.clone();
        for i in targets {
            let block = &mut next.blocks_mut()[i];
            let block_id = block.id().unwrap_or_default().to_string();
            let Some(fields) = block.fields_mut() else {
                return Err(MutationError::MissingFields { block_id });
            };

            match self.index {
                FieldIndex::Pair(pair) => {
                    let len = fields.len();
                    match FieldIndex::value_slot(pair) {
                        Some(slot) if slot < len => self.rewrite(&mut fields[slot]),
                        _ => {
                            return Err(MutationError::FieldIndexOutOfRange {
                                block_id,
                                pair,
                                len,
                            });
                        }
                    }
                }
                FieldIndex::All => {
                    for field in fields.iter_mut().skip(1).step_by(2) {
                        self.rewrite(field);
                    }
                }
            }
        }

        let changed = next != *document;
        Ok(Mutated {
            document: next,
            changed,
        })
    }

    fn rewrite(&self, field: &mut Field) {
        if let Some(guard) = &self.guard
            && !guard.is_match(field.text_or_empty())
        {
            return;
        }
        field.set_text(self.value.as_str());
    }
}
