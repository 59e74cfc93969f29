//! Program sequencer: turns G-code source into a chain of parsed blocks.

use crate::{
    block::{Block, ParseFailure},
    machine::Machine,
};
use std::{fmt, path::Path, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A block that did not parse cleanly.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("line {line}: {source}")]
pub struct Diagnostic {
    /// 1-based line in the source text
    pub line: usize,
    /// Position of the block in the program
    pub index: usize,
    pub source: ParseFailure,
}

#[derive(Debug, Clone)]
pub struct Program<'m> {
    machine: &'m Machine,
    blocks: Vec<Block<'m>>,
    diagnostics: Vec<Diagnostic>,
    cursor: usize,
}

impl<'m> Program<'m> {
    /// Parse every motion line of `source`.
    ///
    /// Blank and comment-only lines are skipped. A block that fails to parse
    /// stays in the chain, so the blocks after it still inherit its modal
    /// state, and its failure is recorded as a [`Diagnostic`].
    pub fn parse(source: &str, machine: &'m Machine) -> Self {
        let mut blocks: Vec<Block<'m>> = Vec::new();
        let mut diagnostics = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            if fresa_gcode::words(line).next().is_none() {
                continue;
            }
            let mut block = Block::new(line, blocks.last(), machine);
            if let Err(failure) = block.parse() {
                tracing::warn!(line = idx + 1, errors = failure.count(), "{failure}");
                for err in &failure.errors {
                    tracing::debug!(line = idx + 1, %err);
                }
                diagnostics.push(Diagnostic {
                    line: idx + 1,
                    index: blocks.len(),
                    source: failure,
                });
            }
            blocks.push(block);
        }

        tracing::info!(
            blocks = blocks.len(),
            invalid = diagnostics.len(),
            "program parsed"
        );

        Self {
            machine,
            blocks,
            diagnostics,
            cursor: 0,
        }
    }

    pub fn load(path: impl AsRef<Path>, machine: &'m Machine) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loading program");
        Ok(Self::parse(&source, machine))
    }

    pub fn machine(&self) -> &'m Machine {
        self.machine
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block<'m>] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block<'m>> {
        self.blocks.get(index)
    }

    /// The block `index` was derived from.
    pub fn previous(&self, index: usize) -> Option<&Block<'m>> {
        index.checked_sub(1).and_then(|i| self.blocks.get(i))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Whether block `index` exists and parsed without errors.
    pub fn is_valid(&self, index: usize) -> bool {
        index < self.blocks.len() && !self.diagnostics.iter().any(|d| d.index == index)
    }

    /// Advance the cursor, returning the block under it.
    pub fn next_block(&mut self) -> Option<&Block<'m>> {
        let block = self.blocks.get(self.cursor)?;
        self.cursor += 1;
        Some(block)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl fmt::Display for Program<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        Ok(())
    }
}
