// Copyright 2024 Nathan Hoos
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::error::Result;
use crate::index::Index;
use crate::tokenizer::Tokenizer;
use std::sync::Arc;

/// Write instruction: append a fixed token sequence to the output. Emitted
/// when only one continuation is legal, in practice the end-of-sequence
/// token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub tokens: Vec<u32>,
}

impl Write {
    pub fn new(tokens: Vec<u32>) -> Self {
        Write { tokens }
    }
}

/// Generate instruction: sample the next token from `tokens`, or from the
/// whole vocabulary when `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generate {
    pub tokens: Option<Vec<u32>>,
}

impl Generate {
    pub fn new(tokens: Option<Vec<u32>>) -> Self {
        Generate { tokens }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Write(Write),
    Generate(Generate),
}

/// A generation guide: a finite-state view over decoding that tells the
/// sampler what may come next and tracks where generation stands.
/// Implementations hold no mutable state; the caller threads states
/// through.
pub trait Guide {
    fn initial_state(&self) -> i32;

    fn get_next_instruction(&self, state: i32) -> Instruction;

    fn get_next_state(&self, state: i32, token_id: u32) -> i32;

    fn is_final_state(&self, state: i32) -> bool;
}

/// Guide constrained by a regular expression, backed by a shared [`Index`].
#[derive(Debug, Clone)]
pub struct RegexGuide {
    index: Arc<Index>,
}

impl RegexGuide {
    /// Build the index for `pattern` and wrap it. Construction errors
    /// surface here; the resulting guide itself cannot fail.
    pub fn from_regex(
        pattern: &str,
        tokenizer: &impl Tokenizer,
        frozen_tokens: &[String],
    ) -> Result<Self> {
        let index = crate::build_index(pattern, tokenizer, frozen_tokens)?;
        Ok(RegexGuide { index })
    }

    pub fn from_index(index: Arc<Index>) -> Self {
        RegexGuide { index }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }
}

impl Guide for RegexGuide {
    fn initial_state(&self) -> i32 {
        self.index.initial_state()
    }

    fn get_next_instruction(&self, state: i32) -> Instruction {
        match self.index.allowed_tokens(state) {
            Some(tokens) => Instruction::Generate(Generate::new(Some(tokens))),
            None => Instruction::Write(Write::new(vec![self.index.eos_token_id()])),
        }
    }

    fn get_next_state(&self, state: i32, token_id: u32) -> i32 {
        self.index.next_state(state, token_id)
    }

    fn is_final_state(&self, state: i32) -> bool {
        self.index.is_final(state)
    }
}

/// The trivial guide: generate freely until the end-of-sequence token.
#[derive(Debug, Clone)]
pub struct StopAtEosGuide {
    eos_token_id: u32,
}

impl StopAtEosGuide {
    const FINAL_STATE: i32 = 1;

    pub fn new(eos_token_id: u32) -> Self {
        StopAtEosGuide { eos_token_id }
    }
}

impl Guide for StopAtEosGuide {
    fn initial_state(&self) -> i32 {
        0
    }

    fn get_next_instruction(&self, state: i32) -> Instruction {
        if self.is_final_state(state) {
            Instruction::Write(Write::new(vec![self.eos_token_id]))
        } else {
            Instruction::Generate(Generate::new(None))
        }
    }

    fn get_next_state(&self, state: i32, token_id: u32) -> i32 {
        if token_id == self.eos_token_id || state == Self::FINAL_STATE {
            Self::FINAL_STATE
        } else {
            self.initial_state()
        }
    }

    fn is_final_state(&self, state: i32) -> bool {
        state == Self::FINAL_STATE
    }
}
