// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Asking the user to choose between cached accounts.

use crate::Result;
use crate::errors;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// An option presented to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Choice {
    /// Ignore the cached credentials and authorize a new one.
    StartNew,
    /// Reuse the cached credential for this account.
    Account(String),
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::StartNew => write!(f, "start new"),
            Choice::Account(email) => write!(f, "{email}"),
        }
    }
}

/// Presents a list of choices and waits for the user to pick one.
#[async_trait::async_trait]
pub trait Prompt: std::fmt::Debug + Send + Sync {
    /// Returns the index of the selected choice, or `None` if the user
    /// cancelled the selection.
    async fn select(&self, choices: &[Choice]) -> Result<Option<usize>>;
}

/// A [Prompt] on the terminal.
///
/// The menu is written to stderr and the selection read from stdin. An
/// empty line, the end of input, or anything other than a listed number
/// cancels the selection.
#[derive(Clone, Debug, Default)]
pub struct ConsolePrompt;

#[async_trait::async_trait]
impl Prompt for ConsolePrompt {
    async fn select(&self, choices: &[Choice]) -> Result<Option<usize>> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(render(choices).as_bytes())
            .await
            .map_err(errors::non_transient)?;
        stderr.flush().await.map_err(errors::non_transient)?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(errors::non_transient)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(parse_selection(&line, choices.len()))
    }
}

fn render(choices: &[Choice]) -> String {
    let mut menu = String::from("Select an account:\n");
    for (i, c) in choices.iter().enumerate() {
        menu.push_str(&format!("  {}) {c}\n", i + 1));
    }
    menu.push_str("Enter a number (empty to cancel): ");
    menu
}

// Choices are numbered from 1.
fn parse_selection(line: &str, count: usize) -> Option<usize> {
    match line.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}
