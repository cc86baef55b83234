use anyhow::Result;
use async_trait::async_trait;

use crate::event::{MessageEvent, Reply};

/// A command published in the platform's command list.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
}

/// Source of the platform's published command list.
#[async_trait]
pub trait CommandCatalog: Send + Sync {
    async fn published_commands(&self) -> Result<Vec<CommandDescriptor>>;
}

/// Reply prefix shown before a suggested command.
const SUGGEST_PREFIX: &str = "Sorry, I don't know that command. Did you mean:";

/// Pick the published command most similar to `input`.
///
/// Highest ratio wins; on a tie the candidate published first is kept, so the
/// result is deterministic for any candidate order.
pub fn closest<'a>(input: &str, candidates: &'a [CommandDescriptor]) -> Option<&'a CommandDescriptor> {
    let mut best: Option<(usize, &CommandDescriptor)> = None;
    for candidate in candidates {
        let score = ratio(input, &candidate.name);
        match best {
            Some((top, _)) if score <= top => {}
            _ => best = Some((score, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// Build the suggestion reply for an unknown command.
pub fn suggestion_reply(event: &MessageEvent, descriptor: &CommandDescriptor) -> Reply {
    Reply::to_silent(
        event,
        format!(
            "{SUGGEST_PREFIX}\n/{} {}",
            descriptor.name, descriptor.description
        ),
    )
}

/// Symmetric similarity ratio on a 0..=100 scale.
pub fn ratio(a: &str, b: &str) -> usize {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 100;
    }
    (total - levenshtein(a, b)) * 100 / total
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row dynamic programming over the edit matrix.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
