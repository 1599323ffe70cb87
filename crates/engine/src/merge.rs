//! Memory merge/truncation policy.
//!
//! Combines persisted session history with inline caller-supplied context
//! under a bounded retention policy. Stored history always precedes inline
//! context; relative order within each source is preserved; the result is
//! chronological.

use agentgate_core::agent::MemoryPolicy;
use agentgate_core::event::MemoryEvent;

/// Merge stored and inline events, then truncate per `policy`.
///
/// The message-count bound applies first: only the last `max_messages`
/// entries survive (0 retains none). The character bound then walks the
/// survivors from most-recent to least-recent, accumulating content length
/// (in chars); the walk stops at the first entry that would push the total
/// past `max_chars` — that entry and everything older is dropped.
pub fn merge_events(
    stored: &[MemoryEvent],
    inline: &[MemoryEvent],
    policy: &MemoryPolicy,
) -> Vec<MemoryEvent> {
    let mut combined: Vec<MemoryEvent> = Vec::with_capacity(stored.len() + inline.len());
    combined.extend_from_slice(stored);
    combined.extend_from_slice(inline);

    // Message-count bound first.
    let max_messages = policy.max_messages as usize;
    if combined.len() > max_messages {
        combined.drain(..combined.len() - max_messages);
    }

    // Character bound, newest to oldest.
    let max_chars = policy.max_chars as usize;
    let mut total = 0usize;
    let mut kept = 0usize;
    for event in combined.iter().rev() {
        total += event.content.chars().count();
        if total > max_chars {
            break;
        }
        kept += 1;
    }
    if kept < combined.len() {
        combined.drain(..combined.len() - kept);
    }

    combined
}
