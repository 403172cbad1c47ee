//! Access rules for snippets, kept as pure functions so handlers and tests
//! share one definition of who may see or change what.

use uuid::Uuid;

use super::repo::Snippet;

/// Only the creator of a snippet owns it; anonymous requesters own nothing.
pub fn is_owner(requester: Option<Uuid>, snippet: &Snippet) -> bool {
    requester == Some(snippet.owner.id)
}

/// Public snippets are visible to everyone, private ones to their owner only.
pub fn is_visible(requester: Option<Uuid>, snippet: &Snippet) -> bool {
    snippet.public || is_owner(requester, snippet)
}
