use anyhow::Result;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::warn;

use crate::core::models::{Mention, MentionKind};
use crate::core::store::Store;

// `@@` is tried first so `@@bob` never also yields `@bob`.
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@@(\w+)|@(\w+)").expect("mention pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMention {
    pub kind: MentionKind,
    pub username: String,
    pub position: usize,
}

/// Mention tokens in left-to-right order. `position` is a byte offset.
pub fn parse(content: &str) -> Vec<ParsedMention> {
    MENTION_PATTERN
        .captures_iter(content)
        .filter_map(|caps| {
            let position = caps.get(0)?.start();
            if let Some(name) = caps.get(1) {
                Some(ParsedMention {
                    kind: MentionKind::AiRole,
                    username: name.as_str().to_string(),
                    position,
                })
            } else {
                caps.get(2).map(|name| ParsedMention {
                    kind: MentionKind::User,
                    username: name.as_str().to_string(),
                    position,
                })
            }
        })
        .collect()
}

/// Removes the first case-insensitive `@@username` plus trailing whitespace.
/// Returns the original content if nothing would be left.
pub fn strip(content: &str, username: &str) -> String {
    let pattern = format!(r"@@{}\b\s*", regex::escape(username));
    let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
        return content.to_string();
    };
    let stripped = re.replacen(content, 1, "").trim().to_string();
    if stripped.is_empty() {
        content.to_string()
    } else {
        stripped
    }
}

pub struct MentionResolver {
    store: Store,
}

impl MentionResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolves tokens against the organization's users. Unknown usernames
    /// are dropped and stay literal text in the message.
    pub async fn resolve(&self, content: &str, org_id: &str) -> Result<Vec<Mention>> {
        let mut mentions = Vec::new();
        for token in parse(content) {
            match self.store.find_user_by_username(org_id, &token.username).await? {
                Some(user) => mentions.push(Mention {
                    kind: token.kind,
                    user_id: user.id,
                    username: token.username,
                    position: token.position,
                }),
                None => warn!(
                    "Mention @{} does not match a user in org {}, ignoring",
                    token.username, org_id
                ),
            }
        }
        Ok(mentions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Organization, User};

    #[test]
    fn double_at_is_a_single_role_mention() {
        let parsed = parse("@@bob hi");
        assert_eq!(
            parsed,
            vec![ParsedMention {
                kind: MentionKind::AiRole,
                username: "bob".to_string(),
                position: 0,
            }]
        );
    }

    #[test]
    fn mixed_mentions_keep_order_and_offsets() {
        let parsed = parse("hey @alice, ask @@legal_bot and @carol");
        let summary: Vec<(MentionKind, &str, usize)> = parsed
            .iter()
            .map(|p| (p.kind, p.username.as_str(), p.position))
            .collect();
        assert_eq!(
            summary,
            vec![
                (MentionKind::User, "alice", 4),
                (MentionKind::AiRole, "legal_bot", 16),
                (MentionKind::User, "carol", 32),
            ]
        );
    }

    #[test]
    fn no_token_is_counted_twice() {
        for content in ["@@x", "@@x @@x", "a@@@x", "@@x@y", "@@@@x"] {
            let parsed = parse(content);
            let mut spans: Vec<usize> = parsed.iter().map(|p| p.position).collect();
            spans.dedup();
            assert_eq!(spans.len(), parsed.len(), "duplicate span in {:?}", content);
            for p in &parsed {
                if p.username == "x" {
                    assert_eq!(p.kind, MentionKind::AiRole, "in {:?}", content);
                }
            }
        }
    }

    #[test]
    fn strip_removes_one_case_insensitive_token() {
        assert_eq!(strip("@@legal please review", "legal"), "please review");
        assert_eq!(strip("@@LEGAL please review", "legal"), "please review");
        assert_eq!(strip("ask @@legal  now @@legal", "legal"), "ask now @@legal");
        assert_eq!(strip("@@legal_bot hi", "legal"), "@@legal_bot hi");
    }

    #[test]
    fn strip_keeps_content_that_would_become_empty() {
        assert_eq!(strip("@@legal", "legal"), "@@legal");
    }

    #[tokio::test]
    async fn resolve_drops_unknown_usernames() {
        let store = Store::open_in_memory().unwrap();
        let org = Organization::new("Acme", "acme");
        store.insert_organization(&org).await.unwrap();
        let bot = User::new(&org.id, "legal_bot");
        store.insert_user(&bot).await.unwrap();

        let resolver = MentionResolver::new(store);
        let mentions = resolver
            .resolve("@@legal_bot and @ghost please", &org.id)
            .await
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].user_id, bot.id);
        assert_eq!(mentions[0].kind, MentionKind::AiRole);
    }

    #[tokio::test]
    async fn resolve_is_scoped_to_the_organization() {
        let store = Store::open_in_memory().unwrap();
        let acme = Organization::new("Acme", "acme");
        let other = Organization::new("Other", "other");
        store.insert_organization(&acme).await.unwrap();
        store.insert_organization(&other).await.unwrap();
        store.insert_user(&User::new(&other.id, "bob")).await.unwrap();

        let resolver = MentionResolver::new(store);
        assert!(resolver.resolve("@bob", &acme.id).await.unwrap().is_empty());
    }
}
