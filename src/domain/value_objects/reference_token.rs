//! Reference tokens - inline cross-document links embedded in text fields
//!
//! Two surface syntaxes are recognised:
//! - bracket directives: `@Actor[abc123]{Display Text}`, `@Compendium[world.monsters.xyz]`
//! - anchor markup: `<a class="entity-link" data-entity="Actor" data-id="abc123">` or
//!   `<a class="entity-link" data-pack="world.monsters" data-id="xyz">`
//!
//! [`tokenize`] splits text into literal and token spans using both grammars in a
//! single pass, so the output of one rewrite can never be re-read by the other.

use std::ops::Range;
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

use super::DocumentKind;

static BRACKET_PATTERN: OnceLock<Regex> = OnceLock::new();
static ANCHOR_PATTERN: OnceLock<Regex> = OnceLock::new();
static ANCHOR_ATTRIBUTE: OnceLock<Regex> = OnceLock::new();

fn bracket_pattern() -> &'static Regex {
    BRACKET_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)@([a-z]+)\[([a-z0-9_.\-]+)\](?:\{([^}]*)\})?").unwrap()
    })
}

fn anchor_pattern() -> &'static Regex {
    ANCHOR_PATTERN.get_or_init(|| Regex::new(r"(?i)<a\s[^>]*>").unwrap())
}

fn anchor_attribute() -> &'static Regex {
    ANCHOR_ATTRIBUTE.get_or_init(|| Regex::new(r#"([A-Za-z_:\-]+)\s*=\s*"([^"]*)""#).unwrap())
}

/// Which grammar produced a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSyntax {
    Bracket,
    Anchor,
}

/// What a token points at, expressed in source-store ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTarget {
    Document { kind: DocumentKind, id: String },
    CollectionEntry { pack_id: String, entry_id: String },
}

/// A single reference token found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken {
    pub syntax: TokenSyntax,
    pub target: TokenTarget,
    /// Display text carried in braces after a bracket directive
    pub label: Option<String>,
    raw: String,
    id_range: Range<usize>,
    pack_range: Option<Range<usize>>,
}

impl ReferenceToken {
    /// The token exactly as authored
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Render the token pointing at `id`, optionally moving it to another pack.
    ///
    /// Everything outside the id (and pack) segments is kept byte-for-byte.
    pub fn rewrite(&self, pack_id: Option<&str>, id: &str) -> String {
        let mut edits: Vec<(Range<usize>, &str)> = vec![(self.id_range.clone(), id)];
        if let (Some(range), Some(pack)) = (self.pack_range.clone(), pack_id) {
            edits.push((range, pack));
        }
        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));

        let mut out = self.raw.clone();
        for (range, value) in edits {
            out.replace_range(range, value);
        }
        out
    }
}

/// A piece of tokenized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span<'a> {
    Literal(&'a str),
    Token(ReferenceToken),
}

/// Split `text` into literal and reference-token spans
pub fn tokenize(text: &str) -> Vec<Span<'_>> {
    let mut found: Vec<(Range<usize>, ReferenceToken)> = Vec::new();

    for caps in bracket_pattern().captures_iter(text) {
        if let Some(token) = parse_bracket(&caps) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
            found.push((whole, token));
        }
    }
    for m in anchor_pattern().find_iter(text) {
        if let Some(token) = parse_anchor(m.as_str()) {
            found.push((m.range(), token));
        }
    }
    found.sort_by_key(|(range, _)| range.start);

    let mut spans = Vec::new();
    let mut cursor = 0;
    for (range, token) in found {
        if range.start < cursor {
            continue;
        }
        if range.start > cursor {
            spans.push(Span::Literal(&text[cursor..range.start]));
        }
        spans.push(Span::Token(token));
        cursor = range.end;
    }
    if cursor < text.len() {
        spans.push(Span::Literal(&text[cursor..]));
    }
    spans
}

/// Whether `text` holds at least one reference token in either syntax
pub fn contains_reference(text: &str) -> bool {
    bracket_pattern()
        .captures_iter(text)
        .any(|caps| parse_bracket(&caps).is_some())
        || anchor_pattern()
            .find_iter(text)
            .any(|m| parse_anchor(m.as_str()).is_some())
}

fn parse_bracket(caps: &Captures<'_>) -> Option<ReferenceToken> {
    let whole = caps.get(0)?;
    let kind_match = caps.get(1)?;
    let id_match = caps.get(2)?;
    let kind = DocumentKind::from_document_name(kind_match.as_str())?;
    if kind == DocumentKind::Folder {
        return None;
    }

    let base = whole.start();
    let id_start = id_match.start() - base;
    let id_end = id_match.end() - base;
    let label = caps.get(3).map(|m| m.as_str().to_string());

    let (target, id_range, pack_range) = if kind == DocumentKind::Compendium {
        let value = id_match.as_str();
        let split = value.rfind('.')?;
        let (pack_id, entry_id) = (&value[..split], &value[split + 1..]);
        if pack_id.is_empty() || entry_id.is_empty() {
            return None;
        }
        (
            TokenTarget::CollectionEntry {
                pack_id: pack_id.to_string(),
                entry_id: entry_id.to_string(),
            },
            id_start + split + 1..id_end,
            Some(id_start..id_start + split),
        )
    } else {
        (
            TokenTarget::Document {
                kind,
                id: id_match.as_str().to_string(),
            },
            id_start..id_end,
            None,
        )
    };

    Some(ReferenceToken {
        syntax: TokenSyntax::Bracket,
        target,
        label,
        raw: whole.as_str().to_string(),
        id_range,
        pack_range,
    })
}

fn parse_anchor(tag: &str) -> Option<ReferenceToken> {
    let mut entity: Option<String> = None;
    let mut pack: Option<(String, Range<usize>)> = None;
    let mut id: Option<(String, Range<usize>)> = None;

    for caps in anchor_attribute().captures_iter(tag) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        match name.as_str().to_ascii_lowercase().as_str() {
            "data-entity" | "data-type" => entity = Some(value.as_str().to_string()),
            "data-pack" => pack = Some((value.as_str().to_string(), value.range())),
            "data-id" => id = Some((value.as_str().to_string(), value.range())),
            _ => {}
        }
    }

    let (id, id_range) = id.filter(|(value, _)| !value.is_empty())?;
    let (target, pack_range) = match pack {
        Some((pack_id, range)) if !pack_id.is_empty() => (
            TokenTarget::CollectionEntry {
                pack_id,
                entry_id: id,
            },
            Some(range),
        ),
        _ => {
            let kind = DocumentKind::from_document_name(entity.as_deref()?)?;
            if matches!(kind, DocumentKind::Folder | DocumentKind::Compendium) {
                return None;
            }
            (TokenTarget::Document { kind, id }, None)
        }
    };

    Some(ReferenceToken {
        syntax: TokenSyntax::Anchor,
        target,
        label: None,
        raw: tag.to_string(),
        id_range,
        pack_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<ReferenceToken> {
        tokenize(text)
            .into_iter()
            .filter_map(|span| match span {
                Span::Token(token) => Some(token),
                Span::Literal(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_bracket_token_with_label() {
        let found = tokens("Speak to @Actor[abc123]{Sildar Hallwinter} at once.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].syntax, TokenSyntax::Bracket);
        assert_eq!(
            found[0].target,
            TokenTarget::Document {
                kind: DocumentKind::Actor,
                id: "abc123".to_string()
            }
        );
        assert_eq!(found[0].label.as_deref(), Some("Sildar Hallwinter"));
        assert_eq!(found[0].rewrite(None, "NEW"), "@Actor[NEW]{Sildar Hallwinter}");
    }

    #[test]
    fn test_bracket_token_without_label_and_case_insensitive_kind() {
        let found = tokens("see @journalentry[j1]");
        assert_eq!(
            found[0].target,
            TokenTarget::Document {
                kind: DocumentKind::JournalEntry,
                id: "j1".to_string()
            }
        );
        assert_eq!(found[0].rewrite(None, "j9"), "@journalentry[j9]");
    }

    #[test]
    fn test_compendium_bracket_token() {
        let found = tokens("@Compendium[world.monsters.xyz]{Goblin}");
        assert_eq!(
            found[0].target,
            TokenTarget::CollectionEntry {
                pack_id: "world.monsters".to_string(),
                entry_id: "xyz".to_string()
            }
        );
        assert_eq!(
            found[0].rewrite(Some("world.monsters-2"), "q1"),
            "@Compendium[world.monsters-2.q1]{Goblin}"
        );
    }

    #[test]
    fn test_unknown_directive_is_literal() {
        assert!(tokens("@Check[dex]{Dexterity} and @UUID[x]").is_empty());
        assert!(!contains_reference("@Check[dex]{Dexterity}"));
    }

    #[test]
    fn test_anchor_tokens() {
        let text = r#"<p><a class="entity-link" data-entity="Item" data-id="i1">Sword</a> and <a data-id="e7" data-pack="world.loot" class="entity-link">Gem</a></p>"#;
        let found = tokens(text);
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0].target,
            TokenTarget::Document {
                kind: DocumentKind::Item,
                id: "i1".to_string()
            }
        );
        assert_eq!(
            found[0].rewrite(None, "i2"),
            r#"<a class="entity-link" data-entity="Item" data-id="i2">"#
        );
        assert_eq!(
            found[1].rewrite(Some("world.treasure"), "e8"),
            r#"<a data-id="e8" data-pack="world.treasure" class="entity-link">"#
        );
    }

    #[test]
    fn test_plain_anchor_is_literal() {
        assert!(tokens(r#"<a href="https://example.com">link</a>"#).is_empty());
    }

    #[test]
    fn test_tokenize_reassembles_to_original() {
        let text = r#"A @Scene[s1]{Cave} then <a data-entity="Actor" data-id="a1">Bob</a>."#;
        let rebuilt: String = tokenize(text)
            .iter()
            .map(|span| match span {
                Span::Literal(s) => s.to_string(),
                Span::Token(token) => token.raw().to_string(),
            })
            .collect();
        assert_eq!(rebuilt, text);
    }
}
