//! Query tokenizer for the log search box.
//!
//! A query mixes three kinds of terms:
//!
//! - `'exact phrase'` — single-quoted text, matched verbatim
//! - `[Category]` — a bracketed tag, matched against the record category
//! - bare words — `14:03` style words (containing a colon) match the display
//!   timestamp, everything else matches message and category text
//!
//! Extraction runs in three passes over the unchanged input: quoted phrases,
//! then bracket groups, then whitespace-delimited words. Each pass marks the
//! bytes it consumed so later passes skip them, so no character is ever
//! claimed by two tokens.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A parsed search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryToken {
    /// Text inside single quotes.
    Exact {
        /// Phrase without the quotes
        value: String,
    },
    /// One bracket group. Every tag must appear in the record category.
    Category {
        /// Tags of the group
        tags: Vec<String>,
    },
    /// A bare word containing a colon, matched against the display timestamp.
    Timestamp {
        /// The word
        value: String,
    },
    /// Any other bare word.
    Text {
        /// The word
        value: String,
    },
}

impl QueryToken {
    /// Creates an exact-phrase token.
    #[must_use]
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact {
            value: value.into(),
        }
    }

    /// Creates a single-tag category token.
    #[must_use]
    pub fn category(tag: impl Into<String>) -> Self {
        Self::Category {
            tags: vec![tag.into()],
        }
    }

    /// Creates a bare-word token, classifying it as timestamp or text.
    #[must_use]
    pub fn word(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.contains(':') {
            Self::Timestamp { value }
        } else {
            Self::Text { value }
        }
    }

    /// Returns the category tags, if this is a category token.
    #[must_use]
    pub fn tags(&self) -> Option<&[String]> {
        match self {
            Self::Category { tags } => Some(tags),
            _ => None,
        }
    }
}

/// A token together with the byte range of the query it was read from.
///
/// The span covers the delimiters: quotes for phrases, brackets for groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    /// The token
    pub token: QueryToken,
    /// Byte range in the original query
    pub span: Range<usize>,
}

/// Parses a query into tokens: phrases first, then categories, then words.
///
/// Never fails. Unterminated quotes or brackets stay in the text and come out
/// as ordinary words. An empty query yields no tokens.
///
/// A bracket group never spans a quoted phrase taken by the first pass:
/// `[a 'b' c]` gives the phrase `b` and the words `[a` and `c]`.
#[must_use]
pub fn tokenize(query: &str) -> Vec<QueryToken> {
    tokenize_spanned(query)
        .into_iter()
        .map(|spanned| spanned.token)
        .collect()
}

/// Like [`tokenize`], but keeps the source span of every token.
#[must_use]
pub fn tokenize_spanned(query: &str) -> Vec<SpannedToken> {
    let mut consumed = vec![false; query.len()];
    let mut tokens = Vec::new();

    for (span, inner) in delimited(query, b'\'', b'\'', &consumed) {
        tokens.push(SpannedToken {
            token: QueryToken::exact(inner),
            span,
        });
    }
    mark(&mut consumed, &tokens);

    let phrases = tokens.len();
    for (span, inner) in delimited(query, b'[', b']', &consumed) {
        tokens.push(SpannedToken {
            token: QueryToken::category(inner),
            span,
        });
    }
    mark(&mut consumed, &tokens[phrases..]);

    tokens.extend(words(query, &consumed).map(|(span, word)| SpannedToken {
        token: QueryToken::word(word),
        span,
    }));

    tokens
}

/// Iterates the bracketed tags of a category string, in order.
///
/// `"[API] [Notifications]"` yields `API` then `Notifications`. Empty
/// brackets are skipped.
pub fn bracket_tags(category: &str) -> impl Iterator<Item = &str> {
    let none = vec![false; category.len()];
    delimited(category, b'[', b']', &none)
        .into_iter()
        .map(|(_, inner)| inner)
}

/// Appends a bracket group for `tag` to a query.
///
/// The new group becomes its own category token, so it widens the search
/// (groups are OR'd) rather than narrowing it.
#[must_use]
pub fn append_tag(query: &str, tag: &str) -> String {
    let trimmed = query.trim_end();
    if trimmed.is_empty() {
        format!("[{tag}]")
    } else {
        format!("{trimmed} [{tag}]")
    }
}

/// Finds `open ... close` spans with non-empty content, skipping consumed bytes.
///
/// A span never crosses a consumed byte. When the content would be empty the
/// scan restarts at the closing delimiter, which lets `''x'` yield `x`.
fn delimited<'a>(
    text: &'a str,
    open: u8,
    close: u8,
    consumed: &[bool],
) -> Vec<(Range<usize>, &'a str)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut start = 0;

    while start < bytes.len() {
        let Some(open_at) = (start..bytes.len()).find(|&i| !consumed[i] && bytes[i] == open)
        else {
            break;
        };

        let mut close_at = None;
        for i in open_at + 1..bytes.len() {
            if consumed[i] {
                break;
            }
            if bytes[i] == close {
                close_at = Some(i);
                break;
            }
        }

        match close_at {
            Some(end) if end > open_at + 1 => {
                found.push((open_at..end + 1, &text[open_at + 1..end]));
                start = end + 1;
            }
            // Empty content: the closing delimiter may open the next span.
            Some(end) if open == close => start = end,
            Some(_) | None => start = open_at + 1,
        }
    }

    found
}

/// Yields maximal runs of unconsumed, non-whitespace characters.
fn words<'a>(
    text: &'a str,
    consumed: &'a [bool],
) -> impl Iterator<Item = (Range<usize>, &'a str)> + 'a {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        let part_of_word = !consumed[i] && !ch.is_whitespace();
        match (part_of_word, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        runs.push(s..text.len());
    }

    runs.into_iter().map(move |span| {
        let word = &text[span.clone()];
        (span, word)
    })
}

fn mark(consumed: &mut [bool], tokens: &[SpannedToken]) {
    for spanned in tokens {
        consumed[spanned.span.clone()].fill(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_query_has_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn mixed_query_in_precedence_order() {
        let tokens = tokenize("timeout [API] 'push token' 14:03 [Settings]");
        assert_eq!(
            tokens,
            vec![
                QueryToken::exact("push token"),
                QueryToken::category("API"),
                QueryToken::category("Settings"),
                QueryToken::Text {
                    value: "timeout".to_string()
                },
                QueryToken::Timestamp {
                    value: "14:03".to_string()
                },
            ]
        );
    }

    #[test]
    fn each_bracket_is_its_own_token() {
        let tokens = tokenize("[API] [Notifications]");
        assert_eq!(
            tokens,
            vec![
                QueryToken::category("API"),
                QueryToken::category("Notifications")
            ]
        );
    }

    #[test]
    fn quoted_text_is_not_reused_as_words() {
        let tokens = tokenize("'disk full' disk");
        assert_eq!(
            tokens,
            vec![
                QueryToken::exact("disk full"),
                QueryToken::word("disk"),
            ]
        );
    }

    #[test]
    fn brackets_inside_quotes_stay_in_the_phrase() {
        let tokens = tokenize("'[API] failed'");
        assert_eq!(tokens, vec![QueryToken::exact("[API] failed")]);
    }

    #[test]
    fn unterminated_quote_is_plain_text() {
        let tokens = tokenize("'open ended");
        assert_eq!(
            tokens,
            vec![QueryToken::word("'open"), QueryToken::word("ended")]
        );
    }

    #[test]
    fn unterminated_bracket_is_plain_text() {
        let tokens = tokenize("[API oops");
        assert_eq!(
            tokens,
            vec![QueryToken::word("[API"), QueryToken::word("oops")]
        );
    }

    #[test]
    fn empty_delimiters_are_words() {
        assert_eq!(tokenize("[]"), vec![QueryToken::word("[]")]);
        assert_eq!(tokenize("''x'"), vec![
            QueryToken::exact("x"),
            QueryToken::word("'"),
        ]);
    }

    #[test]
    fn words_touching_phrases_are_split() {
        let tokens = tokenize("foo'bar'baz");
        assert_eq!(
            tokens,
            vec![
                QueryToken::exact("bar"),
                QueryToken::word("foo"),
                QueryToken::word("baz"),
            ]
        );
    }

    #[test]
    fn bracket_group_cannot_span_a_phrase() {
        let tokens = tokenize("[a 'b' c]");
        assert_eq!(
            tokens,
            vec![
                QueryToken::exact("b"),
                QueryToken::word("[a"),
                QueryToken::word("c]"),
            ]
        );
    }

    #[test]
    fn colon_words_are_timestamps() {
        assert!(matches!(
            QueryToken::word("2024-03-01T14:03"),
            QueryToken::Timestamp { .. }
        ));
        assert!(matches!(QueryToken::word("14h03"), QueryToken::Text { .. }));
    }

    #[test]
    fn spans_point_at_source_text() {
        let query = "x [API] 'y z'";
        for spanned in tokenize_spanned(query) {
            let source = &query[spanned.span.clone()];
            match &spanned.token {
                QueryToken::Exact { value } => assert_eq!(source, format!("'{value}'")),
                QueryToken::Category { tags } => assert_eq!(source, format!("[{}]", tags[0])),
                QueryToken::Text { value } | QueryToken::Timestamp { value } => {
                    assert_eq!(source, value);
                }
            }
        }
    }

    #[test]
    fn bracket_tags_of_category() {
        let tags: Vec<_> = bracket_tags("[API] [Notifications] trailing").collect();
        assert_eq!(tags, vec!["API", "Notifications"]);
        assert_eq!(bracket_tags("no tags here").count(), 0);
        assert_eq!(bracket_tags("[] [X]").collect::<Vec<_>>(), vec!["X"]);
    }

    #[test]
    fn append_tag_adds_separate_group() {
        assert_eq!(append_tag("", "API"), "[API]");
        assert_eq!(append_tag("[API]  ", "Points"), "[API] [Points]");
        assert_eq!(
            tokenize(&append_tag("[API]", "Points")).len(),
            2,
            "appended tag must be a separate token"
        );
    }

    #[test]
    fn unicode_words_are_kept_whole() {
        let tokens = tokenize("größe 'café' [Über]");
        assert_eq!(
            tokens,
            vec![
                QueryToken::exact("café"),
                QueryToken::category("Über"),
                QueryToken::word("größe"),
            ]
        );
    }

    proptest! {
        #[test]
        fn spans_cover_non_whitespace_exactly_once(query in "[a-z:'\\[\\] ]{0,40}") {
            let spanned = tokenize_spanned(&query);
            let mut covered = vec![0u8; query.len()];
            for token in &spanned {
                for i in token.span.clone() {
                    covered[i] += 1;
                }
            }
            for (i, ch) in query.char_indices() {
                if ch.is_whitespace() {
                    // Whitespace may sit inside a phrase or group, never twice.
                    prop_assert!(covered[i] <= 1);
                } else {
                    prop_assert_eq!(covered[i], 1, "byte {} of {:?}", i, query);
                }
            }
        }

        #[test]
        fn tokenize_is_deterministic(query in "\\PC{0,60}") {
            prop_assert_eq!(tokenize(&query), tokenize(&query));
        }
    }
}
