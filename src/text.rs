use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// A piece of post text, ready for rendering as plain text or a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Hashtag { tag: String, href: String },
    Mention { username: String },
    Link { url: String },
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', ')', '"', '\''];

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+").expect("static url pattern"))
}

pub fn tag_href(tag: &str) -> String {
    format!("/tag/{}", urlencoding::encode(tag))
}

/// Splits text on whitespace, keeping whitespace runs as plain segments, and
/// classifies each word as hashtag, mention, link or plain text.
pub fn parse_text(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut word = String::new();
    let mut space = String::new();

    for ch in text.chars() {
        if ch.is_whitespace() {
            if !word.is_empty() {
                push_word(&mut segments, &word);
                word.clear();
            }
            space.push(ch);
        } else {
            if !space.is_empty() {
                push_plain(&mut segments, &space);
                space.clear();
            }
            word.push(ch);
        }
    }
    if !word.is_empty() {
        push_word(&mut segments, &word);
    }
    if !space.is_empty() {
        push_plain(&mut segments, &space);
    }

    segments
}

fn push_word(segments: &mut Vec<Segment>, word: &str) {
    if let Some(tag) = word.strip_prefix('#') {
        segments.push(Segment::Hashtag {
            tag: tag.to_string(),
            href: tag_href(tag),
        });
        return;
    }
    if let Some(username) = word.strip_prefix('@') {
        segments.push(Segment::Mention {
            username: username.to_string(),
        });
        return;
    }

    let mut last = 0;
    for found in url_pattern().find_iter(word) {
        if found.start() > last {
            push_plain(segments, &word[last..found.start()]);
        }
        segments.push(Segment::Link {
            url: found.as_str().to_string(),
        });
        last = found.end();
    }
    if last < word.len() {
        push_plain(segments, &word[last..]);
    }
}

fn push_plain(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Text { text: previous }) = segments.last_mut() {
        previous.push_str(text);
        return;
    }
    segments.push(Segment::Text {
        text: text.to_string(),
    });
}

/// Unique hashtags in order of first appearance, without the `#` and with
/// trailing punctuation removed.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let Some(tag) = word.strip_prefix('#') else {
            continue;
        };
        let tag = tag.trim_end_matches(TRAILING_PUNCTUATION);
        if tag.is_empty() || tags.iter().any(|existing| existing == tag) {
            continue;
        }
        tags.push(tag.to_string());
    }
    tags
}

pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let Some(name) = word.strip_prefix('@') else {
            continue;
        };
        let name = name.trim_end_matches(TRAILING_PUNCTUATION);
        if name.is_empty() || mentions.iter().any(|existing| existing == name) {
            continue;
        }
        mentions.push(name.to_string());
    }
    mentions
}
