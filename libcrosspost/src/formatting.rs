//! Per-platform text rendering
//!
//! The dispatcher never edits what a post says; it only decides where the
//! hashtags go and how many of them survive each platform's limits.
//! Lengths are counted in Unicode scalar values.

use crate::types::PlatformKind;

pub const TWITTER_CHAR_LIMIT: usize = 280;
pub const TWITTER_MAX_HASHTAGS: usize = 3;
pub const INSTAGRAM_MAX_HASHTAGS: usize = 30;
/// Budget for the whole rendered hashtag block, separators included
pub const TIKTOK_HASHTAG_BUDGET: usize = 100;

/// Render `body` and `hashtags` for `platform`
///
/// # Examples
///
/// ```
/// use libcrosspost::formatting::format_for;
/// use libcrosspost::types::PlatformKind;
///
/// let tags = vec!["dart".to_string(), "flutter".to_string()];
/// assert_eq!(
///     format_for(PlatformKind::Twitter, "Hello world", &tags),
///     "Hello world #dart #flutter"
/// );
/// assert_eq!(
///     format_for(PlatformKind::Facebook, "Hello world", &tags),
///     "Hello world\n\n#dart #flutter"
/// );
/// ```
pub fn format_for(platform: PlatformKind, body: &str, hashtags: &[String]) -> String {
    let tags: Vec<String> = hashtags.iter().filter_map(|t| normalize_hashtag(t)).collect();

    match platform {
        PlatformKind::Instagram => {
            let cap = tags.len().min(INSTAGRAM_MAX_HASHTAGS);
            append_block(body, &tags[..cap])
        }
        PlatformKind::Twitter => format_twitter(body, &tags),
        PlatformKind::Tiktok => {
            let mut kept = tags;
            while !kept.is_empty() && char_len(&kept.join(" ")) > TIKTOK_HASHTAG_BUDGET {
                kept.pop();
            }
            append_block(body, &kept)
        }
        PlatformKind::Facebook | PlatformKind::Youtube => append_block(body, &tags),
    }
}

/// Normalise a raw tag to `#tag`, or `None` if nothing is left
///
/// Whitespace inside the tag is dropped too, since a hashtag ends at the
/// first space.
pub fn normalize_hashtag(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(format!("#{}", cleaned))
    }
}

fn format_twitter(body: &str, tags: &[String]) -> String {
    let mut kept: Vec<String> = tags.iter().take(TWITTER_MAX_HASHTAGS).cloned().collect();

    while !kept.is_empty() {
        let candidate = join_inline(body, &kept);
        if char_len(&candidate) <= TWITTER_CHAR_LIMIT {
            return candidate;
        }
        kept.pop();
    }

    truncate_chars(body, TWITTER_CHAR_LIMIT)
}

/// `body` + two newlines + space-separated tags
fn append_block(body: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        return body.to_string();
    }
    let block = tags.join(" ");
    if body.is_empty() {
        block
    } else {
        format!("{}\n\n{}", body, block)
    }
}

fn join_inline(body: &str, tags: &[String]) -> String {
    let block = tags.join(" ");
    if body.is_empty() {
        block
    } else {
        format!("{} {}", body, block)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
