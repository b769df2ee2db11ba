//! Version keys
//!
//! Parses published version labels into totally ordered keys used to put a
//! package's history into release order.
//!
//! Accepted labels: optional `v` prefix, optional `N!` epoch, dotted numeric
//! release, then optional pre-release (`a`/`alpha`, `b`/`beta`, `c`/`rc`/`pre`/
//! `preview`, or a semver `-tag`), post-release (`.postN`, `-N`, `rev`, `r`),
//! dev-release (`.devN`) and `+local` label. Matching is case-insensitive.
//!
//! Ordering: epoch, release (trailing zeros ignored, so `1.0 == 1.0.0`), then
//! dev-only < pre-release < final < post-release. Pre-releases order
//! alpha < beta < rc < other tags (by text), then by number. A dev release
//! precedes the same version without one. Local labels compare last.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A version label that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{label}': {reason}")]
pub struct VersionParseError {
    pub label: String,
    pub reason: String,
}

impl VersionParseError {
    fn new(label: &str, reason: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PreRelease {
    kind: PreKind,
    number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LocalSegment {
    Text(String),
    Number(u64),
}

/// Parsed, ordered form of a version label
#[derive(Debug, Clone)]
pub struct VersionKey {
    raw: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PreSlot<'a> {
    DevOnly,
    Pre(&'a PreRelease),
    Final,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum DevSlot {
    Dev(u64),
    Released,
}

impl VersionKey {
    pub fn parse(label: &str) -> Result<Self, VersionParseError> {
        let normalized = label.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(VersionParseError::new(label, "empty label"));
        }

        let body = normalized.strip_prefix('v').unwrap_or(&normalized);
        let (public, local) = match body.split_once('+') {
            Some((public, local)) => (public, Some(parse_local(label, local)?)),
            None => (body, None),
        };

        let (epoch, rest) = match public.split_once('!') {
            Some((epoch, rest)) => {
                let epoch = parse_number(label, epoch)?;
                (epoch, rest)
            }
            None => (0, public),
        };

        let mut cursor = Cursor::new(rest);
        let release = parse_release(label, &mut cursor)?;
        let pre = parse_pre(label, &mut cursor)?;
        let post = parse_post(label, &mut cursor)?;
        let dev = parse_dev(label, &mut cursor)?;

        if !cursor.is_done() {
            return Err(VersionParseError::new(
                label,
                format!("unexpected trailing text '{}'", cursor.rest()),
            ));
        }

        Ok(Self {
            raw: label.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn release_key(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |idx| idx + 1);
        &self.release[..end]
    }

    fn pre_slot(&self) -> PreSlot<'_> {
        match (&self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreSlot::DevOnly,
            (Some(pre), _, _) => PreSlot::Pre(pre),
            (None, _, _) => PreSlot::Final,
        }
    }

    fn dev_slot(&self) -> DevSlot {
        match self.dev {
            Some(n) => DevSlot::Dev(n),
            None => DevSlot::Released,
        }
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_key().cmp(other.release_key()))
            .then_with(|| self.pre_slot().cmp(&other.pre_slot()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_slot().cmp(&other.dev_slot()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionKey {}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for VersionKey {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionKey::parse(s)
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn is_done(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat_separator(&mut self) -> Option<char> {
        match self.peek() {
            Some(c @ ('.' | '-' | '_')) => {
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn eat_digits(&mut self) -> Option<&'a str> {
        let len = self
            .rest()
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if len == 0 {
            return None;
        }
        let digits = &self.rest()[..len];
        self.pos += len;
        Some(digits)
    }

    /// Consume the first matching word; list longer spellings first
    fn eat_word(&mut self, words: &[&'static str]) -> Option<&'static str> {
        let rest = self.rest();
        let word = words
            .iter()
            .copied()
            .find(|w| starts_with_word(rest, std::slice::from_ref(w)))?;
        self.pos += word.len();
        Some(word)
    }
}

/// True if `text` starts with one of `words` not followed by another letter
fn starts_with_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| {
        text.starts_with(w)
            && !text[w.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
    })
}

fn parse_number(label: &str, digits: &str) -> Result<u64, VersionParseError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionParseError::new(
            label,
            format!("'{}' is not a number", digits),
        ));
    }
    digits
        .parse::<u64>()
        .map_err(|_| VersionParseError::new(label, format!("segment '{}' is too large", digits)))
}

fn parse_release(label: &str, cursor: &mut Cursor<'_>) -> Result<Vec<u64>, VersionParseError> {
    let first = cursor
        .eat_digits()
        .ok_or_else(|| VersionParseError::new(label, "release must start with a number"))?;
    let mut release = vec![parse_number(label, first)?];

    loop {
        let mark = cursor.pos;
        if cursor.eat_separator() != Some('.') {
            cursor.pos = mark;
            break;
        }
        match cursor.eat_digits() {
            Some(digits) => release.push(parse_number(label, digits)?),
            None => {
                cursor.pos = mark;
                break;
            }
        }
    }

    Ok(release)
}

fn optional_number(label: &str, cursor: &mut Cursor<'_>) -> Result<Option<u64>, VersionParseError> {
    let mark = cursor.pos;
    cursor.eat_separator();
    match cursor.eat_digits() {
        Some(digits) => parse_number(label, digits).map(Some),
        None => {
            cursor.pos = mark;
            Ok(None)
        }
    }
}

fn parse_pre(label: &str, cursor: &mut Cursor<'_>) -> Result<Option<PreRelease>, VersionParseError> {
    let mark = cursor.pos;
    let separator = cursor.eat_separator();

    let kind = match cursor.eat_word(&["alpha", "a", "beta", "b", "preview", "pre", "rc", "c"]) {
        Some("alpha" | "a") => PreKind::Alpha,
        Some("beta" | "b") => PreKind::Beta,
        Some(_) => PreKind::Rc,
        None => {
            // semver-style tag, e.g. 1.0.0-next.3
            let rest = cursor.rest();
            let is_tag = separator == Some('-')
                && rest.starts_with(|c: char| c.is_ascii_alphabetic())
                && !starts_with_word(rest, &["post", "rev", "r", "dev"])
                && rest
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
            if is_tag {
                cursor.pos = cursor.text.len();
                return Ok(Some(PreRelease {
                    kind: PreKind::Tag(rest.to_string()),
                    number: 0,
                }));
            }
            cursor.pos = mark;
            return Ok(None);
        }
    };

    let number = optional_number(label, cursor)?.unwrap_or(0);
    Ok(Some(PreRelease { kind, number }))
}

fn parse_post(label: &str, cursor: &mut Cursor<'_>) -> Result<Option<u64>, VersionParseError> {
    let mark = cursor.pos;
    let separator = cursor.eat_separator();

    if cursor.eat_word(&["post", "rev", "r"]).is_some() {
        return Ok(Some(optional_number(label, cursor)?.unwrap_or(0)));
    }

    // implicit post release: 1.0-1
    if separator == Some('-') {
        if let Some(digits) = cursor.eat_digits() {
            return parse_number(label, digits).map(Some);
        }
    }

    cursor.pos = mark;
    Ok(None)
}

fn parse_dev(label: &str, cursor: &mut Cursor<'_>) -> Result<Option<u64>, VersionParseError> {
    let mark = cursor.pos;
    cursor.eat_separator();

    if cursor.eat_word(&["dev"]).is_some() {
        return Ok(Some(optional_number(label, cursor)?.unwrap_or(0)));
    }

    cursor.pos = mark;
    Ok(None)
}

fn parse_local(label: &str, local: &str) -> Result<Vec<LocalSegment>, VersionParseError> {
    local
        .split(['.', '-', '_'])
        .map(|segment| {
            if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(VersionParseError::new(
                    label,
                    format!("invalid local segment '{}'", segment),
                ));
            }
            if segment.bytes().all(|b| b.is_ascii_digit()) {
                parse_number(label, segment).map(LocalSegment::Number)
            } else {
                Ok(LocalSegment::Text(segment.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(label: &str) -> VersionKey {
        VersionKey::parse(label).unwrap()
    }

    #[test]
    fn test_numeric_segments_compare_numerically() {
        assert!(key("1.2.0") < key("1.10.0"));
        assert!(key("0.9") < key("0.10"));
        assert!(key("2") > key("1.99.99"));
    }

    #[test]
    fn test_trailing_zeros_are_insignificant() {
        assert_eq!(key("1.0"), key("1.0.0"));
        assert_eq!(key("v1.0"), key("1"));
        assert!(key("1.0") < key("1.0.1"));
    }

    #[test]
    fn test_prerelease_ordering() {
        let ordered = [
            "1.0.dev1",
            "1.0a1",
            "1.0a2",
            "1.0b1",
            "1.0rc1",
            "1.0",
            "1.0.post1",
            "1.1",
        ];
        for pair in ordered.windows(2) {
            assert!(key(pair[0]) < key(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_semver_prerelease_forms() {
        assert!(key("1.0.0-alpha.1") < key("1.0.0-beta.2"));
        assert!(key("1.0.0-beta.2") < key("1.0.0-rc.1"));
        assert!(key("1.0.0-rc.1") < key("1.0.0-next.1"));
        assert!(key("1.0.0-next.1") < key("1.0.0"));
        assert!(key("1.0.0-canary") < key("1.0.0-next"));
    }

    #[test]
    fn test_implicit_post_release() {
        assert_eq!(key("1.0-1"), key("1.0.post1"));
        assert!(key("1.0-1") > key("1.0"));
    }

    #[test]
    fn test_dashed_post_spellings_are_not_tags() {
        assert_eq!(key("1.0-r1"), key("1.0.post1"));
        assert_eq!(key("1.0-rev2"), key("1.0.post2"));
        assert_eq!(key("1.0-post"), key("1.0.post0"));
        assert!(key("1.0-r1") > key("1.0"));
        assert!(key("1.0-dev1") < key("1.0a1"));
        // a word that only starts with r is still a tag
        assert!(key("1.0.0-release") < key("1.0.0"));
    }

    #[test]
    fn test_dev_release_precedes_release() {
        assert!(key("1.0a1.dev1") < key("1.0a1"));
        assert!(key("1.0.post1.dev1") < key("1.0.post1"));
    }

    #[test]
    fn test_epoch_dominates() {
        assert!(key("1!0.1") > key("99.0"));
    }

    #[test]
    fn test_local_labels_sort_last() {
        assert!(key("1.0") < key("1.0+abc"));
        assert!(key("1.0+abc") < key("1.0+1"));
        assert!(key("1.0+1") < key("1.0+2"));
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(key(" V1.0RC1 "), key("1.0rc1"));
    }

    #[test]
    fn test_invalid_labels() {
        for label in ["", "latest", "1.0.x", "1..0", "abc1.0", "1.0+", "1.0 beta gamma"] {
            assert!(VersionKey::parse(label).is_err(), "{label:?} should fail");
        }
    }

    #[test]
    fn test_error_carries_label() {
        let err = VersionKey::parse("not-a-version").unwrap_err();
        assert_eq!(err.label, "not-a-version");
    }
}
