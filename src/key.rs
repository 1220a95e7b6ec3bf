//! Cache key and eviction pattern construction.
//!
//! Every string that is stored in, or matched against, the key-value store is
//! built here. Keys are colon-separated: a namespace, then alternating labels
//! and values in an order fixed per key kind, so the same logical query always
//! renders to the same bytes.
//!
//! Patterns ([`KeyPattern`]) are only used for eviction. They are built from
//! the same parts as keys, with identifier values glob-escaped so that an id
//! containing `*` or `[` can never widen the eviction.

use chrono::NaiveDate;
use std::fmt;

/// Characters with special meaning in Redis-style glob patterns.
const GLOB_META: &[char] = &['*', '?', '[', ']', '\\'];

#[derive(Clone, Debug)]
enum Part {
    Literal(&'static str),
    Value(String),
}

/// Builder for cache keys and the patterns that cover them.
#[derive(Clone, Debug)]
pub struct KeyBuilder {
    parts: Vec<Part>,
}

impl KeyBuilder {
    /// Start a key in the given namespace.
    pub fn new(namespace: &'static str) -> Self {
        KeyBuilder {
            parts: vec![Part::Literal(namespace)],
        }
    }

    /// Start a key whose namespace is a runtime value (e.g. a wallet kind).
    pub fn dynamic(namespace: impl fmt::Display) -> Self {
        KeyBuilder {
            parts: vec![Part::Value(namespace.to_string())],
        }
    }

    /// Append a fixed label such as `package` or `minPax`.
    pub fn label(mut self, label: &'static str) -> Self {
        self.parts.push(Part::Literal(label));
        self
    }

    /// Append a caller-supplied value.
    pub fn value(mut self, value: impl fmt::Display) -> Self {
        self.parts.push(Part::Value(value.to_string()));
        self
    }

    /// Append `label:value`.
    pub fn field(self, label: &'static str, value: impl fmt::Display) -> Self {
        self.label(label).value(value)
    }

    /// Render the exact key.
    pub fn build(&self) -> CacheKey {
        let rendered: Vec<&str> = self
            .parts
            .iter()
            .map(|p| match p {
                Part::Literal(s) => *s,
                Part::Value(s) => s.as_str(),
            })
            .collect();
        CacheKey(rendered.join(":"))
    }

    /// Render a pattern matching every key that extends this prefix.
    pub fn pattern(&self) -> KeyPattern {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Value(s) => out.push_str(&escape_glob(s)),
            }
            out.push(':');
        }
        out.push('*');
        KeyPattern(out)
    }
}

/// A fully rendered cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// `availability:package:{packageId}:date:{date}:minPax:{minPax}`
    pub fn availability(package_id: &str, date: NaiveDate, min_pax: u32) -> Self {
        KeyBuilder::new("availability")
            .field("package", package_id)
            .field("date", date)
            .field("minPax", min_pax)
            .build()
    }

    /// `availability:summary:package:{packageId}:start:{start}:end:{end}:minPax:{minPax}`
    pub fn availability_summary(
        package_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        min_pax: u32,
    ) -> Self {
        KeyBuilder::new("availability")
            .label("summary")
            .field("package", package_id)
            .field("start", start)
            .field("end", end)
            .field("minPax", min_pax)
            .build()
    }

    /// Wrap an already rendered key. Prefer the typed constructors.
    pub fn raw(key: impl Into<String>) -> Self {
        CacheKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A glob pattern used for eviction, never for reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPattern(String);

impl KeyPattern {
    /// Every key in the store.
    pub fn all() -> Self {
        KeyPattern("*".to_string())
    }

    /// Wrap a hand-written glob. Prefer the typed constructors.
    pub fn raw(pattern: impl Into<String>) -> Self {
        KeyPattern(pattern.into())
    }

    /// `booking:{bookingId}:*`
    pub fn booking(booking_id: &str) -> Self {
        KeyBuilder::new("booking").value(booking_id).pattern()
    }

    /// `bookings:{scope}:*` for `user`, `partner` and `admin` listings.
    pub fn booking_listings(scope: &'static str) -> Self {
        KeyBuilder::new("bookings").label(scope).pattern()
    }

    /// `package:{packageId}:*`
    pub fn package(package_id: &str) -> Self {
        KeyBuilder::new("package").value(package_id).pattern()
    }

    /// `packages:list:*`
    pub fn package_listings() -> Self {
        KeyBuilder::new("packages").label("list").pattern()
    }

    /// `availability:package:{packageId}:*`
    pub fn package_availability(package_id: &str) -> Self {
        KeyBuilder::new("availability")
            .field("package", package_id)
            .pattern()
    }

    /// `availability:package:{packageId}:date:{date}:*`
    pub fn package_availability_on(package_id: &str, date: NaiveDate) -> Self {
        KeyBuilder::new("availability")
            .field("package", package_id)
            .field("date", date)
            .pattern()
    }

    /// `availability:summary:package:{packageId}:*`
    pub fn package_availability_summaries(package_id: &str) -> Self {
        KeyBuilder::new("availability")
            .label("summary")
            .field("package", package_id)
            .pattern()
    }

    /// `trip:{tripId}:*`
    pub fn trip(trip_id: &str) -> Self {
        KeyBuilder::new("trip").value(trip_id).pattern()
    }

    /// `trips:{scope}:*` for `guide` and `admin` listings.
    pub fn trip_listings(scope: &'static str) -> Self {
        KeyBuilder::new("trips").label(scope).pattern()
    }

    /// `{walletKind}:wallet:{userId}:*`
    pub fn wallet(kind: impl fmt::Display, user_id: &str) -> Self {
        KeyBuilder::dynamic(kind)
            .label("wallet")
            .value(user_id)
            .pattern()
    }

    /// `{walletKind}:wallet:transactions:{userId}:*`
    pub fn wallet_transactions(kind: impl fmt::Display, user_id: &str) -> Self {
        KeyBuilder::dynamic(kind)
            .label("wallet")
            .label("transactions")
            .value(user_id)
            .pattern()
    }

    /// `user:{userId}:*`
    pub fn user(user_id: &str) -> Self {
        KeyBuilder::new("user").value(user_id).pattern()
    }

    /// `notifications:{userId}:*`
    pub fn notifications(user_id: &str) -> Self {
        KeyBuilder::new("notifications").value(user_id).pattern()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `key` matches this pattern, using Redis glob rules.
    pub fn matches(&self, key: &str) -> bool {
        glob_match(self.0.as_bytes(), key.as_bytes())
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if GLOB_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Redis `stringmatchlen` semantics: `*`, `?`, `[set]`, `[^set]`, `[a-z]`
/// and `\` escapes.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Backtrack point for the most recent `*`: (pattern index after it, text index).
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    while p < pattern.len() && pattern[p] == b'*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    star = Some((p, t));
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    let (matched, next) = match_class(pattern, p, text[t]);
                    if matched {
                        p = next;
                        t += 1;
                        continue;
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((sp, st)) => {
                p = sp;
                t = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Match one byte against the class starting at `pattern[start] == b'['`.
/// Returns whether it matched and the index just past the closing `]`.
fn match_class(pattern: &[u8], start: usize, c: u8) -> (bool, usize) {
    let mut i = start + 1;
    let negate = i < pattern.len() && pattern[i] == b'^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        if i >= pattern.len() {
            // Unterminated class: Redis treats the end of pattern as `]`.
            break;
        }
        match pattern[i] {
            b']' => {
                i += 1;
                break;
            }
            b'\\' if i + 1 < pattern.len() => {
                if pattern[i + 1] == c {
                    matched = true;
                }
                i += 2;
            }
            lo if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' => {
                let hi = pattern[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                if c >= lo && c <= hi {
                    matched = true;
                }
                i += 3;
            }
            other => {
                if other == c {
                    matched = true;
                }
                i += 1;
            }
        }
    }

    (matched != negate, i)
}
