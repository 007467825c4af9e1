//! `LIKE` pattern compilation and matching
//!
//! `%` matches any run of characters (including none), `_` matches exactly
//! one character. An optional escape character makes the following
//! character literal. Runs of `%` are collapsed when the pattern is built,
//! so patterns that match the same strings compare equal.

use std::fmt;

use compact_str::CompactString;
use smallvec::SmallVec;

const MULTI: char = '%';
const SINGLE: char = '_';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum LikeToken {
    Any,
    One,
    Literal(char),
}

/// A compiled `LIKE` pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LikePattern {
    tokens: Vec<LikeToken>,
    escape: Option<char>,
}

impl LikePattern {
    /// Compile a pattern. `max_len` caps the pattern size in bytes (0 = unlimited).
    pub fn new(pattern: &str, escape: Option<char>, max_len: usize) -> Result<Self, &'static str> {
        if max_len > 0 && pattern.len() > max_len {
            return Err("LIKE pattern exceeds size limit");
        }

        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let token = if Some(c) == escape {
                match chars.next() {
                    Some(escaped) => LikeToken::Literal(escaped),
                    None => return Err("LIKE pattern ends with escape character"),
                }
            } else if c == MULTI {
                if tokens.last() == Some(&LikeToken::Any) {
                    continue;
                }
                LikeToken::Any
            } else if c == SINGLE {
                LikeToken::One
            } else {
                LikeToken::Literal(c)
            };
            tokens.push(token);
        }

        Ok(Self { tokens, escape })
    }

    /// Canonical pattern text (collapsed wildcards, escapes preserved)
    pub fn pattern(&self) -> CompactString {
        let mut out = CompactString::default();
        for token in &self.tokens {
            match token {
                LikeToken::Any => out.push(MULTI),
                LikeToken::One => out.push(SINGLE),
                LikeToken::Literal(c) => {
                    let needs_escape = *c == MULTI || *c == SINGLE || Some(*c) == self.escape;
                    if let (true, Some(escape)) = (needs_escape, self.escape) {
                        out.push(escape);
                    }
                    out.push(*c);
                }
            }
        }
        out
    }

    pub fn escape(&self) -> Option<char> {
        self.escape
    }

    /// Match the whole of `text` against the pattern
    pub fn matches(&self, text: &str) -> bool {
        let chars: SmallVec<[char; 64]> = text.chars().collect();
        let (mut t, mut p) = (0, 0);
        // Position of the last `%` seen and the text index it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while t < chars.len() {
            match self.tokens.get(p) {
                Some(LikeToken::One) => {
                    t += 1;
                    p += 1;
                }
                Some(LikeToken::Literal(c)) if *c == chars[t] => {
                    t += 1;
                    p += 1;
                }
                Some(LikeToken::Any) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                _ => match backtrack {
                    Some((star, absorbed)) => {
                        p = star + 1;
                        t = absorbed + 1;
                        backtrack = Some((star, absorbed + 1));
                    }
                    None => return false,
                },
            }
        }

        self.tokens[p..].iter().all(|token| *token == LikeToken::Any)
    }
}

impl fmt::Display for LikePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.pattern().replace('\'', "''"))?;
        if let Some(escape) = self.escape {
            let escape = escape.to_string().replace('\'', "''");
            write!(f, " ESCAPE '{}'", escape)?;
        }
        Ok(())
    }
}
