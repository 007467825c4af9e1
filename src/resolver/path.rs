//! Field path parsing

use compact_str::CompactString;
use smallvec::SmallVec;

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(CompactString),
    /// Array position; also matches an object key spelled as the number
    Index(usize),
}

/// Split `a.b[2].c` or `a.b.2.c` into segments. Returns `None` if malformed.
pub fn parse_path(path: &str) -> Option<SmallVec<[PathSegment; 4]>> {
    let mut segments = SmallVec::new();
    if path.is_empty() {
        return None;
    }

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };

        if !key.is_empty() {
            segments.push(match key.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(key.into()),
            });
        } else if rest.is_empty() {
            return None;
        }

        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            let index = inner[..close].parse::<usize>().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }
    }

    Some(segments)
}
