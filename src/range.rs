//! `Content-Range` grammar for chunk uploads
//!
//! Two forms are accepted:
//!
//! ```text
//! bytes <start>-<end>/<total>   a chunk covering start..=end of a total-byte file
//! bytes */<total>               a status query carrying no body
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::UploadError;

/// Parsed `Content-Range` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes */<total>`
    Query { total: u64 },
    /// `bytes <start>-<end>/<total>`
    Chunk { start: u64, end: u64, total: u64 },
}

impl ContentRange {
    pub fn total(&self) -> u64 {
        match self {
            ContentRange::Query { total } | ContentRange::Chunk { total, .. } => *total,
        }
    }
}

fn invalid(value: &str) -> UploadError {
    UploadError::InvalidRequest(format!("malformed Content-Range: {:?}", value))
}

fn number(part: &str, whole: &str) -> Result<u64, UploadError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(whole));
    }
    part.parse::<u64>().map_err(|_| invalid(whole))
}

impl FromStr for ContentRange {
    type Err = UploadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rest = value
            .trim()
            .strip_prefix("bytes")
            .ok_or_else(|| invalid(value))?;
        // Unit and range are separated by a space; `bytes=` is tolerated too.
        let rest = rest
            .strip_prefix(' ')
            .or_else(|| rest.strip_prefix('='))
            .ok_or_else(|| invalid(value))?
            .trim();

        let (range, total) = rest.split_once('/').ok_or_else(|| invalid(value))?;
        let total = number(total.trim(), value)?;

        if range.trim() == "*" {
            return Ok(ContentRange::Query { total });
        }

        let (start, end) = range.split_once('-').ok_or_else(|| invalid(value))?;
        let start = number(start.trim(), value)?;
        let end = number(end.trim(), value)?;
        if start > end || end >= total {
            return Err(invalid(value));
        }
        Ok(ContentRange::Chunk { start, end, total })
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRange::Query { total } => write!(f, "bytes */{}", total),
            ContentRange::Chunk { start, end, total } => {
                write!(f, "bytes {}-{}/{}", start, end, total)
            }
        }
    }
}

/// Value of the `Range` header telling a client which bytes are stored,
/// or `None` when nothing has been persisted yet
pub fn resume_range(bytes_written: u64) -> Option<String> {
    if bytes_written == 0 {
        None
    } else {
        Some(format!("bytes=0-{}", bytes_written - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk() {
        let range: ContentRange = "bytes 0-1023/2048".parse().unwrap();
        assert_eq!(range, ContentRange::Chunk { start: 0, end: 1023, total: 2048 });
        assert_eq!(range.total(), 2048);
        assert_eq!(range.to_string(), "bytes 0-1023/2048");
    }

    #[test]
    fn test_parse_query() {
        let range: ContentRange = "bytes */2048".parse().unwrap();
        assert_eq!(range, ContentRange::Query { total: 2048 });
        assert_eq!(range.to_string(), "bytes */2048");
    }

    #[test]
    fn test_parse_tolerates_equals_and_whitespace() {
        assert_eq!(
            " bytes=1024-2047/2048 ".parse::<ContentRange>().unwrap(),
            ContentRange::Chunk { start: 1024, end: 2047, total: 2048 }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        for bad in [
            "",
            "bytes",
            "bytes 0-10",
            "items 0-10/20",
            "bytes */",
            "bytes */-1",
            "bytes a-b/c",
            "bytes 10-5/20",
            "bytes 0-20/20",
            "bytes -5/20",
            "bytes 0-+5/20",
        ] {
            let result = bad.parse::<ContentRange>();
            assert!(
                matches!(result, Err(UploadError::InvalidRequest(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_resume_range() {
        assert_eq!(resume_range(1024).as_deref(), Some("bytes=0-1023"));
        assert_eq!(resume_range(1).as_deref(), Some("bytes=0-0"));
        assert_eq!(resume_range(0), None);
    }
}
