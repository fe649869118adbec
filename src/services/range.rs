//! `Range: bytes=...` handling for local media files.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; send the whole file with 200.
    Full,
    /// Inclusive byte range, already clamped to the file length.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl RangeRequest {
    /// Canonical `Range` header for a file of `len` bytes, or `None` when the
    /// whole file should be sent.
    pub fn to_header(&self, len: u64) -> Option<String> {
        match self {
            RangeRequest::Full => None,
            RangeRequest::Partial { start, end } => Some(format!("bytes={}-{}", start, end)),
            RangeRequest::Unsatisfiable => Some(format!("bytes={}-", len)),
        }
    }
}

/// Parses a single-range `Range` header against a file of `len` bytes.
///
/// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. Headers in
/// any other shape (other units, multiple ranges, garbage) are ignored.
pub fn parse_range(header: Option<&str>, len: u64) -> RangeRequest {
    let Some(header) = header else {
        return RangeRequest::Full;
    };

    let header = header.trim();
    let Some(spec) = header
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes="))
        .map(|_| header[6..].trim())
    else {
        return RangeRequest::Full;
    };

    if spec.contains(',') {
        return RangeRequest::Full;
    }

    let Some((start, end)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };

    match (start.trim(), end.trim()) {
        ("", "") => RangeRequest::Full,
        ("", suffix) => {
            let Ok(suffix) = suffix.parse::<u64>() else {
                return RangeRequest::Full;
            };
            if suffix == 0 || len == 0 {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Partial {
                start: len.saturating_sub(suffix),
                end: len - 1,
            }
        }
        (start, "") => {
            let Ok(start) = start.parse::<u64>() else {
                return RangeRequest::Full;
            };
            if start >= len {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Partial {
                start,
                end: len - 1,
            }
        }
        (start, end) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return RangeRequest::Full;
            };
            if start > end || start >= len {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Partial {
                start,
                end: end.min(len - 1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range() {
        let range = parse_range(Some("bytes=200-299"), 1000);
        assert_eq!(range, RangeRequest::Partial { start: 200, end: 299 });
        assert_eq!(range.to_header(1000).as_deref(), Some("bytes=200-299"));
    }

    #[test]
    fn test_end_clamped_to_length() {
        assert_eq!(
            parse_range(Some("bytes=900-1999"), 1000),
            RangeRequest::Partial { start: 900, end: 999 }
        );
    }

    #[test]
    fn test_start_past_end_of_file() {
        assert_eq!(
            parse_range(Some("bytes=1000-1005"), 1000),
            RangeRequest::Unsatisfiable
        );
        assert_eq!(
            parse_range(Some("bytes=1000-"), 1000),
            RangeRequest::Unsatisfiable
        );
    }

    #[test]
    fn test_inverted_range() {
        assert_eq!(
            parse_range(Some("bytes=500-100"), 1000),
            RangeRequest::Unsatisfiable
        );
    }

    #[test]
    fn test_open_and_suffix_ranges() {
        assert_eq!(
            parse_range(Some("bytes=990-"), 1000),
            RangeRequest::Partial { start: 990, end: 999 }
        );
        assert_eq!(
            parse_range(Some("bytes=-100"), 1000),
            RangeRequest::Partial { start: 900, end: 999 }
        );
        assert_eq!(
            parse_range(Some("bytes=-5000"), 1000),
            RangeRequest::Partial { start: 0, end: 999 }
        );
    }

    #[test]
    fn test_unusable_headers_fall_back_to_full() {
        assert_eq!(parse_range(None, 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("items=0-5"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=0-5,10-20"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=abc-def"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes"), 1000), RangeRequest::Full);
    }

    #[test]
    fn test_canonical_headers() {
        assert_eq!(
            parse_range(Some("bytes=900-1999"), 1000).to_header(1000).as_deref(),
            Some("bytes=900-999")
        );
        assert_eq!(
            parse_range(Some("bytes=500-100"), 1000).to_header(1000).as_deref(),
            Some("bytes=1000-")
        );
        assert_eq!(parse_range(Some("bytes=0-5,10-20"), 1000).to_header(1000), None);
    }
}
