//! Per-deployment path grammar.
//!
//! A grammar is an ordered list of tokens, one per leading path segment of
//! an archived file. Exactly one segment names the category and exactly one
//! carries the archive date; everything after the token-governed segments is
//! the file's public path.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{ConfigError, PathError};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathToken {
    Ignore,
    Category,
    Date,
}

impl PathToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathToken::Ignore => "ignore",
            PathToken::Category => "category",
            PathToken::Date => "date",
        }
    }
}

/// A validated grammar: at least the category and date tokens, each exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFormat {
    tokens: Vec<PathToken>,
}

/// The pieces of an archived file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub category: String,
    pub archive_date: NaiveDate,
    /// The token-governed leading segments, joined with `/`.
    pub prefix: String,
    /// Everything after the prefix; may itself contain `/`.
    pub public_path: String,
}

impl PathFormat {
    pub fn new(tokens: Vec<PathToken>) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPathFormat {
            format: tokens
                .iter()
                .map(PathToken::as_str)
                .collect::<Vec<_>>()
                .join("/"),
            reason,
        };

        for required in [PathToken::Category, PathToken::Date] {
            match tokens.iter().filter(|t| **t == required).count() {
                1 => {}
                0 => return Err(invalid(format!("missing '{}' token", required.as_str()))),
                n => {
                    return Err(invalid(format!(
                        "'{}' token appears {} times",
                        required.as_str(),
                        n
                    )))
                }
            }
        }

        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// Splits `path` into category, archive date, prefix and public path.
    pub fn parse_path(&self, path: &str) -> Result<ParsedPath, PathError> {
        let expected = self.tokens.len() + 1;
        let segments: Vec<&str> = path.splitn(expected, '/').collect();
        if segments.len() != expected {
            return Err(PathError::SegmentCount {
                path: path.to_string(),
                expected,
                found: segments.len(),
            });
        }

        let mut category = None;
        let mut archive_date = None;
        for (token, segment) in self.tokens.iter().zip(&segments) {
            match token {
                PathToken::Ignore => {}
                PathToken::Category => category = Some(*segment),
                PathToken::Date => {
                    archive_date = Some(parse_date(segment).ok_or_else(|| {
                        PathError::InvalidDate {
                            path: path.to_string(),
                            segment: segment.to_string(),
                        }
                    })?)
                }
            }
        }

        let public_path = segments[self.tokens.len()];
        if public_path.is_empty() {
            return Err(PathError::EmptyPublicPath {
                path: path.to_string(),
            });
        }

        // Both are present: the constructor guarantees one of each token
        let (Some(category), Some(archive_date)) = (category, archive_date) else {
            return Err(PathError::SegmentCount {
                path: path.to_string(),
                expected,
                found: segments.len(),
            });
        };

        Ok(ParsedPath {
            category: category.to_string(),
            archive_date,
            prefix: segments[..self.tokens.len()].join("/"),
            public_path: public_path.to_string(),
        })
    }
}

fn parse_date(segment: &str) -> Option<NaiveDate> {
    // chrono tolerates padding spaces and signed years; the archive layout
    // is strictly YYYY-MM-DD
    let bytes = segment.as_bytes();
    if bytes.len() != 10 {
        return None;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !well_formed {
        return None;
    }
    NaiveDate::parse_from_str(segment, DATE_FORMAT).ok()
}

impl FromStr for PathFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidPathFormat {
            format: s.to_string(),
            reason,
        };

        let mut tokens = Vec::new();
        for segment in s.split('/') {
            let token = match segment.trim() {
                "ignore" => PathToken::Ignore,
                "category" | "project" => PathToken::Category,
                "date" => PathToken::Date,
                "" => return Err(invalid("empty segment".to_string())),
                other => return Err(invalid(format!("unknown token '{}'", other))),
            };
            tokens.push(token);
        }

        PathFormat::new(tokens).map_err(|e| match e {
            ConfigError::InvalidPathFormat { reason, .. } => invalid(reason),
            other => other,
        })
    }
}

impl fmt::Display for PathFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(token.as_str())?;
        }
        Ok(())
    }
}
