//! MQTT-style topic filters.
//!
//! Levels are separated by `/`. In a filter, `+` matches exactly one level
//! and `#` (only as the last level) matches any number of trailing levels,
//! including none.

use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
  Exact(String),
  Single,
  Multi,
}

/// A parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
  raw:    String,
  levels: Vec<Level>,
}

impl TopicFilter {
  pub fn parse(filter: &str) -> Result<Self> {
    if filter.is_empty() {
      return Err(Error::InvalidFilter(filter.to_owned()));
    }

    let parts: Vec<&str> = filter.split('/').collect();
    let last = parts.len() - 1;
    let mut levels = Vec::with_capacity(parts.len());
    for (i, part) in parts.into_iter().enumerate() {
      let level = match part {
        "+" => Level::Single,
        "#" if i == last => Level::Multi,
        p if p.contains(['+', '#']) => return Err(Error::InvalidFilter(filter.to_owned())),
        p => Level::Exact(p.to_owned()),
      };
      levels.push(level);
    }

    Ok(Self { raw: filter.to_owned(), levels })
  }

  pub fn as_str(&self) -> &str { &self.raw }

  /// Whether a concrete topic name matches this filter.
  pub fn matches(&self, topic: &str) -> bool {
    let mut parts = topic.split('/');
    for level in &self.levels {
      match level {
        Level::Multi => return true,
        Level::Single => {
          if parts.next().is_none() {
            return false;
          }
        }
        Level::Exact(want) => match parts.next() {
          Some(got) if got == want => {}
          _ => return false,
        },
      }
    }
    parts.next().is_none()
  }
}

impl fmt::Display for TopicFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.raw) }
}

/// Reject publish topics that contain wildcard characters.
pub(crate) fn validate_topic(topic: &str) -> Result<()> {
  if topic.is_empty() || topic.contains(['+', '#']) {
    return Err(Error::InvalidTopic(topic.to_owned()));
  }
  Ok(())
}
