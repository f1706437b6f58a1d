use std::fmt;

use crate::utils::{BridgeError, Result};

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Levels 0..3 are federation tier, centre and source. Only level 0 survives.
const FIXED_PREFIX_LEVELS: usize = 3;
/// Topics longer than this are truncated on rewrite.
const MAX_UNTRUNCATED_LEVELS: usize = 10;
/// Number of levels kept after the prefix when truncating.
const TRUNCATED_LEVELS: usize = 6;

/// A concrete topic a message was published on.
///
/// Never empty and never contains wildcards. The first level denotes the
/// federation tier (`cache`, `origin`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
}

impl Topic {
    /// Parses a published topic, rejecting empty names and wildcards.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(BridgeError::InvalidTopic {
                topic: name.to_string(),
                reason: "topic is empty",
            });
        }
        if name.contains(['+', '#']) {
            return Err(BridgeError::InvalidTopic {
                topic: name.to_string(),
                reason: "wildcards are not allowed in published topics",
            });
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.name.split(LEVEL_SEPARATOR)
    }

    /// The federation tier, i.e. the first level.
    pub fn tier(&self) -> &str {
        self.levels().next().unwrap_or_default()
    }

    /// Maps an inbound topic onto the topic used on the destination broker.
    ///
    /// Keeps level 0 and drops levels 1 and 2. Levels 3.. are kept unless the
    /// topic has more than ten levels, in which case only levels 3..9 are kept.
    /// A topic with fewer than four levels keeps only its tier and a trailing
    /// separator.
    pub fn rewrite(&self) -> Topic {
        let levels: Vec<&str> = self.levels().collect();
        let kept = if levels.len() > MAX_UNTRUNCATED_LEVELS {
            &levels[FIXED_PREFIX_LEVELS..FIXED_PREFIX_LEVELS + TRUNCATED_LEVELS]
        } else {
            levels.get(FIXED_PREFIX_LEVELS..).unwrap_or_default()
        };

        Topic {
            name: format!("{}{}{}", levels[0], LEVEL_SEPARATOR, kept.join("/")),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A subscription pattern, possibly containing `+` and `#` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter {
    pattern: String,
}

impl TopicFilter {
    /// Parses a subscription pattern.
    ///
    /// Wildcards must occupy a whole level and `#` may only be the last level.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason| BridgeError::InvalidTopic {
            topic: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("topic filter is empty"));
        }

        let levels: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
        for (idx, level) in levels.iter().enumerate() {
            if level.contains('#') && (*level != MULTI_LEVEL_WILDCARD || idx + 1 != levels.len()) {
                return Err(invalid("'#' must be the whole last level"));
            }
            if level.contains('+') && *level != SINGLE_LEVEL_WILDCARD {
                return Err(invalid("'+' must occupy a whole level"));
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Returns true when `topic` would be delivered for this subscription.
    pub fn matches(&self, topic: &Topic) -> bool {
        // wildcards in the first level never match system topics
        if topic.as_str().starts_with('$')
            && (self.pattern.starts_with('+') || self.pattern.starts_with('#'))
        {
            return false;
        }

        let mut filter_levels = self.pattern.split(LEVEL_SEPARATOR);
        let mut topic_levels = topic.levels();

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some(MULTI_LEVEL_WILDCARD), _) => return true,
                (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
                (Some(f), Some(t)) if f == t => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// The topic filters subscribed on the source broker.
///
/// Fixed at startup and re-applied verbatim after every reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    filters: Vec<TopicFilter>,
}

impl SubscriptionSet {
    /// Builds the set from configured patterns, trimming whitespace and
    /// dropping duplicates while keeping the configured order.
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut filters: Vec<TopicFilter> = Vec::new();
        for pattern in patterns {
            let filter = TopicFilter::parse(pattern.as_ref().trim())?;
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }

        if filters.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "at least one subscription topic is required".to_string(),
            ));
        }

        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[TopicFilter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, topic: &Topic) -> bool {
        self.filters.iter().any(|f| f.matches(topic))
    }
}
