//! Topic name and filter syntax validation and wildcard matching
//! (MQTT-4.7).

/// Validates topic syntax, shared by names and filters: 1..=65535 UTF-8
/// bytes, `#` at most once and only as the final character, and `+`/`#`
/// only as complete `/`-delimited segments. Rejecting wildcards in
/// *published* topic names is a dispatch concern, not a syntax one.
#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    if topic.is_empty() || topic.len() > 65535 {
        return false;
    }
    if let Some(pos) = topic.find('#') {
        // A second '#', or one anywhere but the last byte, is invalid.
        if pos != topic.len() - 1 {
            return false;
        }
    }
    let bytes = topic.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'+' || b == b'#' {
            let starts_segment = i == 0 || bytes[i - 1] == b'/';
            let ends_segment = i == bytes.len() - 1 || bytes[i + 1] == b'/';
            if !starts_segment || !ends_segment {
                return false;
            }
        }
    }
    true
}

/// Matches a subscription filter against a published (non-wildcard) topic.
///
/// Both arguments must be individually valid, otherwise no match. A filter
/// without wildcards matches by exact equality. `+` matches exactly one
/// segment, a trailing `#` matches the remaining segments, zero or more. A
/// filter whose first segment is a wildcard never matches a `$`-prefixed
/// topic (MQTT-4.7.2-1); `$` state is additionally partitioned into its
/// own store by the subscription engine.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if !is_valid_topic(filter) || !is_valid_topic(topic) {
        return false;
    }
    if !filter.contains('+') && !filter.contains('#') {
        return filter == topic;
    }
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_segments = filter.split('/');
    let mut topic_segments = topic.split('/');
    loop {
        match (filter_segments.next(), topic_segments.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topics() {
        assert!(is_valid_topic("Topic"));
        assert!(is_valid_topic("Topic/A"));
        assert!(is_valid_topic("+"));
        assert!(is_valid_topic("+/+"));
        assert!(is_valid_topic("Topic/+"));
        assert!(is_valid_topic("Topic/#"));
        assert!(is_valid_topic("#"));
        assert!(is_valid_topic("a/#"));
        assert!(is_valid_topic("_(*é"));
        assert!(is_valid_topic("/"));
        assert!(is_valid_topic("$SYS/broker/load"));
    }

    #[test]
    fn test_invalid_topics() {
        assert!(!is_valid_topic(""));
        assert!(!is_valid_topic("a#"));
        assert!(!is_valid_topic("_(*é#"));
        assert!(!is_valid_topic("#/a"));
        assert!(!is_valid_topic("a/#/b"));
        assert!(!is_valid_topic("a+"));
        assert!(!is_valid_topic("+a"));
        assert!(!is_valid_topic("a/b+/c"));
        assert!(!is_valid_topic("a/#b"));
        assert!(!is_valid_topic(&"x".repeat(65536)));
    }

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("Topic", "Topic"));
        assert!(topic_matches("Topic/A", "Topic/A"));
        assert!(!topic_matches("Topic/A", "Topic/B"));
        assert!(!topic_matches("Topic", "topic"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(topic_matches("+", "Topic"));
        assert!(topic_matches("+/+", "Topic/Sub"));
        assert!(topic_matches("Topic/+", "Topic/Sub"));
        assert!(topic_matches("Topic/+/Topic", "Topic/innerPlus/Topic"));
        assert!(!topic_matches("+", "Topic/Sub"));
        assert!(!topic_matches("Topic/+", "Topic"));
        assert!(!topic_matches("Topic/+", "Topic/Sub/Deep"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches("Topic/#", "Topic/Sub"));
        assert!(topic_matches("Topic/#", "Topic/Sub/Sub2"));
        assert!(topic_matches("Topic/#", "Topic"));
        assert!(topic_matches("#", "Topic"));
        assert!(topic_matches("#", "Topic/Sub/Sub2"));
        assert!(!topic_matches("Other/#", "Topic/Sub"));
    }

    #[test]
    fn test_dollar_topics_isolated_from_leading_wildcards() {
        assert!(!topic_matches("#", "$SYS/x"));
        assert!(!topic_matches("+", "$SYS"));
        assert!(!topic_matches("+/x", "$SYS/x"));
        assert!(topic_matches("$SYS/#", "$SYS/x"));
        assert!(topic_matches("$SYS/+", "$SYS/x"));
    }

    #[test]
    fn test_invalid_inputs_never_match() {
        assert!(!topic_matches("a#", "a"));
        assert!(!topic_matches("a/+", "a/b#"));
        assert!(!topic_matches("", ""));
    }

    #[test]
    fn test_empty_segments_match_structurally() {
        assert!(topic_matches("a//c", "a//c"));
        assert!(topic_matches("a/+/c", "a//c"));
    }
}
