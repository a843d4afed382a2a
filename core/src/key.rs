//! Topic key resolution.
//!
//! A logical topic maps to one physical store key by prefix concatenation.
//! No escaping or validation is done; callers keep prefixed names collision
//! free.

/// Separator between a topic key and a message id in dedupe record keys.
pub const DEDUPE_SEPARATOR: &str = ":dedupe:";

/// Physical key for `topic` under `prefix`.
#[must_use]
pub fn resolve(topic: &str, prefix: &str) -> String {
    format!("{prefix}{topic}")
}

/// Dedupe record key for `message_id` on the physical `key`.
#[must_use]
pub fn dedupe_key(key: &str, message_id: &str) -> String {
    format!("{key}{DEDUPE_SEPARATOR}{message_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn concatenates_prefix_and_topic() {
        assert_eq!(
            resolve("events:outbound", "stream-bus:"),
            "stream-bus:events:outbound"
        );
        assert_eq!(resolve("orders", ""), "orders");
    }

    #[test]
    fn dedupe_key_layout() {
        assert_eq!(
            dedupe_key("stream-bus:events:outbound", "1-1"),
            "stream-bus:events:outbound:dedupe:1-1"
        );
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(topic in ".*", prefix in ".*") {
            prop_assert_eq!(resolve(&topic, &prefix), resolve(&topic, &prefix));
        }

        #[test]
        fn resolve_keeps_both_parts(topic in "[a-z:]{0,16}", prefix in "[a-z:-]{0,16}") {
            let key = resolve(&topic, &prefix);
            prop_assert!(key.starts_with(&prefix));
            prop_assert!(key.ends_with(&topic));
            prop_assert_eq!(key.len(), prefix.len() + topic.len());
        }
    }
}
