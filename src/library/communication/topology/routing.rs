use super::ExchangeKind;

const TOPIC_SEPARATOR: char = '.';
const TOPIC_SINGLE_WORD: &str = "*";
const TOPIC_ANY_WORDS: &str = "#";

/// Decides whether a message published with `routing_key` reaches a queue bound with `binding_key`
pub fn routes(kind: ExchangeKind, binding_key: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Direct => binding_key == routing_key,
        ExchangeKind::Topic => {
            let pattern: Vec<&str> = binding_key.split(TOPIC_SEPARATOR).collect();
            let words: Vec<&str> = routing_key.split(TOPIC_SEPARATOR).collect();
            topic_matches(&pattern, &words)
        }
        ExchangeKind::Fanout | ExchangeKind::Headers => true,
    }
}

fn topic_matches(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((head, rest)) if *head == TOPIC_ANY_WORDS => {
            (0..=words.len()).any(|skipped| topic_matches(rest, &words[skipped..]))
        }
        Some((head, rest)) => match words.split_first() {
            Some((word, remaining)) if *head == TOPIC_SINGLE_WORD || head == word => {
                topic_matches(rest, remaining)
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn route_direct_by_equality() {
        assert!(routes(ExchangeKind::Direct, "rpc.user", "rpc.user"));
        assert!(!routes(ExchangeKind::Direct, "rpc.user", "rpc.User"));
    }

    #[test]
    fn route_topic_wildcards() {
        assert!(routes(ExchangeKind::Topic, "rpc.*", "rpc.user"));
        assert!(!routes(ExchangeKind::Topic, "rpc.*", "rpc.user.created"));
        assert!(routes(ExchangeKind::Topic, "rpc.#", "rpc.user.created"));
        assert!(routes(ExchangeKind::Topic, "rpc.#", "rpc"));
        assert!(routes(ExchangeKind::Topic, "#.created", "user.created"));
        assert!(routes(ExchangeKind::Topic, "#", "anything.at.all"));
        assert!(!routes(ExchangeKind::Topic, "*.created", "created"));
    }

    #[test]
    fn route_fanout_unconditionally() {
        assert!(routes(ExchangeKind::Fanout, "", "whatever"));
        assert!(routes(ExchangeKind::Headers, "a", "b"));
    }
}
