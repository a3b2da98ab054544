use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header table attached to a message, values are opaque
pub type Headers = BTreeMap<String, Vec<u8>>;

/// Broker-level envelope of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicProperties {
    /// Address (queue name) a response should be sent to
    pub reply_to: Option<String>,
    /// Token used to match a response to its request
    pub correlation_id: Option<String>,
    /// Identity of this individual message
    pub message_id: Option<String>,
    /// Application defined headers
    #[serde(default)]
    pub headers: Headers,
}

impl BasicProperties {
    /// Sets the reply-to address
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Sets the correlation id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the message id
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Adds a header, replacing any previous value with the same name
    pub fn with_header(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    /// Checks whether the correlation id equals the given one
    ///
    /// Comparison is exact and case-sensitive, a missing id never matches.
    pub fn is_correlated_with(&self, correlation_id: &str) -> bool {
        self.correlation_id.as_deref() == Some(correlation_id)
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn match_correlation_exactly() {
        let properties = BasicProperties::default().with_correlation_id("AbC");

        assert!(properties.is_correlated_with("AbC"));
        assert!(!properties.is_correlated_with("abc"));
        assert!(!properties.is_correlated_with("AbC "));
        assert!(!BasicProperties::default().is_correlated_with(""));
    }
}
