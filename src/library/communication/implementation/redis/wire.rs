use super::super::super::broker::{BrokerError, Delivery};
use super::{EXCHANGE_BINDINGS_KEY_PREFIX, QUEUE_BINDINGS_KEY_PREFIX, QUEUE_KEY_PREFIX};
use serde::{Deserialize, Serialize};

/// Association between exchange and queue, stored with both of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct Binding {
    pub(super) exchange: String,
    pub(super) routing_key: String,
    pub(super) queue: String,
}

impl Binding {
    pub(super) fn encode(&self) -> Result<String, BrokerError> {
        serde_json::to_string(self).map_err(|e| BrokerError::Malformed(e.into()))
    }

    pub(super) fn decode(raw: &str) -> Result<Self, BrokerError> {
        serde_json::from_str(raw).map_err(|e| BrokerError::Malformed(e.into()))
    }
}

pub(super) fn encode_delivery(delivery: &Delivery) -> Result<Vec<u8>, BrokerError> {
    serde_json::to_vec(delivery).map_err(|e| BrokerError::Malformed(e.into()))
}

pub(super) fn decode_delivery(raw: &[u8]) -> Result<Delivery, BrokerError> {
    serde_json::from_slice(raw).map_err(|e| BrokerError::Malformed(e.into()))
}

pub(super) fn queue_key(queue: &str) -> String {
    format!("{}{}", QUEUE_KEY_PREFIX, queue)
}

pub(super) fn exchange_bindings_key(exchange: &str) -> String {
    format!("{}{}", EXCHANGE_BINDINGS_KEY_PREFIX, exchange)
}

pub(super) fn queue_bindings_key(queue: &str) -> String {
    format!("{}{}", QUEUE_BINDINGS_KEY_PREFIX, queue)
}
