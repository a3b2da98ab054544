//! Conversion between typed payloads and wire bytes

use crate::library::BoxedError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialization algorithm used for message bodies
///
/// The request/response logic does not care about the wire format, it only requires payloads
/// to implement the appropriate serde traits. A [`serde_json`] based implementation is
/// provided by [`JsonSerializer`](super::implementation::json::JsonSerializer).
pub trait MessageSerializer {
    /// Converts a value into its wire representation
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, BoxedError>;

    /// Restores a value from its wire representation
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BoxedError>;
}
