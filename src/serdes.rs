//! Serialization/deserialization for handler payloads and object state.
//!
//! State values and payloads travel through the endpoint as raw bytes. The
//! [`SerDes`] trait turns those bytes into typed values; [`JsonSerDes`] is the
//! default implementation and [`StateKey`] binds a state name to a value type.
//!
//! # Example
//!
//! ```rust
//! use durable_object_endpoint::serdes::{JsonSerDes, SerDes, SerDesContext};
//!
//! let serdes = JsonSerDes::<u32>::new();
//! let context = SerDesContext::new("alice", "counter");
//!
//! let bytes = serdes.serialize(&7, &context).unwrap();
//! assert_eq!(&bytes[..], b"7");
//! assert_eq!(serdes.deserialize(&bytes, &context).unwrap(), 7);
//! ```

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Content type produced and accepted by [`JsonSerDes`].
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Error type for serialization/deserialization failures.
#[derive(Debug, Clone)]
pub struct SerDesError {
    /// The kind of error (serialization or deserialization)
    pub kind: SerDesErrorKind,
    /// Descriptive error message
    pub message: String,
}

/// The kind of SerDes error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerDesErrorKind {
    /// Error during serialization
    Serialization,
    /// Error during deserialization
    Deserialization,
}

impl SerDesError {
    /// Creates a new serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self {
            kind: SerDesErrorKind::Serialization,
            message: message.into(),
        }
    }

    /// Creates a new deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self {
            kind: SerDesErrorKind::Deserialization,
            message: message.into(),
        }
    }
}

impl fmt::Display for SerDesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SerDesErrorKind::Serialization => write!(f, "Serialization error: {}", self.message),
            SerDesErrorKind::Deserialization => {
                write!(f, "Deserialization error: {}", self.message)
            }
        }
    }
}

impl std::error::Error for SerDesError {}

impl From<serde_json::Error> for SerDesError {
    fn from(error: serde_json::Error) -> Self {
        if error.is_io() || error.is_syntax() || error.is_data() || error.is_eof() {
            Self::deserialization(error.to_string())
        } else {
            Self::serialization(error.to_string())
        }
    }
}

/// Context provided to serializers.
///
/// Identifies which object and which state entry (or payload) is being
/// encoded, so custom serializers can log or version by location.
#[derive(Debug, Clone)]
pub struct SerDesContext {
    /// The object key the value belongs to
    pub object_key: String,
    /// The state name, or the handler name for payloads
    pub name: String,
}

impl SerDesContext {
    /// Creates a new SerDesContext.
    pub fn new(object_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            name: name.into(),
        }
    }
}

/// Trait for serialization and deserialization of state values and payloads.
///
/// Implementations must be `Send + Sync` so that typed state keys can be
/// shared between concurrent invocations.
pub trait SerDes<T>: Send + Sync {
    /// Serializes a value to bytes.
    fn serialize(&self, value: &T, context: &SerDesContext) -> Result<Bytes, SerDesError>;

    /// Deserializes bytes back to a value.
    fn deserialize(&self, data: &[u8], context: &SerDesContext) -> Result<T, SerDesError>;

    /// Content type of the serialized form.
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }
}

/// Default JSON serialization implementation using serde_json.
pub struct JsonSerDes<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerDes<T> {
    /// Creates a new JsonSerDes instance.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerDes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerDes<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerDes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSerDes").finish()
    }
}

impl<T> SerDes<T> for JsonSerDes<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T, _context: &SerDesContext) -> Result<Bytes, SerDesError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| SerDesError::serialization(e.to_string()))
    }

    fn deserialize(&self, data: &[u8], _context: &SerDesContext) -> Result<T, SerDesError> {
        serde_json::from_slice(data).map_err(|e| SerDesError::deserialization(e.to_string()))
    }
}

/// A typed handle to one state entry of a virtual object.
///
/// Values are JSON-encoded unless another codec is supplied with
/// [`with_serdes`](StateKey::with_serdes).
///
/// ```rust
/// use durable_object_endpoint::serdes::StateKey;
///
/// const COUNT: StateKey<u32> = StateKey::new("counter");
/// assert_eq!(COUNT.name(), "counter");
/// ```
pub struct StateKey<T, S = JsonSerDes<T>> {
    name: &'static str,
    serdes: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// Creates a JSON-encoded state key.
    pub const fn new(name: &'static str) -> Self {
        Self::with_serdes(name, JsonSerDes::new())
    }
}

impl<T, S> StateKey<T, S> {
    /// Creates a state key encoded with a custom codec.
    pub const fn with_serdes(name: &'static str, serdes: S) -> Self {
        Self {
            name,
            serdes,
            _marker: PhantomData,
        }
    }

    /// Returns the state name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the codec used for this key.
    pub fn serdes(&self) -> &S {
        &self.serdes
    }
}

impl<T, S: SerDes<T>> StateKey<T, S> {
    /// Encodes a value for this key.
    pub fn encode(&self, object_key: &str, value: &T) -> Result<Bytes, SerDesError> {
        self.serdes
            .serialize(value, &SerDesContext::new(object_key, self.name))
    }

    /// Decodes a stored value of this key.
    pub fn decode(&self, object_key: &str, data: &[u8]) -> Result<T, SerDesError> {
        self.serdes
            .deserialize(data, &SerDesContext::new(object_key, self.name))
    }
}

impl<T, S: Clone> Clone for StateKey<T, S> {
    fn clone(&self) -> Self {
        Self::with_serdes(self.name, self.serdes.clone())
    }
}

impl<T, S> fmt::Debug for StateKey<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateKey").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn create_test_context() -> SerDesContext {
        SerDesContext::new("alice", "counter")
    }

    #[test]
    fn test_serdes_context_creation() {
        let ctx = SerDesContext::new("bob", "available-drivers");
        assert_eq!(ctx.object_key, "bob");
        assert_eq!(ctx.name, "available-drivers");
    }

    #[test]
    fn test_serdes_error_kinds() {
        let error = SerDesError::serialization("failed to serialize");
        assert_eq!(error.kind, SerDesErrorKind::Serialization);
        assert!(error.to_string().contains("Serialization error"));

        let error = SerDesError::deserialization("failed to deserialize");
        assert_eq!(error.kind, SerDesErrorKind::Deserialization);
        assert!(error.to_string().contains("Deserialization error"));
    }

    #[test]
    fn test_json_serdes_serialize() {
        let serdes = JsonSerDes::<TestData>::new();
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let result = serdes.serialize(&data, &create_test_context()).unwrap();
        let text = std::str::from_utf8(&result).unwrap();
        assert!(text.contains("\"name\":\"test\""));
        assert!(text.contains("\"value\":42"));
    }

    #[test]
    fn test_json_serdes_deserialize_invalid() {
        let serdes = JsonSerDes::<TestData>::new();
        let result = serdes.deserialize(b"not valid json", &create_test_context());
        assert_eq!(result.unwrap_err().kind, SerDesErrorKind::Deserialization);
    }

    #[test]
    fn test_json_serdes_string_payload() {
        let serdes = JsonSerDes::<String>::new();
        let greeting = serdes.deserialize(br#""Hello""#, &create_test_context()).unwrap();
        assert_eq!(greeting, "Hello");
    }

    #[test]
    fn test_json_serdes_content_type() {
        let serdes = JsonSerDes::<u32>::new();
        assert_eq!(serdes.content_type(), JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_state_key_is_const_constructible() {
        const COUNT: StateKey<u32> = StateKey::new("counter");
        let cloned = COUNT.clone();
        assert_eq!(cloned.name(), "counter");
        let bytes = COUNT.serdes().serialize(&3, &create_test_context()).unwrap();
        assert_eq!(&bytes[..], b"3");
    }

    #[test]
    fn test_serde_json_eof_is_deserialization() {
        let err = serde_json::from_slice::<u32>(b"").unwrap_err();
        assert_eq!(SerDesError::from(err).kind, SerDesErrorKind::Deserialization);
    }

    /// Stores a list of tags as one comma-separated line.
    #[derive(Clone, Default)]
    struct TagListSerDes;

    impl SerDes<Vec<String>> for TagListSerDes {
        fn serialize(
            &self,
            value: &Vec<String>,
            _context: &SerDesContext,
        ) -> Result<Bytes, SerDesError> {
            if value.iter().any(|tag| tag.contains(',')) {
                return Err(SerDesError::serialization("tags may not contain ','"));
            }
            Ok(Bytes::from(value.join(",")))
        }

        fn deserialize(
            &self,
            data: &[u8],
            context: &SerDesContext,
        ) -> Result<Vec<String>, SerDesError> {
            let text = std::str::from_utf8(data).map_err(|e| {
                SerDesError::deserialization(format!("{} is not UTF-8: {}", context.name, e))
            })?;
            if text.is_empty() {
                return Ok(Vec::new());
            }
            Ok(text.split(',').map(str::to_string).collect())
        }

        fn content_type(&self) -> &'static str {
            "text/csv"
        }
    }

    #[test]
    fn test_state_key_with_custom_serdes() {
        const TAGS: StateKey<Vec<String>, TagListSerDes> =
            StateKey::with_serdes("tags", TagListSerDes);

        let tags = vec!["vip".to_string(), "night".to_string()];
        let bytes = TAGS.encode("alice", &tags).unwrap();
        assert_eq!(&bytes[..], b"vip,night");
        assert_eq!(TAGS.decode("alice", b"a,b").unwrap(), vec!["a", "b"]);
        assert_eq!(TAGS.serdes().content_type(), "text/csv");

        let err = TAGS.encode("alice", &vec!["a,b".to_string()]).unwrap_err();
        assert_eq!(err.kind, SerDesErrorKind::Serialization);
    }
}
