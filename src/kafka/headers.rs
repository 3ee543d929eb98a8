use rdkafka::message::Headers as KafkaHeaders;
use std::collections::HashMap;

/// Message headers with a clean, string-typed API.
///
/// `Headers` wraps a `HashMap<String, Option<String>>`: Kafka allows headers
/// without a value, which are represented here as `None`. Construction uses
/// a builder pattern.
///
/// # Examples
///
/// ```rust
/// use kafka_readstream::Headers;
///
/// let headers = Headers::new()
///     .insert("source", "web-api")
///     .insert("trace-id", "abc-123")
///     .insert_null("redelivered");
///
/// assert_eq!(headers.get("source"), Some("web-api"));
/// assert!(headers.contains_key("redelivered"));
/// assert_eq!(headers.get("redelivered"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    inner: HashMap<String, Option<String>>,
}

impl Headers {
    /// Creates an empty headers collection
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Creates a headers collection with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a header with a value
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.insert(key.into(), Some(value.into()));
        self
    }

    /// Inserts a header with no value (null header)
    pub fn insert_null(mut self, key: impl Into<String>) -> Self {
        self.inner.insert(key.into(), None);
        self
    }

    /// Gets a header value by key; null headers return `None`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(|v| v.as_deref())
    }

    /// Gets a header entry by key, distinguishing a null header from a missing one
    pub fn get_optional(&self, key: &str) -> Option<&Option<String>> {
        self.inner.get(key)
    }

    /// Checks whether a header exists, regardless of value
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the number of headers
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no headers
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over all header entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Builds a headers collection from native rdkafka headers.
    ///
    /// Header values are decoded as UTF-8; invalid bytes are replaced.
    pub(crate) fn from_rdkafka<H: KafkaHeaders>(headers: &H) -> Self {
        let mut inner = HashMap::with_capacity(headers.count());
        for header in headers.iter() {
            let value = header
                .value
                .map(|v| String::from_utf8_lossy(v).into_owned());
            inner.insert(header.key.to_string(), value);
        }
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let headers = Headers::new()
            .insert("source", "test")
            .insert("version", "1.0");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("source"), Some("test"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn test_null_header() {
        let headers = Headers::new().insert_null("flag");

        assert!(headers.contains_key("flag"));
        assert_eq!(headers.get("flag"), None);
        assert_eq!(headers.get_optional("flag"), Some(&None));
        assert_eq!(headers.get_optional("missing"), None);
    }

    #[test]
    fn test_iteration() {
        let headers = Headers::new().insert("a", "1").insert_null("b");
        let mut seen: Vec<_> = headers.iter().collect();
        seen.sort();

        assert_eq!(seen, vec![("a", Some("1")), ("b", None)]);
    }

    #[test]
    fn test_empty() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.len(), 0);
    }
}
