//! Locating a JSON object inside free-form model output.

use serde_json::{Deserializer, Map, Value};

/// Parse `text` as a single JSON object, ignoring surrounding whitespace.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Objects embedded in `text`, in order of their opening brace.
///
/// Each `{` is a candidate start. serde_json's streaming deserializer reads
/// exactly one value from that offset and stops, so string literals,
/// escapes and nested braces are handled by the JSON grammar itself and any
/// trailing prose or code fence is left unread. Candidates that do not parse
/// as an object are skipped. Objects nested inside an earlier match are also
/// yielded; callers take the first one that suits them.
pub fn embedded_objects(text: &str) -> impl Iterator<Item = Map<String, Value>> + '_ {
    text.match_indices('{').filter_map(move |(start, _)| {
        let mut stream = Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

/// First embedded object satisfying `accept`.
pub fn find_object<F>(text: &str, accept: F) -> Option<Map<String, Value>>
where
    F: Fn(&Map<String, Value>) -> bool,
{
    embedded_objects(text).find(|map| accept(map))
}
