/// Opaque pagination tokens
///
/// A cursor is the URL-safe base64 of a JSON-serialized storage key. Clients
/// only hand back values the service produced; anything else is rejected as
/// an invalid cursor. Tokens are not stable across key layout changes.
use crate::error::{CardError, CardResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Serialize};

/// Encode a key into an opaque cursor
pub fn encode<K: Serialize>(key: &K) -> CardResult<String> {
    let json = serde_json::to_vec(key)
        .map_err(|e| CardError::Internal(format!("Failed to serialize cursor key: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a cursor previously produced by [`encode`]
pub fn decode<K: DeserializeOwned>(cursor: &str) -> CardResult<K> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim())
        .map_err(|e| CardError::InvalidCursor(format!("not base64: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CardError::InvalidCursor(format!("unreadable key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageKey;
    use std::collections::BTreeMap;

    #[test]
    fn test_page_key_round_trip() {
        let key = PageKey {
            partition: "label:frequency-often".to_string(),
            sort: "user1|1900-01-01T00:00:00.000Z|card1".to_string(),
        };
        let cursor = encode(&key).unwrap();
        let decoded: PageKey = decode(&cursor).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_arbitrary_keys_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("vertex".to_string(), "card:u|1".to_string());
        map.insert("edge".to_string(), "label:a/b+c=".to_string());
        let decoded: BTreeMap<String, String> = decode(&encode(&map).unwrap()).unwrap();
        assert_eq!(decoded, map);

        let plain = "20240101000000-abc".to_string();
        let decoded: String = decode(&encode(&plain).unwrap()).unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let cursor = encode(&"??>>~~".repeat(10)).unwrap();
        assert!(cursor
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_malformed_cursor() {
        let result: CardResult<PageKey> = decode("not a cursor!");
        assert!(matches!(result, Err(CardError::InvalidCursor(_))));

        // valid base64, wrong shape
        let wrong_shape = encode(&vec![1, 2, 3]).unwrap();
        let result: CardResult<PageKey> = decode(&wrong_shape);
        assert!(matches!(result, Err(CardError::InvalidCursor(_))));
    }
}
