/// Partition names and key layout for the record store
///
/// Partition structure:
/// - `records`: {id} -> LogRecord (JSON)
/// - `idx_timestamp`: {ts:020}:{id} -> ()
/// - `idx_domain`: {domain}\0{id} -> ()
/// - `idx_level`: {level}\0{id} -> ()
/// - `idx_session`: {session_id}\0{id} -> ()
/// - `idx_domain_time`: {domain}\0{ts:020}:{id} -> ()
/// - `idx_level_time`: {level}\0{ts:020}:{id} -> ()
///
/// Timestamps are zero-padded so byte order equals numeric order; ids break
/// ties. Tag values never contain NUL, which keeps prefix scans exact.

pub const RECORDS: &str = "records";
pub const IDX_TIMESTAMP: &str = "idx_timestamp";
pub const IDX_DOMAIN: &str = "idx_domain";
pub const IDX_LEVEL: &str = "idx_level";
pub const IDX_SESSION: &str = "idx_session";
pub const IDX_DOMAIN_TIME: &str = "idx_domain_time";
pub const IDX_LEVEL_TIME: &str = "idx_level_time";

const TAG_SEP: char = '\0';

/// Encode a time key: {ts:020}:{id}
pub fn encode_time_key(timestamp: i64, id: &str) -> Vec<u8> {
    format!("{:020}:{}", timestamp, id).into_bytes()
}

/// Decode a time key: {ts:020}:{id} -> (ts, id)
pub fn decode_time_key(key: &[u8]) -> Option<(i64, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (ts, id) = key_str.split_once(':')?;
    Some((ts.parse().ok()?, id.to_string()))
}

/// Smallest time key at `timestamp` (inclusive lower bound)
pub fn time_lower_bound(timestamp: i64) -> Vec<u8> {
    format!("{:020}:", timestamp).into_bytes()
}

/// Key just past every time key at `timestamp` (exclusive upper bound)
pub fn time_upper_bound(timestamp: i64) -> Vec<u8> {
    // ';' sorts immediately after ':'
    format!("{:020};", timestamp).into_bytes()
}

/// Encode a tag key: {tag}\0{id}
pub fn encode_tag_key(tag: &str, id: &str) -> Vec<u8> {
    format!("{}{}{}", tag, TAG_SEP, id).into_bytes()
}

/// Prefix for all keys of one tag: {tag}\0
pub fn encode_tag_prefix(tag: &str) -> Vec<u8> {
    format!("{}{}", tag, TAG_SEP).into_bytes()
}

/// Decode a tag key: {tag}\0{id} -> (tag, id)
pub fn decode_tag_key(key: &[u8]) -> Option<(String, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (tag, id) = key_str.split_once(TAG_SEP)?;
    Some((tag.to_string(), id.to_string()))
}

/// Encode a tagged time key: {tag}\0{ts:020}:{id}
pub fn encode_tagged_time_key(tag: &str, timestamp: i64, id: &str) -> Vec<u8> {
    format!("{}{}{:020}:{}", tag, TAG_SEP, timestamp, id).into_bytes()
}

pub fn tagged_time_lower_bound(tag: &str, timestamp: i64) -> Vec<u8> {
    format!("{}{}{:020}:", tag, TAG_SEP, timestamp).into_bytes()
}

pub fn tagged_time_upper_bound(tag: &str, timestamp: i64) -> Vec<u8> {
    format!("{}{}{:020};", tag, TAG_SEP, timestamp).into_bytes()
}

/// Decode a tagged time key: {tag}\0{ts:020}:{id} -> (tag, ts, id)
pub fn decode_tagged_time_key(key: &[u8]) -> Option<(String, i64, String)> {
    let (tag, rest) = decode_tag_key(key)?;
    let (ts, id) = decode_time_key(rest.as_bytes())?;
    Some((tag, ts, id))
}

/// Tag values are embedded in keys and must not contain the separator
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.contains(TAG_SEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_key_encoding() {
        let key = encode_time_key(42, "abc");
        assert_eq!(key, b"00000000000000000042:abc");

        let (ts, id) = decode_time_key(&key).unwrap();
        assert_eq!(ts, 42);
        assert_eq!(id, "abc");
    }

    #[test]
    fn test_time_keys_sort_numerically() {
        assert!(encode_time_key(9, "z") < encode_time_key(10, "a"));
        assert!(encode_time_key(10, "a") < encode_time_key(10, "b"));
        assert!(encode_time_key(i64::MAX, "a") > encode_time_key(0, "a"));
    }

    #[test]
    fn test_time_bounds_cover_all_ids() {
        let lower = time_lower_bound(10);
        let upper = time_upper_bound(10);
        let key = encode_time_key(10, "zzzz-with:colon");

        assert!(lower <= key && key < upper);
        assert!(encode_time_key(11, "") >= upper);
        assert!(encode_time_key(9, "zzzz") < lower);
    }

    #[test]
    fn test_tag_key_encoding() {
        let key = encode_tag_key("x.com", "id1");
        assert_eq!(key, b"x.com\0id1");
        assert!(key.starts_with(&encode_tag_prefix("x.com")));
        assert!(!key.starts_with(&encode_tag_prefix("x.co")));

        let (tag, id) = decode_tag_key(&key).unwrap();
        assert_eq!(tag, "x.com");
        assert_eq!(id, "id1");
    }

    #[test]
    fn test_tagged_time_key_encoding() {
        let key = encode_tagged_time_key("error", 7, "id1");
        let (tag, ts, id) = decode_tagged_time_key(&key).unwrap();
        assert_eq!(tag, "error");
        assert_eq!(ts, 7);
        assert_eq!(id, "id1");

        assert!(tagged_time_lower_bound("error", 7) <= key);
        assert!(key < tagged_time_upper_bound("error", 7));
        assert!(tagged_time_upper_bound("error", 7) <= encode_tagged_time_key("error", 8, ""));
    }

    #[test]
    fn test_tag_validation() {
        assert!(is_valid_tag("tab-12"));
        assert!(!is_valid_tag("bad\0tag"));
    }
}
