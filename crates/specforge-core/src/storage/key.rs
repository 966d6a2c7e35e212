//! Row key encoding.

/// Separator between the table name and the row id.
pub const TABLE_SEPARATOR: u8 = 0;

/// Size of a row id in bytes.
pub const ROW_ID_SIZE: usize = 8;

/// Encode the key of one row.
///
/// Key format: `[table bytes][0x00][id (8 bytes, big-endian)]`
///
/// Big-endian ids keep a table's rows in id order during prefix scans.
pub fn row_key(table: &str, id: u64) -> Vec<u8> {
    let mut key = table_prefix(table);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Prefix shared by every row of a table.
pub fn table_prefix(table: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(table.len() + 1 + ROW_ID_SIZE);
    prefix.extend_from_slice(table.as_bytes());
    prefix.push(TABLE_SEPARATOR);
    prefix
}

/// Decode a row key into its table name and id.
pub fn decode_row_key(key: &[u8]) -> Option<(&str, u64)> {
    if key.len() < ROW_ID_SIZE + 1 {
        return None;
    }
    let (head, id_bytes) = key.split_at(key.len() - ROW_ID_SIZE);
    let (table, separator) = head.split_at(head.len() - 1);
    if separator != [TABLE_SEPARATOR] {
        return None;
    }

    let mut id = [0u8; ROW_ID_SIZE];
    id.copy_from_slice(id_bytes);
    Some((std::str::from_utf8(table).ok()?, u64::from_be_bytes(id)))
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let key = row_key("article_tag", 42);
        assert_eq!(decode_row_key(&key), Some(("article_tag", 42)));
        assert!(key.starts_with(&table_prefix("article_tag")));
    }

    #[test]
    fn test_ordering_follows_id() {
        assert!(row_key("article", 2) < row_key("article", 10));
        assert!(row_key("article", 255) < row_key("article", 256));
    }

    #[test]
    fn test_prefixes_do_not_overlap() {
        assert!(!row_key("article_tag", 1).starts_with(&table_prefix("article")));
    }

    #[test]
    fn test_decode_invalid() {
        assert!(decode_row_key(&[1, 2, 3]).is_none());
        assert!(decode_row_key(&[b'a', 1, 0, 0, 0, 0, 0, 0, 0, 1]).is_none());
    }
}
