//! Relay-style cursor pagination.
//!
//! Cursors are opaque but reversible: `encode` wraps the node ID, `decode`
//! returns it or `None` for garbage. Pages default to 50 items and are hard
//! capped at 250 regardless of what the caller asks for.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 250;

const CURSOR_PREFIX: &str = "c:";

/// Encode an ID into an opaque cursor (hex of the ID bytes).
pub fn encode_cursor(id: &str) -> String {
    let mut out = String::with_capacity(CURSOR_PREFIX.len() + id.len() * 2);
    out.push_str(CURSOR_PREFIX);
    for byte in id.bytes() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Decode a cursor back into the original ID. `None` on malformed input.
pub fn decode_cursor(cursor: &str) -> Option<String> {
    let hex = cursor.strip_prefix(CURSOR_PREFIX)?;
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = (chunk[0] as char).to_digit(16)?;
        let low = (chunk[1] as char).to_digit(16)?;
        bytes.push((high * 16 + low) as u8);
    }
    String::from_utf8(bytes).ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEdge<T> {
    pub node: T,
    pub cursor: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<ConnectionEdge<T>>,
    pub page_info: PageInfo,
    pub total_count: usize,
}

/// Slice `items` into one page. `has_previous_page` is true iff `after` was
/// given and resolves to an item inside the collection.
pub fn paginate<T>(
    items: Vec<T>,
    first: Option<usize>,
    after: Option<&str>,
    id_of: impl Fn(&T) -> String,
) -> Connection<T> {
    let total_count = items.len();
    let page_size = first.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let (start, has_previous_page) = match after.and_then(decode_cursor) {
        Some(after_id) => match items.iter().position(|item| id_of(item) == after_id) {
            Some(pos) => (pos + 1, true),
            None => (0, false),
        },
        None => (0, false),
    };

    let edges: Vec<ConnectionEdge<T>> = items
        .into_iter()
        .skip(start)
        .take(page_size)
        .map(|item| {
            let cursor = encode_cursor(&id_of(&item));
            ConnectionEdge { node: item, cursor }
        })
        .collect();

    let has_next_page = start + edges.len() < total_count;
    let page_info = PageInfo {
        has_next_page,
        has_previous_page,
        start_cursor: edges.first().map(|e| e.cursor.clone()),
        end_cursor: edges.last().map(|e| e.cursor.clone()),
    };

    Connection {
        edges,
        page_info,
        total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let id = "src/app.js->FUNCTION->foo[in:Cls,h:9f2c]#2";
        let cursor = encode_cursor(id);
        assert_eq!(decode_cursor(&cursor).as_deref(), Some(id));
        assert_eq!(decode_cursor("garbage"), None);
        assert_eq!(decode_cursor("c:zz"), None);
        assert_eq!(decode_cursor("c:abc"), None);
    }

    #[test]
    fn defaults_and_hard_cap() {
        let items: Vec<String> = (0..500).map(|i| format!("id{i}")).collect();

        let default_page = paginate(items.clone(), None, None, |s| s.clone());
        assert_eq!(default_page.edges.len(), DEFAULT_PAGE_SIZE);
        assert_eq!(default_page.total_count, 500);

        // Requesting 1000 still returns the cap.
        let capped = paginate(items, Some(1000), None, |s| s.clone());
        assert_eq!(capped.edges.len(), MAX_PAGE_SIZE);
        assert!(capped.page_info.has_next_page);
    }

    #[test]
    fn round_trip_has_no_duplicates() {
        let items: Vec<String> = (0..100).map(|i| format!("id{i}")).collect();
        let first_page = paginate(items.clone(), Some(40), None, |s| s.clone());
        let end = first_page.page_info.end_cursor.clone().unwrap();
        let second_page = paginate(items.clone(), Some(40), Some(&end), |s| s.clone());
        assert!(second_page.page_info.has_previous_page);

        let combined: Vec<&str> = first_page
            .edges
            .iter()
            .chain(second_page.edges.iter())
            .map(|e| e.node.as_str())
            .collect();
        assert_eq!(combined.len(), 80);
        assert_eq!(combined, items[..80].iter().map(|s| s.as_str()).collect::<Vec<_>>());
    }

    #[test]
    fn unknown_after_restarts_without_previous_flag() {
        let items: Vec<String> = (0..10).map(|i| format!("id{i}")).collect();
        let cursor = encode_cursor("missing");
        let page = paginate(items, Some(5), Some(&cursor), |s| s.clone());
        assert!(!page.page_info.has_previous_page);
        assert_eq!(page.edges[0].node, "id0");
    }
}
