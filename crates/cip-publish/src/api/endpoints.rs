//! API endpoint URL builders
//!
//! Helper functions to construct destination and blob store URLs.

/// Build health check URL
pub fn health_url(base_url: &str) -> String {
    format!("{}/health", base_url)
}

/// Build destination status URL (readiness + collection counters)
pub fn status_url(base_url: &str) -> String {
    format!("{}/status", base_url)
}

/// Build import queue URL for a content kind
pub fn import_queue_url(base_url: &str, kind: &str) -> String {
    format!("{}/import/{}", base_url, kind)
}

/// Build import batch status URL
pub fn import_status_url(base_url: &str, kind: &str, batch_id: &str) -> String {
    format!("{}/import/{}/{}", base_url, kind, batch_id)
}

/// Build bulk write URL for a destination collection
pub fn bulk_write_url(base_url: &str, collection: &str) -> String {
    format!("{}/bulk/{}", base_url, collection)
}

/// Build content read-back URL
pub fn content_url(base_url: &str, id: &str) -> String {
    format!("{}/content/{}", base_url, id)
}

/// Build blob store object URL for a content address
pub fn blob_url(blob_store_url: &str, address: &str) -> String {
    format!("{}/store/{}", blob_store_url, address)
}

/// Build the progress WebSocket URL from the destination's HTTP URL.
///
/// Swaps the scheme (`http` -> `ws`, `https` -> `wss`) and appends the
/// progress path.
pub fn progress_ws_url(base_url: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!("{}/ws/progress", ws_base)
}
