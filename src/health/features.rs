//! Static mappings between components and what users see.

/// Cache / pub-sub service.
pub const CACHE: &str = "cache";
/// Durable checkpoint (session) store.
pub const STORE: &str = "store";
/// Knowledge-graph client.
pub const KNOWLEDGE_GRAPH: &str = "knowledge_graph";
/// Background worker pool.
pub const WORKERS: &str = "workers";

/// User-facing features lost or impaired when `component` is not operational.
pub fn affected_features(component: &str) -> &'static [&'static str] {
    match component {
        CACHE => &["Query result caching", "Real-time progress updates"],
        STORE => &["Session persistence across restarts", "Conversation history"],
        KNOWLEDGE_GRAPH => &["Schema relationship hints", "Knowledge-graph enrichment"],
        WORKERS => &["Background query execution", "Scheduled reports"],
        _ => &[],
    }
}

/// Component a feature key depends on; `None` for unknown keys.
pub fn component_for_feature(feature: &str) -> Option<&'static str> {
    match feature {
        "query_cache" | "realtime_updates" => Some(CACHE),
        "session_persistence" | "conversation_history" => Some(STORE),
        "knowledge_graph" => Some(KNOWLEDGE_GRAPH),
        "background_jobs" | "async_execution" => Some(WORKERS),
        _ => None,
    }
}
