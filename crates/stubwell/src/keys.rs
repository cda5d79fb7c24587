//! Canonical storage key derivation.
//!
//! Pure functions over (route, endpoint, method) triples. Identical inputs
//! always yield identical keys; no case or trailing-slash normalization is
//! performed, so callers must supply already-normalized segments. Malformed
//! inputs produce syntactically valid but semantically meaningless keys.

/// Key holding a static stub definition.
pub fn stub_key(route: &str, endpoint: &str, method: &str) -> String {
    format!("stub:{route}:{endpoint}:{method}")
}

/// Key holding the bounded request history list.
pub fn history_key(route: &str, endpoint: &str, method: &str) -> String {
    format!("history:{route}:{endpoint}:{method}")
}

/// Key holding one request/response pair for a transaction id.
pub fn transaction_key(route: &str, endpoint: &str, tx_id: &str) -> String {
    format!("request:{route}:{endpoint}:{tx_id}")
}

/// Key holding a pending outbound callback registration.
pub fn pending_callback_key(request_id: &str) -> String {
    format!("req:{request_id}")
}

/// Glob matching every method variant of one static stub.
pub fn stub_endpoint_pattern(route: &str, endpoint: &str) -> String {
    format!("stub:{route}:{endpoint}:*")
}

/// Glob matching every static stub under a mounted route.
pub fn stub_route_pattern(route: &str) -> String {
    format!("stub:{route}:*")
}

/// Glob matching every static stub in the store.
pub fn stub_all_pattern() -> String {
    "stub:*".to_string()
}

/// Glob matching every history list for one endpoint.
pub fn history_endpoint_pattern(route: &str, endpoint: &str) -> String {
    format!("history:{route}:{endpoint}:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_key_shape() {
        assert_eq!(
            stub_key("exchange", "widgets", "post"),
            "stub:exchange:widgets:post"
        );
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(
            history_key("a", "b", "get"),
            history_key("a", "b", "get")
        );
        assert_eq!(
            transaction_key("a", "b", "tx-1"),
            "request:a:b:tx-1"
        );
        assert_eq!(pending_callback_key("r-9"), "req:r-9");
    }

    #[test]
    fn test_no_normalization() {
        // Case and trailing slashes pass through untouched.
        assert_ne!(
            stub_key("Exchange", "widgets", "post"),
            stub_key("exchange", "widgets", "post")
        );
        assert_eq!(
            stub_key("exchange", "widgets/", "post"),
            "stub:exchange:widgets/:post"
        );
    }

    #[test]
    fn test_patterns() {
        assert_eq!(
            stub_endpoint_pattern("exchange", "widgets"),
            "stub:exchange:widgets:*"
        );
        assert_eq!(stub_route_pattern("exchange"), "stub:exchange:*");
        assert_eq!(stub_all_pattern(), "stub:*");
        assert_eq!(
            history_endpoint_pattern("exchange", "widgets"),
            "history:exchange:widgets:*"
        );
    }
}
