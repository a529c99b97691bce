use axum::http::HeaderMap;
use shared::protocol::{API_KEY_HEADER, PROJECT_HEADER};

use crate::api::ApiContext;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) client_keys: ClientKeys,
}

/// Identifiers a client must present on every guarded request. A key left
/// unset in the server settings is not checked.
#[derive(Debug, Clone, Default)]
pub(crate) struct ClientKeys {
    pub(crate) api_key: Option<String>,
    pub(crate) project_id: Option<String>,
}

impl ClientKeys {
    pub(crate) fn admits(&self, headers: &HeaderMap) -> bool {
        header_matches(headers, API_KEY_HEADER, self.api_key.as_deref())
            && header_matches(headers, PROJECT_HEADER, self.project_id.as_deref())
    }
}

fn header_matches(headers: &HeaderMap, name: &str, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected),
    }
}
