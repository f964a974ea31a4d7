use axum::http::HeaderMap;

pub const SESSION_COOKIE_NAME: &str = "sessionId";
pub const SESSION_HEADER_NAME: &str = "session-id";
const MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// `Set-Cookie` value for a freshly created or re-confirmed UI session.
pub fn set_cookie(ui_id: &str) -> String {
    format!("{SESSION_COOKIE_NAME}={ui_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={MAX_AGE_SECS}")
}

/// Reads `session-id` from the request header, falling back to the `sessionId` cookie.
/// Neither is authoritative for routed requests (the `uiId` path segment is), but the
/// header lets a non-browser client avoid cookie jars entirely.
pub fn resolve_ui_id(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(SESSION_HEADER_NAME).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let name = parts.next()?;
        let value = parts.next()?;
        (name == SESSION_COOKIE_NAME).then(|| value.to_string())
    })
}
