//! Redirect page (GET /redirect)
//!
//! `?return=<url>` sends the browser on to `<url>`. `view_point=N` appends
//! `&point=N`; `map_point=N` replaces the query string with `?point=N`.
//! Only same-site paths and URLs under the configured public base URL are
//! followed.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use crate::AppState;

pub const REDIRECT_ERROR_MESSAGE: &str =
    "UBCAR has encountered an error. Please return to the previous page and try your action again.";

#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    #[serde(rename = "return")]
    pub return_to: Option<String>,
    pub view_point: Option<String>,
    pub map_point: Option<String>,
}

/// Rewrite the return URL according to the point parameters
pub fn build_target(return_to: &str, view_point: Option<&str>, map_point: Option<&str>) -> String {
    let mut target = return_to.to_string();
    if let Some(point) = view_point {
        target.push_str("&point=");
        target.push_str(point);
    }
    if let Some(point) = map_point {
        let base = target.split('?').next().unwrap_or_default().to_string();
        target = format!("{}?point={}", base, point);
    }
    target
}

/// Same-site path, or a URL under `public_base_url`
///
/// Targets containing whitespace or control characters are refused: browsers
/// drop tabs and newlines while parsing, which can turn `/\t/host` into
/// `//host`.
pub fn is_allowed_target(target: &str, public_base_url: Option<&str>) -> bool {
    if target.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return false;
    }
    if target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\") {
        return true;
    }
    match public_base_url {
        Some(base) => {
            let base = base.trim_end_matches('/');
            target == base
                || target
                    .strip_prefix(base)
                    .is_some_and(|rest| rest.starts_with(['/', '?', '#']))
        }
        None => false,
    }
}

/// GET /redirect
pub async fn redirect_page(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let return_to = match query.return_to.as_deref().filter(|r| !r.is_empty()) {
        Some(return_to) => return_to,
        None => return error_page(),
    };

    let target = build_target(
        return_to,
        query.view_point.as_deref(),
        query.map_point.as_deref(),
    );
    if !is_allowed_target(&target, state.public_base_url.as_deref()) {
        warn!(target = %target, "Refusing redirect to foreign URL");
        return error_page();
    }

    (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
}

fn error_page() -> Response {
    (StatusCode::BAD_REQUEST, REDIRECT_ERROR_MESSAGE).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_return() {
        assert_eq!(build_target("/admin?page=ubcar-media", None, None), "/admin?page=ubcar-media");
    }

    #[test]
    fn test_view_point_appends() {
        assert_eq!(
            build_target("/admin?page=ubcar-point", Some("42"), None),
            "/admin?page=ubcar-point&point=42"
        );
    }

    #[test]
    fn test_map_point_replaces_query() {
        assert_eq!(build_target("/map?layer=3&zoom=2", None, Some("7")), "/map?point=7");
        assert_eq!(build_target("/map", None, Some("7")), "/map?point=7");
    }

    #[test]
    fn test_map_point_applied_after_view_point() {
        assert_eq!(build_target("/map?x=1", Some("5"), Some("9")), "/map?point=9");
    }

    #[test]
    fn test_allowed_targets() {
        assert!(is_allowed_target("/", None));
        assert!(is_allowed_target("/admin?page=ubcar-media", None));
        assert!(!is_allowed_target("//evil.example.com/", None));
        assert!(!is_allowed_target("/\\evil.example.com", None));
        assert!(!is_allowed_target("https://evil.example.com/", None));
    }

    #[test]
    fn test_control_characters_refused() {
        assert!(!is_allowed_target("/\t/evil.example.com/", None));
        assert!(!is_allowed_target("/\n/evil.example.com/", None));
        assert!(!is_allowed_target("/\r\n/evil.example.com/", None));
        assert!(!is_allowed_target("/ /evil.example.com/", None));
        assert!(!is_allowed_target("/admin\u{0}", None));
        let base = Some("https://map.example.org");
        assert!(!is_allowed_target("https://map.example.org/\t/x", base));
    }

    #[test]
    fn test_public_base_url_targets() {
        let base = Some("https://map.example.org/");
        assert!(is_allowed_target("https://map.example.org/tour?point=3", base));
        assert!(is_allowed_target("https://map.example.org", base));
        assert!(!is_allowed_target("https://map.example.org.evil.com/", base));
        assert!(!is_allowed_target("https://other.example.org/", base));
    }
}
