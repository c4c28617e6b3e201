//! Candidate channel endpoints.
//!
//! Order: the configured endpoint, the same path on the page origin, then
//! the TLS-upgraded form of the configured endpoint. Duplicates collapse.

use tokio_tungstenite::tungstenite::http::Uri;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    scheme: &'static str,
    authority: String,
    path: String,
}

impl Endpoint {
    fn render(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.path)
    }

    fn upgraded(&self) -> Self {
        Self {
            scheme: "wss",
            ..self.clone()
        }
    }
}

/// Maps a page or socket scheme to its WebSocket counterpart.
fn socket_scheme(scheme: &str) -> Option<&'static str> {
    match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => Some("ws"),
        "wss" | "https" => Some("wss"),
        _ => None,
    }
}

fn parse_absolute(text: &str) -> Option<Endpoint> {
    let uri: Uri = text.trim().parse().ok()?;
    let scheme = socket_scheme(uri.scheme_str()?)?;
    let authority = uri.authority()?.as_str().to_string();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    Some(Endpoint {
        scheme,
        authority,
        path,
    })
}

/// Returns the path (plus query) of `text`, for relative or absolute input.
fn path_of(text: &str) -> Option<String> {
    let uri: Uri = text.trim().parse().ok()?;
    Some(
        uri.path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
    )
}

/// Builds the ordered candidate list from the configured socket address
/// and the page's base URL.
///
/// `configured` may be absolute (`wss://host/ws`, `https://host/ws`) or a
/// path (`/ws`) resolved against `base_url`. `http` becomes `ws` and
/// `https` becomes `wss`. Returns an empty list when nothing usable can be
/// derived.
pub fn build_candidates(configured: &str, base_url: Option<&str>) -> Vec<String> {
    let origin = base_url.and_then(parse_absolute);
    let primary = parse_absolute(configured).or_else(|| {
        let base = origin.as_ref()?;
        Some(Endpoint {
            path: path_of(configured)?,
            ..base.clone()
        })
    });

    let Some(primary) = primary else {
        warn!(configured, "no usable channel endpoint");
        return Vec::new();
    };

    let mut ordered = vec![primary.clone()];
    if let Some(base) = origin {
        ordered.push(Endpoint {
            path: primary.path.clone(),
            ..base
        });
    }
    ordered.push(primary.upgraded());

    let mut candidates: Vec<String> = Vec::with_capacity(ordered.len());
    for endpoint in ordered {
        let url = endpoint.render();
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    candidates
}
