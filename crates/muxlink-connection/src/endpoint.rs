use muxlink_types::{TerminalTarget, TERMINAL_PATH_PREFIX};
use url::{ParseError, Url};

use crate::error::ConnectionError;

fn invalid(base: &str, reason: impl Into<String>) -> ConnectionError {
    ConnectionError::InvalidEndpoint {
        endpoint: base.to_string(),
        reason: reason.into(),
    }
}

/// Parse a base URL and switch it to the matching websocket scheme
fn websocket_base(base: &str) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(base.trim()).map_err(|e| match e {
        ParseError::RelativeUrlWithoutBase => invalid(base, "missing scheme"),
        ParseError::EmptyHost => invalid(base, "missing host"),
        other => invalid(base, other.to_string()),
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(base, format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(ws_scheme)
        .map_err(|_| invalid(base, format!("cannot use scheme '{}'", ws_scheme)))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(base, "missing host"));
    }
    Ok(url)
}

/// Build the websocket URL for a terminal target
///
/// `http` becomes `ws` and `https` becomes `wss`; websocket bases are taken
/// as they are. Any path on the base is kept as a prefix.
pub fn terminal_url(base: &str, target: &TerminalTarget) -> Result<String, ConnectionError> {
    let mut url = websocket_base(base)?;
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(base, "base URL must be a plain scheme, host and path"));
    }
    if target.container_id.is_empty() {
        return Err(invalid(base, "empty container id"));
    }
    if target.session_name.is_empty() {
        return Err(invalid(base, "empty session name"));
    }

    let window = target.window_index.to_string();
    url.path_segments_mut()
        .map_err(|_| invalid(base, "base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(TERMINAL_PATH_PREFIX.split('/').filter(|s| !s.is_empty()))
        .extend([
            target.container_id.as_str(),
            target.session_name.as_str(),
            window.as_str(),
        ]);
    Ok(url.into())
}

/// `host:port` of a base URL, for reachability probes
///
/// Credentials, path and query are dropped; the port defaults from the scheme.
pub fn probe_address(base: &str) -> Result<String, ConnectionError> {
    let url = websocket_base(base)?;
    let host = url.host_str().ok_or_else(|| invalid(base, "missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid(base, "missing port"))?;
    Ok(format!("{}:{}", host, port))
}
