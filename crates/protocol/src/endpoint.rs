use url::Url;

pub const LIVECODE_PATH: &str = "/livecode";

/// Derives the sandbox websocket endpoint from the configured HTTP(S) base URL.
pub fn livecode_ws_url(base: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(base.trim())?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    let netloc = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(format!("{scheme}://{netloc}{LIVECODE_PATH}"))
}
