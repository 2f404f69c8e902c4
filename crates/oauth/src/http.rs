//! Minimal HTTP/1.x message handling for the loopback callback listener.

use std::collections::HashMap;

/// One inbound request as far as the callback flow cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
}

impl CallbackRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Blank line separating the header block from the body.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// True once `buf` holds a complete header block.
pub fn header_complete(buf: &[u8]) -> bool {
    buf.windows(HEADER_TERMINATOR.len())
        .any(|w| w == HEADER_TERMINATOR)
}

/// Parse the request line `METHOD /path?query HTTP/x.y` of a raw request.
///
/// Returns `None` when the request line does not have that shape.
pub fn parse_request(raw: &str) -> Option<CallbackRequest> {
    let line = raw.lines().next()?;
    let mut parts = line.split(' ');
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some()
        || method.is_empty()
        || !method.bytes().all(|b| b.is_ascii_uppercase())
        || !target.starts_with('/')
        || !version.starts_with("HTTP/")
    {
        return None;
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    Some(CallbackRequest {
        method: method.to_string(),
        path: path.to_string(),
        params: parse_query(query),
    })
}

/// Split `a=1&b=2` into a map; a pair without `=` maps to an empty value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Encode `pairs` as a query string, sorted by key so the output is
/// deterministic. Everything outside the RFC 3986 unreserved set is
/// percent-encoded.
pub fn encode_query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(v.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Serialize a complete response with `Connection: close`.
pub fn build_response(status_line: &str, body: &str, content_type: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// [`build_response`] with an HTML body.
pub fn html_response(status_line: &str, body: &str) -> String {
    build_response(status_line, body, "text/html; charset=utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split a raw response into (status line, headers, body).
    fn parse_response(raw: &str) -> (String, HashMap<String, String>, String) {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let mut lines = head.split("\r\n");
        let status = lines.next().unwrap().to_string();
        let headers = lines
            .map(|l| {
                let (k, v) = l.split_once(": ").unwrap();
                (k.to_ascii_lowercase(), v.to_string())
            })
            .collect();
        (status, headers, body.to_string())
    }

    #[test]
    fn parses_standard_callback() {
        let req = parse_request("GET /callback?code=abc123&state=xyz HTTP/1.1\r\nHost: h\r\n\r\n")
            .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/callback");
        assert_eq!(req.param("code"), Some("abc123"));
        assert_eq!(req.param("state"), Some("xyz"));
        assert_eq!(req.params.len(), 2);
    }

    #[test]
    fn rejects_non_http_text() {
        assert!(parse_request("not an http request").is_none());
        assert!(parse_request("").is_none());
        assert!(parse_request("GET callback HTTP/1.1\r\n\r\n").is_none());
        assert!(parse_request("GET /callback\r\n\r\n").is_none());
        assert!(parse_request("GET /callback SPDY/3\r\n\r\n").is_none());
    }

    #[test]
    fn path_without_query_has_no_params() {
        let req = parse_request("GET /favicon.ico HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/favicon.ico");
        assert!(req.params.is_empty());
    }

    #[test]
    fn pair_without_equals_has_empty_value() {
        let req = parse_request("GET /callback?flag&a=1 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.param("flag"), Some(""));
        assert_eq!(req.param("a"), Some("1"));
    }

    #[test]
    fn value_splits_on_first_equals_only() {
        let req = parse_request("GET /callback?code=a=b HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.param("code"), Some("a=b"));
    }

    #[test]
    fn values_are_percent_decoded() {
        let req = parse_request(
            "GET /callback?error=access_denied&error_description=User+denied%20access HTTP/1.1\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.param("error_description"), Some("User denied access"));
    }

    #[test]
    fn query_is_sorted_and_percent_encoded() {
        let query = encode_query([
            ("state", "a~b"),
            ("scope", "user-read-playback-state playlist-read-private"),
            ("redirect_uri", "http://127.0.0.1:8888/callback"),
        ]);
        assert_eq!(
            query,
            "redirect_uri=http%3A%2F%2F127.0.0.1%3A8888%2Fcallback\
             &scope=user-read-playback-state%20playlist-read-private\
             &state=a~b"
        );
    }

    #[test]
    fn encoded_query_parses_back() {
        let query = encode_query([("q", "artist:Björk & friends"), ("type", "track")]);
        let params = parse_query(&query);
        assert_eq!(params["q"], "artist:Björk & friends");
        assert_eq!(params["type"], "track");
    }

    #[test]
    fn detects_header_terminator() {
        assert!(!header_complete(b"GET / HTTP/1.1\r\nHost: h\r\n"));
        assert!(header_complete(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n"));
        assert!(!header_complete(b""));
    }

    #[test]
    fn response_round_trips_status_and_body() {
        let body = "<h1>Connected</h1> \u{2713}";
        let raw = build_response("200 OK", body, "text/html");
        let (status, headers, parsed_body) = parse_response(&raw);
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert_eq!(parsed_body, body);
        assert_eq!(headers["content-length"], body.len().to_string());
        assert_eq!(headers["connection"], "close");
        assert_eq!(headers["content-type"], "text/html");
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let raw = html_response("404 Not Found", "é");
        assert!(raw.contains("Content-Length: 2\r\n"));
        assert!(raw.contains("text/html; charset=utf-8"));
    }
}
