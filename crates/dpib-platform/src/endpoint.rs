//! Listen endpoint of a ByeDPI argument string

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::warn;

/// Endpoint ByeDPI listens on when the arguments do not say otherwise
pub const DEFAULT_ENDPOINT: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1080);

/// Find the `-i/--ip` and `-p/--port` values in `args`.
///
/// Both `--ip 1.2.3.4` and `--ip=1.2.3.4` forms are recognised. Missing or
/// unparsable values fall back to [`DEFAULT_ENDPOINT`]. When an option is
/// repeated the last occurrence wins, matching the proxy's own parser.
pub fn endpoint_from_args(args: &str) -> SocketAddr {
    let mut ip = DEFAULT_ENDPOINT.ip();
    let mut port = DEFAULT_ENDPOINT.port();

    let mut tokens = args.split_whitespace();
    while let Some(token) = tokens.next() {
        let (name, inline) = match token.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value)),
            _ => (token, None),
        };

        match name {
            "-i" | "--ip" => {
                if let Some(value) = inline.or_else(|| tokens.next()) {
                    match value.parse() {
                        Ok(parsed) => ip = parsed,
                        Err(_) => warn!(value, "Ignoring unparsable listen address"),
                    }
                }
            }
            "-p" | "--port" => {
                if let Some(value) = inline.or_else(|| tokens.next()) {
                    match value.parse() {
                        Ok(parsed) => port = parsed,
                        Err(_) => warn!(value, "Ignoring unparsable listen port"),
                    }
                }
            }
            _ => {}
        }
    }

    SocketAddr::new(ip, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(endpoint_from_args(""), DEFAULT_ENDPOINT);
        assert_eq!(endpoint_from_args("-s1 -q1 -Y"), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_long_options() {
        let addr = endpoint_from_args("--ip 127.0.0.2 --port 2080 -d1");
        assert_eq!(addr, "127.0.0.2:2080".parse().unwrap());
    }

    #[test]
    fn test_short_and_inline_options() {
        assert_eq!(endpoint_from_args("-i 10.0.0.1 -p 9000"), "10.0.0.1:9000".parse().unwrap());
        assert_eq!(endpoint_from_args("--ip=10.0.0.1 --port=9000"), "10.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_last_occurrence_wins() {
        let addr = endpoint_from_args("--port 1080 -d1 --port 1090");
        assert_eq!(addr.port(), 1090);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let addr = endpoint_from_args("--ip localhost --port 99999");
        assert_eq!(addr, DEFAULT_ENDPOINT);
        assert_eq!(endpoint_from_args("--port"), DEFAULT_ENDPOINT);
    }
}
