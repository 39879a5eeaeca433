/// Server-wide configuration, parsed from the sole command-line argument.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 5566;

    /// Read the port override from `argv[1]`, if present.
    /// Falls back to [`ServerConfig::DEFAULT_PORT`] on missing or
    /// unparseable input, mirroring the reference server's permissive
    /// `stringstream >> port` behavior.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut args = args.into_iter();
        args.next(); // argv[0]

        let port = args
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(Self::DEFAULT_PORT);

        ServerConfig { port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_argument() {
        let cfg = ServerConfig::from_args(["npshelld".to_string()]);
        assert_eq!(cfg.port, ServerConfig::DEFAULT_PORT);
    }

    #[test]
    fn parses_explicit_port() {
        let cfg = ServerConfig::from_args(["npshelld".to_string(), "6000".to_string()]);
        assert_eq!(cfg.port, 6000);
    }

    #[test]
    fn falls_back_on_garbage() {
        let cfg = ServerConfig::from_args(["npshelld".to_string(), "not-a-port".to_string()]);
        assert_eq!(cfg.port, ServerConfig::DEFAULT_PORT);
    }
}
