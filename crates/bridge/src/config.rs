use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: SocketAddr,
    pub base_url: String,
    pub debug: bool,
    pub fallback_token: Option<String>,
    pub forward_timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl BridgeConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("HABRIDGE_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("HABRIDGE_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "HABRIDGE_BIND_ADDR",
        )?;

        let base_url = require_nonempty(kv, "HABRIDGE_BASE_URL")?;

        let debug = parse_bool(kv.get("HABRIDGE_DEBUG")).unwrap_or(false);

        let fallback_token = kv
            .get("HABRIDGE_FALLBACK_TOKEN")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        // The fallback token bypasses account-linking authorization; refuse to
        // arm it on anything but a loopback bind.
        if debug && fallback_token.is_some() && !bind_addr.ip().is_loopback() {
            return Err(StartupError {
                code: "ERR_FALLBACK_TOKEN_NONLOCAL_BIND",
                message: "fallback token with non-local bind is refused; unset \
                          HABRIDGE_FALLBACK_TOKEN or bind to loopback"
                    .to_string(),
            });
        }

        let forward_timeout_ms = parse_u64(
            kv.get("HABRIDGE_FORWARD_TIMEOUT_MS"),
            6000,
            "HABRIDGE_FORWARD_TIMEOUT_MS",
        )?;
        if forward_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "HABRIDGE_FORWARD_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        let user_agent = kv
            .get("HABRIDGE_USER_AGENT")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("habridge")
            .to_string();

        Ok(Self {
            bind_addr,
            base_url,
            debug,
            fallback_token,
            forward_timeout_ms,
            user_agent,
        })
    }

    /// Statically configured token, honored only in debug mode.
    pub fn debug_fallback_token(&self) -> Option<&str> {
        if self.debug {
            self.fallback_token.as_deref()
        } else {
            None
        }
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        let mut value = value.trim().to_string();
        value = strip_quotes(&value);
        kv.insert(key.to_string(), value);
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    let Some(value) = kv.get(key) else {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    };

    let value = value.trim();
    if value.is_empty() {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    }

    Ok(value.to_string())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_ok_env() -> HashMap<String, String> {
        HashMap::from([(
            "HABRIDGE_BASE_URL".to_string(),
            "https://ha.example:8123".to_string(),
        )])
    }

    #[test]
    fn defaults_applied_for_minimal_env() {
        let cfg = BridgeConfig::from_kv(&minimal_ok_env()).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.base_url, "https://ha.example:8123");
        assert!(!cfg.debug);
        assert_eq!(cfg.fallback_token, None);
        assert_eq!(cfg.forward_timeout_ms, 6000);
        assert_eq!(cfg.user_agent, "habridge");
    }

    #[test]
    fn missing_base_url_fails() {
        let err = BridgeConfig::from_kv(&HashMap::new()).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
    }

    #[test]
    fn blank_base_url_fails() {
        let mut env = minimal_ok_env();
        env.insert("HABRIDGE_BASE_URL".to_string(), "   ".to_string());
        let err = BridgeConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
    }

    #[test]
    fn armed_fallback_token_with_nonlocal_bind_fails() {
        let mut env = minimal_ok_env();
        env.insert("HABRIDGE_BIND_ADDR".to_string(), "0.0.0.0:8080".to_string());
        env.insert("HABRIDGE_DEBUG".to_string(), "true".to_string());
        env.insert(
            "HABRIDGE_FALLBACK_TOKEN".to_string(),
            "long-lived-token".to_string(),
        );
        let err = BridgeConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_FALLBACK_TOKEN_NONLOCAL_BIND");
    }

    #[test]
    fn fallback_token_without_debug_is_kept_but_not_honored() {
        let mut env = minimal_ok_env();
        env.insert(
            "HABRIDGE_FALLBACK_TOKEN".to_string(),
            "long-lived-token".to_string(),
        );
        let cfg = BridgeConfig::from_kv(&env).unwrap();
        assert_eq!(cfg.fallback_token.as_deref(), Some("long-lived-token"));
        assert_eq!(cfg.debug_fallback_token(), None);
    }

    #[test]
    fn fallback_token_honored_in_debug_mode() {
        let mut env = minimal_ok_env();
        env.insert("HABRIDGE_DEBUG".to_string(), "1".to_string());
        env.insert(
            "HABRIDGE_FALLBACK_TOKEN".to_string(),
            "long-lived-token".to_string(),
        );
        let cfg = BridgeConfig::from_kv(&env).unwrap();
        assert_eq!(cfg.debug_fallback_token(), Some("long-lived-token"));
    }

    #[test]
    fn zero_forward_timeout_fails() {
        let mut env = minimal_ok_env();
        env.insert("HABRIDGE_FORWARD_TIMEOUT_MS".to_string(), "0".to_string());
        let err = BridgeConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let mut env = minimal_ok_env();
        env.insert("HABRIDGE_BIND_ADDR".to_string(), "not-an-addr".to_string());
        let err = BridgeConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }
}
