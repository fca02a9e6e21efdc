//! On-disk TOML shape. Every field is optional; validation happens in
//! [`SwitchwatchConfig::resolve`](crate::SwitchwatchConfig::resolve).

use std::fmt;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub slack: Option<SlackSection>,
    pub gpio: Option<GpioSection>,
    pub http: Option<HttpSection>,
    pub log: Option<LogSection>,
    pub monitor: Option<MonitorSection>,
}

#[derive(Default, Deserialize)]
pub struct SlackSection {
    pub token: Option<String>,
    pub channel: Option<String>,
    pub verification_token: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: Option<u64>,
}

// Manual Debug impl to prevent leaking tokens in logs.
impl fmt::Debug for SlackSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(opt: Option<&String>) -> &'static str {
            if opt.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("SlackSection")
            .field("token", &mask(self.token.as_ref()))
            .field("channel", &self.channel)
            .field("verification_token", &mask(self.verification_token.as_ref()))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GpioSection {
    /// BCM line number, e.g. 17 for GPIO17.
    pub pin: Option<u32>,
    pub sysfs_root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpSection {
    pub listen: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogSection {
    pub dir: Option<String>,
    pub file_name: Option<String>,
    pub stderr: Option<bool>,
    pub compaction_interval_secs: Option<u64>,
    pub retention_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonitorSection {
    pub poll_interval_ms: Option<u64>,
}

/// Replace `${VAR}` references using `lookup`. Unknown variables expand to
/// the empty string; an unterminated `${` is kept literally.
pub fn expand_env_vars(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&lookup(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
