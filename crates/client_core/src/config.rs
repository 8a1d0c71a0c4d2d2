use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;
use url::Url;

use crate::{poller::PollSchedule, upload::UploadPolicy};

pub const SETTINGS_FILE: &str = "dashboard.toml";
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/v1/";
const API_PREFIX: &str = "api/v1/";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub upload_policy: UploadPolicy,
    pub poll_initial_delay_ms: u64,
    pub poll_max_delay_ms: u64,
    pub poll_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            auth_token: None,
            request_timeout_secs: None,
            upload_policy: UploadPolicy::BestEffort,
            poll_initial_delay_ms: 2_000,
            poll_max_delay_ms: 30_000,
            poll_max_attempts: 12,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            initial_delay: Duration::from_millis(self.poll_initial_delay_ms),
            max_delay: Duration::from_millis(self.poll_max_delay_ms),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn set_api_base_url(&mut self, raw: &str) {
        self.api_base_url = normalize_api_base_url(raw);
    }
}

/// Defaults, then `dashboard.toml`, then the environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(table) => {
                let table = table
                    .into_iter()
                    .map(|(key, value)| (key, value_text(value)))
                    .collect();
                apply_file_overrides(&mut settings, &table);
            }
            Err(err) => warn!(path = %path.display(), "config: ignoring malformed settings file: {err}"),
        }
    }

    apply_env_overrides(&mut settings, env);
    settings
}

fn value_text(value: toml::Value) -> String {
    match value {
        toml::Value::String(text) => text,
        other => other.to_string(),
    }
}

fn apply_file_overrides(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("api_base_url") {
        settings.set_api_base_url(v);
    }
    if let Some(v) = file_cfg.get("auth_token") {
        settings.auth_token = non_empty(v);
    }
    if let Some(v) = file_cfg.get("request_timeout_secs") {
        parse_into(&mut settings.request_timeout_secs, "request_timeout_secs", v, Some);
    }
    if let Some(v) = file_cfg.get("upload_policy") {
        parse_into(&mut settings.upload_policy, "upload_policy", v, |policy| policy);
    }
    if let Some(v) = file_cfg.get("poll_initial_delay_ms") {
        parse_into(&mut settings.poll_initial_delay_ms, "poll_initial_delay_ms", v, |ms| ms);
    }
    if let Some(v) = file_cfg.get("poll_max_delay_ms") {
        parse_into(&mut settings.poll_max_delay_ms, "poll_max_delay_ms", v, |ms| ms);
    }
    if let Some(v) = file_cfg.get("poll_max_attempts") {
        parse_into(&mut settings.poll_max_attempts, "poll_max_attempts", v, |n| n);
    }
}

fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("DASHBOARD_API_URL") {
        settings.set_api_base_url(&v);
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.set_api_base_url(&v);
    }

    if let Some(v) = env("DASHBOARD_TOKEN") {
        settings.auth_token = non_empty(&v);
    }
    if let Some(v) = env("APP__AUTH_TOKEN") {
        settings.auth_token = non_empty(&v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        parse_into(&mut settings.request_timeout_secs, "APP__REQUEST_TIMEOUT_SECS", &v, Some);
    }
    if let Some(v) = env("APP__UPLOAD_POLICY") {
        parse_into(&mut settings.upload_policy, "APP__UPLOAD_POLICY", &v, |policy| policy);
    }
    if let Some(v) = env("APP__POLL_INITIAL_DELAY_MS") {
        parse_into(&mut settings.poll_initial_delay_ms, "APP__POLL_INITIAL_DELAY_MS", &v, |ms| ms);
    }
    if let Some(v) = env("APP__POLL_MAX_DELAY_MS") {
        parse_into(&mut settings.poll_max_delay_ms, "APP__POLL_MAX_DELAY_MS", &v, |ms| ms);
    }
    if let Some(v) = env("APP__POLL_MAX_ATTEMPTS") {
        parse_into(&mut settings.poll_max_attempts, "APP__POLL_MAX_ATTEMPTS", &v, |n| n);
    }
}

fn parse_into<P, T>(slot: &mut T, key: &str, raw: &str, wrap: impl FnOnce(P) -> T)
where
    P: std::str::FromStr,
    P::Err: std::fmt::Display,
{
    match raw.trim().parse::<P>() {
        Ok(parsed) => *slot = wrap(parsed),
        Err(err) => warn!(key, value = raw, "config: ignoring invalid value: {err}"),
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A bare origin gets the API prefix appended; the result always ends in `/`.
pub fn normalize_api_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE_URL.to_string();
    }

    match Url::parse(trimmed) {
        Ok(url) if url.path() == "/" => format!("{trimmed}/{API_PREFIX}"),
        _ => format!("{trimmed}/"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn bare_origin_gets_api_prefix() {
        assert_eq!(
            normalize_api_base_url("http://lab.example:8000"),
            "http://lab.example:8000/api/v1/"
        );
        assert_eq!(
            normalize_api_base_url("https://lab.example/"),
            "https://lab.example/api/v1/"
        );
    }

    #[test]
    fn explicit_path_only_gains_trailing_slash() {
        assert_eq!(
            normalize_api_base_url("http://127.0.0.1:9000/api/v2"),
            "http://127.0.0.1:9000/api/v2/"
        );
        assert_eq!(normalize_api_base_url("  "), DEFAULT_API_BASE_URL);
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("dashboard_settings_test_{suffix}.toml"));
        fs::write(
            &path,
            "api_base_url = \"http://file.example\"\nupload_policy = \"abort_on_failure\"\npoll_max_attempts = 3\n",
        )
        .expect("write settings");

        let settings = load_settings_from(&path, |key| match key {
            "DASHBOARD_API_URL" => Some("http://env.example".into()),
            "APP__API_BASE_URL" => Some("http://app.example/api/v1".into()),
            "DASHBOARD_TOKEN" => Some("abc123".into()),
            _ => None,
        });
        fs::remove_file(&path).expect("cleanup");

        assert_eq!(settings.api_base_url, "http://app.example/api/v1/");
        assert_eq!(settings.auth_token.as_deref(), Some("abc123"));
        assert_eq!(settings.upload_policy, UploadPolicy::AbortOnFailure);
        assert_eq!(settings.poll_max_attempts, 3);
        assert_eq!(settings.request_timeout(), None);
    }

    #[test]
    fn missing_or_malformed_file_keeps_defaults() {
        let missing = load_settings_from(Path::new("/nonexistent/dashboard.toml"), no_env);
        assert_eq!(missing, Settings::default());

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("dashboard_settings_bad_{suffix}.toml"));
        fs::write(&path, "this is = = not toml").expect("write settings");
        let malformed = load_settings_from(&path, no_env);
        fs::remove_file(&path).expect("cleanup");
        assert_eq!(malformed, Settings::default());
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let settings = load_settings_from(Path::new("/nonexistent/dashboard.toml"), |key| {
            match key {
                "APP__POLL_MAX_ATTEMPTS" => Some("lots".into()),
                "APP__REQUEST_TIMEOUT_SECS" => Some("15".into()),
                _ => None,
            }
        });
        assert_eq!(settings.poll_max_attempts, 12);
        assert_eq!(settings.request_timeout(), Some(Duration::from_secs(15)));
    }
}
