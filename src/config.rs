use std::path::PathBuf;
use std::time::Duration;

pub const ENV_BROWSER: &str = "RUSTY_SCATTER_BROWSER";
pub const ENV_INSTALL_CMD: &str = "RUSTY_SCATTER_INSTALL_CMD";
pub const ENV_BROWSER_DIR: &str = "RUSTY_SCATTER_BROWSER_DIR";
pub const ENV_RENDER_TIMEOUT: &str = "RUSTY_SCATTER_RENDER_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Renderer configuration
// ---------------------------------------------------------------------------

/// Where the raster backend finds (and installs) its browser engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Explicit browser executable; skips the search when set.
    pub browser: Option<PathBuf>,
    /// Directory the installer downloads into and the backend searches.
    pub browser_dir: PathBuf,
    /// Program and arguments run when the browser is missing.
    pub install_command: Vec<String>,
    pub timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let browser_dir = default_browser_dir();
        RenderConfig {
            browser: None,
            install_command: default_install_command(&browser_dir),
            browser_dir,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RenderConfig {
    /// Defaults overridden by the `RUSTY_SCATTER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = RenderConfig::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = value(ENV_BROWSER_DIR) {
            config.browser_dir = PathBuf::from(dir);
            config.install_command = default_install_command(&config.browser_dir);
        }
        if let Some(browser) = value(ENV_BROWSER) {
            config.browser = Some(PathBuf::from(browser));
        }
        if let Some(cmd) = value(ENV_INSTALL_CMD) {
            config.install_command = cmd.split_whitespace().map(str::to_string).collect();
        }
        if let Some(secs) = value(ENV_RENDER_TIMEOUT) {
            match secs.trim().parse::<u64>() {
                Ok(s) if s > 0 => config.timeout = Duration::from_secs(s),
                _ => log::warn!(
                    "ignoring {ENV_RENDER_TIMEOUT}={secs:?}; using {}s",
                    config.timeout.as_secs()
                ),
            }
        }
        config
    }
}

fn default_browser_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache").join("rusty-scatter"),
        None => std::env::temp_dir().join("rusty-scatter"),
    }
}

fn default_install_command(dir: &std::path::Path) -> Vec<String> {
    [
        "npx",
        "--yes",
        "@puppeteer/browsers",
        "install",
        "chrome-headless-shell@stable",
        "--path",
    ]
    .into_iter()
    .map(str::to_string)
    .chain(std::iter::once(dir.display().to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_install_into_browser_dir() {
        let config = RenderConfig::from_lookup(lookup(&[]));
        assert_eq!(config.browser, None);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.install_command[0], "npx");
        assert_eq!(
            config.install_command.last().map(String::as_str),
            Some(config.browser_dir.display().to_string().as_str())
        );
    }

    #[test]
    fn environment_overrides() {
        let config = RenderConfig::from_lookup(lookup(&[
            (ENV_BROWSER, "/opt/chrome/chrome"),
            (ENV_BROWSER_DIR, "/tmp/browsers"),
            (ENV_INSTALL_CMD, "install-chrome --quiet"),
            (ENV_RENDER_TIMEOUT, "5"),
        ]));
        assert_eq!(config.browser, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(config.browser_dir, PathBuf::from("/tmp/browsers"));
        assert_eq!(config.install_command, vec!["install-chrome", "--quiet"]);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_timeout_keeps_default() {
        let config = RenderConfig::from_lookup(lookup(&[(ENV_RENDER_TIMEOUT, "soon")]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
