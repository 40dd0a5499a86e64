use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::chart::model::CanvasSize;
use crate::config::RenderConfig;
use crate::error::{BackendError, InstallError};

/// Turns an SVG document into PNG bytes.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn screenshot(&self, svg: &str, size: CanvasSize) -> Result<Vec<u8>, BackendError>;
}

/// Provisions whatever a backend reported as missing.
pub trait BrowserInstaller: Send + Sync {
    fn install(&self) -> Result<(), InstallError>;
}

// ---------------------------------------------------------------------------
// Headless browser backend
// ---------------------------------------------------------------------------

const BROWSER_NAMES: [&str; 6] = [
    "chrome-headless-shell",
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Screenshots the SVG with a Chromium-family browser in headless mode.
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    executable: Option<PathBuf>,
    search_dir: PathBuf,
    timeout: Duration,
}

impl HeadlessBrowser {
    pub fn new(config: &RenderConfig) -> Self {
        HeadlessBrowser {
            executable: config.browser.clone(),
            search_dir: config.browser_dir.clone(),
            timeout: config.timeout,
        }
    }

    /// Explicit executable, then `PATH`, then the install directory.
    fn locate(&self) -> Result<PathBuf, BackendError> {
        if let Some(exe) = &self.executable {
            return if exe.is_file() {
                Ok(exe.clone())
            } else {
                Err(BackendError::BrowserMissing(format!(
                    "{} does not exist",
                    exe.display()
                )))
            };
        }
        if let Some(found) = search_path() {
            return Ok(found);
        }
        if let Some(found) = search_dir(&self.search_dir, 6) {
            return Ok(found);
        }
        Err(BackendError::BrowserMissing(format!(
            "none of {} found on PATH or under {}",
            BROWSER_NAMES.join(", "),
            self.search_dir.display()
        )))
    }

    fn run(&self, exe: &Path, args: &[String], log_path: &Path) -> Result<(), BackendError> {
        let log = File::create(log_path).map_err(failed("creating browser log"))?;
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    BackendError::BrowserMissing(format!("{}: {e}", exe.display()))
                }
                _ => BackendError::Failed(format!("starting {}: {e}", exe.display())),
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait().map_err(failed("waiting for browser"))? {
                Some(status) if status.success() => return Ok(()),
                Some(status) => {
                    let stderr = fs::read_to_string(log_path).unwrap_or_default();
                    return Err(BackendError::Failed(format!(
                        "browser exited with {status}: {}",
                        last_lines(&stderr, 5)
                    )));
                }
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BackendError::Failed(format!(
                        "browser timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
                None => thread::sleep(Duration::from_millis(50)),
            }
        }
    }
}

impl RenderBackend for HeadlessBrowser {
    fn name(&self) -> &str {
        "headless browser"
    }

    fn screenshot(&self, svg: &str, size: CanvasSize) -> Result<Vec<u8>, BackendError> {
        let exe = self.locate()?;
        let scratch = tempfile::tempdir().map_err(failed("creating scratch directory"))?;
        let page = scratch.path().join("chart.html");
        let output = scratch.path().join("chart.png");
        fs::write(&page, html_page(svg)).map_err(failed("writing chart page"))?;

        let args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--hide-scrollbars".to_string(),
            "--force-device-scale-factor=1".to_string(),
            format!("--window-size={},{}", size.width, size.height),
            format!("--screenshot={}", output.display()),
            format!("file://{}", page.display()),
        ];
        log::debug!("running {} {}", exe.display(), args.join(" "));
        self.run(&exe, &args, &scratch.path().join("browser.log"))?;

        fs::read(&output).map_err(|e| {
            BackendError::Failed(format!("browser produced no screenshot ({e})"))
        })
    }
}

fn html_page(svg: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><style>\
         html,body{{margin:0;padding:0;overflow:hidden;background:white}}\
         svg{{display:block}}</style></head><body>{svg}</body></html>"
    )
}

fn failed(what: &'static str) -> impl Fn(io::Error) -> BackendError {
    move |e| BackendError::Failed(format!("{what}: {e}"))
}

fn last_lines(s: &str, n: usize) -> String {
    let lines: Vec<&str> = s.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}

fn search_path() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        BROWSER_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Depth-limited search for a browser binary below `dir`.
fn search_dir(dir: &Path, depth: usize) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| BROWSER_NAMES.contains(&n))
        {
            return Some(path);
        }
    }
    if depth == 0 {
        return None;
    }
    subdirs.sort();
    subdirs.iter().find_map(|d| search_dir(d, depth - 1))
}

// ---------------------------------------------------------------------------
// Installer
// ---------------------------------------------------------------------------

/// Runs an external command that downloads the browser engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(command: &[String]) -> Self {
        let (program, args) = command.split_first().map_or_else(
            || (String::new(), Vec::new()),
            |(p, a)| (p.clone(), a.to_vec()),
        );
        CommandInstaller { program, args }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(&config.install_command)
    }
}

impl BrowserInstaller for CommandInstaller {
    fn install(&self) -> Result<(), InstallError> {
        if self.program.is_empty() {
            return Err(InstallError("no install command configured".to_string()));
        }
        log::warn!(
            "browser engine missing; installing with `{} {}`",
            self.program,
            self.args.join(" ")
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InstallError(format!("running {}: {e}", self.program)))?;
        if output.status.success() {
            log::info!("browser engine installed");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(InstallError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                last_lines(&stderr, 5)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_executable_is_reported_as_missing() {
        let config = RenderConfig {
            browser: Some(PathBuf::from("/definitely/not/here/chrome")),
            ..RenderConfig::default()
        };
        let err = HeadlessBrowser::new(&config)
            .screenshot("<svg/>", CanvasSize { width: 10, height: 10 })
            .unwrap_err();
        assert!(matches!(err, BackendError::BrowserMissing(_)));
    }

    #[test]
    fn finds_browser_in_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("chrome-headless-shell/linux-131/chrome-headless-shell-linux64");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("chrome-headless-shell"), b"").unwrap();
        assert_eq!(
            search_dir(dir.path(), 6),
            Some(nested.join("chrome-headless-shell"))
        );
        assert_eq!(search_dir(dir.path(), 1), None);
    }

    #[test]
    fn empty_install_command_fails() {
        let err = CommandInstaller::new(&[]).install().unwrap_err();
        assert!(err.0.contains("no install command"));
    }

    #[test]
    fn page_embeds_svg() {
        assert!(html_page("<svg id=\"c\"/>").contains("<body><svg id=\"c\"/></body>"));
    }
}
