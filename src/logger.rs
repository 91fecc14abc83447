//! Session log for PolaroidFX renders.
//!
//! One file per session, truncated on [`init`]:
//!   Windows:  `%APPDATA%\PolaroidFX\polaroidfx.log`
//!   Linux:    `$XDG_DATA_HOME/PolaroidFX/polaroidfx.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/PolaroidFX/polaroidfx.log`
//!
//! `log_info!` / `log_warn!` / `log_err!` work from any module. Without
//! [`init`] (library callers, tests) lines only reach stderr, and only when
//! echo is on.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

const APP_DIR: &str = "PolaroidFX";
const LOG_NAME: &str = "polaroidfx.log";

static SESSION: OnceLock<(PathBuf, Mutex<File>)> = OnceLock::new();
static ECHO: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Path of the open session log, if [`init`] succeeded.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|(p, _)| p.as_path())
}

/// Mirror log lines to stderr (`--verbose`).
pub fn set_echo(on: bool) {
    ECHO.store(on, Ordering::Relaxed);
}

pub fn write(level: Level, msg: &str) {
    emit(&format_line(&clock_of_day(unix_secs()), level, msg));
}

/// `[HH:MM:SS] [LEVEL] message`
pub fn format_line(clock: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock, level.tag(), msg)
}

// I/O errors are dropped: a failing log must not fail a render.
fn emit(line: &str) {
    if ECHO.load(Ordering::Relaxed) {
        eprintln!("{}", line);
    }
    if let Some((_, file)) = SESSION.get()
        && let Ok(mut f) = file.lock()
    {
        let _ = writeln!(f, "{}", line);
    }
}

/// Open (truncate) the session log and hook panics into it.
/// Failure to open the file is reported on stderr and otherwise ignored.
pub fn init() {
    let path = default_log_path();
    match open_session(&path) {
        Ok(file) => {
            if SESSION.set((path.clone(), Mutex::new(file))).is_err() {
                return;
            }
        }
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    }

    emit(&format!(
        "=== PolaroidFX {} session, pid {}, unix {} ===",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        unix_secs().unwrap_or(0)
    ));
    emit(&format!("Log file: {}", path.display()));

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        default_hook(info);
    }));
}

fn open_session(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

pub fn default_log_path() -> PathBuf {
    data_dir().join(APP_DIR).join(LOG_NAME)
}

fn data_dir() -> PathBuf {
    let var = |k: &str| std::env::var_os(k).filter(|v| !v.is_empty()).map(PathBuf::from);

    if cfg!(target_os = "windows")
        && let Some(appdata) = var("APPDATA")
    {
        return appdata;
    }
    if cfg!(target_os = "macos")
        && let Some(home) = var("HOME")
    {
        return home.join("Library").join("Application Support");
    }
    if let Some(xdg) = var("XDG_DATA_HOME") {
        return xdg;
    }
    match var("HOME") {
        Some(home) => home.join(".local").join("share"),
        None => PathBuf::from("."),
    }
}

fn unix_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// UTC wall clock within the day; `??:??:??` when the system clock is
/// before the epoch.
fn clock_of_day(secs: Option<u64>) -> String {
    match secs {
        Some(s) => format!("{:02}:{:02}:{:02}", (s % 86_400) / 3600, (s % 3600) / 60, s % 60),
        None => "??:??:??".to_string(),
    }
}
