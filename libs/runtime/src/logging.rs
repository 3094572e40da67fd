use crate::config::{LoggingConfig, Section};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;

const DEFAULT_MAX_SIZE_MB: u64 = 100;
const DEFAULT_MAX_BACKUPS: usize = 3;

/// `None` means the output is switched off.
fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        "off" | "none" => None,
        _ => Some(LevelFilter::INFO),
    }
}

fn matches_target(target: &str, prefix: &str) -> bool {
    target == prefix
        || (target.starts_with(prefix) && target[prefix.len()..].starts_with("::"))
}

// -------- rotating file sinks --------

type Rotating = Arc<Mutex<FileRotate<AppendCount>>>;

#[derive(Clone)]
struct FileHandle(Option<Rotating>);

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(f) => f.lock().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(f) => f.lock().flush(),
            None => Ok(()),
        }
    }
}

/// Picks the log file for a record by its target; falls back to the
/// "default" section's file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<Rotating>,
    by_target: Vec<(String, Rotating)>,
}

impl FileRouter {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_target.is_empty()
    }

    fn resolve(&self, target: &str) -> Option<Rotating> {
        self.by_target
            .iter()
            .find(|(prefix, _)| matches_target(target, prefix))
            .map(|(_, f)| f.clone())
            .or_else(|| self.default.clone())
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = FileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        FileHandle(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileHandle(self.resolve(meta.target()))
    }
}

/// Relative paths are joined onto `base_dir` (usually server.home_dir).
fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<Option<Rotating>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let path = resolve_log_path(section.file.trim(), base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) * 1024 * 1024;
    let rot = FileRotate::new(
        &path,
        AppendCount::new(section.max_backups.unwrap_or(DEFAULT_MAX_BACKUPS)),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Some(Arc::new(Mutex::new(rot))))
}

fn build_file_router(cfg: &LoggingConfig, base_dir: &Path) -> FileRouter {
    let mut router = FileRouter::default();
    for (name, section) in cfg {
        match open_rotating(section, base_dir) {
            Ok(Some(file)) if name == "default" => router.default = Some(file),
            Ok(Some(file)) => router.by_target.push((name.clone(), file)),
            Ok(None) => {}
            Err(e) => eprintln!("Failed to open log file '{}' for '{name}': {e}", section.file),
        }
    }
    // longest prefix wins
    router
        .by_target
        .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    router
}

// -------- filters --------

/// Per-target filter. Sections other than "default" set explicit targets;
/// "default" sets the fallback level.
fn build_targets(cfg: &LoggingConfig, level_of: impl Fn(&Section) -> Option<LevelFilter>) -> Targets {
    let fallback = cfg
        .get("default")
        .and_then(&level_of)
        .unwrap_or(LevelFilter::OFF);
    cfg.iter()
        .filter(|(name, _)| name.as_str() != "default")
        .fold(Targets::new().with_default(fallback), |targets, (name, section)| {
            targets.with_target(name.clone(), level_of(section).unwrap_or(LevelFilter::OFF))
        })
}

fn console_level(section: &Section) -> Option<LevelFilter> {
    parse_level(&section.console_level)
}

fn file_level(section: &Section) -> Option<LevelFilter> {
    if section.file.trim().is_empty() {
        return None;
    }
    parse_level(&section.file_level)
}

// -------- public init --------

/// Install the global subscriber described by `cfg`.
///
/// Console output is human-readable, file output is JSON. Relative file paths
/// are resolved against `base_dir`. Calling this twice is harmless.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    // bridge `log` records before the subscriber goes in
    let _ = tracing_log::LogTracer::init();

    if cfg.is_empty() {
        init_default_logging();
        return;
    }

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

    let console = fmt::layer()
        .with_ansi(std::io::stdout().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(build_targets(cfg, console_level));

    let router = build_file_router(cfg, base_dir);
    let file = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(build_targets(cfg, file_level))
    });

    let _ = Registry::default().with(console).with(file).try_init();
}

fn init_default_logging() {
    let _ = fmt()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_level("trace"), Some(LevelFilter::TRACE));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level(" warn "), Some(LevelFilter::WARN));
        assert_eq!(parse_level("off"), None);
        assert_eq!(parse_level("bogus"), Some(LevelFilter::INFO));
    }

    #[test]
    fn target_prefix_matching() {
        assert!(matches_target("restkit", "restkit"));
        assert!(matches_target("restkit::pipeline", "restkit"));
        assert!(!matches_target("restkit_macros", "restkit"));
    }

    #[test]
    fn targets_use_default_as_fallback() {
        let mut cfg = default_logging_config();
        cfg.insert("restkit".into(), section("debug", "", ""));
        cfg.insert("noisy".into(), section("off", "", ""));

        let targets = build_targets(&cfg, console_level);
        assert!(targets.would_enable("restkit::pipeline", &tracing::Level::DEBUG));
        assert!(!targets.would_enable("noisy", &tracing::Level::ERROR));
        assert!(targets.would_enable("other", &tracing::Level::INFO));
        assert!(!targets.would_enable("other", &tracing::Level::DEBUG));
    }

    #[test]
    fn file_router_resolves_by_target() {
        let tmp = tempdir().unwrap();
        let mut cfg = LoggingConfig::new();
        cfg.insert("default".into(), section("info", "logs/all.log", "debug"));
        cfg.insert("restkit".into(), section("info", "logs/api.log", "debug"));
        cfg.insert("quiet".into(), section("info", "", ""));

        let router = build_file_router(&cfg, tmp.path());
        assert!(!router.is_empty());
        assert_eq!(router.by_target.len(), 1);
        assert!(tmp.path().join("logs").is_dir());

        let api = router.resolve("restkit::registry").unwrap();
        assert!(Arc::ptr_eq(&api, &router.by_target[0].1));
        let other = router.resolve("hyper").unwrap();
        assert!(Arc::ptr_eq(&other, router.default.as_ref().unwrap()));
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let tmp = tempdir().unwrap();
        let resolved = resolve_log_path("logs/test.log", tmp.path());
        assert!(resolved.starts_with(tmp.path()));
        assert!(resolved.ends_with("logs/test.log"));

        let abs = tmp.path().join("x.log");
        assert_eq!(resolve_log_path(abs.to_str().unwrap(), Path::new("/elsewhere")), abs);
    }

    #[test]
    fn empty_file_disables_file_level() {
        assert_eq!(file_level(&section("info", "", "debug")), None);
        assert_eq!(
            file_level(&section("info", "a.log", "debug")),
            Some(LevelFilter::DEBUG)
        );
    }
}
