use std::{fmt, fs, path::PathBuf, str::FromStr, sync::Mutex};

use anyhow::{Context, Result};
use shared::domain::UnknownVariant;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

pub trait ThemeStore: Send + Sync {
    fn load(&self) -> Option<Theme>;
    fn save(&self, theme: Theme) -> Result<()>;
}

/// One-word preference file, `light` or `dark`.
pub struct FileThemeStore {
    path: PathBuf,
}

impl FileThemeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/vs-press/theme`, or `None` when the platform has no
    /// config directory.
    pub fn in_config_dir() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("vs-press").join("theme")))
    }
}

impl ThemeStore for FileThemeStore {
    fn load(&self) -> Option<Theme> {
        let raw = fs::read_to_string(&self.path).ok()?;
        raw.parse().ok()
    }

    fn save(&self, theme: Theme) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, theme.as_str())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), %theme, "theme saved");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryThemeStore {
    theme: Mutex<Option<Theme>>,
}

impl ThemeStore for MemoryThemeStore {
    fn load(&self) -> Option<Theme> {
        self.theme.lock().ok().and_then(|guard| *guard)
    }

    fn save(&self, theme: Theme) -> Result<()> {
        let mut guard = self
            .theme
            .lock()
            .map_err(|_| anyhow::anyhow!("theme store poisoned"))?;
        *guard = Some(theme);
        Ok(())
    }
}

/// Colour-scheme hint from the environment: `PRESS_COLOR_SCHEME` first,
/// then the `COLORFGBG` terminal convention (`fg;bg`, where a background of
/// 0-6 or 8 is dark).
pub fn platform_hint(var: impl Fn(&str) -> Option<String>) -> Option<Theme> {
    if let Some(theme) = var("PRESS_COLOR_SCHEME").and_then(|v| v.parse().ok()) {
        return Some(theme);
    }
    let colorfgbg = var("COLORFGBG")?;
    let background: u8 = colorfgbg.rsplit(';').next()?.trim().parse().ok()?;
    Some(match background {
        0..=6 | 8 => Theme::Dark,
        _ => Theme::Light,
    })
}

pub fn initial_theme(store: &dyn ThemeStore, hint: Option<Theme>) -> Theme {
    store.load().or(hint).unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/theme_tests.rs"]
mod tests;
