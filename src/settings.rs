use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::overlay::LayoutTuning;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub app_name: String,
    pub debug: bool,
    pub server_addr: String,
    pub fetch_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub image_model: String,
    pub provider_timeout_secs: u64,
    pub proxy_fallback: bool,
    pub font_candidates: Vec<String>,
    pub font_families: Vec<String>,
    pub default_background: Option<String>,
    pub line_spacing_ratio: f32,
    pub panel_bottom_ratio: f32,
}

impl Default for Settings {
    fn default() -> Self {
        let tuning = LayoutTuning::default();
        Self {
            app_name: "Text to Image API".to_string(),
            debug: false,
            server_addr: "0.0.0.0:8000".to_string(),
            fetch_timeout_secs: 30,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            image_model: "dall-e-3".to_string(),
            provider_timeout_secs: 60,
            proxy_fallback: true,
            font_candidates: vec![
                "/System/Library/Fonts/PingFang.ttc".to_string(),
                "/System/Library/Fonts/STHeiti Light.ttc".to_string(),
                "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf".to_string(),
                "C:\\Windows\\Fonts\\msyh.ttc".to_string(),
            ],
            font_families: vec!["sans-serif".to_string()],
            default_background: None,
            line_spacing_ratio: tuning.line_spacing_ratio,
            panel_bottom_ratio: tuning.panel_bottom_ratio,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    app: Option<AppSettings>,
    server: Option<ServerSettings>,
    openai: Option<OpenAISettings>,
    fonts: Option<FontSettings>,
    overlay: Option<OverlaySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct AppSettings {
    name: Option<String>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAISettings {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    proxy_fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    candidates: Option<Vec<String>>,
    families: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    default_background: Option<String>,
    line_spacing_ratio: Option<f32>,
    panel_bottom_ratio: Option<f32>,
}

/// Loads settings from the embedded defaults, the working directory, the
/// home settings directory and `extra_path`, in that order, then applies
/// environment overrides.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, Path::new("<embedded>"))?);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse_settings(&content, &path)?);
        }
    }

    settings.apply_env(|name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn parse_settings(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

impl Settings {
    pub fn layout_tuning(&self) -> LayoutTuning {
        LayoutTuning {
            line_spacing_ratio: self.line_spacing_ratio,
            panel_bottom_ratio: self.panel_bottom_ratio,
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(app) = incoming.app {
            if let Some(name) = non_empty(app.name) {
                self.app_name = name;
            }
            if let Some(debug) = app.debug {
                self.debug = debug;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
            if let Some(secs) = server.fetch_timeout_secs
                && secs > 0
            {
                self.fetch_timeout_secs = secs;
            }
        }
        if let Some(openai) = incoming.openai {
            if let Some(key) = non_empty(openai.api_key) {
                self.openai_api_key = Some(key);
            }
            if let Some(url) = non_empty(openai.base_url) {
                self.openai_base_url = url;
            }
            if let Some(model) = non_empty(openai.model) {
                self.image_model = model;
            }
            if let Some(secs) = openai.timeout_secs
                && secs > 0
            {
                self.provider_timeout_secs = secs;
            }
            if let Some(fallback) = openai.proxy_fallback {
                self.proxy_fallback = fallback;
            }
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(candidates) = fonts.candidates {
                self.font_candidates = candidates;
            }
            if let Some(families) = fonts.families {
                self.font_families = families;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = non_empty(overlay.default_background) {
                self.default_background = Some(path);
            }
            if let Some(ratio) = overlay.line_spacing_ratio {
                self.line_spacing_ratio = ratio;
            }
            if let Some(ratio) = overlay.panel_bottom_ratio {
                self.panel_bottom_ratio = ratio;
            }
        }
    }

    /// Environment variables win over every settings file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = non_empty(lookup("OPENAI_API_KEY")) {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = non_empty(lookup("OPENAI_BASE_URL")) {
            self.openai_base_url = url;
        }
        if let Some(name) = non_empty(lookup("APP_NAME")) {
            self.app_name = name;
        }
        if let Some(debug) = non_empty(lookup("DEBUG")) {
            self.debug = matches!(
                debug.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.line_spacing_ratio.is_finite() && self.line_spacing_ratio > 0.0) {
            return Err(anyhow!(
                "overlay.line_spacing_ratio must be positive (got {})",
                self.line_spacing_ratio
            ));
        }
        if !(self.panel_bottom_ratio.is_finite() && self.panel_bottom_ratio >= 0.0) {
            return Err(anyhow!(
                "overlay.panel_bottom_ratio must not be negative (got {})",
                self.panel_bottom_ratio
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".text-to-image-rust"))
        }
    })
}
