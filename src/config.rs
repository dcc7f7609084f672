//! Configuration management for metatimeline using the prefer crate.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::charts::ChartOptions;
use crate::render::SpringConfig;
use crate::timeline::ScrubberSettings;

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// User agent for the studies-page fetch. `None` uses the built-in agent,
    /// `"impersonate"` picks a browser agent.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Origami-style spring tension for animated markers.
    pub spring_tension: f64,
    /// Origami-style spring friction.
    pub spring_friction: f64,
    /// Stop springs at their target instead of letting them overshoot.
    pub spring_overshoot_clamping: bool,
    /// Autoplay poll interval in milliseconds.
    pub autoplay_poll_ms: u64,
    /// Simulated hours advanced per real millisecond of autoplay.
    pub autoplay_hours_per_ms: f64,
    /// Animation frame interval in milliseconds.
    pub animation_frame_ms: u64,
    /// Per-hostname override of the built-in studies URL.
    pub studies_urls: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: None,
            request_timeout: 30,
            spring_tension: 150.0,
            spring_friction: 10.0,
            spring_overshoot_clamping: true,
            autoplay_poll_ms: 10,
            autoplay_hours_per_ms: 1.0,
            animation_frame_ms: 16,
            studies_urls: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn animation_frame(&self) -> Duration {
        Duration::from_millis(self.animation_frame_ms.max(1))
    }

    pub fn scrubber(&self) -> ScrubberSettings {
        ScrubberSettings {
            poll_interval: Duration::from_millis(self.autoplay_poll_ms.max(1)),
            hours_per_ms: self.autoplay_hours_per_ms,
        }
    }

    /// Chart options for a page on `hostname`.
    pub fn chart_options(&self, hostname: &str) -> ChartOptions {
        ChartOptions {
            spring: SpringConfig::from_origami(self.spring_tension, self.spring_friction),
            overshoot_clamping: self.spring_overshoot_clamping,
            ..ChartOptions::new(hostname)
        }
    }

    /// Studies URL for a host, preferring a configured override.
    pub fn studies_url<'a>(&'a self, hostname: &str, built_in: &'a str) -> &'a str {
        self.studies_urls
            .get(hostname)
            .map(String::as_str)
            .unwrap_or(built_in)
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// User agent string, or "impersonate".
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub spring_tension: Option<f64>,
    #[serde(default)]
    pub spring_friction: Option<f64>,
    #[serde(default)]
    pub spring_overshoot_clamping: Option<bool>,
    #[serde(default)]
    pub autoplay_poll_ms: Option<u64>,
    #[serde(default)]
    pub autoplay_hours_per_ms: Option<f64>,
    #[serde(default)]
    pub animation_frame_ms: Option<u64>,
    /// Studies URL overrides keyed by hostname.
    #[serde(default)]
    pub studies_urls: HashMap<String, String>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers metatimeline config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("metatimeline").await {
            Ok(pref_config) => {
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").ok();
                let spring_tension: Option<f64> = pref_config.get("spring_tension").ok();
                let spring_friction: Option<f64> = pref_config.get("spring_friction").ok();
                let spring_overshoot_clamping: Option<bool> =
                    pref_config.get("spring_overshoot_clamping").ok();
                let autoplay_poll_ms: Option<u64> =
                    pref_config.get("autoplay_poll_ms").ok();
                let autoplay_hours_per_ms: Option<f64> =
                    pref_config.get("autoplay_hours_per_ms").ok();
                let animation_frame_ms: Option<u64> =
                    pref_config.get("animation_frame_ms").ok();
                let studies_urls: HashMap<String, String> =
                    pref_config.get("studies_urls").unwrap_or_default();

                Config {
                    user_agent,
                    request_timeout,
                    spring_tension,
                    spring_friction,
                    spring_overshoot_clamping,
                    autoplay_poll_ms,
                    autoplay_hours_per_ms,
                    animation_frame_ms,
                    studies_urls,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(tension) = self.spring_tension {
            settings.spring_tension = tension;
        }
        if let Some(friction) = self.spring_friction {
            settings.spring_friction = friction;
        }
        if let Some(clamping) = self.spring_overshoot_clamping {
            settings.spring_overshoot_clamping = clamping;
        }
        if let Some(poll) = self.autoplay_poll_ms {
            settings.autoplay_poll_ms = poll;
        }
        if let Some(rate) = self.autoplay_hours_per_ms {
            settings.autoplay_hours_per_ms = rate;
        }
        if let Some(frame) = self.animation_frame_ms {
            settings.animation_frame_ms = frame;
        }
        for (hostname, url) in &self.studies_urls {
            settings
                .studies_urls
                .insert(hostname.clone(), url.clone());
        }
    }
}

/// Load settings from configuration (async version).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
