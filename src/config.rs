use std::{fs, path::Path};

use color_eyre::{
	Result,
	eyre::{Context, bail},
};
use serde::Deserialize;

/// Operating mode for a run: open videos until none are unwatched, or solve
/// tests until none are pending.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
	Video,
	#[default]
	Test,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	pub username: String,
	pub password: String,
	/// Subjects to process, by their exact link text on the portal home page.
	#[serde(default)]
	pub subjects: Vec<String>,
	#[serde(default)]
	pub mode: Mode,
	/// API key for the text-generation endpoint. Required in test mode.
	#[serde(default)]
	pub gemini_api_key: String,
	#[serde(default = "default_gemini_model")]
	pub gemini_model: String,
	#[serde(default = "default_base_url")]
	pub base_url: String,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Flat wait after opening a video popup, seconds.
	#[serde(default = "default_video_wait_secs")]
	pub video_wait_secs: u64,
	/// Flat wait after opening a test popup or submitting an answer, seconds.
	#[serde(default = "default_page_wait_secs")]
	pub page_wait_secs: u64,
	/// Timeout for bounded element-readiness waits, seconds.
	#[serde(default = "default_ready_timeout_secs")]
	pub ready_timeout_secs: u64,
	/// How many lesson blocks to expand per subject.
	#[serde(default = "default_lesson_blocks")]
	pub lesson_blocks: u32,
}

fn default_gemini_model() -> String {
	"gemini-2.0-flash".to_string()
}

fn default_base_url() -> String {
	"https://elcampus.otemae.ac.jp/".to_string()
}

fn default_video_wait_secs() -> u64 {
	10
}

fn default_page_wait_secs() -> u64 {
	3
}

fn default_ready_timeout_secs() -> u64 {
	10
}

fn default_lesson_blocks() -> u32 {
	15
}

impl AppConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
		let config: AppConfig = toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))?;
		Ok(config)
	}

	/// Checks that everything a run needs is present. Called before the
	/// browser is launched; a failure here means exit code 1.
	pub fn validate(&self) -> Result<()> {
		if self.username.is_empty() || self.password.is_empty() {
			bail!("username and password must be set in the config file");
		}
		if self.subjects.is_empty() {
			bail!("at least one subject must be listed in the config file");
		}
		if self.mode == Mode::Test && self.gemini_api_key.is_empty() {
			bail!("gemini_api_key must be set for test mode");
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn minimal() -> AppConfig {
		toml::from_str(
			r#"
			username = "u"
			password = "p"
			subjects = ["Subject A"]
			gemini_api_key = "k"
			"#,
		)
		.unwrap()
	}

	#[test]
	fn defaults_fill_in() {
		let config = minimal();
		assert_eq!(config.mode, Mode::Test);
		assert_eq!(config.video_wait_secs, 10);
		assert_eq!(config.lesson_blocks, 15);
		assert!(config.base_url.contains("elcampus"));
		config.validate().unwrap();
	}

	#[test]
	fn test_mode_requires_api_key() {
		let mut config = minimal();
		config.gemini_api_key.clear();
		assert!(config.validate().is_err());
		config.mode = Mode::Video;
		config.validate().unwrap();
	}

	#[test]
	fn missing_subjects_rejected() {
		let mut config = minimal();
		config.subjects.clear();
		assert!(config.validate().is_err());
	}
}
