//! Per-subject processing: navigation, the pending-test queue with its
//! retry/failure bookkeeping, and the video-watching loop.

use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	time::Duration,
};

use chromiumoxide::Browser;
use color_eyre::{Result, eyre::bail};
use derive_new::new;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
	TestOutcome,
	config::AppConfig,
	driver::{self, ChromePage, Frame, PageDriver},
	oracle::QuotaExhausted,
	scripts,
};

/// Attempts allowed per test title within one subject pass. 1 = no retries.
pub const RETRY_CAP: u32 = 1;

/// Consecutive errors after which a subject is abandoned for this run.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// In-run record of which tests could not be completed for one subject, plus
/// the attempt counter feeding it. Not persisted across runs.
#[derive(Debug, Default)]
pub struct SubjectLedger {
	failed: BTreeSet<String>,
	attempts: HashMap<String, u32>,
}

impl SubjectLedger {
	pub fn is_failed(&self, title: &str) -> bool {
		self.failed.contains(title)
	}

	pub fn mark_failed(&mut self, title: &str) {
		self.failed.insert(title.to_string());
	}

	/// Count an attempt against `title`. Returns `false` when the cap was
	/// already spent; the title is then ledgered and never attempted again.
	pub fn begin_attempt(&mut self, title: &str) -> bool {
		let count = self.attempts.entry(title.to_string()).or_insert(0);
		*count += 1;
		if *count > RETRY_CAP {
			self.mark_failed(title);
			false
		} else {
			true
		}
	}

	pub fn attempt_count(&self, title: &str) -> u32 {
		self.attempts.get(title).copied().unwrap_or(0)
	}

	pub fn failed_titles(&self) -> impl Iterator<Item = &str> {
		self.failed.iter().map(String::as_str)
	}
}

/// End-of-run summary data: per subject, what was completed and what wasn't.
#[derive(Debug, Default)]
pub struct RunReport {
	processed: BTreeMap<String, u32>,
	failures: BTreeMap<String, BTreeSet<String>>,
}

impl RunReport {
	pub fn record(&mut self, subject: &str, processed: u32, ledger: &SubjectLedger) {
		self.processed.insert(subject.to_string(), processed);
		self.failures.insert(subject.to_string(), ledger.failed_titles().map(str::to_string).collect());
	}

	pub fn log_summary(&self) {
		info!("==== run summary ====");
		for (subject, processed) in &self.processed {
			info!("{subject}: {processed} item(s) completed");
			if let Some(failed) = self.failures.get(subject) {
				for title in failed {
					info!("{subject}: could not complete \"{title}\"");
				}
			}
		}
	}
}

#[derive(Debug, Deserialize)]
struct TestRow {
	title: String,
	done: bool,
}

#[derive(Debug, Deserialize)]
struct VideoRow {
	title: String,
	watched: bool,
}

/// Works through one subject's pending tests, rescanning the list after every
/// processed item because navigation resets the page state.
#[derive(Debug, new)]
pub struct SubjectRunner {
	subject: String,
	#[new(default)]
	pub ledger: SubjectLedger,
}

impl SubjectRunner {
	pub fn subject(&self) -> &str {
		&self.subject
	}

	/// Returns the number of genuinely completed tests. Failures and
	/// unsupported skips only ever show up in the ledger.
	///
	/// `open_and_run` owns the popup lifecycle for a single titled test and
	/// reports its terminal outcome; only quota exhaustion may escape it.
	pub async fn process_tests<D, F>(&mut self, page: &mut D, config: &AppConfig, mut open_and_run: F) -> Result<u32, QuotaExhausted>
	where
		D: PageDriver,
		F: AsyncFnMut(&str) -> Result<TestOutcome, QuotaExhausted>,
	{
		let mut processed: u32 = 0;
		let mut consecutive_errors: u32 = 0;

		loop {
			if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
				warn!("{}: {consecutive_errors} consecutive errors, giving up on this subject", self.subject);
				break;
			}

			let rows = match scan_tests(page, config).await {
				Ok(rows) => rows,
				Err(e) => {
					warn!("{}: failed to scan the test list: {e:#}", self.subject);
					consecutive_errors += 1;
					page.settle(Duration::from_secs(2)).await;
					continue;
				}
			};

			let Some(row) = rows.into_iter().find(|r| !r.done && !self.ledger.is_failed(&r.title)) else {
				info!("{}: no pending tests left", self.subject);
				break;
			};

			if !self.ledger.begin_attempt(&row.title) {
				// Seen pending again after its one allowed attempt; it is in
				// the ledger now and the next scan will pass over it.
				warn!("{}: \"{}\" still pending after its attempt, not retrying", self.subject, row.title);
				continue;
			}

			info!("{}: opening test \"{}\"", self.subject, row.title);
			match open_and_run(row.title.as_str()).await? {
				TestOutcome::Completed { answered } => {
					processed += 1;
					consecutive_errors = 0;
					info!("{}: completed \"{}\" ({answered} question(s))", self.subject, row.title);
				}
				TestOutcome::SkippedUnsupported => {
					self.ledger.mark_failed(&row.title);
					info!("{}: skipped \"{}\" (free-text answers are unsupported)", self.subject, row.title);
				}
				TestOutcome::Failed => {
					self.ledger.mark_failed(&row.title);
					consecutive_errors += 1;
					warn!("{}: failed \"{}\"", self.subject, row.title);
				}
			}
		}

		Ok(processed)
	}
}

async fn scan_tests<D: PageDriver>(page: &mut D, config: &AppConfig) -> Result<Vec<TestRow>> {
	page.wait_until(Frame::Top, scripts::PRESENT_STATE_ICONS, Duration::from_secs(config.ready_timeout_secs)).await?;
	let raw = page.eval(Frame::Top, scripts::LIST_TESTS).await?;
	Ok(serde_json::from_str(raw.as_str().unwrap_or("[]"))?)
}

// ---- portal navigation ----

/// Read every subject name off the home page, for discovering the exact
/// strings the subject list in the config has to carry.
pub async fn list_subject_names<D: PageDriver>(page: &mut D, config: &AppConfig) -> Result<Vec<String>> {
	page.wait_until(Frame::Top, scripts::PRESENT_SUBJECT_LIST, Duration::from_secs(config.ready_timeout_secs)).await?;
	let raw = page.eval(Frame::Top, scripts::LIST_SUBJECT_NAMES).await?;
	Ok(serde_json::from_str(raw.as_str().unwrap_or("[]"))?)
}

/// Back to the portal home page (between subjects).
pub async fn goto_home<D: PageDriver>(page: &mut D, config: &AppConfig) -> Result<()> {
	let clicked = page.eval(Frame::Top, &scripts::click_link_text("ホーム")).await?;
	if clicked.as_bool() != Some(true) {
		bail!("home link not found");
	}
	page.settle(Duration::from_secs(3)).await;
	page.wait_until(Frame::Top, scripts::PRESENT_SUBJECT_LIST, Duration::from_secs(config.ready_timeout_secs)).await?;
	Ok(())
}

/// Open a subject from the home page and switch to its lessons tab.
pub async fn open_subject<D: PageDriver>(page: &mut D, name: &str, config: &AppConfig) -> Result<()> {
	page.wait_until(Frame::Top, scripts::PRESENT_SUBJECT_LIST, Duration::from_secs(config.ready_timeout_secs)).await?;
	let clicked = page.eval(Frame::Top, &scripts::click_subject(name)).await?;
	if clicked.as_bool() != Some(true) {
		bail!("subject \"{name}\" not found in the subject list");
	}
	page.settle(Duration::from_secs(3)).await;

	let clicked = page.eval(Frame::Top, &scripts::click_link_text("授業")).await?;
	if clicked.as_bool() != Some(true) {
		bail!("lessons tab not found on subject page");
	}
	page.settle(Duration::from_secs(5)).await;
	page.wait_until(Frame::Top, scripts::PRESENT_LESSON_BLOCKS, Duration::from_secs(config.ready_timeout_secs)).await?;
	Ok(())
}

/// Expand every 第N回 lesson block so its contents become visible. A missing
/// block just means the subject has fewer lessons; logged, not fatal.
pub async fn expand_lesson_blocks<D: PageDriver>(page: &mut D, config: &AppConfig) -> Result<()> {
	for i in 1..=config.lesson_blocks {
		let label = format!("第{i}回");
		let clicked = page.eval(Frame::Top, &scripts::expand_lesson_block(&label)).await?;
		if clicked.as_bool() == Some(true) {
			page.settle(Duration::from_secs(1)).await;
		} else {
			info!("lesson block {label} not found, subject may have fewer lessons");
		}
	}
	Ok(())
}

// ---- video mode ----

/// Open every unwatched video once: scan, open the first unwatched in its
/// popup, wait the configured delay, close, rescan. Pure polling; there is no
/// per-question machinery here.
pub async fn watch_videos(page: &mut ChromePage, browser: &Browser, config: &AppConfig) -> Result<u32> {
	let mut watched: u32 = 0;
	let mut consecutive_errors: u32 = 0;

	loop {
		if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
			warn!("{consecutive_errors} consecutive errors, giving up on this subject's videos");
			break;
		}

		let rows: Vec<VideoRow> = match scan_videos(page, config).await {
			Ok(rows) => rows,
			Err(e) => {
				warn!("failed to scan the video list: {e:#}");
				consecutive_errors += 1;
				page.settle(Duration::from_secs(5)).await;
				continue;
			}
		};

		let Some(next) = rows.into_iter().find(|r| !r.watched) else {
			info!("no unwatched videos left");
			break;
		};

		info!("opening video: {}", next.title);
		match open_video_once(page, browser, config, &next.title).await {
			Ok(()) => {
				watched += 1;
				consecutive_errors = 0;
				info!("watched \"{}\"", next.title);
			}
			Err(e) => {
				warn!("failed to watch \"{}\": {e:#}", next.title);
				consecutive_errors += 1;
			}
		}
	}

	Ok(watched)
}

async fn scan_videos(page: &mut ChromePage, config: &AppConfig) -> Result<Vec<VideoRow>> {
	page.wait_until(Frame::Top, scripts::PRESENT_STATE_ICONS, Duration::from_secs(config.ready_timeout_secs)).await?;
	let raw = page.eval(Frame::Top, scripts::LIST_VIDEOS).await?;
	Ok(serde_json::from_str(raw.as_str().unwrap_or("[]"))?)
}

async fn open_video_once(page: &mut ChromePage, browser: &Browser, config: &AppConfig, title: &str) -> Result<()> {
	let clicked = page.eval(Frame::Top, &scripts::click_video(title)).await?;
	if clicked.as_bool() != Some(true) {
		bail!("video link \"{title}\" not found");
	}

	// Let the popup open and register the view before closing it again.
	page.settle(Duration::from_secs(config.video_wait_secs)).await;
	let popup = driver::find_popup(browser, page.page()).await?;
	page.settle(Duration::from_secs(3)).await;
	driver::close_popup(popup).await;

	// The lesson list reloads its status icons after the popup closes.
	page.settle(Duration::from_secs(config.video_wait_secs)).await;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ledger_marks_failed_once() {
		let mut ledger = SubjectLedger::default();
		assert!(!ledger.is_failed("t1"));
		ledger.mark_failed("t1");
		ledger.mark_failed("t1");
		assert!(ledger.is_failed("t1"));
		assert_eq!(ledger.failed_titles().count(), 1);
	}

	#[test]
	fn attempt_cap_moves_title_to_ledger() {
		let mut ledger = SubjectLedger::default();
		assert!(ledger.begin_attempt("t1"));
		assert_eq!(ledger.attempt_count("t1"), 1);
		assert!(!ledger.is_failed("t1"));

		// Second sighting exceeds the cap: ledgered, not retried.
		assert!(!ledger.begin_attempt("t1"));
		assert!(ledger.is_failed("t1"));
	}

	#[test]
	fn attempts_are_tracked_per_title() {
		let mut ledger = SubjectLedger::default();
		assert!(ledger.begin_attempt("t1"));
		assert!(ledger.begin_attempt("t2"));
		assert!(!ledger.is_failed("t1"));
		assert!(!ledger.is_failed("t2"));
	}

	#[test]
	fn report_collects_ledger_titles() {
		let mut ledger = SubjectLedger::default();
		ledger.mark_failed("bad test");
		let mut report = RunReport::default();
		report.record("Subject A", 2, &ledger);
		assert_eq!(report.processed.get("Subject A"), Some(&2));
		assert!(report.failures.get("Subject A").is_some_and(|f| f.contains("bad test")));
	}
}
