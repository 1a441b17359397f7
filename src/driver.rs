//! Browser context plumbing. The portal nests its test UI three deep
//! (top window, content iframe, answer-list iframe, control frame), so every
//! page operation names its frame explicitly instead of relying on a hidden
//! "current frame" in the driver.

use std::time::Duration;

use chromiumoxide::{Browser, Page};
use color_eyre::{Result, eyre::{bail, eyre}};
use serde_json::Value;
use tracing::debug;

/// Browser context a script runs in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frame {
	/// Top-level document of the window.
	Top,
	/// Main content iframe holding the question body and radio/checkbox controls.
	Content,
	/// Answer-list iframe nested inside the content frame (dropdown selects).
	AnswerList,
	/// Navigation frame with the forward/mark controls.
	Control,
}

impl Frame {
	fn name(&self) -> &'static str {
		match self {
			Self::Top => "top",
			Self::Content => "content",
			Self::AnswerList => "answer_list",
			Self::Control => "control",
		}
	}
}

/// The browser capabilities the test machinery needs. Production code uses
/// [`ChromePage`]; tests inject a scripted fake.
pub trait PageDriver {
	/// Navigate the top-level window.
	fn goto(&mut self, url: &str) -> impl Future<Output = Result<()>>;

	/// Evaluate a `(doc, win) => ...` script in the given frame and return its
	/// JSON result.
	fn eval(&mut self, frame: Frame, script: &str) -> impl Future<Output = Result<Value>>;

	/// Poll until `script` evaluates truthy in `frame`, or time out.
	fn wait_until(&mut self, frame: Frame, script: &str, timeout: Duration) -> impl Future<Output = Result<()>>;

	/// Flat pacing wait. The portal offers no readiness signal for most
	/// transitions, so fixed sleeps stand in; fakes make this a no-op.
	fn settle(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

/// Walks from the top document to the requested frame window, or null when
/// the frame chain has not rendered yet.
const FRAME_RESOLVER: &str = r#"(name => {
	if (name === 'top') return window;
	const content = document.getElementById('cts_main');
	const cw = content && content.contentWindow;
	if (name === 'content') return cw;
	if (!cw) return null;
	if (name === 'answer_list') {
		const inner = cw.document.getElementById('ans_list');
		return inner && inner.contentWindow;
	}
	if (name === 'control') {
		const ctl = cw.document.getElementById('ctrl_bar');
		return (ctl && ctl.contentWindow) || cw;
	}
	return null;
})"#;

/// Sentinel returned by the wrapper when the frame chain is missing, so the
/// caller sees a structural error instead of a silent null.
const NO_FRAME: &str = "__no_frame__";

/// chromiumoxide-backed [`PageDriver`].
#[derive(Clone, Debug)]
pub struct ChromePage {
	page: Page,
}

impl ChromePage {
	pub fn new(page: Page) -> Self {
		Self { page }
	}

	pub fn into_page(self) -> Page {
		self.page
	}

	pub fn page(&self) -> &Page {
		&self.page
	}

	fn wrap(frame: Frame, script: &str) -> String {
		format!(
			r#"(() => {{
				const win = ({FRAME_RESOLVER})('{name}');
				if (!win) return '{NO_FRAME}';
				return ({script})(win.document, win);
			}})()"#,
			name = frame.name(),
		)
	}
}

impl PageDriver for ChromePage {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| eyre!("failed to navigate to {url}: {e}"))?;
		Ok(())
	}

	async fn eval(&mut self, frame: Frame, script: &str) -> Result<Value> {
		let wrapped = Self::wrap(frame, script);
		let result = self.page.evaluate(wrapped).await.map_err(|e| eyre!("script evaluation failed in {frame:?} frame: {e}"))?;
		let value = result.value().cloned().unwrap_or(Value::Null);
		if value.as_str() == Some(NO_FRAME) {
			bail!("{frame:?} frame not present on the page");
		}
		Ok(value)
	}

	async fn wait_until(&mut self, frame: Frame, script: &str, timeout: Duration) -> Result<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			match self.eval(frame, script).await {
				Ok(value) if is_truthy(&value) => return Ok(()),
				Ok(_) => {}
				Err(e) => debug!("readiness probe failed, retrying: {e}"),
			}
			if tokio::time::Instant::now() >= deadline {
				bail!("timed out after {timeout:?} waiting for condition in {frame:?} frame");
			}
			tokio::time::sleep(Duration::from_millis(250)).await;
		}
	}

	async fn settle(&mut self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Bool(b) => *b,
		Value::Null => false,
		Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
		Value::String(s) => !s.is_empty(),
		_ => true,
	}
}

/// Find the popup window that opened after clicking a content link: the first
/// page whose target is not the main window's. Retries briefly because the
/// popup target appears asynchronously.
pub async fn find_popup(browser: &Browser, main: &Page) -> Result<Page> {
	let main_id = main.target_id().clone();
	for _ in 0..20 {
		let pages = browser.pages().await.map_err(|e| eyre!("failed to list browser pages: {e}"))?;
		if let Some(popup) = pages.into_iter().find(|p| *p.target_id() != main_id) {
			return Ok(popup);
		}
		tokio::time::sleep(Duration::from_millis(500)).await;
	}
	bail!("popup window did not appear")
}

/// Close a popup, logging instead of failing; the caller is usually already
/// carrying a more interesting outcome.
pub async fn close_popup(popup: Page) {
	if let Err(e) = popup.close().await {
		tracing::warn!("failed to close popup window: {e}");
	}
}
