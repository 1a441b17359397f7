//! In-memory stand-ins for the browser page and the answer endpoint, keyed on
//! the same page scripts the real driver sends.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use color_eyre::{Result, eyre::bail};
use elcampus_headless::{
	Question, Selection,
	driver::{Frame, PageDriver},
	oracle::{AnswerOracle, QuotaExhausted},
	scripts,
};
use serde_json::{Value, json};

/// One scripted question in a fake test window.
#[derive(Clone, Debug)]
pub enum FakeQuestion {
	Radio { text: &'static str, options: &'static [&'static str] },
	Checkbox { text: &'static str, options: &'static [&'static str] },
	Dropdown { text: &'static str, options: &'static [&'static str] },
	FreeText,
	/// A page with no readable question on it.
	Blank,
}

/// Fake page: serves a scripted question sequence and records every
/// state-changing script it receives in `actions`.
pub struct FakePage {
	questions: Vec<FakeQuestion>,
	pub index: usize,
	pub actions: Vec<String>,
	/// Test rows served for list scans, shared so a test can flip `done`
	/// mid-run the way completing a real test would.
	pub tests: Rc<RefCell<Vec<(String, bool)>>>,
	/// Subject names served for home-page scans.
	pub subject_names: Vec<String>,
	/// Every readiness wait received, with its timeout.
	pub waits: Vec<(String, Duration)>,
	/// URLs navigated to.
	pub visited: Vec<String>,
}

impl FakePage {
	pub fn with_questions(questions: Vec<FakeQuestion>) -> Self {
		Self {
			questions,
			index: 0,
			actions: Vec::new(),
			tests: Rc::new(RefCell::new(Vec::new())),
			subject_names: Vec::new(),
			waits: Vec::new(),
			visited: Vec::new(),
		}
	}

	pub fn with_tests(rows: Vec<(&str, bool)>) -> (Self, Rc<RefCell<Vec<(String, bool)>>>) {
		let tests = Rc::new(RefCell::new(rows.into_iter().map(|(t, d)| (t.to_string(), d)).collect::<Vec<_>>()));
		let mut page = Self::with_questions(Vec::new());
		page.tests = Rc::clone(&tests);
		(page, tests)
	}

	fn current(&self) -> &FakeQuestion {
		self.questions.get(self.index).unwrap_or(&FakeQuestion::Blank)
	}

	/// Actions recorded with the given prefix, e.g. `"radio:"`.
	pub fn actions_with_prefix(&self, prefix: &str) -> Vec<String> {
		self.actions.iter().filter(|a| a.starts_with(prefix)).cloned().collect()
	}
}

impl PageDriver for FakePage {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.visited.push(url.to_string());
		Ok(())
	}

	async fn eval(&mut self, _frame: Frame, script: &str) -> Result<Value> {
		if script.contains("login_id") && script.contains("login_pw") {
			self.actions.push("fill_login".to_string());
			return Ok(json!(true));
		}
		if script == scripts::CLICK_LOGIN {
			self.actions.push("click_login".to_string());
			return Ok(json!(true));
		}
		if script == scripts::LIST_SUBJECT_NAMES {
			return Ok(Value::String(json!(self.subject_names).to_string()));
		}
		if script == scripts::LIST_TESTS {
			let rows: Vec<Value> = self.tests.borrow().iter().map(|(title, done)| json!({ "title": title, "done": done })).collect();
			return Ok(Value::String(serde_json::to_string(&rows)?));
		}

		if script == scripts::FREE_TEXT_FLAG {
			return Ok(json!(matches!(self.current(), FakeQuestion::FreeText)));
		}
		if script == scripts::COUNT_CHECKBOXES {
			let n = match self.current() {
				FakeQuestion::Checkbox { options, .. } => options.len(),
				_ => 0,
			};
			return Ok(json!(n));
		}
		if script == scripts::COUNT_RADIOS {
			let n = match self.current() {
				FakeQuestion::Radio { options, .. } => options.len(),
				_ => 0,
			};
			return Ok(json!(n));
		}
		if script == scripts::HAS_DROPDOWN {
			return Ok(json!(matches!(self.current(), FakeQuestion::Dropdown { .. })));
		}

		if script == scripts::READ_RADIO_QUESTION || script == scripts::READ_CHECKBOX_QUESTION {
			let payload = match self.current() {
				FakeQuestion::Radio { text, options } | FakeQuestion::Checkbox { text, options } => json!({ "text": text, "options": options }),
				_ => json!({ "text": "", "options": [] }),
			};
			return Ok(Value::String(payload.to_string()));
		}
		if script == scripts::READ_DROPDOWN_OPTIONS {
			let options: &[&str] = match self.current() {
				FakeQuestion::Dropdown { options, .. } => options,
				_ => &[],
			};
			return Ok(Value::String(json!(options).to_string()));
		}
		if script == scripts::READ_QUESTION_TEXT {
			let text = match self.current() {
				FakeQuestion::Dropdown { text, .. } => *text,
				_ => "",
			};
			return Ok(json!(text));
		}

		if script == scripts::FORWARD_ENABLED {
			return Ok(json!(self.index + 1 < self.questions.len()));
		}
		if script == scripts::CLICK_FORWARD {
			self.actions.push("forward".to_string());
			self.index += 1;
			return Ok(json!(true));
		}
		if script == scripts::OVERRIDE_CONFIRM {
			self.actions.push("confirm_override".to_string());
			return Ok(json!(true));
		}
		if script == scripts::CLICK_MARK {
			self.actions.push("mark".to_string());
			return Ok(json!(true));
		}

		// Answer clicks are generated per index; match them exactly.
		for n in 0..32 {
			if script == scripts::click_radio(n) {
				self.actions.push(format!("radio:{n}"));
				return Ok(json!(true));
			}
			if script == scripts::click_checkbox(n) {
				self.actions.push(format!("checkbox:{n}"));
				return Ok(json!(true));
			}
		}
		for position in 1..8 {
			for choice in 0..16 {
				if script == scripts::set_dropdown(position, choice) {
					self.actions.push(format!("dropdown:{position}={choice}"));
					return Ok(json!(true));
				}
			}
		}

		bail!("fake page received an unexpected script: {script}")
	}

	async fn wait_until(&mut self, _frame: Frame, script: &str, timeout: Duration) -> Result<()> {
		self.waits.push((script.to_string(), timeout));
		Ok(())
	}

	async fn settle(&mut self, _duration: Duration) {}
}

/// Fake oracle: hands out queued selections in order, or fails every call
/// with quota exhaustion.
pub struct FakeOracle {
	replies: RefCell<VecDeque<Selection>>,
	pub asked: RefCell<Vec<String>>,
	quota_exhausted: bool,
}

impl FakeOracle {
	pub fn with_replies(replies: Vec<Selection>) -> Self {
		Self { replies: RefCell::new(replies.into()), asked: RefCell::new(Vec::new()), quota_exhausted: false }
	}

	pub fn quota_exhausted() -> Self {
		Self { replies: RefCell::new(VecDeque::new()), asked: RefCell::new(Vec::new()), quota_exhausted: true }
	}
}

impl AnswerOracle for FakeOracle {
	async fn solve(&self, question: &Question) -> Result<Selection, QuotaExhausted> {
		if self.quota_exhausted {
			return Err(QuotaExhausted);
		}
		self.asked.borrow_mut().push(question.text.clone());
		Ok(self.replies.borrow_mut().pop_front().unwrap_or_else(|| vec![1]))
	}
}
