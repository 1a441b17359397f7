//! Page scripts, all in `(doc, win) => ...` form so the driver can aim them
//! at the right frame. Everything here is coordinates into the elcampus
//! markup and will break when the portal changes.

/// Login form is present on the entry page.
pub const PRESENT_LOGIN_FORM: &str = "((doc, win) => !!doc.querySelector('input[name=\"login_id\"]'))";

/// Subject list container on the portal home page.
pub const PRESENT_SUBJECT_LIST: &str = "((doc, win) => !!doc.querySelector('.subject_list'))";

/// Lesson blocks have rendered on the subject page.
pub const PRESENT_LESSON_BLOCKS: &str = "((doc, win) => doc.querySelectorAll('.lesson_name').length > 0)";

/// At least one content row with a status icon is present.
pub const PRESENT_STATE_ICONS: &str = "((doc, win) => !!doc.querySelector('td.state_iconl'))";

pub fn fill_login(username: &str, password: &str) -> String {
	format!(
		r#"((doc, win) => {{
			const id = doc.querySelector('input[name="login_id"]');
			const pw = doc.querySelector('input[name="login_pw"]');
			if (!id || !pw) return false;
			id.value = {username};
			pw.value = {password};
			return true;
		}})"#,
		username = js_str(username),
		password = js_str(password),
	)
}

pub const CLICK_LOGIN: &str = r#"((doc, win) => {
	const btn = doc.getElementById('msg_btn_login');
	if (!btn) return false;
	btn.click();
	return true;
})"#;

/// Click the anchor whose trimmed text equals `text` (home link, lessons tab).
pub fn click_link_text(text: &str) -> String {
	format!(
		r#"((doc, win) => {{
			for (const a of doc.querySelectorAll('a')) {{
				if (a.textContent.trim() === {text}) {{ a.click(); return true; }}
			}}
			return false;
		}})"#,
		text = js_str(text),
	)
}

/// All subject names on the home page, spelled exactly as the subject links
/// spell them (and therefore exactly as the config must). JSON string array.
pub const LIST_SUBJECT_NAMES: &str = r#"((doc, win) => {
	const names = [];
	for (const a of doc.querySelectorAll('.subject_list_hdr h4 a')) {
		const text = a.textContent.trim();
		if (text) names.push(text);
	}
	return JSON.stringify(names);
})"#;

/// Click the subject link inside the home-page subject list.
pub fn click_subject(name: &str) -> String {
	format!(
		r#"((doc, win) => {{
			const list = doc.querySelector('.subject_list');
			if (!list) return false;
			for (const a of list.querySelectorAll('a')) {{
				if (a.textContent.trim() === {name}) {{ a.click(); return true; }}
			}}
			return false;
		}})"#,
		name = js_str(name),
	)
}

/// Expand the lesson block whose header contains `label` (e.g. 第3回).
pub fn expand_lesson_block(label: &str) -> String {
	format!(
		r#"((doc, win) => {{
			for (const block of doc.querySelectorAll('.lesson_name')) {{
				if (block.textContent.includes({label})) {{ block.click(); return true; }}
			}}
			return false;
		}})"#,
		label = js_str(label),
	)
}

// ---- test-list / video-list scanning (top frame of the main window) ----

/// Test rows: `[{title, done}]` as a JSON string. `done` comes from the
/// completed status icon.
pub const LIST_TESTS: &str = r#"((doc, win) => {
	const rows = [];
	for (const block of doc.querySelectorAll('div.type_ts')) {
		const link = block.querySelector('td.contents_name a');
		if (!link) continue;
		const icon = block.querySelector('td.state_iconl img');
		rows.push({
			title: link.textContent.trim(),
			done: !!(icon && icon.src.includes('sttop_iconl_fin')),
		});
	}
	return JSON.stringify(rows);
})"#;

/// Video rows: `[{title, watched}]` as a JSON string. Unwatched rows carry
/// the `sttop_iconl_yet` icon.
pub const LIST_VIDEOS: &str = r#"((doc, win) => {
	const rows = [];
	for (const block of doc.querySelectorAll('div.type_bw')) {
		const link = block.querySelector('td.contents_name a');
		if (!link) continue;
		const icon = block.querySelector('td.state_iconl img');
		rows.push({
			title: link.textContent.trim(),
			watched: !(icon && icon.src.includes('sttop_iconl_yet')),
		});
	}
	return JSON.stringify(rows);
})"#;

fn click_content_row(block_class: &str, title: &str) -> String {
	format!(
		r#"((doc, win) => {{
			for (const block of doc.querySelectorAll('div.{block_class}')) {{
				const link = block.querySelector('td.contents_name a');
				if (link && link.textContent.trim() === {title}) {{ link.click(); return true; }}
			}}
			return false;
		}})"#,
		title = js_str(title),
	)
}

pub fn click_test(title: &str) -> String {
	click_content_row("type_ts", title)
}

pub fn click_video(title: &str) -> String {
	click_content_row("type_bw", title)
}

// ---- question type detection (test popup) ----

/// Embedded script state advertises a free-text answer on this question.
pub const FREE_TEXT_FLAG: &str = "((doc, win) => !!(win.qst_info && win.qst_info.free_text_flg))";

pub const COUNT_CHECKBOXES: &str = "((doc, win) => doc.querySelectorAll('input.ans_chk[type=\"checkbox\"]').length)";

pub const COUNT_RADIOS: &str = "((doc, win) => doc.querySelectorAll('input.ans_rdo[type=\"radio\"]').length)";

/// Dropdown answers live in the nested list frame under a fixed id convention.
pub const HAS_DROPDOWN: &str = "((doc, win) => !!doc.querySelector('select#ans_1'))";

// ---- question extraction ----

/// `{text, options}` for radio questions, JSON string. Labels in DOM order.
pub const READ_RADIO_QUESTION: &str = r#"((doc, win) => {
	const body = doc.querySelector('div.qst_txt');
	const options = [];
	for (const lbl of doc.querySelectorAll('input.ans_rdo[type="radio"] + label, label.ans_lbl')) {
		const text = lbl.textContent.trim();
		if (text) options.push(text);
	}
	return JSON.stringify({ text: body ? body.textContent.trim() : '', options: options });
})"#;

/// Same as the radio variant but for checkbox labels.
pub const READ_CHECKBOX_QUESTION: &str = r#"((doc, win) => {
	const body = doc.querySelector('div.qst_txt');
	const options = [];
	for (const lbl of doc.querySelectorAll('input.ans_chk[type="checkbox"] + label, label.ans_lbl')) {
		const text = lbl.textContent.trim();
		if (text) options.push(text);
	}
	return JSON.stringify({ text: body ? body.textContent.trim() : '', options: options });
})"#;

/// Option display texts of `select#ans_1`, 1-indexed, skipping the
/// placeholder at index 0. JSON string array.
pub const READ_DROPDOWN_OPTIONS: &str = r#"((doc, win) => {
	const sel = doc.querySelector('select#ans_1');
	if (!sel) return JSON.stringify([]);
	const options = [];
	for (let i = 1; i < sel.options.length; i++) {
		options.push(sel.options[i].textContent.trim());
	}
	return JSON.stringify(options);
})"#;

/// Question body text alone (used on the dropdown path after the option read).
pub const READ_QUESTION_TEXT: &str = r#"((doc, win) => {
	const body = doc.querySelector('div.qst_txt');
	return body ? body.textContent.trim() : '';
})"#;

// ---- answer submission ----

pub fn click_radio(index0: usize) -> String {
	format!(
		r#"((doc, win) => {{
			const inputs = doc.querySelectorAll('input.ans_rdo[type="radio"]');
			if (inputs.length <= {index0}) return false;
			inputs[{index0}].click();
			if (typeof win.answer_click === 'function') win.answer_click();
			return true;
		}})"#
	)
}

pub fn click_checkbox(index0: usize) -> String {
	format!(
		r#"((doc, win) => {{
			const inputs = doc.querySelectorAll('input.ans_chk[type="checkbox"]');
			if (inputs.length <= {index0}) return false;
			inputs[{index0}].click();
			if (typeof win.answer_click === 'function') win.answer_click();
			return true;
		}})"#
	)
}

/// Set the `position`-th select (1-based) to the chosen option index and fire
/// the page's answer-changed hook so its internal state follows.
pub fn set_dropdown(position: usize, choice: usize) -> String {
	format!(
		r#"((doc, win) => {{
			const sel = doc.querySelector('select#ans_{position}');
			if (!sel || sel.options.length <= {choice}) return false;
			sel.selectedIndex = {choice};
			sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
			if (typeof win.ans_change === 'function') win.ans_change({position});
			return true;
		}})"#
	)
}

/// Whether the go-forward affordance in the control frame is usable.
pub const FORWARD_ENABLED: &str = r#"((doc, win) => {
	const btn = doc.getElementById('btn_forward');
	return !!btn && !btn.disabled && !btn.classList.contains('disabled');
})"#;

pub const CLICK_FORWARD: &str = r#"((doc, win) => {
	if (typeof win.go_forward === 'function') { win.go_forward(); return true; }
	const btn = doc.getElementById('btn_forward');
	if (!btn) return false;
	btn.click();
	return true;
})"#;

/// The finalize action pops a confirm dialog; pre-accept it in the top frame.
pub const OVERRIDE_CONFIRM: &str = r#"((doc, win) => {
	win.confirm = () => true;
	return true;
})"#;

pub const CLICK_MARK: &str = r#"((doc, win) => {
	if (typeof win.mark_exec === 'function') { win.mark_exec(); return true; }
	const btn = doc.getElementById('btn_mark');
	if (!btn) return false;
	btn.click();
	return true;
})"#;

/// Escape an arbitrary string into a JS string literal.
fn js_str(s: &str) -> String {
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strings_are_escaped_into_literals() {
		let script = click_subject("情報\"リテラシー\"");
		assert!(script.contains(r#""情報\"リテラシー\"""#));
	}

	#[test]
	fn builders_inline_indices() {
		assert!(click_radio(1).contains("inputs[1]"));
		assert!(set_dropdown(2, 3).contains("select#ans_2"));
		assert!(set_dropdown(2, 3).contains("selectedIndex = 3"));
	}
}
