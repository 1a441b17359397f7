use std::{fs::File, path::PathBuf, sync::Arc, time::Duration};

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::Result;
use elcampus_headless::{
	TestOutcome,
	config::{AppConfig, Mode},
	driver::{self, ChromePage, Frame, PageDriver},
	login,
	oracle::{self, AnswerOracle},
	scripts, session,
	subject::{self, RunReport, SubjectRunner},
};
use futures::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Debug, Parser)]
#[command(name = "elcampus_headless")]
#[command(about = "Automated elCampus lesson processing", long_about = None)]
struct Args {
	/// Path to the TOML config file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Run with a visible browser window (non-headless mode)
	#[arg(long)]
	visible: bool,

	/// Override the configured mode
	#[arg(short, long)]
	mode: Option<Mode>,

	/// Process only this subject, ignoring the rest of the configured list
	#[arg(short, long)]
	subject: Option<String>,

	/// Log in, print the subject names available on the portal, and exit
	#[arg(long)]
	list_subjects: bool,
}

fn init_logging() -> Result<()> {
	let filename = format!("elcampus_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
	let file = Arc::new(File::create(&filename)?);

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
		.init();
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	init_logging()?;

	let mut config = match AppConfig::load(&args.config) {
		Ok(config) => config,
		Err(e) => {
			error!("could not load config from {}: {e:#}", args.config.display());
			std::process::exit(1);
		}
	};
	if args.visible {
		config.visible = true;
	}
	if let Some(mode) = args.mode {
		config.mode = mode;
	}
	if let Some(only) = &args.subject {
		config.subjects.retain(|s| s == only);
	}
	if args.list_subjects {
		// Discovery only needs credentials; the usual subject/API-key
		// requirements do not apply.
		if config.username.is_empty() || config.password.is_empty() {
			error!("username and password must be set in the config file");
			std::process::exit(1);
		}
	} else if let Err(e) = config.validate() {
		error!("invalid config: {e:#}");
		std::process::exit(1);
	}

	if !args.list_subjects {
		info!("mode: {:?}, {} subject(s)", config.mode, config.subjects.len());
	}

	let browser_config = if config.visible {
		BrowserConfig::builder().with_head().build()
	} else {
		BrowserConfig::builder().build()
	}
	.map_err(|e| color_eyre::eyre::eyre!("Failed to build browser config: {}", e))?;

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| color_eyre::eyre::eyre!("Failed to launch browser: {}", e))?;

	// Drain browser events so the connection never stalls.
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| color_eyre::eyre::eyre!("Failed to create new page: {}", e))?;
	let mut page = ChromePage::new(page);

	login::login(&mut page, &config).await?;

	if args.list_subjects {
		let names = subject::list_subject_names(&mut page, &config).await?;
		info!("{} subject(s) available; config subjects must match these exactly:", names.len());
		for name in &names {
			println!("{name}");
		}
		if let Err(e) = browser.close().await {
			warn!("failed to close browser: {e}");
		}
		handle.abort();
		return Ok(());
	}

	let mut report = RunReport::default();
	let mut quota_hit = false;

	for (i, name) in config.subjects.iter().enumerate() {
		if i > 0 {
			if let Err(e) = subject::goto_home(&mut page, &config).await {
				warn!("could not return to the home page: {e:#}");
				break;
			}
		}

		info!("==== subject: {name} ====");
		if let Err(e) = subject::open_subject(&mut page, name, &config).await {
			warn!("{name}: could not open subject: {e:#}");
			continue;
		}
		if let Err(e) = subject::expand_lesson_blocks(&mut page, &config).await {
			warn!("{name}: could not expand lesson blocks: {e:#}");
			continue;
		}

		match config.mode {
			Mode::Video => match subject::watch_videos(&mut page, &browser, &config).await {
				Ok(watched) => info!("{name}: watched {watched} video(s)"),
				Err(e) => warn!("{name}: video processing aborted: {e:#}"),
			},
			Mode::Test => {
				let oracle = oracle::GeminiOracle::new(&config.gemini_api_key, &config.gemini_model);
				let mut runner = SubjectRunner::new(name.clone());
				match run_subject_tests(&mut page, &browser, &config, &oracle, &mut runner).await {
					Ok(processed) => {
						report.record(name, processed, &runner.ledger);
						info!("{name}: completed {processed} test(s)");
					}
					Err(quota) => {
						report.record(name, 0, &runner.ledger);
						error!("{quota}, stopping the whole run");
						quota_hit = true;
					}
				}
			}
		}

		if quota_hit {
			break;
		}
	}

	report.log_summary();

	// Give the portal a moment to persist the last submission.
	tokio::time::sleep(Duration::from_secs(3)).await;
	if let Err(e) = browser.close().await {
		warn!("failed to close browser: {e}");
	}
	handle.abort();

	if quota_hit {
		std::process::exit(2);
	}
	Ok(())
}

/// Runs one subject's pending tests. The closure handed to the runner opens a
/// test in its popup, walks its questions, and always closes the popup before
/// reporting the outcome. Popup failures count as a failed test rather than
/// aborting the subject.
async fn run_subject_tests<O: AnswerOracle>(page: &mut ChromePage, browser: &Browser, config: &AppConfig, oracle: &O, runner: &mut SubjectRunner) -> Result<u32, oracle::QuotaExhausted> {
	let subject_name = runner.subject().to_string();
	// The runner keeps scanning through `page`; the closure drives the same
	// browser tab through its own handle, since Page is a cheap Arc clone.
	let main_page = page.page().clone();

	let open_and_run = async |title: &str| -> Result<TestOutcome, oracle::QuotaExhausted> {
		let mut main = ChromePage::new(main_page.clone());
		match open_test_popup(&mut main, browser, config, title).await {
			Ok(mut popup) => {
				let outcome = session::run_test(&mut popup, oracle).await;
				driver::close_popup(popup.into_page()).await;
				// Let the lesson list refresh its status icons.
				main.settle(Duration::from_secs(config.page_wait_secs)).await;
				outcome
			}
			Err(e) => {
				warn!("{subject_name}: could not open \"{title}\": {e:#}");
				Ok(TestOutcome::Failed)
			}
		}
	};

	runner.process_tests(page, config, open_and_run).await
}

async fn open_test_popup(main: &mut ChromePage, browser: &Browser, config: &AppConfig, title: &str) -> Result<ChromePage> {
	let clicked = main.eval(Frame::Top, &scripts::click_test(title)).await?;
	if clicked.as_bool() != Some(true) {
		color_eyre::eyre::bail!("test link \"{title}\" not found");
	}
	main.settle(Duration::from_secs(config.page_wait_secs)).await;
	let popup = driver::find_popup(browser, main.page()).await?;
	let mut popup = ChromePage::new(popup);
	popup.settle(Duration::from_secs(config.page_wait_secs)).await;
	Ok(popup)
}
