use std::time::Duration;

use color_eyre::{Result, eyre::WrapErr as _};
use tracing::info;

use crate::{
	config::AppConfig,
	driver::{Frame, PageDriver},
	scripts,
};

/// Log into the portal with the configured credentials and wait for the home
/// page's subject list to appear.
pub async fn login<D: PageDriver>(page: &mut D, config: &AppConfig) -> Result<()> {
	page.goto(&config.base_url).await?;
	page.wait_until(Frame::Top, scripts::PRESENT_LOGIN_FORM, Duration::from_secs(config.ready_timeout_secs))
		.await
		.wrap_err("login form did not appear")?;

	page.eval(Frame::Top, &scripts::fill_login(&config.username, &config.password)).await?;
	page.eval(Frame::Top, scripts::CLICK_LOGIN).await?;
	page.settle(Duration::from_secs(config.page_wait_secs)).await;

	page.wait_until(Frame::Top, scripts::PRESENT_SUBJECT_LIST, Duration::from_secs(config.ready_timeout_secs))
		.await
		.wrap_err("login failed, subject list never appeared (check the configured credentials)")?;

	info!("logged in as {}", config.username);
	Ok(())
}
