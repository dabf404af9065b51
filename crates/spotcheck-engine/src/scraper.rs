//! HTTP scraper for LRS bill pages.

use std::time::Duration;

use spotcheck_core::{BoxError, key::ContentKey, service::Scraper};
use tracing::debug;

use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LrsScraper {
  client:       reqwest::Client,
  url_template: String,
}

impl LrsScraper {
  /// `url_template` carries `{printNo}` and `{session}` placeholders.
  pub fn new(url_template: impl Into<String>) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, url_template: url_template.into() })
  }

  /// The page URL for the base bill of `key`.
  pub fn url_for(&self, key: &ContentKey) -> Result<String> {
    let bill = key.base_bill_id().ok_or_else(|| Error::NotABill(key.clone()))?;
    Ok(
      self
        .url_template
        .replace("{printNo}", &bill.print_no)
        .replace("{session}", &bill.session.to_string()),
    )
  }

  async fn get(&self, key: &ContentKey) -> Result<Vec<u8>> {
    let url = self.url_for(key)?;
    debug!(%key, %url, "fetching reference page");
    let resp = self.client.get(&url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
  }
}

impl Scraper for LrsScraper {
  async fn fetch<'a>(&'a self, key: &'a ContentKey) -> Result<Vec<u8>, BoxError> {
    Ok(self.get(key).await?)
  }
}
