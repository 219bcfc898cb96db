//! Validator snapshots from the beacon node's REST API.

use crate::RpcError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;
use zond_mirror_types::{Validator, ValidatorSnapshot, unix_now};

/// Path of the paginated validator listing.
const VALIDATORS_PATH: &str = "zond/v1alpha1/validators";

/// Pages fetched per snapshot.
const DEFAULT_MAX_PAGES: usize = 3;

/// A page of the validator listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconValidatorsPage {
    /// Epoch of the listing.
    #[serde(default)]
    pub epoch: String,
    /// Validators on this page.
    #[serde(default)]
    pub validator_list: Vec<BeaconValidatorEntry>,
    /// Token of the next page, empty on the last page.
    #[serde(default)]
    pub next_page_token: String,
    /// Total validator count.
    #[serde(default)]
    pub total_size: u64,
}

/// One entry of [`BeaconValidatorsPage`].
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconValidatorEntry {
    /// Decimal validator index.
    pub index: String,
    /// Validator details.
    pub validator: BeaconValidatorDetails,
}

/// Validator details as reported by the beacon API. Numbers are decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconValidatorDetails {
    /// Public key.
    pub public_key: String,
    /// Effective balance.
    #[serde(default)]
    pub effective_balance: String,
    /// Slashed flag.
    #[serde(default)]
    pub slashed: bool,
    /// Activation epoch.
    #[serde(default)]
    pub activation_epoch: String,
    /// Exit epoch.
    #[serde(default)]
    pub exit_epoch: String,
}

impl BeaconValidatorEntry {
    /// Converts into a [`Validator`], `None` if the index is not a number.
    pub fn into_validator(self) -> Option<Validator> {
        let parse = |s: &str| s.parse::<u64>().unwrap_or_default();
        let index = self.index.parse::<u64>().ok()?;
        Some(Validator {
            index,
            public_key: self.validator.public_key,
            effective_balance: parse(&self.validator.effective_balance),
            slashed: self.validator.slashed,
            activation_epoch: parse(&self.validator.activation_epoch),
            exit_epoch: self.validator.exit_epoch.parse().unwrap_or(u64::MAX),
        })
    }
}

/// Client for the beacon node's validator listing.
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: reqwest::Client,
    endpoint: Url,
    max_pages: usize,
}

impl BeaconClient {
    /// Creates a client for the beacon API rooted at `base`.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, RpcError> {
        let endpoint = base
            .join(VALIDATORS_PATH)
            .map_err(|err| RpcError::Transport(format!("invalid beacon url: {err}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint, max_pages: DEFAULT_MAX_PAGES })
    }

    /// Fetches up to `max_pages` pages of validators into one snapshot.
    ///
    /// Entries with an unparseable index are skipped. A failure after the first page
    /// returns what was collected so far.
    pub async fn validators(&self) -> Result<ValidatorSnapshot, RpcError> {
        let mut snapshot = ValidatorSnapshot { updated_at: unix_now(), ..Default::default() };
        let mut page_token = String::new();

        for page_number in 0..self.max_pages {
            let mut url = self.endpoint.clone();
            if !page_token.is_empty() {
                url.query_pairs_mut().append_pair("page_token", &page_token);
            }

            let page = match self.fetch_page(url).await {
                Ok(page) => page,
                Err(err) if page_number > 0 => {
                    warn!(target: "mirror::rpc", %err, page_number, "Validator page fetch failed, keeping partial snapshot");
                    break;
                }
                Err(err) => return Err(err),
            };

            if page_number == 0 {
                snapshot.epoch = page.epoch.parse().unwrap_or_default();
                snapshot.total_size = page.total_size;
            }
            let before = snapshot.validators.len();
            snapshot
                .validators
                .extend(page.validator_list.into_iter().filter_map(BeaconValidatorEntry::into_validator));
            debug!(
                target: "mirror::rpc",
                page_number,
                validators = snapshot.validators.len() - before,
                "Fetched validator page"
            );

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        Ok(snapshot)
    }

    async fn fetch_page(&self, url: Url) -> Result<BeaconValidatorsPage, RpcError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::HttpStatus(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
