//! HTTP client for the portal REST API.

use std::time::Duration;

use budgetdesk_core::BudgetRequestId;
use budgetdesk_platform_access::{TokenStore, UserProfile};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::ApiError;
use crate::types::{
    BudgetRequest, BudgetRequestUpdate, CatalogEntry, CatalogKind, EmailMessage, ImportSummary,
    Listing, NewBudgetRequest, RequestFilter, ReviewBody, ReviewDecision,
};

const REQUESTS_PATH: &str = "api/solicitudes-presupuesto";
const USER_PATH: &str = "api/user";
const EMAIL_PATH: &str = "api/emails/send";

/// Client for the portal API.
///
/// The bearer token is read from the token store on every call, so a login
/// completed elsewhere in the process is picked up without rebuilding the
/// client.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: Url,
    store: TokenStore,
}

impl PortalClient {
    /// Creates a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        store: TokenStore,
        timeout: Duration,
    ) -> Result<Self, Report<ApiError>> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            store,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches the signed-in user's profile.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<UserProfile, Report<ApiError>> {
        let url = self.url(USER_PATH)?;
        let response = self.send(self.http.get(url)).await?;
        json(response).await
    }

    /// Lists budget requests matching `filter`.
    #[instrument(skip(self))]
    pub async fn list_budget_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<BudgetRequest>, Report<ApiError>> {
        let mut url = self.url(REQUESTS_PATH)?;
        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        let response = self.send(self.http.get(url)).await?;
        let requests = json::<Listing<BudgetRequest>>(response).await?.into_vec();
        debug!(count = requests.len(), "listed budget requests");
        Ok(requests)
    }

    /// Fetches one budget request.
    #[instrument(skip(self))]
    pub async fn get_budget_request(
        &self,
        id: BudgetRequestId,
    ) -> Result<BudgetRequest, Report<ApiError>> {
        let url = self.url(&format!("{REQUESTS_PATH}/{id}"))?;
        let response = self.send(self.http.get(url)).await?;
        json(response).await
    }

    /// Submits a new budget request.
    #[instrument(skip_all)]
    pub async fn create_budget_request(
        &self,
        request: &NewBudgetRequest,
    ) -> Result<BudgetRequest, Report<ApiError>> {
        let url = self.url(REQUESTS_PATH)?;
        let response = self.send(self.http.post(url).json(request)).await?;
        let created: BudgetRequest = json(response).await?;
        info!(id = %created.id, "budget request created");
        Ok(created)
    }

    /// Updates fields of an existing budget request.
    #[instrument(skip(self, update))]
    pub async fn update_budget_request(
        &self,
        id: BudgetRequestId,
        update: &BudgetRequestUpdate,
    ) -> Result<BudgetRequest, Report<ApiError>> {
        let url = self.url(&format!("{REQUESTS_PATH}/{id}"))?;
        let response = self.send(self.http.put(url).json(update)).await?;
        json(response).await
    }

    /// Approves or rejects a budget request.
    #[instrument(skip(self, comment))]
    pub async fn review_budget_request(
        &self,
        id: BudgetRequestId,
        decision: ReviewDecision,
        comment: Option<&str>,
    ) -> Result<BudgetRequest, Report<ApiError>> {
        let url = self.url(&format!("{REQUESTS_PATH}/{id}/estado"))?;
        let body = ReviewBody {
            status: decision.status(),
            comment,
        };
        let response = self.send(self.http.put(url).json(&body)).await?;
        let reviewed: BudgetRequest = json(response).await?;
        info!(%id, status = %reviewed.status, "budget request reviewed");
        Ok(reviewed)
    }

    /// Lists the entries of a reference catalog.
    #[instrument(skip(self))]
    pub async fn list_catalog(
        &self,
        kind: CatalogKind,
    ) -> Result<Vec<CatalogEntry>, Report<ApiError>> {
        let url = self.url(&format!("api/{}", kind.path_segment()))?;
        let response = self.send(self.http.get(url)).await?;
        Ok(json::<Listing<CatalogEntry>>(response).await?.into_vec())
    }

    /// Uploads a CSV file into a reference catalog.
    #[instrument(skip(self, contents), fields(bytes = contents.len()))]
    pub async fn import_catalog_csv(
        &self,
        kind: CatalogKind,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<ImportSummary, Report<ApiError>> {
        let url = self.url(&format!("api/{}/import-csv", kind.path_segment()))?;
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| ApiError::InvalidRequest {
                details: format!("invalid upload part: {e}"),
            })?;
        let form = Form::new().part("file", part);

        let response = self.send(self.http.post(url).multipart(form)).await?;
        let summary: ImportSummary = json(response).await?;
        if summary.is_clean() {
            info!(catalog = %kind, imported = summary.imported, "catalog imported");
        } else {
            warn!(
                catalog = %kind,
                imported = summary.imported,
                skipped = summary.skipped,
                "catalog imported with rejected rows"
            );
        }
        Ok(summary)
    }

    /// Sends a notification email through the portal.
    #[instrument(skip_all, fields(recipients = message.to.len()))]
    pub async fn send_email(&self, message: &EmailMessage) -> Result<(), Report<ApiError>> {
        let url = self.url(EMAIL_PATH)?;
        self.send(self.http.post(url).json(message)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, Report<ApiError>> {
        self.base_url.join(path).map_err(|e| {
            ApiError::InvalidRequest {
                details: format!("{path}: {e}"),
            }
            .into()
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Report<ApiError>> {
        let token = self.store.bearer_token().ok_or(ApiError::NotAuthenticated)?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Network {
                details: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::NotAuthenticated.into());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T, Report<ApiError>> {
    let bytes = response.bytes().await.map_err(|e| ApiError::Network {
        details: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ApiError::Malformed {
            details: e.to_string(),
        }
        .into()
    })
}

/// Keeps the last path segment of the base URL when joining relative paths.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
