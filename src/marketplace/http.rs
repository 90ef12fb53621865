//! `reqwest` client for the marketplace pricing gateway.
//!
//! Endpoints (JSON):
//!
//! | Method | Path                                   | Purpose                    |
//! |--------|----------------------------------------|----------------------------|
//! | GET    | `/v1/pricing/competitive?asins=A,B`    | competitive pricing batch  |
//! | GET    | `/v1/catalog/classification/{sku}`     | listing classification     |
//! | POST   | `/v1/feeds/price`                      | submit a price feed        |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{FeedAck, FeedError, FeedFailureKind, FeedPriceUpdate, ProviderError};
use crate::domain::{Classification, PricingSnapshot};
use crate::ports::{CatalogLookup, FeedSubmitter, PricingProvider};

/// Seller account credentials for the pricing gateway.
#[derive(Clone)]
pub struct MarketplaceCredentials {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token for the seller account.
    pub refresh_token: String,
    /// Seller account identifier, when the gateway needs it.
    pub seller_id: Option<String>,
}

impl fmt::Debug for MarketplaceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("seller_id", &self.seller_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CompetitivePricingResponse {
    #[serde(default)]
    snapshots: Vec<PricingSnapshot>,
}

#[derive(Debug, Serialize)]
struct PriceFeedBody<'a> {
    sku: &'a str,
    asin: &'a str,
    price: rust_decimal::Decimal,
    previous_price: Option<rust_decimal::Decimal>,
    product_type: &'a str,
    marketplace_id: &'a str,
    seller_id: Option<&'a str>,
}

/// HTTP implementation of [`PricingProvider`], [`CatalogLookup`] and
/// [`FeedSubmitter`].
///
/// Timeouts are enforced by the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpMarketplaceClient {
    http: reqwest::Client,
    base_url: String,
    marketplace_id: String,
    credentials: Option<MarketplaceCredentials>,
}

impl HttpMarketplaceClient {
    /// Builds a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error if the TLS backend cannot be
    /// initialized.
    pub fn new(
        base_url: &str,
        marketplace_id: &str,
        credentials: Option<MarketplaceCredentials>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("buybox-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            marketplace_id: marketplace_id.to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Classification endpoint for `sku`, with the SKU percent-encoded as a
    /// single path segment.
    fn classification_url(&self, sku: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Upstream(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::Upstream("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "catalog", "classification", sku]);
        Ok(url)
    }

    fn authorized(
        &self,
        request: RequestBuilder,
    ) -> Option<(RequestBuilder, &MarketplaceCredentials)> {
        let creds = self.credentials.as_ref()?;
        let mut request = request
            .bearer_auth(&creds.refresh_token)
            .header("x-client-id", &creds.client_id);
        if let Some(seller_id) = &creds.seller_id {
            request = request.header("x-seller-id", seller_id);
        }
        Some((request, creds))
    }
}

#[async_trait]
impl PricingProvider for HttpMarketplaceClient {
    async fn fetch_batch(&self, asins: &[String]) -> Result<Vec<PricingSnapshot>, ProviderError> {
        if asins.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.http.get(self.url("/v1/pricing/competitive")).query(&[
            ("asins", asins.join(",")),
            ("marketplaceId", self.marketplace_id.clone()),
        ]);
        let Some((request, _)) = self.authorized(request) else {
            return Err(ProviderError::Upstream(
                "marketplace credentials are not configured".to_string(),
            ));
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("status {status}: {text}")));
        }

        let body: CompetitivePricingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        if body.snapshots.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(body.snapshots)
    }
}

#[async_trait]
impl CatalogLookup for HttpMarketplaceClient {
    async fn get_classification(&self, sku: &str) -> Result<Option<Classification>, ProviderError> {
        let request = self
            .http
            .get(self.classification_url(sku)?)
            .query(&[("marketplaceId", self.marketplace_id.as_str())]);
        let Some((request, _)) = self.authorized(request) else {
            return Err(ProviderError::Upstream(
                "marketplace credentials are not configured".to_string(),
            ));
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Classification>()
                .await
                .map(Some)
                .map_err(|e| ProviderError::Decode(e.to_string())),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(ProviderError::Upstream(format!("status {status}: {text}")))
            }
        }
    }
}

#[async_trait]
impl FeedSubmitter for HttpMarketplaceClient {
    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn submit(&self, update: &FeedPriceUpdate) -> Result<FeedAck, FeedError> {
        let request = self.http.post(self.url("/v1/feeds/price"));
        let Some((request, creds)) = self.authorized(request) else {
            return Err(FeedError::new(
                FeedFailureKind::MissingCredentials,
                "marketplace credentials are not configured",
            ));
        };

        let body = PriceFeedBody {
            sku: &update.sku,
            asin: &update.asin,
            price: update.price,
            previous_price: update.previous_price,
            product_type: &update.classification.product_type,
            marketplace_id: &update.classification.marketplace_id,
            seller_id: creds.seller_id.as_deref(),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| FeedError::new(FeedFailureKind::UnknownUpstream, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FeedError::new(
                FeedFailureKind::from_status(status.as_u16()),
                format!("status {status}: {text}"),
            ));
        }

        // Acceptance without a body still counts as an acknowledgment.
        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(FeedAck::default());
        }
        serde_json::from_str(&text).map_err(|e| {
            FeedError::new(
                FeedFailureKind::UnknownUpstream,
                format!("unreadable feed acknowledgment: {e}"),
            )
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn client(credentials: Option<MarketplaceCredentials>) -> Option<HttpMarketplaceClient> {
        HttpMarketplaceClient::new(
            "http://127.0.0.1:9/",
            "A1F83G8C2ARO7P",
            credentials,
            Duration::from_secs(1),
        )
        .ok()
    }

    fn credentials() -> MarketplaceCredentials {
        MarketplaceCredentials {
            client_id: "amzn1.client".to_string(),
            client_secret: "top-secret".to_string(),
            refresh_token: "Atzr|token".to_string(),
            seller_id: Some("A2SELLER".to_string()),
        }
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("amzn1.client"));
        assert!(!rendered.contains("top-secret"));
        assert!(!rendered.contains("Atzr|token"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let Some(client) = client(None) else {
            return;
        };
        assert_eq!(client.url("/v1/feeds/price"), "http://127.0.0.1:9/v1/feeds/price");
    }

    #[test]
    fn classification_sku_is_one_encoded_segment() {
        let Some(client) = client(None) else {
            return;
        };
        let Ok(url) = client.classification_url("A/B?c#d") else {
            panic!("url should build");
        };
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/v1/catalog/classification/A%2FB%3Fc%23d"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn classification_url_keeps_base_path_prefix() {
        let Ok(client) = HttpMarketplaceClient::new(
            "https://gateway.example.com/pricing/",
            "A1F83G8C2ARO7P",
            None,
            Duration::from_secs(1),
        ) else {
            return;
        };
        let Ok(url) = client.classification_url("SKU 1") else {
            panic!("url should build");
        };
        assert_eq!(
            url.as_str(),
            "https://gateway.example.com/pricing/v1/catalog/classification/SKU%201"
        );
    }

    #[tokio::test]
    async fn submit_without_credentials_is_categorized() {
        let Some(client) = client(None) else {
            return;
        };
        assert!(!client.is_configured());

        let update = FeedPriceUpdate {
            sku: "SKU-1".to_string(),
            asin: "B000TEST01".to_string(),
            price: Decimal::new(1299, 2),
            previous_price: None,
            classification: Classification {
                product_type: "HOME".to_string(),
                marketplace_id: "A1F83G8C2ARO7P".to_string(),
            },
        };
        let result = client.submit(&update).await;
        let Err(err) = result else {
            unreachable!("submission without credentials cannot succeed");
        };
        assert_eq!(err.kind, FeedFailureKind::MissingCredentials);
    }

    #[tokio::test]
    async fn empty_asin_list_skips_the_request() {
        let Some(client) = client(Some(credentials())) else {
            return;
        };
        assert!(client.is_configured());
        assert_eq!(client.fetch_batch(&[]).await, Ok(Vec::new()));
    }
}
