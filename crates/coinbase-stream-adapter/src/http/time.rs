/*
[INPUT]:  Public server time endpoint
[OUTPUT]: Server time and local clock skew used to stamp signed frames
[POS]:    HTTP layer - authentication material for stream subscriptions
[UPDATE]: When the time endpoint or skew calculation changes
*/

use chrono::Utc;
use reqwest::Method;

use crate::error::Result;
use crate::http::RestClient;
use crate::types::ServerTime;

impl RestClient {
    /// Get the exchange server time
    ///
    /// GET /brokerage/time
    pub async fn get_server_time(&self) -> Result<ServerTime> {
        let builder = self.request(Method::GET, "brokerage/time")?;
        self.send_json(builder).await
    }

    /// Seconds to add to the local clock to match the server clock
    pub async fn clock_skew(&self) -> Result<i64> {
        let server = self.get_server_time().await?;
        Ok(server.epoch_seconds - Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CoinbaseError;
    use crate::http::{ClientConfig, RestClient};
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_server_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brokerage/time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "iso": "2024-01-01T00:00:00Z",
                "epochSeconds": "1704067200",
                "epochMillis": "1704067200000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
            .expect("client init");
        let time = client.get_server_time().await.expect("server time");

        assert_eq!(time.epoch_seconds, 1_704_067_200);
    }

    #[tokio::test]
    async fn test_clock_skew_against_future_server() {
        let server = MockServer::start().await;
        let ahead = Utc::now().timestamp() + 120;
        Mock::given(method("GET"))
            .and(path("/brokerage/time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "iso": Utc::now().to_rfc3339(),
                "epochSeconds": ahead.to_string(),
            })))
            .mount(&server)
            .await;

        let client = RestClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
            .expect("client init");
        let skew = client.clock_skew().await.expect("clock skew");

        assert!((118..=120).contains(&skew), "unexpected skew {skew}");
    }

    #[tokio::test]
    async fn test_non_success_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/brokerage/time"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({"message": "maintenance"})),
            )
            .mount(&server)
            .await;

        let client = RestClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
            .expect("client init");

        match client.get_server_time().await {
            Err(CoinbaseError::Api { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
