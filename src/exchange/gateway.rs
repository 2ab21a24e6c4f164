//! HTTP client for an exchange gateway speaking JSON.
//!
//! The gateway owns venue signing; this client only maps the [`Exchange`]
//! capability onto REST routes.

use super::{Exchange, ExchangeError};
use crate::domain::{AccountTrade, Balance, Kline, OrderAck, Position, PositionSide};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GatewayExchange {
    client: Client,
    base_url: String,
    max_retry_elapsed: Duration,
}

impl GatewayExchange {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retry_elapsed: Duration::from_secs(30),
        }
    }

    /// Cap the total time spent retrying a read.
    pub fn with_max_retry_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_retry_elapsed = elapsed;
        self
    }

    /// Idempotent read, retried on network errors, 429 and 5xx.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ExchangeError::NetworkError(e.to_string())))?;

            let response = check_status(response).await.map_err(|e| match e {
                ExchangeError::RateLimited | ExchangeError::HttpError { status: 500..=599, .. } => {
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })?;

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(ExchangeError::ParseError(e.to_string())))
        })
        .await
    }

    /// Single-shot write. Orders are not idempotent and never retried.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ExchangeError::ParseError(e.to_string()))
    }

    async fn place_order(
        &self,
        action: &str,
        symbol: &str,
        quantity: f64,
        leverage: Option<u32>,
    ) -> Result<OrderAck, ExchangeError> {
        let client_order_id = Uuid::new_v4().to_string();
        debug!(
            "Placing {} order symbol={} qty={} leverage={:?} client_order_id={}",
            action, symbol, quantity, leverage, client_order_id
        );
        let payload = serde_json::json!({
            "clientOrderId": client_order_id,
            "symbol": symbol,
            "action": action,
            "quantity": quantity,
            "leverage": leverage,
        });
        self.post_json("/orders", payload).await
    }

    async fn place_trigger(
        &self,
        kind: &str,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError> {
        let payload = serde_json::json!({
            "clientOrderId": Uuid::new_v4().to_string(),
            "symbol": symbol,
            "positionSide": side,
            "quantity": quantity,
            "triggerPrice": price,
        });
        let _: serde_json::Value = self.post_json(&format!("/orders/{}", kind), payload).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ExchangeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        return Err(ExchangeError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(ExchangeError::HttpError {
            status: status.as_u16(),
            message: body,
        });
    }
    if status.as_u16() == 400 || status.as_u16() == 422 {
        return Err(ExchangeError::Rejected(body));
    }
    Err(ExchangeError::HttpError {
        status: status.as_u16(),
        message: body,
    })
}

#[derive(serde::Deserialize)]
struct PriceResponse {
    price: f64,
}

#[async_trait]
impl Exchange for GatewayExchange {
    async fn get_balance(&self) -> Result<Balance, ExchangeError> {
        self.get_json("/account/balance", &[]).await
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        let positions: Vec<Position> = self.get_json("/account/positions", &[]).await?;
        Ok(positions.into_iter().filter(|p| p.quantity > 0.0).collect())
    }

    async fn open_long(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError> {
        self.place_order("open_long", symbol, quantity, Some(leverage))
            .await
    }

    async fn open_short(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<OrderAck, ExchangeError> {
        self.place_order("open_short", symbol, quantity, Some(leverage))
            .await
    }

    async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.place_order("close_long", symbol, quantity, None).await
    }

    async fn close_short(&self, symbol: &str, quantity: f64) -> Result<OrderAck, ExchangeError> {
        self.place_order("close_short", symbol, quantity, None).await
    }

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError> {
        self.place_trigger("stop_loss", symbol, side, quantity, price)
            .await
    }

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError> {
        self.place_trigger("take_profit", symbol, side, quantity, price)
            .await
    }

    async fn get_market_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let response: PriceResponse = self
            .get_json("/market/price", &[("symbol", symbol.to_string())])
            .await?;
        if !response.price.is_finite() || response.price <= 0.0 {
            warn!("Gateway returned invalid price {} for {}", response.price, symbol);
            return Err(ExchangeError::ParseError(format!(
                "invalid price {} for {}",
                response.price, symbol
            )));
        }
        Ok(response.price)
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let mut klines: Vec<Kline> = self
            .get_json(
                "/market/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        klines.sort_by_key(|k| k.open_time);
        Ok(klines)
    }

    async fn get_account_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AccountTrade>, ExchangeError> {
        self.get_json(
            "/account/trades",
            &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
        )
        .await
    }
}
