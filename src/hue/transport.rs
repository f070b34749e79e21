use std::{error::Error as StdError, future::Future, time::Duration};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,

    pub body: Vec<u8>,
}

/// The request never produced a response (connection refused, timeout, ...).
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransportError(Box<dyn StdError + Send + Sync>);

impl TransportError {
    pub fn new(source: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }
}

pub trait HttpTransport {
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl HttpTransport for reqwest::Client {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = reqwest::Client::get(self, url)
            .send()
            .await
            .map_err(TransportError::new)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(TransportError::new)?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

pub fn new_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
