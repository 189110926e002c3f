use std::{fmt, future::Future, str::FromStr};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interval::week::DateWindow;

/// Root of CENACE's public SW-PML web service.
pub const SWPML_ROOT: &str = "https://ws01.cenace.gob.mx:8082/SWPML/SIM";

#[derive(Error, Debug)]
pub enum PmlError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("malformed response for nodes {nodes}, window {window}: {source}")]
    Malformed {
        nodes: String,
        window: DateWindow,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetch task for nodes {nodes} did not complete: {message}")]
    Task { nodes: String, message: String },
    #[error("invalid node catalog: {0}")]
    Catalog(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

/// The HTTP GET the downloader needs.  Implemented for [`reqwest::Client`];
/// tests plug in canned replies.
pub trait PmlTransport: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<Reply, PmlError>> + Send;
}

impl PmlTransport for reqwest::Client {
    async fn get(&self, url: &str) -> Result<Reply, PmlError> {
        let transport = |e: reqwest::Error| PmlError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        };
        let response = reqwest::Client::get(self, url)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        Ok(Reply { status, body })
    }
}

/// Electrical system of the Mexican grid.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum System {
    /// Sistema Interconectado Nacional
    #[default]
    Sin,
    /// Baja California
    Bca,
    /// Baja California Sur
    Bcs,
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            System::Sin => write!(f, "SIN"),
            System::Bca => write!(f, "BCA"),
            System::Bcs => write!(f, "BCS"),
        }
    }
}

impl FromStr for System {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SIN" => Ok(System::Sin),
            "BCA" => Ok(System::Bca),
            "BCS" => Ok(System::Bcs),
            _ => Err(format!("Failed parsing {} as a system", s)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Market {
    /// Mercado del Dia en Adelanto (day-ahead)
    #[default]
    Mda,
    /// Mercado de Tiempo Real (real-time)
    Mtr,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Market::Mda => write!(f, "MDA"),
            Market::Mtr => write!(f, "MTR"),
        }
    }
}

impl FromStr for Market {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MDA" => Ok(Market::Mda),
            "MTR" => Ok(Market::Mtr),
            _ => Err(format!("Failed parsing {} as a market", s)),
        }
    }
}

/// Service url for one system and market, e.g.
/// `https://ws01.cenace.gob.mx:8082/SWPML/SIM/SIN/MDA`
pub fn base_url(root: &str, system: System, market: Market) -> String {
    format!("{}/{}/{}", root.trim_end_matches('/'), system, market)
}
