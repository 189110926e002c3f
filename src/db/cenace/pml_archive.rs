use std::fs::{self, File};
use std::path::Path;

use futures::StreamExt;
use itertools::Itertools;
use jiff::civil::Date;
use log::{error, info, warn};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::lib_cenace::{PmlError, PmlTransport};
use super::node_table::{chunk_count, node_chunks, unique_nodes, DEFAULT_CHUNK_SIZE};
use crate::interval::week::{week_windows, DateWindow};

/// Upper bound on chunk fetches in flight for the parallel download.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Column names of the csv file, in order.
pub const CSV_HEADER: [&str; 7] = [
    "node_key",
    "date",
    "hour",
    "price",
    "energy_component",
    "loss_component",
    "congestion_component",
];

#[derive(Clone, Debug, PartialEq)]
pub struct PmlConfig {
    /// Service url including system and market, e.g. `.../SWPML/SIM/SIN/MDA`
    pub base_url: String,
    pub years: Vec<i16>,
    pub chunk_size: usize,
    pub pool_size: usize,
}

impl PmlConfig {
    pub fn new(base_url: String, years: Vec<i16>) -> PmlConfig {
        PmlConfig {
            base_url,
            years,
            chunk_size: DEFAULT_CHUNK_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn validate(&self) -> Result<(), PmlError> {
        if self.chunk_size == 0 {
            return Err(PmlError::Config("chunk size must be at least 1".to_string()));
        }
        if self.pool_size == 0 {
            return Err(PmlError::Config("pool size must be at least 1".to_string()));
        }
        if self.years.is_empty() {
            return Err(PmlError::Config("no years requested".to_string()));
        }
        Ok(())
    }
}

/// One hourly price for one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub node_key: String,
    pub date: Date,
    pub hour: u8,
    pub price: Decimal,
    pub energy_component: Decimal,
    pub loss_component: Decimal,
    pub congestion_component: Decimal,
}

/// Outcome of a parallel download.  Chunks in `failures` contributed
/// no rows.
#[derive(Debug, Default)]
pub struct ParallelReport {
    pub rows: Vec<Record>,
    pub failures: Vec<ChunkFailure>,
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub nodes: Vec<String>,
    pub error: PmlError,
}

#[derive(Clone)]
pub struct CenacePmlArchive<T: PmlTransport> {
    pub config: PmlConfig,
    pub transport: T,
}

impl<T: PmlTransport> CenacePmlArchive<T> {
    /// For example
    /// https://ws01.cenace.gob.mx:8082/SWPML/SIM/SIN/MDA/01PLO-115,08SUR-115/2017/01/01/2017/01/07/JSON
    pub fn url(&self, nodes: &[String], window: &DateWindow) -> String {
        format!(
            "{}/{}/{}/JSON",
            self.config.base_url.trim_end_matches('/'),
            nodes.iter().join(","),
            window.url_path()
        )
    }

    /// Get the prices for a group of nodes for one window.  Returns `None`
    /// if the service answers with anything other than 200.
    pub async fn fetch_window(
        &self,
        nodes: &[String],
        window: &DateWindow,
    ) -> Result<Option<Vec<Record>>, PmlError> {
        let reply = self.transport.get(&self.url(nodes, window)).await?;
        if reply.status != StatusCode::OK {
            warn!(
                "Failed to fetch data for {}: HTTP {}",
                window_context(nodes, window),
                reply.status
            );
            return Ok(None);
        }
        let rows = parse_response(&reply.body).map_err(|source| PmlError::Malformed {
            nodes: nodes.iter().join(","),
            window: *window,
            source,
        })?;
        info!(
            "Data fetched successfully for {} ({} rows)",
            window_context(nodes, window),
            rows.len()
        );
        Ok(Some(rows))
    }

    /// Get all the prices for a group of nodes, walking each year
    /// one week at a time.  Windows the service refuses are skipped.
    pub async fn download_nodes(
        &self,
        nodes: &[String],
        years: &[i16],
    ) -> Result<Vec<Record>, PmlError> {
        let mut rows = Vec::new();
        for year in years {
            let windows =
                week_windows(*year).map_err(|e| PmlError::Config(format!("year {}: {}", year, e)))?;
            for window in windows {
                if let Some(data) = self.fetch_window(nodes, &window).await? {
                    rows.extend(data);
                }
            }
        }
        Ok(rows)
    }

    /// Download all the nodes one chunk at a time.  Repeated nodes are
    /// requested once.  The rows of each new chunk go in front of the rows
    /// accumulated so far.  The first error stops the download.
    pub async fn download_all(&self, nodes: &[String]) -> Result<Vec<Record>, PmlError> {
        self.config.validate()?;
        let nodes = unique_nodes(nodes.iter().cloned());
        let total = chunk_count(nodes.len(), self.config.chunk_size);
        let mut table: Vec<Record> = Vec::new();
        for (i, chunk) in node_chunks(&nodes, self.config.chunk_size).enumerate() {
            info!("Processing chunk {} of {}", i + 1, total);
            let mut rows = self.download_nodes(chunk, &self.config.years).await?;
            rows.append(&mut table);
            table = rows;
        }
        Ok(table)
    }
}

impl<T: PmlTransport + Clone + 'static> CenacePmlArchive<T> {
    /// Download the chunks concurrently, at most `pool_size` at a time.
    /// Repeated nodes are requested once.  Rows are merged in completion
    /// order.  A chunk that fails is logged and reported, the other chunks
    /// are not affected.
    pub async fn download_all_parallel(
        &self,
        nodes: &[String],
    ) -> Result<ParallelReport, PmlError> {
        self.config.validate()?;
        let nodes = unique_nodes(nodes.iter().cloned());
        let total = chunk_count(nodes.len(), self.config.chunk_size);
        let tasks = node_chunks(&nodes, self.config.chunk_size).map(|chunk| {
            let chunk = chunk.to_vec();
            let archive = self.clone();
            async move {
                let handle = tokio::spawn({
                    let chunk = chunk.clone();
                    async move {
                        archive
                            .download_nodes(&chunk, &archive.config.years)
                            .await
                    }
                });
                (chunk, handle.await)
            }
        });

        let mut completed = futures::stream::iter(tasks).buffer_unordered(self.config.pool_size);
        let mut report = ParallelReport::default();
        let mut done = 0;
        while let Some((chunk, joined)) = completed.next().await {
            done += 1;
            let outcome = joined.unwrap_or_else(|e| {
                Err(PmlError::Task {
                    nodes: chunk.iter().join(","),
                    message: e.to_string(),
                })
            });
            match outcome {
                Ok(rows) => {
                    info!(
                        "Finished chunk {} of {} with {} rows",
                        done,
                        total,
                        rows.len()
                    );
                    report.rows.extend(rows);
                }
                Err(e) => {
                    error!("Chunk {} failed: {}", chunk.iter().join(","), e);
                    report.failures.push(ChunkFailure {
                        nodes: chunk,
                        error: e,
                    });
                }
            }
        }
        Ok(report)
    }
}

/// Chunk and window a diagnostic refers to, e.g.
/// `nodes 01PLO-115,08SUR-115 in window 2017-01-01/2017-01-07`
pub fn window_context(nodes: &[String], window: &DateWindow) -> String {
    format!("nodes {} in window {}", nodes.iter().join(","), window)
}

/// Sort by node, date and hour.
pub fn sort_rows(rows: &mut [Record]) {
    rows.sort_by(|a, b| (&a.node_key, a.date, a.hour).cmp(&(&b.node_key, b.date, b.hour)));
}

pub fn write_csv(path: &str, rows: &[Record]) -> Result<(), PmlError> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new().from_writer(file);
    if rows.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to file {}", rows.len(), path);
    Ok(())
}

#[derive(Deserialize)]
struct PmlResponse {
    #[serde(rename = "Resultados")]
    results: Vec<NodeResults>,
}

#[derive(Deserialize)]
struct NodeResults {
    clv_nodo: String,
    #[serde(rename = "Valores")]
    values: Vec<HourlyValue>,
}

#[derive(Deserialize)]
struct HourlyValue {
    fecha: Date,
    #[serde(deserialize_with = "deserialize_hour")]
    hora: u8,
    pml: Decimal,
    pml_ene: Decimal,
    pml_per: Decimal,
    pml_cng: Decimal,
}

// The service sends the hour as a string, accept an integer too.
#[derive(Deserialize)]
#[serde(untagged)]
enum HourField {
    Int(u8),
    Str(String),
}

fn deserialize_hour<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    match HourField::deserialize(deserializer)? {
        HourField::Int(hour) => Ok(hour),
        HourField::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Flatten a SW-PML json body into one record per node and hour, in
/// the order of the response.
pub fn parse_response(body: &str) -> Result<Vec<Record>, serde_json::Error> {
    let response: PmlResponse = serde_json::from_str(body)?;
    let rows = response
        .results
        .into_iter()
        .flat_map(|node| {
            let node_key = node.clv_nodo;
            node.values.into_iter().map(move |v| Record {
                node_key: node_key.clone(),
                date: v.fecha,
                hour: v.hora,
                price: v.pml,
                energy_component: v.pml_ene,
                loss_component: v.pml_per,
                congestion_component: v.pml_cng,
            })
        })
        .collect();
    Ok(rows)
}
