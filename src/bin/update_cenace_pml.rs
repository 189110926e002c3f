use std::{error::Error, path::Path};

use cenace_pml::db::{
    cenace::{
        lib_cenace::{Market, System},
        node_table::{NodeCatalog, NodeList, NodeProvider, DEFAULT_CHUNK_SIZE},
        pml_archive::{sort_rows, write_csv, DEFAULT_POOL_SIZE},
    },
    prod_db::ProdDb,
};
use clap::Parser;
use itertools::Itertools;
use jiff::Zoned;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// CSV export of the node catalog, needs a CLAVE column
    #[arg(long, default_value = "Catalogo_Nodos.csv")]
    catalog: String,

    /// One or more node keys, separated by commas.  Overrides the catalog.
    #[arg(long)]
    nodes: Option<String>,

    /// Years to download, separated by commas.  Defaults to last year.
    #[arg(short, long, value_delimiter = ',')]
    years: Vec<i16>,

    /// Number of nodes in one request
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Maximum number of chunks downloaded at the same time
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Download one chunk at a time, stop at the first error
    #[arg(long)]
    sequential: bool,

    /// Sort the output by node, date and hour
    #[arg(long)]
    sort: bool,

    /// Electrical system: SIN, BCA or BCS
    #[arg(long, default_value = "SIN")]
    system: System,

    /// Market: MDA or MTR
    #[arg(long, default_value = "MDA")]
    market: Market,

    /// Output csv file
    #[arg(short, long)]
    out: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let env_file = format!(".env/{}.env", args.env);
    if dotenvy::from_path(Path::new(&env_file)).is_err() {
        info!("No {} file, using the default settings", env_file);
    }

    let years = if args.years.is_empty() {
        vec![Zoned::now().year() - 1]
    } else {
        args.years.clone()
    };

    let nodes = match &args.nodes {
        Some(keys) => NodeList(
            keys.split(',')
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty())
                .collect(),
        )
        .list_nodes()?,
        None => NodeCatalog {
            path: args.catalog.clone(),
        }
        .list_nodes()?,
    };

    let mut archive = ProdDb::cenace_pml(args.system, args.market, years.clone());
    archive.config.chunk_size = args.chunk_size;
    archive.config.pool_size = args.pool_size;
    archive.config.validate()?;
    info!(
        "Downloading {}/{} prices for {} nodes, years {}",
        args.system,
        args.market,
        nodes.len(),
        years.iter().join(",")
    );

    let mut rows = if args.sequential {
        archive.download_all(&nodes).await?
    } else {
        let report = archive.download_all_parallel(&nodes).await?;
        if !report.failures.is_empty() {
            warn!(
                "{} chunks failed: {}",
                report.failures.len(),
                report
                    .failures
                    .iter()
                    .map(|f| f.nodes.iter().join(","))
                    .join("; ")
            );
        }
        report.rows
    };
    if args.sort {
        sort_rows(&mut rows);
    }

    let out = args.out.clone().unwrap_or_else(|| {
        format!(
            "pml_{}_{}_{}.csv",
            args.system,
            args.market,
            years.iter().join("-")
        )
    });
    write_csv(&out, &rows)?;

    Ok(())
}
