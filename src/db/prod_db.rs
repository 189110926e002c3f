use std::env;

use crate::db::cenace::{
    lib_cenace::{base_url, Market, System, SWPML_ROOT},
    pml_archive::{CenacePmlArchive, PmlConfig},
};

pub struct ProdDb {}

impl ProdDb {
    /// Downloader for one system and market.  The service root can be
    /// overridden with the `CENACE_PML_URL` environment variable.
    pub fn cenace_pml(
        system: System,
        market: Market,
        years: Vec<i16>,
    ) -> CenacePmlArchive<reqwest::Client> {
        let root = env::var("CENACE_PML_URL").unwrap_or_else(|_| SWPML_ROOT.to_string());
        CenacePmlArchive {
            config: PmlConfig::new(base_url(&root, system, market), years),
            transport: reqwest::Client::new(),
        }
    }
}
