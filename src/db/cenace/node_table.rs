use std::{fs::File, path::Path, slice::Chunks};

use calamine::{open_workbook_auto, Reader};
use itertools::Itertools;
use log::info;

use super::lib_cenace::PmlError;

/// Default number of nodes sent in one request.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Source of the nodes to download.  Implementations return each
/// node once, in the order it was first seen.
pub trait NodeProvider {
    fn list_nodes(&self) -> Result<Vec<String>, PmlError>;
}

/// CENACE's node catalog (Catalogo_Nodos), either the xlsx workbook or
/// a csv export of it.  Only the `CLAVE` column is used.
#[derive(Clone, Debug)]
pub struct NodeCatalog {
    pub path: String,
}

impl NodeCatalog {
    /// Read the node keys from the file, picking the format from the extension.
    pub fn read_file(&self) -> Result<Vec<String>, PmlError> {
        let extension = Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "ods") => self.read_workbook(),
            _ => self.read_csv(),
        }
    }

    /// First sheet of the workbook, header in the first row.
    fn read_workbook(&self) -> Result<Vec<String>, PmlError> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| PmlError::Catalog(format!("{}: {}", self.path, e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PmlError::Catalog(format!("no sheets in {}", self.path)))?
            .map_err(|e| PmlError::Catalog(format!("{}: {}", self.path, e)))?;

        let mut rows = range.rows();
        let idx = rows
            .next()
            .and_then(|header| {
                header
                    .iter()
                    .position(|cell| cell.to_string().trim().eq_ignore_ascii_case("CLAVE"))
            })
            .ok_or_else(|| {
                PmlError::Catalog(format!("no CLAVE column in {}", self.path))
            })?;

        let keys = rows
            .filter_map(|row| row.get(idx))
            .map(|cell| cell.to_string().trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        Ok(keys)
    }

    fn read_csv(&self) -> Result<Vec<String>, PmlError> {
        let file = File::open(Path::new(&self.path))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let idx = reader
            .headers()?
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("CLAVE"))
            .ok_or_else(|| {
                PmlError::Catalog(format!("no CLAVE column in {}", self.path))
            })?;

        let mut keys = Vec::new();
        for record in reader.records() {
            let record = record?;
            match record.get(idx).map(str::trim) {
                Some(key) if !key.is_empty() => keys.push(key.to_string()),
                _ => continue,
            }
        }
        Ok(keys)
    }
}

impl NodeProvider for NodeCatalog {
    fn list_nodes(&self) -> Result<Vec<String>, PmlError> {
        let nodes = unique_nodes(self.read_file()?);
        if nodes.is_empty() {
            return Err(PmlError::Catalog(format!("no nodes in {}", self.path)));
        }
        info!("read {} nodes from {}", nodes.len(), self.path);
        Ok(nodes)
    }
}

/// A fixed list of nodes, e.g. from the command line.
#[derive(Clone, Debug, Default)]
pub struct NodeList(pub Vec<String>);

impl NodeProvider for NodeList {
    fn list_nodes(&self) -> Result<Vec<String>, PmlError> {
        Ok(unique_nodes(self.0.iter().cloned()))
    }
}

/// Collapse duplicates, keeping the first occurrence.
pub fn unique_nodes<I: IntoIterator<Item = String>>(nodes: I) -> Vec<String> {
    nodes.into_iter().unique().collect()
}

/// Split the nodes in groups of `chunk_size`, in order.  Only the last
/// chunk can be shorter.  Panics if `chunk_size` is 0.
pub fn node_chunks(nodes: &[String], chunk_size: usize) -> Chunks<'_, String> {
    nodes.chunks(chunk_size)
}

pub fn chunk_count(node_count: usize, chunk_size: usize) -> usize {
    node_count.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use std::{error::Error, fs};

    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("N{:03}", i)).collect()
    }

    #[test]
    fn chunks_cover_input_in_order() {
        for (n, size) in [(0, 20), (1, 20), (20, 20), (21, 20), (45, 7), (5, 1)] {
            let nodes = names(n);
            let chunks: Vec<&[String]> = node_chunks(&nodes, size).collect();
            assert_eq!(chunks.len(), chunk_count(n, size));
            if let Some((last, rest)) = chunks.split_last() {
                assert!(rest.iter().all(|c| c.len() == size));
                assert!(!last.is_empty() && last.len() <= size);
            }
            assert_eq!(chunks.concat(), nodes);
        }
    }

    #[test]
    fn node_list_drops_duplicates() -> Result<(), Box<dyn Error>> {
        let list = NodeList(
            ["B", "A", "B", "C", "A"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(list.list_nodes()?, vec!["B", "A", "C"]);
        Ok(())
    }

    #[test]
    fn read_catalog() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("cenace_pml_catalog_test");
        fs::create_dir_all(&dir)?;
        let path = dir.join("Catalogo_Nodos.csv");
        fs::write(
            &path,
            "SISTEMA,CLAVE,NOMBRE\nSIN,01PLO-115,PLO\nSIN,08SUR-115,SUR\nSIN,01PLO-115,PLO\nSIN,,\n",
        )?;
        let catalog = NodeCatalog {
            path: path.to_string_lossy().to_string(),
        };
        assert_eq!(catalog.list_nodes()?, vec!["01PLO-115", "08SUR-115"]);
        Ok(())
    }

    #[test]
    fn read_catalog_workbook() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("cenace_pml_catalog_test");
        fs::create_dir_all(&dir)?;
        let path = dir.join("Catalogo_Nodos.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        let rows = [
            ["SISTEMA", "CLAVE", "NOMBRE"],
            ["SIN", "01PLO-115", "PLO"],
            ["SIN", "08SUR-115", "SUR"],
            ["SIN", "01PLO-115", "PLO"],
        ];
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                sheet.write_string(i as u32, j as u16, *value)?;
            }
        }
        // a row without a key
        sheet.write_string(4, 0, "SIN")?;
        workbook.save(&path)?;

        let catalog = NodeCatalog {
            path: path.to_string_lossy().to_string(),
        };
        assert_eq!(
            catalog.read_file()?,
            vec!["01PLO-115", "08SUR-115", "01PLO-115"]
        );
        assert_eq!(catalog.list_nodes()?, vec!["01PLO-115", "08SUR-115"]);
        Ok(())
    }

    #[test]
    fn workbook_without_clave_column() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("cenace_pml_catalog_test");
        fs::create_dir_all(&dir)?;
        let path = dir.join("no_clave.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "NOMBRE")?;
        sheet.write_string(1, 0, "PLO")?;
        workbook.save(&path)?;
        let catalog = NodeCatalog {
            path: path.to_string_lossy().to_string(),
        };
        assert!(matches!(catalog.list_nodes(), Err(PmlError::Catalog(_))));
        Ok(())
    }

    #[test]
    fn catalog_without_clave_column() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("cenace_pml_catalog_test");
        fs::create_dir_all(&dir)?;
        let path = dir.join("no_clave.csv");
        fs::write(&path, "SISTEMA,NOMBRE\nSIN,PLO\n")?;
        let catalog = NodeCatalog {
            path: path.to_string_lossy().to_string(),
        };
        assert!(matches!(catalog.list_nodes(), Err(PmlError::Catalog(_))));
        Ok(())
    }
}
