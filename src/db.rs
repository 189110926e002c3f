pub mod cenace;
pub mod prod_db;
