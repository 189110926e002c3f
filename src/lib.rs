pub mod db;
pub mod interval;
