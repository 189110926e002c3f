pub mod lib_cenace;
pub mod node_table;
pub mod pml_archive;
