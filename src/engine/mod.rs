pub mod broadcast;
pub mod dim_loop;
pub mod filemap;
pub mod subscript;
