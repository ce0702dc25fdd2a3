pub mod op;
pub mod polish;
pub mod reg;
pub mod table;
