//! Metadata object model: fields, keys, tables, rows and typed values

pub mod data_source;
pub mod field;
pub mod key;
pub mod map;
pub mod row;
pub mod table;
pub mod value;

pub use data_source::*;
pub use field::*;
pub use key::*;
pub use map::*;
pub use row::*;
pub use table::*;
pub use value::*;
