//! Open-addressing hash primitives for key grouping

pub mod int_set;
pub mod keyed_table;

pub use int_set::IntHashSet;
pub use keyed_table::KeyedTable;
