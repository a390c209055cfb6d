//! Abstract syntax tree for shode scripts.

mod sexpr;
mod types;

pub use sexpr::to_sexpr;
pub use types::*;
