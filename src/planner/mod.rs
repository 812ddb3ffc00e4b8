pub mod error;
pub mod expression;
pub mod parser;
pub mod statement;

pub use parser::SqlParser;
pub use statement::Statement;
