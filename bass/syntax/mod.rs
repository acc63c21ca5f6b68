//! The Bass reader. Turns source text into annotated forms, ready for
//! evaluation.

mod token;
pub use token::{
   PAIR_DELIMITER,
   is_delimiter,
   is_space,
};

mod reader;
pub use reader::{
   Reader,
   read,
};
