pub mod avl;

pub use avl::*;
