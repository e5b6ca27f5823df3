pub mod edge;
pub mod event;
pub mod node;
pub mod transfer;

pub use edge::*;
pub use event::*;
pub use node::*;
pub use transfer::*;
