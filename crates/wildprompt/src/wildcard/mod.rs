pub mod chooser;
pub mod expander;
pub mod store;

pub use chooser::{Chooser, SeededChooser, ThreadRngChooser};
pub use crate::config::DEFAULT_MAX_DEPTH;
pub use expander::WildcardExpander;
pub use store::{WildcardStore, WildcardTable};
