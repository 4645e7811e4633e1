mod chunker;
mod enricher;
mod hybrid_search;
mod index_store;
mod orchestrator;
mod scanner;
mod work_item_indexer;

pub use chunker::*;
pub use enricher::*;
pub use hybrid_search::*;
pub use index_store::*;
pub use orchestrator::*;
pub use scanner::*;
pub use work_item_indexer::*;
