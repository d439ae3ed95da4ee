//! Types for the channel management core.

mod block;
pub use block::{BlockId, BlockInfo, L1BlockInfo, L2Block, L2BlockInfo, SyncStatus};

mod batch;
pub use batch::SingleBatch;

mod frame;
pub use frame::Frame;

mod tx;
pub use tx::{TxData, TxId};
