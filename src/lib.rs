mod bookkeeping;
mod buffer;
mod cache;
mod cellorder;
mod codec;
mod config;
mod coordinator;
mod error;
mod expr;
mod fragment;
mod schema;
mod storage;

pub use bookkeeping::{AttributeBookkeeping, Bookkeeping, Mbr};
pub use cache::{BookkeepingCache, CacheResult, HashMapCache, NoCache};
pub use cellorder::{sort_permutation, CellOrder};
pub use codec::{CompressionId, FilterId};
pub use config::{Config, ReadMethod};
pub use coordinator::{ArrayCoordinator, CoordinatorMode, ReadResult, RequestHandle, RequestStatus};
pub use error::{Error, Result};
pub use expr::{Predicate, Value};
pub use fragment::{AttributeData, CellBatch, FragmentReader, FragmentWriter, TileResult, WriteMode};
pub use schema::{Attribute, CellType, CellValNum, Schema, COORDS_NAME};
pub use storage::{Backend, MemoryBackend, PosixBackend};
