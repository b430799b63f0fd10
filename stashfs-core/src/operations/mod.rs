pub mod block_content;
pub mod create_block;
pub mod list_directory;
pub mod new_block;

pub use block_content::{AppendBlockOperationRequest, BlockContentOperation};
pub use create_block::{CreateBlockOperation, CreateBlockOperationRequest};
pub use list_directory::{ListDirectoryOperation, ListDirectoryOperationRequest, path_segments};
pub use new_block::{NewBlockOperation, NewBlockOperationRequest, NewBlockOperationResult};
