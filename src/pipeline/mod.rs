//! Update delivery pipeline: channel cleanup, graph generation, posting.

pub mod channel;
pub mod files;
pub mod generator;
pub mod update;

pub use channel::{ChannelClient, ChannelError, ChannelMessage, MessageId};
pub use files::{FileValidation, SUPPORTED_EXTENSIONS, validate_graph_file};
pub use generator::GraphGenerator;
pub use update::{PipelineResult, UpdateCallback, UpdatePipeline};
