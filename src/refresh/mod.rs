pub mod pipeline;
pub mod state;
pub mod store;

pub use pipeline::{PageSource, PortalSource, RefreshAck, RefreshPipeline};
pub use state::{RefreshFailure, RefreshStatus};
pub use store::StateStore;
