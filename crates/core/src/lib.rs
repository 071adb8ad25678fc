pub mod types;

pub use types::{
    ArtifactKind, BackendKind, MediaKind, ScrapeMode, ScrapeStatus, SidecarLevel, TransferMode,
};
