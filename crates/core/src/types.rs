use serde::{Deserialize, Serialize};

/// Kind of content a scrape path manages, stored in the `media_kind` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    TvShow,
    Other,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::TvShow => "tvshow",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "tvshow" => Some(Self::TvShow),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend family a scrape path operates on.
///
/// The four kinds cover three addressing schemes: absolute filesystem paths
/// (`Local`), opaque numeric identifiers (`CloudDrive`), and path strings
/// used as identifiers (`RemoteFile` speaks paths directly, `PanDrive`
/// returns server-issued path-like ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    CloudDrive,
    RemoteFile,
    PanDrive,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CloudDrive => "cloud_drive",
            Self::RemoteFile => "remote_file",
            Self::PanDrive => "pan_drive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "cloud_drive" => Some(Self::CloudDrive),
            "remote_file" => Some(Self::RemoteFile),
            "pan_drive" => Some(Self::PanDrive),
            _ => None,
        }
    }

    /// Whether entries are addressed by opaque ids rather than path strings.
    pub fn addresses_by_id(self) -> bool {
        matches!(self, Self::CloudDrive | Self::PanDrive)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a file is placed at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    HardLink,
    SoftLink,
    Move,
    Copy,
}

impl TransferMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HardLink => "hard_link",
            Self::SoftLink => "soft_link",
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard_link" => Some(Self::HardLink),
            "soft_link" => Some(Self::SoftLink),
            "move" => Some(Self::Move),
            "copy" => Some(Self::Copy),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline does with an identified file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Fetch metadata and write sidecars; leave the file where it is.
    ScrapeOnly,
    /// Fetch metadata, then rename/relocate into the library layout.
    ScrapeRename,
    /// Rename in place under the source root, no relocation across roots.
    RenameOnly,
}

impl ScrapeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScrapeOnly => "scrape_only",
            Self::ScrapeRename => "scrape_rename",
            Self::RenameOnly => "rename_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scrape_only" => Some(Self::ScrapeOnly),
            "scrape_rename" => Some(Self::ScrapeRename),
            "rename_only" => Some(Self::RenameOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file pipeline status.
///
/// `Unscanned → Scanned → Scraping → Scraped → Renaming → Renamed` with
/// failure branches `ScrapeFailed`/`RenameFailed`, the re-scrape branch
/// `Rollbacking`, and the manual override `Ignore`. Every transition is
/// persisted; the row is the only durable record of progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Unscanned,
    Scanned,
    Scraping,
    Scraped,
    Renaming,
    Renamed,
    ScrapeFailed,
    RenameFailed,
    Rollbacking,
    Ignore,
}

impl ScrapeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unscanned => "unscanned",
            Self::Scanned => "scanned",
            Self::Scraping => "scraping",
            Self::Scraped => "scraped",
            Self::Renaming => "renaming",
            Self::Renamed => "renamed",
            Self::ScrapeFailed => "scrape_failed",
            Self::RenameFailed => "rename_failed",
            Self::Rollbacking => "rollbacking",
            Self::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unscanned" => Some(Self::Unscanned),
            "scanned" => Some(Self::Scanned),
            "scraping" => Some(Self::Scraping),
            "scraped" => Some(Self::Scraped),
            "renaming" => Some(Self::Renaming),
            "renamed" => Some(Self::Renamed),
            "scrape_failed" => Some(Self::ScrapeFailed),
            "rename_failed" => Some(Self::RenameFailed),
            "rollbacking" => Some(Self::Rollbacking),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }

    /// Terminal statuses receive no further automatic transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Renamed | Self::RenameFailed | Self::ScrapeFailed | Self::Ignore
        )
    }
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope of a staged sidecar artifact within a logical work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarLevel {
    Show,
    Season,
    Episode,
}

impl SidecarLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Season => "season",
            Self::Episode => "episode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "show" => Some(Self::Show),
            "season" => Some(Self::Season),
            "episode" => Some(Self::Episode),
            _ => None,
        }
    }
}

/// What a queued transfer task carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Video,
    Sidecar(SidecarLevel),
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Sidecar(SidecarLevel::Show) => "sidecar_show",
            Self::Sidecar(SidecarLevel::Season) => "sidecar_season",
            Self::Sidecar(SidecarLevel::Episode) => "sidecar_episode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "sidecar_show" => Some(Self::Sidecar(SidecarLevel::Show)),
            "sidecar_season" => Some(Self::Sidecar(SidecarLevel::Season)),
            "sidecar_episode" => Some(Self::Sidecar(SidecarLevel::Episode)),
            _ => None,
        }
    }

    /// Per-episode artifacts never trigger the shared staging sweep.
    pub fn is_shared(self) -> bool {
        !matches!(self, Self::Sidecar(SidecarLevel::Episode))
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            ScrapeStatus::Unscanned,
            ScrapeStatus::Scanned,
            ScrapeStatus::Scraping,
            ScrapeStatus::Scraped,
            ScrapeStatus::Renaming,
            ScrapeStatus::Renamed,
            ScrapeStatus::ScrapeFailed,
            ScrapeStatus::RenameFailed,
            ScrapeStatus::Rollbacking,
            ScrapeStatus::Ignore,
        ] {
            assert_eq!(ScrapeStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(ScrapeStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ScrapeStatus::Renamed.is_terminal());
        assert!(ScrapeStatus::RenameFailed.is_terminal());
        assert!(ScrapeStatus::ScrapeFailed.is_terminal());
        assert!(ScrapeStatus::Ignore.is_terminal());
        assert!(!ScrapeStatus::Renaming.is_terminal());
        assert!(!ScrapeStatus::Rollbacking.is_terminal());
    }

    #[test]
    fn backend_addressing() {
        assert!(!BackendKind::Local.addresses_by_id());
        assert!(BackendKind::CloudDrive.addresses_by_id());
        assert!(!BackendKind::RemoteFile.addresses_by_id());
        assert!(BackendKind::PanDrive.addresses_by_id());
    }

    #[test]
    fn artifact_kind_sharing() {
        assert!(ArtifactKind::Video.is_shared());
        assert!(ArtifactKind::Sidecar(SidecarLevel::Show).is_shared());
        assert!(!ArtifactKind::Sidecar(SidecarLevel::Episode).is_shared());
    }
}
