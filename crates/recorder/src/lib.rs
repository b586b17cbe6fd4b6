//! Live-page recording: node identity, mutation diffing, asset
//! inlining, and frame emission over the binary protocol.

pub mod assets;
pub mod config;
pub mod css;
pub mod detector;
pub mod id_map;
pub mod inliner;
pub mod interactions;
pub mod recorder;
pub mod sheets;
pub mod text_diff;
pub mod watcher;

pub use assets::{AssetFetcher, AssetTracker, FetchedAsset, HttpFetcher, PendingAsset, StaticFetcher};
pub use config::RecorderConfig;
pub use detector::{DomChangeDetector, DomOperation};
pub use id_map::IdMap;
pub use interactions::{InputEvent, UserInteractionTracker};
pub use recorder::{FrameHandler, HandlerToken, PageRecorder, WriterSink};
pub use sheets::StyleSheetRegistry;
pub use watcher::{StyleSheetEvent, StyleSheetWatcher};
