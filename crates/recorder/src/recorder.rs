//! The recording orchestrator.
//!
//! Owns node identity, the asset registry, and the watchers; sequences
//! keyframe emission; and enforces the asset barrier: after any frame
//! announcing `asset_count > 0`, every one of those assets is emitted
//! before the next DOM operation frame, regardless of fetch completion
//! order.
//!
//! The embedder drives the recorder explicitly: `start` takes the
//! initial keyframe, `pump` processes accumulated mutations, `input`
//! records interactions, `stop` tears down. Mutation records buffer in a
//! channel between pumps, which is where queued operations wait while a
//! barrier is held.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Error, bail};
use async_trait::async_trait;
use dom::{AdoptTarget, Document, MutationRecord};
use futures::StreamExt as _;
use log::{debug, warn};
use protocol::{Frame, Writer};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::assets::{AssetFetcher, AssetTracker, PendingAsset};
use crate::config::RecorderConfig;
use crate::detector::{DomChangeDetector, DomOperation};
use crate::id_map::IdMap;
use crate::inliner::{SnapshotContext, fetch_stream, snapshot_document, snapshot_node};
use crate::interactions::{InputEvent, UserInteractionTracker};
use crate::sheets::StyleSheetRegistry;
use crate::watcher::{StyleSheetEvent, StyleSheetWatcher};

/// CSS injected while snapshotting with frozen animations.
const FREEZE_CSS: &str = "*{animation:none!important;transition:none!important}";

/// Handle returned by [`PageRecorder::add_frame_handler`].
pub type HandlerToken = u64;

/// An ordered frame subscriber. Handlers run serially per frame; a
/// failing handler is logged and skipped, never aborting the recording.
#[async_trait]
pub trait FrameHandler: Send {
    async fn on_frame(&mut self, frame: &Frame) -> Result<(), Error>;

    /// Called once when the recording stops.
    async fn on_close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Adapts a protocol [`Writer`] into a frame handler.
pub struct WriterSink {
    writer: Option<Writer>,
}

impl WriterSink {
    #[must_use]
    pub const fn new(writer: Writer) -> Self {
        Self {
            writer: Some(writer),
        }
    }
}

#[async_trait]
impl FrameHandler for WriterSink {
    async fn on_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        match self.writer.as_mut() {
            Some(writer) => {
                frame.encode(writer).await?;
                Ok(())
            }
            None => bail!("writer sink already closed"),
        }
    }

    async fn on_close(&mut self) -> Result<(), Error> {
        if let Some(writer) = self.writer.take() {
            writer.close();
        }
        Ok(())
    }
}

async fn deliver(handlers: &mut [(HandlerToken, Box<dyn FrameHandler>)], frame: &Frame) {
    for (_, handler) in handlers.iter_mut() {
        if let Err(error) = handler.on_frame(frame).await {
            warn!("frame handler failed: {error:#}");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Records one document into a frame stream.
pub struct PageRecorder {
    config: RecorderConfig,
    fetcher: Arc<dyn AssetFetcher>,
    ids: IdMap,
    assets: AssetTracker,
    sheet_registry: StyleSheetRegistry,
    detector: Option<DomChangeDetector>,
    watcher: Option<StyleSheetWatcher>,
    interactions: UserInteractionTracker,
    handlers: Vec<(HandlerToken, Box<dyn FrameHandler>)>,
    next_token: HandlerToken,
    records: Option<mpsc::UnboundedReceiver<MutationRecord>>,
    last_heartbeat: Option<Instant>,
    started: bool,
}

impl PageRecorder {
    #[must_use]
    pub fn new(config: RecorderConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            config,
            fetcher,
            ids: IdMap::new(),
            assets: AssetTracker::new(),
            sheet_registry: StyleSheetRegistry::new(),
            detector: None,
            watcher: None,
            interactions: UserInteractionTracker::new(),
            handlers: Vec::new(),
            next_token: 0,
            records: None,
            last_heartbeat: None,
            started: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// The node identity map, for resolving interaction targets.
    #[must_use]
    pub const fn ids(&self) -> &IdMap {
        &self.ids
    }

    /// Append a frame handler and return its removal token.
    pub fn add_frame_handler(&mut self, handler: Box<dyn FrameHandler>) -> HandlerToken {
        self.next_token += 1;
        self.handlers.push((self.next_token, handler));
        self.next_token
    }

    /// Remove a handler by token. Returns whether it was present.
    pub fn remove_frame_handler(&mut self, token: HandlerToken) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != token);
        self.handlers.len() != before
    }

    /// Begin recording: assign ids to the whole document, emit the
    /// metadata and keyframe, and stream the keyframe's assets.
    ///
    /// # Errors
    /// Returns an error if already started or on a broken invariant.
    pub async fn start(&mut self, document: &mut Document) -> Result<(), Error> {
        if self.started {
            bail!("recorder already started");
        }
        let mut records = document.observe();

        // Quiet window: wait for the mutation stream to settle before
        // snapshotting. Records seen here predate the keyframe and are
        // covered by it.
        if self.config.quiet_window_ms > 0 {
            while let Ok(Some(_)) = timeout(self.config.quiet_window(), records.recv()).await {}
        }

        let freeze = if self.config.freeze_animations {
            let key = document.create_sheet(None, vec![FREEZE_CSS.to_owned()]);
            let mut adopted = document.adopted_sheets(AdoptTarget::Document).to_vec();
            adopted.push(key);
            document.set_adopted_sheets(AdoptTarget::Document, adopted);
            Some(key)
        } else {
            None
        };

        self.ids.assign_subtree(document, document.root());
        let snapshot = {
            let mut ctx = SnapshotContext {
                document: &*document,
                ids: &mut self.ids,
                assets: &mut self.assets,
                sheets: &mut self.sheet_registry,
                exclude_sheet: freeze,
            };
            snapshot_document(&mut ctx)?
        };
        let pending = self.assets.take();
        let (viewport_width, viewport_height) = document.viewport();

        deliver(
            &mut self.handlers,
            &Frame::RecordingMetadata {
                initial_url: document.base_url().as_str().to_owned(),
                heartbeat_interval_secs: self.config.heartbeat_interval_secs,
            },
        )
        .await;
        deliver(&mut self.handlers, &Frame::Timestamp { timestamp: now_ms() }).await;
        deliver(
            &mut self.handlers,
            &Frame::Keyframe {
                document: snapshot,
                asset_count: pending.len() as u32,
                viewport_width,
                viewport_height,
            },
        )
        .await;
        self.emit_assets(pending).await;

        if let Some(key) = freeze {
            let adopted: Vec<_> = document
                .adopted_sheets(AdoptTarget::Document)
                .iter()
                .copied()
                .filter(|existing| *existing != key)
                .collect();
            document.set_adopted_sheets(AdoptTarget::Document, adopted);
        }
        // Setup records (freeze sheet bookkeeping) predate the baseline.
        while records.try_recv().is_ok() {}

        self.detector = Some(DomChangeDetector::new(document, &self.ids)?);
        self.watcher = Some(StyleSheetWatcher::new(document));
        self.records = Some(records);
        self.last_heartbeat = Some(Instant::now());
        self.started = true;
        Ok(())
    }

    /// Process accumulated mutations: debounce, reconcile against the
    /// mirror, and emit the resulting frames in order.
    ///
    /// # Errors
    /// Returns an error if the recorder is not started or on a broken
    /// invariant.
    pub async fn pump(&mut self, document: &Document) -> Result<(), Error> {
        if !self.started {
            bail!("recorder not started");
        }
        self.maybe_heartbeat().await;

        let mut batch = self.drain_records();
        if !batch.is_empty() && self.config.debounce_ms > 0 {
            // Let the burst settle; anything arriving meanwhile joins
            // this batch.
            tokio::time::sleep(self.config.debounce()).await;
            batch.extend(self.drain_records());
        }

        let Some(detector) = self.detector.as_mut() else {
            bail!("recorder not started");
        };
        detector.note_records(document, &batch);
        if !detector.has_pending() && batch.is_empty() {
            return Ok(());
        }
        let operations = detector.flush(document, &mut self.ids)?;
        let sheet_events = self
            .watcher
            .as_mut()
            .map(|watcher| watcher.on_records(document, &batch))
            .unwrap_or_default();
        if operations.is_empty() && sheet_events.is_empty() {
            return Ok(());
        }

        deliver(&mut self.handlers, &Frame::Timestamp { timestamp: now_ms() }).await;
        for operation in operations {
            self.apply_operation(document, operation).await?;
        }
        for event in sheet_events {
            self.apply_sheet_event(document, event).await?;
        }
        Ok(())
    }

    /// Record one user interaction.
    ///
    /// # Errors
    /// Returns an error if the recorder is not started.
    pub async fn input(&mut self, event: InputEvent) -> Result<(), Error> {
        if !self.started {
            bail!("recorder not started");
        }
        if let Some(frame) = self.interactions.translate(&self.ids, event) {
            deliver(&mut self.handlers, &frame).await;
        }
        Ok(())
    }

    /// Stop recording: disconnect observation and close every handler.
    ///
    /// # Errors
    /// Never fails today; kept fallible for symmetry with the rest of
    /// the surface.
    pub async fn stop(&mut self) -> Result<(), Error> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.records = None;
        self.detector = None;
        self.watcher = None;
        deliver(&mut self.handlers, &Frame::Timestamp { timestamp: now_ms() }).await;
        for (_, handler) in &mut self.handlers {
            if let Err(error) = handler.on_close().await {
                warn!("frame handler close failed: {error:#}");
            }
        }
        Ok(())
    }

    // ---- internals ----

    fn drain_records(&mut self) -> Vec<MutationRecord> {
        let Some(records) = self.records.as_mut() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Ok(record) = records.try_recv() {
            out.push(record);
        }
        out
    }

    async fn maybe_heartbeat(&mut self) {
        if self.config.heartbeat_interval_secs == 0 {
            return;
        }
        let Some(last) = self.last_heartbeat else {
            return;
        };
        if last.elapsed() >= self.config.heartbeat_interval() {
            self.last_heartbeat = Some(Instant::now());
            deliver(&mut self.handlers, &Frame::Timestamp { timestamp: now_ms() }).await;
            deliver(&mut self.handlers, &Frame::Heartbeat).await;
        }
    }

    /// Stream every pending asset through the handlers in completion
    /// order. Awaiting this before the next operation frame is what
    /// holds the asset barrier.
    async fn emit_assets(&mut self, pending: Vec<PendingAsset>) {
        if pending.is_empty() {
            return;
        }
        let mut frames = fetch_stream(
            Arc::clone(&self.fetcher),
            pending,
            self.config.fetch_concurrency,
        );
        while let Some(frame) = frames.next().await {
            deliver(&mut self.handlers, &frame).await;
        }
    }

    async fn apply_operation(
        &mut self,
        document: &Document,
        operation: DomOperation,
    ) -> Result<(), Error> {
        match operation {
            DomOperation::Insert {
                parent_id,
                index,
                root,
            } => {
                let node = {
                    let mut ctx = SnapshotContext {
                        document,
                        ids: &mut self.ids,
                        assets: &mut self.assets,
                        sheets: &mut self.sheet_registry,
                        exclude_sheet: None,
                    };
                    snapshot_node(&mut ctx, root)?
                };
                let pending = self.assets.take();
                deliver(
                    &mut self.handlers,
                    &Frame::DomNodeAdded {
                        parent_node_id: parent_id,
                        index,
                        node,
                        asset_count: pending.len() as u32,
                    },
                )
                .await;
                self.emit_assets(pending).await;
            }
            DomOperation::Remove { node_id } => {
                deliver(&mut self.handlers, &Frame::DomNodeRemoved { node_id }).await;
            }
            DomOperation::UpdateAttribute {
                node_id,
                name,
                value,
            } => {
                deliver(
                    &mut self.handlers,
                    &Frame::DomAttributeChanged {
                        node_id,
                        name,
                        value,
                    },
                )
                .await;
            }
            DomOperation::RemoveAttribute { node_id, name } => {
                deliver(
                    &mut self.handlers,
                    &Frame::DomAttributeRemoved { node_id, name },
                )
                .await;
            }
            DomOperation::UpdateText {
                node_id,
                operations,
            } => {
                deliver(
                    &mut self.handlers,
                    &Frame::DomTextChanged {
                        node_id,
                        operations,
                    },
                )
                .await;
            }
        }
        Ok(())
    }

    async fn apply_sheet_event(
        &mut self,
        document: &Document,
        event: StyleSheetEvent,
    ) -> Result<(), Error> {
        match event {
            StyleSheetEvent::DocumentSheets {
                added,
                removed,
                order_changed,
                ..
            } => {
                // The owning elements surface through DOM operations;
                // the list change itself is informational.
                debug!(
                    "document sheet list changed: +{} -{} reorder={order_changed}",
                    added.len(),
                    removed.len()
                );
            }
            StyleSheetEvent::AdoptedSheets {
                target: AdoptTarget::Document,
                now,
                added,
                ..
            } => {
                let sheet_ids: Vec<u32> = now
                    .iter()
                    .map(|key| self.sheet_registry.ensure(*key))
                    .collect();
                deliver(
                    &mut self.handlers,
                    &Frame::AdoptedStyleSheetsChanged {
                        sheet_ids,
                        added_count: added.len() as u32,
                    },
                )
                .await;
                for key in added {
                    let sheet = {
                        let mut ctx = SnapshotContext {
                            document,
                            ids: &mut self.ids,
                            assets: &mut self.assets,
                            sheets: &mut self.sheet_registry,
                            exclude_sheet: None,
                        };
                        ctx.snapshot_sheet(key)?
                    };
                    let pending = self.assets.take();
                    deliver(
                        &mut self.handlers,
                        &Frame::NewAdoptedStyleSheet {
                            sheet,
                            asset_count: pending.len() as u32,
                        },
                    )
                    .await;
                    self.emit_assets(pending).await;
                }
            }
            StyleSheetEvent::AdoptedSheets { .. } => {
                // Shadow-root adopted lists reach consumers through
                // keyframe snapshots only.
                debug!("adopted sheets changed on a shadow root");
            }
            StyleSheetEvent::SheetRule { sheet, op } => {
                let sheet_id = self.sheet_registry.ensure(sheet);
                let frame = match op {
                    dom::SheetRuleOp::Insert { index, rule } => Frame::StyleSheetRuleInserted {
                        sheet_id,
                        rule_index: index,
                        content: rule,
                    },
                    dom::SheetRuleOp::Delete { index } => Frame::StyleSheetRuleDeleted {
                        sheet_id,
                        rule_index: index,
                    },
                    dom::SheetRuleOp::Replace { css_text } => Frame::StyleSheetReplaced {
                        sheet_id,
                        content: css_text,
                    },
                };
                deliver(&mut self.handlers, &frame).await;
            }
        }
        Ok(())
    }
}
