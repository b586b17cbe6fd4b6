//! Two-phase snapshotting: a synchronous virtual-DOM snapshot with all
//! external references rewritten to `asset:<id>`, followed by an
//! asynchronous, bounded-concurrency fetch of the registered assets.
//!
//! The snapshot walks special elements (`script`, `style`,
//! `link`, `img`, `video`) and CSS text so that a consumer can
//! materialize the tree without touching the network; the fetch phase
//! streams each asset out-of-band in completion order.

use anyhow::{Error, anyhow};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt as _};
use log::debug;
use std::sync::Arc;

use dom::{AdoptTarget, Document, NodeId, NodeKind, SheetKey};
use protocol::{FetchError, Frame, VDocument, VElement, VNode, VStyleSheet};
use url::Url;

use crate::assets::{AssetFetcher, AssetTracker, PendingAsset};
use crate::css::{rewrite_css_urls, rewrite_srcset};
use crate::id_map::IdMap;
use crate::sheets::StyleSheetRegistry;

/// `link` relations that trigger consumer-side network activity and are
/// therefore disarmed in snapshots.
const RESOURCE_HINTS: [&str; 6] = [
    "prefetch",
    "preload",
    "modulepreload",
    "dns-prefetch",
    "preconnect",
    "prerender",
];

/// Mutable snapshot state threaded through the walk.
pub struct SnapshotContext<'rec> {
    pub document: &'rec Document,
    pub ids: &'rec mut IdMap,
    pub assets: &'rec mut AssetTracker,
    pub sheets: &'rec mut StyleSheetRegistry,
    /// A sheet excluded from the emitted adopted list, such as the
    /// temporary animation-freeze sheet.
    pub exclude_sheet: Option<SheetKey>,
}

impl SnapshotContext<'_> {
    fn base(&self) -> &Url {
        self.document.base_url()
    }

    /// Register an attribute URL, returning the rewritten reference and
    /// the absolute form. Opaque and malformed references stay as-is.
    fn register_url(&mut self, raw: &str) -> Option<(String, String)> {
        if raw.is_empty()
            || raw.starts_with("data:")
            || raw.starts_with("asset:")
            || raw.starts_with("blob:")
        {
            return None;
        }
        let Ok(resolved) = self.base().join(raw) else {
            debug!("leaving malformed url untouched: {raw}");
            return None;
        };
        let id = self.assets.assign(resolved.as_str(), None, None);
        Some((format!("asset:{id}"), resolved.into()))
    }

    /// Snapshot one stylesheet object: ensure its stable id, serialize
    /// its rules, and rewrite the `url()` references inside.
    pub fn snapshot_sheet(&mut self, key: SheetKey) -> Result<VStyleSheet, Error> {
        let sheet = self
            .document
            .sheet(key)
            .ok_or_else(|| anyhow!("invariant violation: unknown sheet key {key:?}"))?;
        let media = sheet.media.clone();
        let css = sheet.css_text();
        let sheet_id = self.sheets.ensure(key);
        let css_text = rewrite_css_urls(&css, self.document.base_url(), self.assets);
        Ok(VStyleSheet {
            id: sheet_id,
            media,
            css_text,
        })
    }
}

/// Snapshot the whole document: doctype, tree, and adopted stylesheets.
///
/// # Errors
/// Returns an error on a broken identity invariant.
pub fn snapshot_document(ctx: &mut SnapshotContext<'_>) -> Result<VDocument, Error> {
    let root = ctx.document.root();
    let id = ctx.ids.assign(root);
    let mut adopted_style_sheets = Vec::new();
    for key in ctx.document.adopted_sheets(AdoptTarget::Document).to_vec() {
        if ctx.exclude_sheet == Some(key) {
            continue;
        }
        adopted_style_sheets.push(ctx.snapshot_sheet(key)?);
    }
    let mut children = Vec::new();
    for child in ctx.document.children(root).collect::<Vec<_>>() {
        children.push(snapshot_node(ctx, child)?);
    }
    Ok(VDocument {
        id,
        adopted_style_sheets,
        children,
    })
}

/// Snapshot one subtree.
///
/// # Errors
/// Returns an error if the root is a document or shadow-root node.
pub fn snapshot_node(ctx: &mut SnapshotContext<'_>, node: NodeId) -> Result<VNode, Error> {
    let id = ctx.ids.assign(node);
    let kind = ctx
        .document
        .kind(node)
        .ok_or_else(|| anyhow!("invariant violation: snapshot of a vanished node"))?
        .clone();
    match kind {
        NodeKind::Element { tag, namespace } => snapshot_element(ctx, node, id, tag, namespace),
        NodeKind::Text { text } => Ok(VNode::Text { id, text }),
        NodeKind::CData { text } => Ok(VNode::CData { id, text }),
        NodeKind::Comment { text } => Ok(VNode::Comment { id, text }),
        NodeKind::ProcessingInstruction { target, data } => {
            Ok(VNode::ProcessingInstruction { id, target, data })
        }
        NodeKind::DocumentType {
            name,
            public_id,
            system_id,
        } => Ok(VNode::DocumentType {
            id,
            name,
            public_id,
            system_id,
        }),
        NodeKind::Document | NodeKind::ShadowRoot { .. } => {
            Err(anyhow!("invariant violation: container node as snapshot root"))
        }
    }
}

fn snapshot_element(
    ctx: &mut SnapshotContext<'_>,
    node: NodeId,
    id: u32,
    tag: String,
    namespace: Option<String>,
) -> Result<VNode, Error> {
    let mut attrs: Vec<(String, String)> = ctx
        .document
        .node(node)
        .map(|entry| entry.attrs.iter().cloned().collect())
        .unwrap_or_default();

    match tag.as_str() {
        "script" => rewrite_script(&mut attrs),
        "style" => {}
        "link" => rewrite_link(ctx, node, &mut attrs)?,
        "img" => rewrite_img(ctx, &mut attrs),
        "video" => rewrite_video(ctx, &mut attrs),
        _ => {}
    }

    // Inline style attributes can reference assets too.
    if let Some(style) = attr_value(&attrs, "style") {
        let rewritten = rewrite_css_urls(&style, ctx.document.base_url(), ctx.assets);
        set_attr(&mut attrs, "style", &rewritten);
    }

    let children = match tag.as_str() {
        // Script bodies are blanked so nothing executes on replay.
        "script" => Vec::new(),
        "style" => vec![style_text_child(ctx, node)?],
        _ => {
            let mut out = Vec::new();
            for child in ctx.document.children(node).collect::<Vec<_>>() {
                out.push(snapshot_node(ctx, child)?);
            }
            out
        }
    };

    let mut shadow_children = Vec::new();
    if let Some(shadow) = ctx.document.open_shadow_root(node) {
        for child in ctx.document.children(shadow).collect::<Vec<_>>() {
            shadow_children.push(snapshot_node(ctx, child)?);
        }
    }

    Ok(VNode::Element(VElement {
        id,
        tag,
        namespace,
        attributes: attrs,
        children,
        shadow_children,
    }))
}

/// The synthesized text child of a `<style>` element: the owning sheet's
/// serialized rules when reachable, falling back to the raw text
/// content, with every `url()` reference rewritten.
fn style_text_child(ctx: &mut SnapshotContext<'_>, node: NodeId) -> Result<VNode, Error> {
    let css = ctx
        .document
        .node(node)
        .and_then(|entry| entry.sheet)
        .and_then(|key| {
            ctx.sheets.ensure(key);
            ctx.document.sheet(key).map(dom::StyleSheet::css_text)
        })
        .unwrap_or_else(|| ctx.document.text_content(node));
    let rewritten = rewrite_css_urls(&css, ctx.document.base_url(), ctx.assets);
    let text_id = ctx
        .document
        .children(node)
        .find(|child| matches!(ctx.document.kind(*child), Some(NodeKind::Text { .. })))
        .map_or(0, |child| ctx.ids.assign(child));
    Ok(VNode::Text {
        id: text_id,
        text: rewritten,
    })
}

fn rewrite_script(attrs: &mut Vec<(String, String)>) {
    if let Some(src) = remove_attr(attrs, "src") {
        set_attr(attrs, "data-orig-src", &src);
    }
}

fn rewrite_img(ctx: &mut SnapshotContext<'_>, attrs: &mut Vec<(String, String)>) {
    if let Some(src) = attr_value(attrs, "src")
        && let Some((reference, _)) = ctx.register_url(&src)
    {
        set_attr(attrs, "src", &reference);
        set_attr(attrs, "data-original-src", &src);
    }
    if let Some(srcset) = attr_value(attrs, "srcset") {
        let rewritten = rewrite_srcset(&srcset, ctx.document.base_url(), ctx.assets);
        set_attr(attrs, "srcset", &rewritten);
    }
}

fn rewrite_video(ctx: &mut SnapshotContext<'_>, attrs: &mut Vec<(String, String)>) {
    if let Some(poster) = attr_value(attrs, "poster")
        && let Some((reference, _)) = ctx.register_url(&poster)
    {
        set_attr(attrs, "poster", &reference);
        set_attr(attrs, "data-orig-poster", &poster);
    }
}

fn rewrite_link(
    ctx: &mut SnapshotContext<'_>,
    node: NodeId,
    attrs: &mut Vec<(String, String)>,
) -> Result<(), Error> {
    let rel = attr_value(attrs, "rel").unwrap_or_default().to_lowercase();
    let rels: Vec<&str> = rel.split_whitespace().collect();

    if rels.contains(&"stylesheet") {
        let Some(href) = attr_value(attrs, "href") else {
            return Ok(());
        };
        let Ok(resolved) = ctx.document.base_url().join(&href) else {
            debug!("stylesheet link with unresolvable href: {href}");
            return Ok(());
        };
        let sheet_key = ctx.document.node(node).and_then(|entry| entry.sheet);
        let asset_id = if let Some(key) = sheet_key {
            ctx.sheets.ensure(key);
            let css = ctx
                .document
                .sheet(key)
                .ok_or_else(|| anyhow!("invariant violation: unknown sheet key {key:?}"))?
                .css_text();
            let rewritten = rewrite_css_urls(&css, ctx.document.base_url(), ctx.assets);
            ctx.assets.assign(
                resolved.as_str(),
                Some(Bytes::from(rewritten)),
                Some("text/css".to_owned()),
            )
        } else {
            // Sheet not loaded yet; the fetch phase pulls the raw CSS.
            ctx.assets
                .assign(resolved.as_str(), None, Some("text/css".to_owned()))
        };
        set_attr(attrs, "href", &format!("asset:{asset_id}"));
        set_attr(attrs, "data-link-href", &href);
        return Ok(());
    }

    if rels.contains(&"icon") || rels.contains(&"apple-touch-icon") {
        if let Some(href) = attr_value(attrs, "href")
            && let Some((reference, _)) = ctx.register_url(&href)
        {
            set_attr(attrs, "href", &reference);
            set_attr(attrs, "data-orig-href", &href);
        }
        return Ok(());
    }

    if rels.iter().any(|value| RESOURCE_HINTS.contains(value)) {
        if let Some(href) = remove_attr(attrs, "href") {
            set_attr(attrs, "data-orig-href", &href);
        }
        if let Some(rel_value) = remove_attr(attrs, "rel") {
            set_attr(attrs, "data-orig-rel", &rel_value);
        }
    }
    Ok(())
}

// ---- attribute list helpers (insertion order preserved) ----

fn attr_value(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(attr, _)| attr == name)
        .map(|(_, value)| value.clone())
}

fn set_attr(attrs: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some((_, slot)) = attrs.iter_mut().find(|(attr, _)| attr == name) {
        value.clone_into(slot);
    } else {
        attrs.push((name.to_owned(), value.to_owned()));
    }
}

fn remove_attr(attrs: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let position = attrs.iter().position(|(attr, _)| attr == name)?;
    Some(attrs.remove(position).1)
}

// ---- fetch phase ----

/// Fetch every pending asset with bounded concurrency, yielding one
/// `Asset` frame per asset in completion order. A failed fetch yields
/// the asset with an empty buffer and its in-band error; assets are
/// never skipped.
pub fn fetch_stream(
    fetcher: Arc<dyn AssetFetcher>,
    pending: Vec<PendingAsset>,
    concurrency: usize,
) -> impl Stream<Item = Frame> + Send {
    stream::iter(pending.into_iter().map(move |asset| {
        let fetcher = Arc::clone(&fetcher);
        async move { fetch_one(fetcher.as_ref(), asset).await }
    }))
    .buffer_unordered(concurrency.max(1))
}

async fn fetch_one(fetcher: &dyn AssetFetcher, asset: PendingAsset) -> Frame {
    if let Some(data) = asset.data {
        return Frame::Asset {
            asset_id: asset.id,
            url: asset.url,
            mime: asset.mime,
            buf: data,
            fetch_error: FetchError::None,
        };
    }
    let parsed = match Url::parse(&asset.url) {
        Ok(parsed) => parsed,
        Err(error) => {
            return Frame::Asset {
                asset_id: asset.id,
                url: asset.url,
                mime: asset.mime,
                buf: Bytes::new(),
                fetch_error: FetchError::Unknown {
                    message: error.to_string(),
                },
            };
        }
    };
    match fetcher.fetch(&parsed).await {
        Ok(fetched) => Frame::Asset {
            asset_id: asset.id,
            url: asset.url,
            mime: asset.mime.or(fetched.mime),
            buf: fetched.data,
            fetch_error: FetchError::None,
        },
        Err(fetch_error) => Frame::Asset {
            asset_id: asset.id,
            url: asset.url,
            mime: asset.mime,
            buf: Bytes::new(),
            fetch_error,
        },
    }
}
