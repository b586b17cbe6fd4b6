//! Snapshotting of special elements and asset reference rewriting.

use dom::{AdoptTarget, Document, ShadowMode};
use protocol::{VNode, printing};
use recorder::assets::AssetTracker;
use recorder::id_map::IdMap;
use recorder::inliner::{SnapshotContext, snapshot_document, snapshot_node};
use recorder::sheets::StyleSheetRegistry;
use url::Url;

fn attr<'el>(element: &'el protocol::VElement, name: &str) -> Option<&'el str> {
    element
        .attributes
        .iter()
        .find(|(attr, _)| attr == name)
        .map(|(_, value)| value.as_str())
}

fn element(node: &VNode) -> &protocol::VElement {
    match node {
        VNode::Element(element) => element,
        other => panic!("expected element, got {other:?}"),
    }
}

struct Fixture {
    document: Document,
    ids: IdMap,
    assets: AssetTracker,
    sheets: StyleSheetRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            document: Document::new(Url::parse("https://site.test/app/").unwrap()),
            ids: IdMap::new(),
            assets: AssetTracker::new(),
            sheets: StyleSheetRegistry::new(),
        }
    }

    fn snapshot(&mut self, node: dom::NodeId) -> VNode {
        let mut ctx = SnapshotContext {
            document: &self.document,
            ids: &mut self.ids,
            assets: &mut self.assets,
            sheets: &mut self.sheets,
            exclude_sheet: None,
        };
        snapshot_node(&mut ctx, node).unwrap()
    }
}

#[test]
fn script_sources_are_disarmed_and_bodies_blanked() {
    let mut fx = Fixture::new();
    let script = fx.document.create_element("script");
    fx.document.append_child(fx.document.root(), script);
    fx.document.set_attribute(script, "src", "app.js");
    fx.document.set_attribute(script, "defer", "");
    let body = fx.document.create_text("console.log('hi')");
    fx.document.append_child(script, body);

    let snapshot = fx.snapshot(script);
    let el = element(&snapshot);
    assert_eq!(attr(el, "src"), None);
    assert_eq!(attr(el, "data-orig-src"), Some("app.js"));
    assert_eq!(attr(el, "defer"), Some(""));
    assert!(el.children.is_empty());
    assert_eq!(fx.assets.count(), 0);
}

#[test]
fn img_src_and_srcset_are_registered() {
    let mut fx = Fixture::new();
    let img = fx.document.create_element("img");
    fx.document.append_child(fx.document.root(), img);
    fx.document.set_attribute(img, "src", "hero.png");
    fx.document.set_attribute(img, "srcset", "hero.png 1x, hero@2x.png 2x");

    let snapshot = fx.snapshot(img);
    let el = element(&snapshot);
    assert_eq!(attr(el, "src"), Some("asset:1"));
    assert_eq!(attr(el, "data-original-src"), Some("hero.png"));
    assert_eq!(attr(el, "srcset"), Some("asset:1 1x, asset:2 2x"));
    assert_eq!(fx.assets.get("https://site.test/app/hero.png"), Some(1));
    assert_eq!(fx.assets.get("https://site.test/app/hero@2x.png"), Some(2));
}

#[test]
fn style_elements_serialize_their_sheet_with_rewritten_urls() {
    let mut fx = Fixture::new();
    let style = fx.document.create_element("style");
    fx.document.append_child(fx.document.root(), style);
    let text = fx
        .document
        .create_text("body { background: url(old.png) }");
    fx.document.append_child(style, text);
    let key = fx.document.create_sheet(
        None,
        vec!["body { background: url(\"bg.png\") }".to_owned()],
    );
    fx.document.set_element_sheet(style, key);

    let snapshot = fx.snapshot(style);
    let el = element(&snapshot);
    // The owning sheet wins over raw text content.
    assert_eq!(el.children.len(), 1);
    match &el.children[0] {
        VNode::Text { text, .. } => {
            assert_eq!(text, "body { background: url(\"asset:1\") }");
        }
        other => panic!("expected text child, got {other:?}"),
    }
    assert_eq!(fx.assets.get("https://site.test/app/bg.png"), Some(1));
    assert_eq!(fx.sheets.get(key), Some(1));
}

#[test]
fn stylesheet_links_become_prefilled_css_assets() {
    let mut fx = Fixture::new();
    let link = fx.document.create_element("link");
    fx.document.append_child(fx.document.root(), link);
    fx.document.set_attribute(link, "rel", "stylesheet");
    fx.document.set_attribute(link, "href", "site.css");
    let key = fx
        .document
        .create_sheet(None, vec![".a { background: url(a.png) }".to_owned()]);
    fx.document.set_element_sheet(link, key);

    let snapshot = fx.snapshot(link);
    let el = element(&snapshot);
    // The css asset takes id 1; the image inside it id 2.
    assert_eq!(attr(el, "href"), Some("asset:2"));
    assert_eq!(attr(el, "data-link-href"), Some("site.css"));
    let pending = fx.assets.take();
    let css = pending
        .iter()
        .find(|asset| asset.url == "https://site.test/app/site.css")
        .unwrap();
    assert_eq!(css.mime.as_deref(), Some("text/css"));
    assert_eq!(
        css.data.as_ref().map(|data| data.as_ref()),
        Some(".a { background: url(asset:1) }".as_bytes())
    );
}

#[test]
fn resource_hint_links_are_neutralized() {
    let mut fx = Fixture::new();
    let link = fx.document.create_element("link");
    fx.document.append_child(fx.document.root(), link);
    fx.document.set_attribute(link, "rel", "preload");
    fx.document.set_attribute(link, "href", "font.woff2");
    fx.document.set_attribute(link, "as", "font");

    let snapshot = fx.snapshot(link);
    let el = element(&snapshot);
    assert_eq!(attr(el, "href"), None);
    assert_eq!(attr(el, "rel"), None);
    assert_eq!(attr(el, "data-orig-href"), Some("font.woff2"));
    assert_eq!(attr(el, "data-orig-rel"), Some("preload"));
    assert_eq!(fx.assets.count(), 0);
}

#[test]
fn icon_links_and_video_posters_register_as_assets() {
    let mut fx = Fixture::new();
    let icon = fx.document.create_element("link");
    fx.document.append_child(fx.document.root(), icon);
    fx.document.set_attribute(icon, "rel", "icon");
    fx.document.set_attribute(icon, "href", "favicon.ico");
    let video = fx.document.create_element("video");
    fx.document.append_child(fx.document.root(), video);
    fx.document.set_attribute(video, "poster", "poster.jpg");

    let icon_snapshot = fx.snapshot(icon);
    assert_eq!(attr(element(&icon_snapshot), "href"), Some("asset:1"));
    let video_snapshot = fx.snapshot(video);
    assert_eq!(attr(element(&video_snapshot), "poster"), Some("asset:2"));
    assert_eq!(
        attr(element(&video_snapshot), "data-orig-poster"),
        Some("poster.jpg")
    );
}

#[test]
fn inline_style_attributes_are_rewritten() {
    let mut fx = Fixture::new();
    let div = fx.document.create_element("div");
    fx.document.append_child(fx.document.root(), div);
    fx.document
        .set_attribute(div, "style", "background: url('dot.gif')");

    let snapshot = fx.snapshot(div);
    assert_eq!(
        attr(element(&snapshot), "style"),
        Some("background: url('asset:1')")
    );
}

#[test]
fn open_shadow_trees_snapshot_and_closed_ones_do_not() {
    let mut fx = Fixture::new();
    let open_host = fx.document.create_element("x-open");
    fx.document.append_child(fx.document.root(), open_host);
    let open_root = fx.document.attach_shadow(open_host, ShadowMode::Open).unwrap();
    let inner = fx.document.create_element("span");
    fx.document.append_child(open_root, inner);

    let closed_host = fx.document.create_element("x-closed");
    fx.document.append_child(fx.document.root(), closed_host);
    let closed_root = fx
        .document
        .attach_shadow(closed_host, ShadowMode::Closed)
        .unwrap();
    let hidden = fx.document.create_element("b");
    fx.document.append_child(closed_root, hidden);

    let open_snapshot = fx.snapshot(open_host);
    assert_eq!(element(&open_snapshot).shadow_children.len(), 1);
    let closed_snapshot = fx.snapshot(closed_host);
    assert!(element(&closed_snapshot).shadow_children.is_empty());
}

#[test]
fn document_snapshots_carry_adopted_sheets() {
    let mut fx = Fixture::new();
    let html = fx.document.create_element("html");
    fx.document.append_child(fx.document.root(), html);
    let key = fx.document.create_sheet(
        Some("screen"),
        vec![":root { --bg: url(tile.png) }".to_owned()],
    );
    fx.document
        .set_adopted_sheets(AdoptTarget::Document, vec![key]);

    let mut ctx = SnapshotContext {
        document: &fx.document,
        ids: &mut fx.ids,
        assets: &mut fx.assets,
        sheets: &mut fx.sheets,
        exclude_sheet: None,
    };
    let snapshot = snapshot_document(&mut ctx).unwrap();
    assert_eq!(snapshot.adopted_style_sheets.len(), 1);
    let sheet = &snapshot.adopted_style_sheets[0];
    assert_eq!(sheet.media.as_deref(), Some("screen"));
    assert_eq!(sheet.css_text, ":root { --bg: url(asset:1) }");

    // The JSON rendering stays deterministic for comparisons.
    let rendered = printing::document_to_json_string(&snapshot);
    assert!(rendered.contains("\"adoptedStyleSheets\""));
}
