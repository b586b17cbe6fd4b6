//! CSS `url(...)` discovery and rewriting.

use std::sync::LazyLock;

use log::debug;
use regex::{Captures, Regex};
use url::Url;

use crate::assets::AssetTracker;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(['"]?)([^'"\)]+)\1\s*\)"#).expect("css url pattern")
});

/// Whether a reference is left untouched by the rewriter.
fn is_opaque(raw: &str) -> bool {
    raw.starts_with("data:") || raw.starts_with("asset:") || raw.starts_with("blob:")
}

/// Rewrite every `url(...)` reference in a block of CSS to
/// `url(asset:<id>)`, registering each discovered URL with the tracker.
///
/// `data:`, `blob:`, and already-rewritten `asset:` references pass
/// through, as do URLs that fail to resolve against `base`. The original
/// quoting of each reference is preserved.
#[must_use]
pub fn rewrite_css_urls(css: &str, base: &Url, assets: &mut AssetTracker) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures<'_>| {
            let quote = &caps[1];
            let raw = caps[2].trim();
            if is_opaque(raw) {
                return caps[0].to_owned();
            }
            let Ok(resolved) = base.join(raw) else {
                debug!("leaving malformed css url untouched: {raw}");
                return caps[0].to_owned();
            };
            let id = assets.assign(resolved.as_str(), None, None);
            format!("url({quote}asset:{id}{quote})")
        })
        .into_owned()
}

/// Rewrite the entries of a `srcset` attribute value, registering each
/// candidate URL. Descriptors are preserved.
#[must_use]
pub fn rewrite_srcset(srcset: &str, base: &Url, assets: &mut AssetTracker) -> String {
    let entries: Vec<String> = srcset
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(2, char::is_whitespace);
            let raw = parts.next().unwrap_or_default();
            let descriptor = parts.next().map(str::trim).filter(|d| !d.is_empty());
            if is_opaque(raw) {
                return entry.to_owned();
            }
            let Ok(resolved) = base.join(raw) else {
                return entry.to_owned();
            };
            let id = assets.assign(resolved.as_str(), None, None);
            match descriptor {
                Some(descriptor) => format!("asset:{id} {descriptor}"),
                None => format!("asset:{id}"),
            }
        })
        .collect();
    entries.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.test/styles/site.css").unwrap()
    }

    #[test]
    fn rewrites_register_and_skip_opaque_urls() {
        let mut assets = AssetTracker::new();
        let css =
            "background: url(\"x.png\"), url(asset:5), url('data:image/png;base64,AAA')";
        let out = rewrite_css_urls(css, &base(), &mut assets);
        assert_eq!(
            out,
            "background: url(\"asset:1\"), url(asset:5), url('data:image/png;base64,AAA')"
        );
        assert_eq!(assets.count(), 1);
        assert_eq!(
            assets.get("https://example.test/styles/x.png"),
            Some(1)
        );
    }

    #[test]
    fn quoting_is_preserved() {
        let mut assets = AssetTracker::new();
        let out = rewrite_css_urls("url(a.png) url('b.png')", &base(), &mut assets);
        assert_eq!(out, "url(asset:1) url('asset:2')");
    }

    #[test]
    fn duplicate_urls_share_one_id() {
        let mut assets = AssetTracker::new();
        let out = rewrite_css_urls("url(a.png) url(./a.png)", &base(), &mut assets);
        assert_eq!(out, "url(asset:1) url(asset:1)");
        assert_eq!(assets.count(), 1);
    }

    #[test]
    fn srcset_entries_keep_descriptors() {
        let mut assets = AssetTracker::new();
        let out = rewrite_srcset("a.png 1x, b.png 2x", &base(), &mut assets);
        assert_eq!(out, "asset:1 1x, asset:2 2x");
    }
}
