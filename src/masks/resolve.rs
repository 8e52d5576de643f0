//! Authored-mask file resolution.
//!
//! Candidate URLs derive from the tile's albedo path by inserting the mask
//! suffix before the extension and trying known extensions in priority
//! order. Existence is confirmed only against a host-provided directory
//! listing; the resolver never issues speculative fetches that could 404.
//! Both hits and misses are cached so probing never repeats.

use std::collections::HashMap;

use anyhow::Result;

use crate::host::SceneHost;
use crate::masks::MaskKind;

/// Extensions probed after the tile's own, in priority order.
const FALLBACK_EXTENSIONS: &[&str] = &["webp", "png", "jpg", "jpeg"];

#[derive(Default)]
pub struct MaskResolver {
    /// Directory path → lowercase file-name set, fetched once per directory.
    listings: HashMap<String, Option<Vec<String>>>,
    /// (albedo path, kind) → resolved URL. `None` is cached too.
    resolved: HashMap<(String, MaskKind), Option<String>>,
}

/// An albedo path split into the parts mask probing needs.
struct SplitPath<'a> {
    dir: &'a str,
    stem: &'a str,
    ext: &'a str,
    query: &'a str,
}

fn split_albedo_path(path: &str) -> SplitPath<'_> {
    let (without_query, query) = match path.find('?') {
        Some(idx) => (&path[..idx], &path[idx..]),
        None => (path, ""),
    };
    let (dir, file) = match without_query.rfind('/') {
        Some(idx) => (&without_query[..idx], &without_query[idx + 1..]),
        None => ("", without_query),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(idx) => (&file[..idx], &file[idx + 1..]),
        None => (file, ""),
    };
    SplitPath { dir, stem, ext, query }
}

impl MaskResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the mask URL for `(albedo_path, kind)`, consulting the host
    /// directory listing at most once per directory. Returns `Ok(None)` when
    /// no sibling file exists; that result is cached.
    pub fn resolve(
        &mut self,
        host: &dyn SceneHost,
        albedo_path: &str,
        kind: MaskKind,
    ) -> Result<Option<String>> {
        debug_assert!(kind.is_authored(), "FloorAlpha is generated, not resolved");
        let cache_key = (albedo_path.to_string(), kind);
        if let Some(cached) = self.resolved.get(&cache_key) {
            return Ok(cached.clone());
        }

        let split = split_albedo_path(albedo_path);
        let listing = self.listing_for(host, split.dir)?;

        let resolved = listing.and_then(|files| {
            for ext in candidate_extensions(split.ext) {
                let candidate = format!("{}{}.{}", split.stem, kind.suffix(), ext);
                let candidate_lower = candidate.to_ascii_lowercase();
                if files.iter().any(|f| *f == candidate_lower) {
                    let full = if split.dir.is_empty() {
                        format!("{candidate}{}", split.query)
                    } else {
                        format!("{}/{candidate}{}", split.dir, split.query)
                    };
                    return Some(full);
                }
            }
            None
        });

        self.resolved.insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    /// Drop every cached resolution for tiles under the given albedo path.
    /// Called when a tile's texture source changes.
    pub fn invalidate_path(&mut self, albedo_path: &str) {
        self.resolved.retain(|(path, _), _| path != albedo_path);
    }

    /// Drop everything, including directory listings.
    pub fn clear(&mut self) {
        self.listings.clear();
        self.resolved.clear();
    }

    fn listing_for(&mut self, host: &dyn SceneHost, dir: &str) -> Result<Option<&Vec<String>>> {
        if !self.listings.contains_key(dir) {
            let listing = match host.list_directory_files(dir) {
                Ok(files) => Some(
                    files
                        .into_iter()
                        .map(|f| f.to_ascii_lowercase())
                        .collect::<Vec<_>>(),
                ),
                Err(e) => {
                    eprintln!("[masks] directory listing failed for '{dir}': {e:#}");
                    None
                }
            };
            self.listings.insert(dir.to_string(), listing);
        }
        Ok(self.listings.get(dir).and_then(|l| l.as_ref()))
    }
}

/// The tile's own extension first, then the fallbacks, deduplicated.
fn candidate_extensions(own: &str) -> Vec<String> {
    let own_lower = own.to_ascii_lowercase();
    let mut out = Vec::with_capacity(1 + FALLBACK_EXTENSIONS.len());
    if !own_lower.is_empty() {
        out.push(own_lower.clone());
    }
    for ext in FALLBACK_EXTENSIONS {
        if *ext != own_lower {
            out.push((*ext).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests_support::ListingHost;

    #[test]
    fn split_handles_query_strings_and_bare_names() {
        let split = split_albedo_path("maps/tavern/map.webp?v=3");
        assert_eq!(split.dir, "maps/tavern");
        assert_eq!(split.stem, "map");
        assert_eq!(split.ext, "webp");
        assert_eq!(split.query, "?v=3");

        let bare = split_albedo_path("map.png");
        assert_eq!(bare.dir, "");
        assert_eq!(bare.stem, "map");
        assert_eq!(bare.ext, "png");
    }

    #[test]
    fn own_extension_probes_first_then_fallbacks() {
        let exts = candidate_extensions("png");
        assert_eq!(exts[0], "png");
        assert_eq!(exts[1], "webp");
        assert!(!exts[2..].contains(&"png".to_string()));

        let exts = candidate_extensions("");
        assert_eq!(exts[0], "webp");
    }

    #[test]
    fn resolves_sibling_and_reattaches_query() {
        let host = ListingHost::new("maps", &["map.webp", "map_water.png"]);
        let mut resolver = MaskResolver::new();
        let url = resolver
            .resolve(&host, "maps/map.webp?cachebust=9", MaskKind::Water)
            .unwrap();
        // Own extension (.webp) misses, .png fallback hits; query reattached.
        assert_eq!(url.as_deref(), Some("maps/map_Water.png?cachebust=9"));
    }

    #[test]
    fn misses_are_cached_and_listing_fetched_once() {
        let host = ListingHost::new("maps", &["map.webp"]);
        let mut resolver = MaskResolver::new();
        for _ in 0..3 {
            let url = resolver
                .resolve(&host, "maps/map.webp", MaskKind::Specular)
                .unwrap();
            assert!(url.is_none());
        }
        assert_eq!(host.listing_calls(), 1);
    }

    #[test]
    fn invalidate_path_drops_only_that_tile() {
        let host = ListingHost::new("maps", &["a_Outdoors.webp", "b_Outdoors.webp"]);
        let mut resolver = MaskResolver::new();
        resolver.resolve(&host, "maps/a.webp", MaskKind::Outdoors).unwrap();
        resolver.resolve(&host, "maps/b.webp", MaskKind::Outdoors).unwrap();
        resolver.invalidate_path("maps/a.webp");
        assert!(resolver.resolved.contains_key(&("maps/b.webp".to_string(), MaskKind::Outdoors)));
        assert!(!resolver.resolved.contains_key(&("maps/a.webp".to_string(), MaskKind::Outdoors)));
    }
}
