//! Rewrites placeholder URL schemes in a style document into local file URLs.
//!
//! Fixtures reference their resources through `local://` and through the vendor
//! `mapbox://` scheme. Vendor references are first mapped onto the matching
//! fixture sub-directory (`glyphs`, `tilesets`, `tiles`, or the fixture root for
//! sprites and everything else) and only then is `local://` replaced by the
//! integration fixture root, so nothing vendor-prefixed survives the rewrite.

use crate::config::FixturePaths;
use serde_json::Value;
use std::borrow::Cow;
use std::path::PathBuf;

/// Placeholder scheme for files below the integration fixture root.
pub const LOCAL_SCHEME: &str = "local://";
/// Vendor scheme for hosted sprites, glyphs, tiles and tilesets.
pub const VENDOR_SCHEME: &str = "mapbox://";

const VENDOR_FONTS: &str = "mapbox://fonts";
const LOCAL_GLYPHS: &str = "local://glyphs";
const LOCAL_TILESETS: &str = "local://tilesets/";
const LOCAL_TILES: &str = "local://tiles/";

/// What a URL-bearing field points at; selects the vendor mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Root `glyphs` template.
    Glyphs,
    /// TileJSON reference in a source `url`.
    Tileset,
    /// Tile URL template in a source `tiles` array.
    Tile,
    /// Sprites, images, videos, GeoJSON data.
    Other,
}

/// Rewrites `local://` and `mapbox://` URLs in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlLocalizer {
    local_root: String,
}

impl UrlLocalizer {
    /// Localizer targeting the integration fixture root of `paths`.
    #[must_use]
    pub fn new(paths: &FixturePaths) -> Self {
        Self::with_local_root(format!("file://{}/", paths.integration().display()))
    }

    /// Localizer replacing `local://` by an arbitrary prefix.
    #[must_use]
    pub fn with_local_root(local_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
        }
    }

    #[must_use]
    pub fn local_root(&self) -> &str {
        &self.local_root
    }

    /// Localizes every URL-bearing field of a style document: all sources,
    /// `glyphs` and `sprite`. Other fields are left untouched.
    pub fn localize_style(&self, style: &mut Value) {
        let Some(root) = style.as_object_mut() else {
            return;
        };

        if let Some(sources) = root.get_mut("sources") {
            self.localize_sources(sources);
        }

        if let Some(glyphs) = root.get_mut("glyphs") {
            self.rewrite(glyphs, ResourceKind::Glyphs);
        }

        if let Some(sprite) = root.get_mut("sprite") {
            match sprite {
                Value::Array(sprites) => {
                    for entry in sprites {
                        if let Some(url) = entry.get_mut("url") {
                            self.rewrite(url, ResourceKind::Other);
                        }
                    }
                }
                other => self.rewrite(other, ResourceKind::Other),
            }
        }
    }

    /// Localizes every entry of a `sources` map.
    pub fn localize_sources(&self, sources: &mut Value) {
        let Some(sources) = sources.as_object_mut() else {
            return;
        };
        for source in sources.values_mut() {
            self.localize_source(source);
        }
    }

    /// Localizes the URL fields of one source definition, chosen by its `type`.
    pub fn localize_source(&self, source: &mut Value) {
        let source_type = source
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let Some(fields) = source.as_object_mut() else {
            return;
        };

        match source_type.as_str() {
            "vector" | "raster" | "raster-dem" => {
                if let Some(url) = fields.get_mut("url") {
                    self.rewrite(url, ResourceKind::Tileset);
                }
                if let Some(tiles) = fields.get_mut("tiles") {
                    self.rewrite_each(tiles, ResourceKind::Tile);
                }
            }
            "image" => {
                if let Some(url) = fields.get_mut("url") {
                    self.rewrite(url, ResourceKind::Other);
                }
            }
            "video" => {
                if let Some(urls) = fields.get_mut("urls") {
                    self.rewrite_each(urls, ResourceKind::Other);
                }
            }
            // GeoJSON and anything else: `data` is a URL only when it is a string.
            _ => {
                if let Some(data) = fields.get_mut("data") {
                    self.rewrite(data, ResourceKind::Other);
                }
            }
        }
    }

    /// Localizes a single URL.
    #[must_use]
    pub fn localize_url(&self, url: &str, kind: ResourceKind) -> String {
        devendor(url, kind).replace(LOCAL_SCHEME, &self.local_root)
    }

    fn rewrite(&self, value: &mut Value, kind: ResourceKind) {
        if let Value::String(url) = value {
            *url = self.localize_url(url, kind);
        }
    }

    fn rewrite_each(&self, values: &mut Value, kind: ResourceKind) {
        if let Value::Array(items) = values {
            for item in items {
                self.rewrite(item, kind);
            }
        }
    }
}

/// Maps vendor URLs onto `local://` fixture sub-directories.
fn devendor(url: &str, kind: ResourceKind) -> Cow<'_, str> {
    if url.contains(VENDOR_FONTS) {
        return Cow::Owned(url.replace(VENDOR_FONTS, LOCAL_GLYPHS));
    }
    if !url.contains(VENDOR_SCHEME) {
        return Cow::Borrowed(url);
    }
    let target = match kind {
        ResourceKind::Tileset => LOCAL_TILESETS,
        ResourceKind::Tile => LOCAL_TILES,
        ResourceKind::Glyphs | ResourceKind::Other => LOCAL_SCHEME,
    };
    Cow::Owned(url.replace(VENDOR_SCHEME, target))
}

/// Resolves a `local://` style file reference.
///
/// The vector tile fixtures are tried first, then the vendored styles, then the
/// integration fixture root. The first candidate that exists wins; if none does
/// the integration candidate is returned unresolved.
#[must_use]
pub fn localize_style_path(url: &str, paths: &FixturePaths) -> PathBuf {
    let search = [
        paths.mvt_fixtures(),
        paths.vendor_styles(),
        paths.integration(),
    ];
    let mut candidate = PathBuf::new();
    for dir in search {
        candidate = PathBuf::from(url.replace(LOCAL_SCHEME, &format!("{}/", dir.display())));
        if candidate.exists() {
            break;
        }
    }
    candidate
}
