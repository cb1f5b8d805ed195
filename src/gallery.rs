//! Gallery item discovery: a `gallery.json` manifest when present, otherwise
//! a plain folder scan of image files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const MANIFEST_NAME: &str = "gallery.json";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif"];

/// One viewable image. `sources` maps source keys ("src", "full", ...) to
/// file paths; every item is guaranteed to carry at least one entry.
#[derive(Clone, Debug)]
pub struct GalleryItem {
    pub title: String,
    pub sources: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    title: Option<String>,
    #[serde(flatten)]
    sources: BTreeMap<String, String>,
}

impl GalleryItem {
    pub fn from_path(path: PathBuf) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut sources = BTreeMap::new();
        sources.insert("src".to_string(), path);
        Self { title, sources }
    }

    /// Resolve the configured source key, falling back to "src" and then to
    /// whatever the item carries.
    pub fn source_for(&self, key: &str) -> &Path {
        self.sources
            .get(key)
            .or_else(|| self.sources.get("src"))
            .or_else(|| self.sources.values().next())
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// The standard (grid/thumbnail) source.
    pub fn thumb_source(&self) -> &Path {
        self.source_for("src")
    }
}

/// Load items from a folder: manifest first, scan as fallback. An empty
/// result is not an error here; the caller decides what an empty gallery
/// means.
pub fn load_folder(dir: &Path) -> Result<Vec<GalleryItem>> {
    let manifest = dir.join(MANIFEST_NAME);
    if manifest.is_file() {
        let text = std::fs::read_to_string(&manifest)
            .with_context(|| format!("reading {}", manifest.display()))?;
        return items_from_manifest(&text, dir);
    }
    scan_folder(dir)
}

pub fn items_from_manifest(json: &str, base: &Path) -> Result<Vec<GalleryItem>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(json).context("parsing gallery manifest")?;
    let mut items = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let sources: BTreeMap<String, PathBuf> = entry
            .sources
            .into_iter()
            .map(|(k, v)| (k, base.join(v)))
            .collect();
        if sources.is_empty() {
            eprintln!("[gallery] manifest entry {i} has no sources, skipping");
            continue;
        }
        let title = entry.title.unwrap_or_else(|| {
            sources
                .values()
                .next()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        items.push(GalleryItem { title, sources });
    }
    Ok(items)
}

fn scan_folder(dir: &Path) -> Result<Vec<GalleryItem>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_image_file(p))
        .collect();
    paths.sort();
    Ok(paths.into_iter().map(GalleryItem::from_path).collect())
}

pub fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| {
                IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str())
            })
}
