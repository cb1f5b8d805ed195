use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::capability::Capability;
use crate::config::ViewerConfig;
use crate::gallery::{self, GalleryItem};
use crate::gpu::{HeadlessFactory, SessionFactory, SharedGpu, WgpuFactory};
use crate::loader::ImageLoader;
use crate::viewer::Viewer;

pub enum ThumbSlot {
    Unloaded,
    Pending,
    Ready(egui::TextureHandle),
    Failed,
}

pub struct AppState {
    pub folder: Option<PathBuf>,
    pub items: Vec<GalleryItem>,
    pub thumbs: Vec<ThumbSlot>,
    /// Screen rects of the grid tiles, refreshed every frame; the viewer
    /// anchors particle fields to these.
    pub thumb_rects: Vec<Option<egui::Rect>>,
    pub viewer: Option<Viewer>,
    pub capability: Capability,
    pub config: ViewerConfig,
    pub shared_gpu: Option<Arc<SharedGpu>>,
    pub thumb_loader: ImageLoader,
    /// Invalidates in-flight thumbnail decodes across gallery reloads.
    pub gallery_epoch: u64,

    pub folder_dialog_rx: Option<Receiver<PathBuf>>,
    pub folder_dialog_tx: Option<Sender<PathBuf>>,

    pub toast_message: Option<String>,
    pub toast_deadline: f64,

    // Fallback (non-animated) path: plain image swap with a fade.
    pub simple_index: Option<usize>,
    pub simple_texture: Option<egui::TextureHandle>,
}

impl AppState {
    pub fn new(
        capability: Capability,
        config: ViewerConfig,
        shared_gpu: Option<Arc<SharedGpu>>,
        ctx: egui::Context,
    ) -> Self {
        let (tx, rx) = channel();
        Self {
            folder: None,
            items: Vec::new(),
            thumbs: Vec::new(),
            thumb_rects: Vec::new(),
            viewer: None,
            capability,
            config,
            shared_gpu,
            thumb_loader: ImageLoader::new(Some(ctx)),
            gallery_epoch: 0,
            folder_dialog_rx: Some(rx),
            folder_dialog_tx: Some(tx),
            toast_message: None,
            toast_deadline: 0.0,
            simple_index: None,
            simple_texture: None,
        }
    }

    /// Tear down the current viewer session and every binding that belongs
    /// to it. Called before a gallery switch and on app exit, so repeated
    /// load/teardown cycles cannot leak GPU resources.
    pub fn teardown_viewer(&mut self) {
        if let Some(viewer) = self.viewer.as_mut() {
            viewer.destroy();
        }
        self.viewer = None;
        self.simple_index = None;
        self.simple_texture = None;
    }

    /// Switch the gallery to `dir`: full teardown, then re-initialization
    /// from the new folder's manifest or file listing.
    pub fn load_folder(&mut self, dir: PathBuf, now: f64) {
        self.teardown_viewer();
        self.gallery_epoch += 1;
        match gallery::load_folder(&dir) {
            Ok(items) => {
                if items.is_empty() {
                    self.toast(format!("no images found in {}", dir.display()), now);
                }
                self.thumbs = items.iter().map(|_| ThumbSlot::Unloaded).collect();
                self.thumb_rects = vec![None; items.len()];
                self.items = items;
                self.folder = Some(dir);
            }
            Err(e) => {
                eprintln!("[gallery] {:#}", e);
                self.toast(format!("{e:#}"), now);
            }
        }
    }

    /// Build the animated viewer lazily, once items exist. The factory is
    /// GPU-backed when eframe gave us a wgpu render state and ledger-only
    /// otherwise, so the app still runs (invisibly but correctly) headless.
    pub fn ensure_viewer(&mut self, ctx: &egui::Context) {
        if self.viewer.is_some() || self.items.is_empty() || !self.capability.animated() {
            return;
        }
        let factory: Box<dyn SessionFactory> = match &self.shared_gpu {
            Some(shared) => Box::new(WgpuFactory::new(shared.clone())),
            None => Box::new(HeadlessFactory::new()),
        };
        let decoder = Box::new(ImageLoader::new(Some(ctx.clone())));
        match Viewer::new(
            self.items.clone(),
            self.config.clone(),
            self.capability.clone(),
            factory,
            decoder,
        ) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(e) => eprintln!("[viewer] {:#}", e),
        }
    }

    pub fn toast(&mut self, message: String, now: f64) {
        self.toast_message = Some(message);
        self.toast_deadline = now + 4.0;
    }
}
