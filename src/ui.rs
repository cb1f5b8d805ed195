use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui;

use crate::app_state::{AppState, ThumbSlot};
use crate::capability;
use crate::config::ViewerConfig;
use crate::gpu::{OverlayCallback, SharedGpu, ViewerUniforms};
use crate::loader::{DecodeJob, Decoder, LoadKind};

const TILE_SIZE: egui::Vec2 = egui::vec2(200.0, 150.0);

pub struct GalleryApp {
    state: AppState,
    /// Grid tile that should take keyboard focus on the next frame,
    /// set when the overlay closes.
    pending_focus: Option<usize>,
}

pub fn create_app(cc: &eframe::CreationContext<'_>, folder: Option<PathBuf>) -> GalleryApp {
    let capability = capability::detected();
    let config = ViewerConfig::default().resolve(&capability);
    let shared_gpu = cc
        .wgpu_render_state
        .as_ref()
        .map(|rs| Arc::new(SharedGpu::new(rs)));
    let mut state = AppState::new(capability, config, shared_gpu, cc.egui_ctx.clone());
    if let Some(dir) = folder {
        state.load_folder(dir, 0.0);
    }
    GalleryApp {
        state,
        pending_focus: None,
    }
}

/// Overlay interactions collected during a frame and applied afterwards.
enum OverlayAction {
    Close,
    Next,
    Prev,
    Goto(usize),
}

impl eframe::App for GalleryApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);
        let state = &mut self.state;

        // Folder picker results (worker thread -> channel)
        let picked = state
            .folder_dialog_rx
            .as_ref()
            .and_then(|rx| rx.try_recv().ok());
        if let Some(dir) = picked {
            state.load_folder(dir, now);
        }

        pump_decodes(state, ctx);

        // 1. Top bar
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open Folder…").clicked() {
                    if let Some(tx) = state.folder_dialog_tx.clone() {
                        let repaint = ctx.clone();
                        std::thread::spawn(move || {
                            if let Some(dir) = rfd::FileDialog::new().pick_folder() {
                                let _ = tx.send(dir);
                                repaint.request_repaint();
                            }
                        });
                    }
                }
                if let Some(folder) = &state.folder {
                    ui.label(
                        egui::RichText::new(format!(
                            "{}  ({} images)",
                            folder.display(),
                            state.items.len()
                        ))
                        .weak(),
                    );
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if state.capability.reduced_motion {
                        ui.label(egui::RichText::new("reduced motion").small().weak());
                    }
                    if !state.capability.animated() {
                        ui.label(egui::RichText::new("simple viewer").small().weak())
                            .on_hover_text(state.capability.reason.clone());
                    }
                });
            });
        });

        // 2. Thumbnail grid
        let mut clicked: Option<(usize, egui::Rect)> = None;
        let pending_focus = self.pending_focus.take();
        egui::CentralPanel::default().show(ctx, |ui| {
            if state.items.is_empty() {
                ui.centered_and_justified(|ui| {
                    ui.label("Open a folder of images to start.");
                });
                return;
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.horizontal_wrapped(|ui| {
                    for i in 0..state.items.len() {
                        let (rect, response) =
                            ui.allocate_exact_size(TILE_SIZE, egui::Sense::click());
                        if i < state.thumb_rects.len() {
                            state.thumb_rects[i] = Some(rect);
                        }
                        if matches!(state.thumbs[i], ThumbSlot::Unloaded) {
                            state.thumbs[i] = ThumbSlot::Pending;
                            state.thumb_loader.request(DecodeJob {
                                epoch: state.gallery_epoch,
                                index: i,
                                kind: LoadKind::Thumbnail,
                                path: state.items[i].thumb_source().to_path_buf(),
                            });
                        }
                        draw_tile(ui, rect, &state.thumbs[i], &state.items[i].title);
                        if pending_focus == Some(i) {
                            response.request_focus();
                            response.scroll_to_me(None);
                        }
                        if response.has_focus() || response.hovered() {
                            ui.painter().rect_stroke(
                                rect,
                                4.0,
                                egui::Stroke::new(2.0, egui::Color32::from_gray(200)),
                            );
                        }
                        if response.clicked() {
                            clicked = Some((i, rect));
                        }
                    }
                });
            });
        });

        if let Some((index, origin)) = clicked {
            open_item(state, index, origin, ctx, now);
        }

        // 3. Animated viewer: advance and render the overlay
        let screen = ctx.screen_rect();
        let rects = state.thumb_rects.clone();
        let mut viewer_error = None;
        let mut overlay: Option<OverlayView> = None;
        if let Some(viewer) = state.viewer.as_mut() {
            if viewer.tick(now, screen, &rects) {
                ctx.request_repaint();
            }
            viewer_error = viewer.chrome_mut().take_error();
            if let Some(i) = viewer.chrome_mut().take_focus_return() {
                self.pending_focus = Some(i);
                ctx.request_repaint();
            }
            if viewer.chrome().overlay_visible {
                overlay = Some(OverlayView::gather(viewer, now));
            }
        }
        if let Some(e) = viewer_error {
            state.toast(e, now);
        }
        if let Some(view) = overlay {
            let actions = show_overlay(ctx, state.shared_gpu.clone(), &view, now);
            if let Some(viewer) = state.viewer.as_mut() {
                for action in actions {
                    match action {
                        OverlayAction::Close => viewer.close(now),
                        OverlayAction::Next => viewer.next(now),
                        OverlayAction::Prev => viewer.prev(now),
                        OverlayAction::Goto(i) => viewer.goto_index(i, now),
                    }
                }
            }
        }

        // 4. Fallback viewer: plain image swap with a fade
        show_simple_overlay(state, ctx);

        // Toast notification
        if let Some(msg) = state.toast_message.clone() {
            if now > state.toast_deadline {
                state.toast_message = None;
            } else {
                egui::Area::new("toast_notification")
                    .order(egui::Order::Tooltip)
                    .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -40.0))
                    .show(ctx, |ui| {
                        egui::Frame::none()
                            .fill(egui::Color32::from_rgb(180, 60, 60))
                            .rounding(6.0)
                            .inner_margin(10.0)
                            .show(ui, |ui| {
                                ui.label(egui::RichText::new(msg).color(egui::Color32::WHITE));
                            });
                    });
            }
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // teardown hook: the window is about to go away
        self.state.teardown_viewer();
    }
}

fn open_item(state: &mut AppState, index: usize, origin: egui::Rect, ctx: &egui::Context, now: f64) {
    if state.capability.animated() {
        state.ensure_viewer(ctx);
        if let Some(viewer) = state.viewer.as_mut() {
            viewer.open(index, origin, ctx.screen_rect(), now);
        }
    } else {
        simple_open(state, index);
    }
}

fn simple_open(state: &mut AppState, index: usize) {
    state.simple_index = Some(index);
    state.simple_texture = None;
    state.thumb_loader.request(DecodeJob {
        epoch: state.gallery_epoch,
        index,
        kind: LoadKind::Source,
        path: state.items[index]
            .source_for(&state.config.source_key)
            .to_path_buf(),
    });
}

fn pump_decodes(state: &mut AppState, ctx: &egui::Context) {
    while let Some(res) = state.thumb_loader.poll() {
        if res.epoch != state.gallery_epoch {
            continue;
        }
        match res.kind {
            LoadKind::Thumbnail => {
                let slot = match res.result {
                    Ok(img) => {
                        let color = egui::ColorImage::from_rgba_unmultiplied(
                            [img.width as usize, img.height as usize],
                            &img.pixels,
                        );
                        ThumbSlot::Ready(ctx.load_texture(
                            format!("thumb_{}", res.index),
                            color,
                            egui::TextureOptions::LINEAR,
                        ))
                    }
                    Err(_) => ThumbSlot::Failed,
                };
                if let Some(s) = state.thumbs.get_mut(res.index) {
                    *s = slot;
                }
            }
            LoadKind::Source => {
                if state.simple_index == Some(res.index) {
                    if let Ok(img) = res.result {
                        let color = egui::ColorImage::from_rgba_unmultiplied(
                            [img.width as usize, img.height as usize],
                            &img.pixels,
                        );
                        state.simple_texture = Some(ctx.load_texture(
                            format!("full_{}", res.index),
                            color,
                            egui::TextureOptions::LINEAR,
                        ));
                    }
                }
            }
        }
    }
}

fn draw_tile(ui: &egui::Ui, rect: egui::Rect, slot: &ThumbSlot, title: &str) {
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 4.0, egui::Color32::from_gray(30));
    match slot {
        ThumbSlot::Ready(tex) => {
            let size = tex.size_vec2();
            painter.image(
                tex.id(),
                fit_rect(rect.shrink(4.0), size),
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
        ThumbSlot::Failed => {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "⚠",
                egui::FontId::proportional(24.0),
                egui::Color32::from_gray(120),
            );
        }
        _ => {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "…",
                egui::FontId::proportional(18.0),
                egui::Color32::from_gray(90),
            );
        }
    }
    painter.text(
        rect.left_bottom() + egui::vec2(6.0, -6.0),
        egui::Align2::LEFT_BOTTOM,
        title,
        egui::FontId::proportional(11.0),
        egui::Color32::from_gray(180),
    );
}

fn fit_rect(bounds: egui::Rect, size: egui::Vec2) -> egui::Rect {
    let scale = (bounds.width() / size.x)
        .min(bounds.height() / size.y)
        .min(1.0);
    egui::Rect::from_center_size(bounds.center(), size * scale)
}

/// Chrome snapshot taken while the viewer is mutably borrowed, rendered
/// afterwards.
struct OverlayView {
    backdrop_alpha: f32,
    caption: String,
    counter: String,
    controls_enabled: bool,
    current: usize,
    len: usize,
    dots: Vec<usize>,
    shared_draw: Option<crate::viewer::DrawParams>,
}

impl OverlayView {
    fn gather(viewer: &crate::viewer::Viewer, now: f64) -> Self {
        let chrome = viewer.chrome();
        let len = viewer.items().len();
        let current = viewer.current_index().unwrap_or(0);
        Self {
            backdrop_alpha: chrome.backdrop_alpha,
            caption: chrome.caption.clone(),
            counter: chrome.counter.clone(),
            controls_enabled: chrome.controls_enabled,
            current,
            len,
            dots: chrome.dots.range(len).collect(),
            shared_draw: viewer.draw_params(now),
        }
    }
}

fn show_overlay(
    ctx: &egui::Context,
    shared_gpu: Option<Arc<SharedGpu>>,
    view: &OverlayView,
    now: f64,
) -> Vec<OverlayAction> {
    let mut actions = Vec::new();
    let screen = ctx.screen_rect();

    ctx.input(|i| {
        if i.key_pressed(egui::Key::Escape) {
            actions.push(OverlayAction::Close);
        }
        if i.key_pressed(egui::Key::ArrowRight) {
            actions.push(OverlayAction::Next);
        }
        if i.key_pressed(egui::Key::ArrowLeft) {
            actions.push(OverlayAction::Prev);
        }
    });

    egui::Area::new("viewer_overlay")
        .order(egui::Order::Foreground)
        .fixed_pos(screen.min)
        .show(ctx, |ui| {
            let response = ui.allocate_rect(screen, egui::Sense::click());
            let painter = ui.painter_at(screen);

            painter.rect_filled(
                screen,
                0.0,
                egui::Color32::from_black_alpha((235.0 * view.backdrop_alpha) as u8),
            );

            if let (Some(shared), Some(params)) = (shared_gpu, &view.shared_draw) {
                let uniforms = ViewerUniforms {
                    viewport: [screen.width(), screen.height()],
                    plane: params.plane,
                    progress: params.progress,
                    dispersion: params.dispersion,
                    texture_mix: params.texture_mix,
                    time: now as f32,
                    point_size: params.point_size,
                    open_mode: if params.opening { 1.0 } else { 0.0 },
                    sprite_opacity: params.sprite_opacity,
                    plane_opacity: params.plane_opacity,
                    pixels_per_point: ctx.pixels_per_point(),
                    _pad: [0.0; 3],
                };
                painter.add(egui_wgpu::Callback::new_paint_callback(
                    screen,
                    OverlayCallback {
                        shared,
                        uniforms,
                        geometry: params.geometry.clone(),
                        material: params.material.clone(),
                    },
                ));
            }

            // chrome: close, prev/next, caption, counter, dots
            let close_rect =
                egui::Rect::from_center_size(screen.right_top() + egui::vec2(-32.0, 32.0), egui::vec2(32.0, 32.0));
            if ui
                .put(
                    close_rect,
                    egui::Button::new(egui::RichText::new("✕").size(18.0)).frame(false),
                )
                .clicked()
            {
                actions.push(OverlayAction::Close);
            }

            if view.len > 1 {
                let prev_rect = egui::Rect::from_center_size(
                    egui::pos2(screen.left() + 28.0, screen.center().y),
                    egui::vec2(36.0, 48.0),
                );
                let next_rect = egui::Rect::from_center_size(
                    egui::pos2(screen.right() - 28.0, screen.center().y),
                    egui::vec2(36.0, 48.0),
                );
                let prev = ui.add_enabled_ui(view.controls_enabled, |ui| {
                    ui.put(
                        prev_rect,
                        egui::Button::new(egui::RichText::new("‹").size(28.0)).frame(false),
                    )
                });
                if prev.inner.clicked() {
                    actions.push(OverlayAction::Prev);
                }
                let next = ui.add_enabled_ui(view.controls_enabled, |ui| {
                    ui.put(
                        next_rect,
                        egui::Button::new(egui::RichText::new("›").size(28.0)).frame(false),
                    )
                });
                if next.inner.clicked() {
                    actions.push(OverlayAction::Next);
                }
            }

            painter.text(
                egui::pos2(screen.left() + 16.0, screen.top() + 14.0),
                egui::Align2::LEFT_TOP,
                &view.counter,
                egui::FontId::proportional(13.0),
                egui::Color32::from_gray(200),
            );
            if !view.caption.is_empty() {
                painter.text(
                    egui::pos2(screen.center().x, screen.bottom() - 44.0),
                    egui::Align2::CENTER_BOTTOM,
                    &view.caption,
                    egui::FontId::proportional(14.0),
                    egui::Color32::from_gray(220),
                );
            }

            // pagination dots: sliding window, current highlighted
            if view.len > 1 {
                let dot_gap = 16.0;
                let width = view.dots.len() as f32 * dot_gap;
                let mut x = screen.center().x - width * 0.5 + dot_gap * 0.5;
                let y = screen.bottom() - 22.0;
                for &i in &view.dots {
                    let center = egui::pos2(x, y);
                    let (radius, color) = if i == view.current {
                        (4.5, egui::Color32::WHITE)
                    } else {
                        (3.0, egui::Color32::from_gray(130))
                    };
                    painter.circle_filled(center, radius, color);
                    let hit = egui::Rect::from_center_size(center, egui::vec2(14.0, 14.0));
                    let resp = ui.interact(hit, ui.id().with(("dot", i)), egui::Sense::click());
                    if resp.clicked() && view.controls_enabled {
                        actions.push(OverlayAction::Goto(i));
                    }
                    x += dot_gap;
                }
            }

            // clicking the backdrop (not a control) closes
            if response.clicked() {
                actions.push(OverlayAction::Close);
            }
        });

    actions
}

/// The non-animated collaborator path: decoded image, centered, with an
/// egui-driven fade. Kept intentionally minimal.
fn show_simple_overlay(state: &mut AppState, ctx: &egui::Context) {
    let open = state.simple_index.is_some();
    let t = ctx.animate_bool("simple_overlay_fade".into(), open);
    if t <= 0.0 {
        return;
    }
    let screen = ctx.screen_rect();
    let mut close = false;
    let mut step: i64 = 0;
    ctx.input(|i| {
        if i.key_pressed(egui::Key::Escape) {
            close = true;
        }
        if i.key_pressed(egui::Key::ArrowRight) {
            step = 1;
        }
        if i.key_pressed(egui::Key::ArrowLeft) {
            step = -1;
        }
    });
    egui::Area::new("simple_overlay")
        .order(egui::Order::Foreground)
        .fixed_pos(screen.min)
        .show(ctx, |ui| {
            let response = ui.allocate_rect(screen, egui::Sense::click());
            let painter = ui.painter_at(screen);
            painter.rect_filled(
                screen,
                0.0,
                egui::Color32::from_black_alpha((235.0 * t) as u8),
            );
            if let Some(tex) = &state.simple_texture {
                let tint =
                    egui::Color32::from_white_alpha((255.0 * t) as u8);
                painter.image(
                    tex.id(),
                    fit_rect(screen.shrink(40.0), tex.size_vec2()),
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    tint,
                );
            }
            if response.clicked() {
                close = true;
            }
        });

    if open && close {
        state.simple_index = None;
    } else if open && step != 0 && state.items.len() > 1 {
        if let Some(current) = state.simple_index {
            let len = state.items.len() as i64;
            let target = ((current as i64 + step).rem_euclid(len)) as usize;
            simple_open(state, target);
        }
    }
}
