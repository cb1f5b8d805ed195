use crate::field::ParticleField;
use crate::gpu::{GeometryGuard, MaterialGuard, TextureGuard};

/// Everything bound to one displayed image: GPU guards, the particle field,
/// and the screen rect the particles anchor to. Replaced atomically by the
/// state machine; dropping a session releases every guard.
pub struct Session {
    pub index: usize,
    /// Decoded pixel dimensions of the displayed source.
    pub natural: (u32, u32),
    /// Thumbnail rect the start positions were sampled from.
    pub origin: egui::Rect,
    pub field: ParticleField,
    pub texture: TextureGuard,
    /// Populated only while a navigation morph is in flight.
    pub next_texture: Option<TextureGuard>,
    pub next_natural: Option<(u32, u32)>,
    pub geometry: GeometryGuard,
    pub material: MaterialGuard,
}

impl Session {
    pub fn sprite_count(&self) -> u32 {
        self.geometry.count()
    }

    /// Promote the pending navigation texture to current. Returns false when
    /// no swap is pending.
    pub fn promote_next(&mut self) -> bool {
        let (Some(tex), Some(natural)) = (self.next_texture.take(), self.next_natural.take())
        else {
            return false;
        };
        self.texture = tex;
        self.natural = natural;
        true
    }

    /// Drop a pending navigation texture without promoting it (aborted or
    /// cancelled morph).
    pub fn discard_next(&mut self) {
        self.next_texture = None;
        self.next_natural = None;
    }
}
