//! Typed, generation-checked resource handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A small integer handle into a [`Pool`](crate::pool::Pool).
///
/// The tag parameter keeps handles of different pools from being mixed up;
/// the generation detects use of a slot after it has been freed and reused.
pub struct Handle<T> {
    index: u16,
    generation: u16,
    _tag: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u16, generation: u16) -> Self {
        Self {
            index,
            generation,
            _tag: PhantomData,
        }
    }

    /// Slot index inside the owning pool.
    #[must_use]
    pub fn index(self) -> u16 {
        self.index
    }

    /// Generation of the slot at the time the handle was issued.
    #[must_use]
    pub fn generation(self) -> u16 {
        self.generation
    }
}

// Manual impls: deriving would put bounds on the tag type.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// Handle tags, one per pool kind.
pub mod tag {
    /// Mesh pool.
    pub enum Mesh {}
    /// Texture pool.
    pub enum Texture {}
    /// Offscreen target pool.
    pub enum Target {}
    /// Shader pool.
    pub enum Shader {}
    /// Material pool.
    pub enum Material {}
    /// Render passes of a graph.
    pub enum Pass {}
    /// Draw calls of a pass.
    pub enum DrawCall {}
}

pub type MeshHandle = Handle<tag::Mesh>;
pub type TextureHandle = Handle<tag::Texture>;
pub type TargetHandle = Handle<tag::Target>;
pub type ShaderHandle = Handle<tag::Shader>;
pub type MaterialHandle = Handle<tag::Material>;
pub type PassHandle = Handle<tag::Pass>;
pub type DrawCallHandle = Handle<tag::DrawCall>;
