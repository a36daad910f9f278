use crate::expansion::{Macros, Services};
use crate::primitives::Primitives;

/// Expansion context threaded explicitly through build and merge calls.
///
/// Each component is optional; a rule that needs an absent component fails
/// with a lookup error at construction time.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub primitives: Option<Primitives>,
    pub macros: Option<Macros>,
    pub services: Option<Services>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }
}
