//! visitor pattern helpers
mod visit_objects;
pub use visit_objects::VisitObjectsMut;

use crate::path::Path;

/// Visitor that visits its subjects mutably, together with their location
pub trait VisitMut<T> {
    fn visit_mut(&mut self, path: &Path, value: &mut T);
}

// blanket impl for FnMut
impl<T, F> VisitMut<T> for F
where
    F: FnMut(&Path, &mut T),
{
    fn visit_mut(&mut self, path: &Path, value: &mut T) {
        self(path, value)
    }
}
