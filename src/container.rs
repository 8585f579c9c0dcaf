//! View container seam - the ordered sequence of views the engine mutates.
//!
//! The engine does not render anything itself. It drives any backend that can
//! hold positioned views through the [`ViewContainer`] trait: insert, remove,
//! move, detach and reattach are synchronous, 0-indexed and immediately
//! consistent. The engine is the sole mutator of container order during a
//! pass; views must not touch their container from inside `refresh`.
//!
//! [`VecContainer`] is the in-memory implementation used by tests and demos.

use std::rc::Rc;

use crate::context::ViewContext;
use crate::error::RenderError;

/// One instantiated render unit positioned in a container.
///
/// A view is bound 1:1 to its [`ViewContext`] and lives from creation until
/// explicit removal or container teardown.
pub trait View<T> {
    /// The context this view renders from.
    fn context(&self) -> Rc<ViewContext<T>>;

    /// Re-render from the current context state.
    fn refresh(&mut self) -> Result<(), RenderError>;

    /// Called exactly once when the view is removed for good.
    fn destroy(&mut self) {}
}

/// Factory producing a view from a freshly built context.
///
/// Creation may fail; the engine treats that as a per-item error and keeps
/// going with the rest of the pass.
pub type ViewTemplate<T> =
    Rc<dyn Fn(Rc<ViewContext<T>>) -> Result<Box<dyn View<T>>, RenderError>>;

/// Ordered, contiguous, 0-indexed sequence of views.
pub trait ViewContainer<T> {
    /// Insert `view` at `index`, shifting later views right.
    fn insert(&mut self, view: Box<dyn View<T>>, index: usize);

    /// Remove and destroy the view at `index`.
    fn remove(&mut self, index: usize);

    /// Relocate the view at `from` to `to` (indices after the removal step).
    fn move_view(&mut self, from: usize, to: usize);

    /// Remove the view at `index` without destroying it.
    fn detach(&mut self, index: usize) -> Option<Box<dyn View<T>>>;

    /// Insert a previously detached view at `index`.
    fn reattach(&mut self, view: Box<dyn View<T>>, index: usize);

    /// The view at `index`, if any.
    fn get(&self, index: usize) -> Option<&dyn View<T>>;

    /// Mutable access to the view at `index`, if any.
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn View<T>>;

    /// Number of views currently held.
    fn len(&self) -> usize;

    /// True when no views are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every view and empty the container.
    fn clear(&mut self);
}

/// In-memory container backed by a `Vec`.
pub struct VecContainer<T> {
    views: Vec<Box<dyn View<T>>>,
}

impl<T> VecContainer<T> {
    /// Create an empty container.
    pub fn new() -> Self {
        Self { views: Vec::new() }
    }
}

impl<T> Default for VecContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ViewContainer<T> for VecContainer<T> {
    fn insert(&mut self, view: Box<dyn View<T>>, index: usize) {
        let at = index.min(self.views.len());
        self.views.insert(at, view);
    }

    fn remove(&mut self, index: usize) {
        if index < self.views.len() {
            let mut view = self.views.remove(index);
            view.destroy();
        }
    }

    fn move_view(&mut self, from: usize, to: usize) {
        if from >= self.views.len() {
            return;
        }
        let view = self.views.remove(from);
        let at = to.min(self.views.len());
        self.views.insert(at, view);
    }

    fn detach(&mut self, index: usize) -> Option<Box<dyn View<T>>> {
        if index < self.views.len() {
            Some(self.views.remove(index))
        } else {
            None
        }
    }

    fn reattach(&mut self, view: Box<dyn View<T>>, index: usize) {
        self.insert(view, index);
    }

    fn get(&self, index: usize) -> Option<&dyn View<T>> {
        self.views.get(index).map(|v| v.as_ref())
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn View<T>> {
        // explicit match so the unsizing coercion applies at the return site
        match self.views.get_mut(index) {
            Some(view) => Some(view.as_mut()),
            None => None,
        }
    }

    fn len(&self) -> usize {
        self.views.len()
    }

    fn clear(&mut self) {
        for view in &mut self.views {
            view.destroy();
        }
        self.views.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct TestView {
        context: Rc<ViewContext<i32>>,
        destroyed: Rc<Cell<bool>>,
    }

    impl View<i32> for TestView {
        fn context(&self) -> Rc<ViewContext<i32>> {
            self.context.clone()
        }

        fn refresh(&mut self) -> Result<(), RenderError> {
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.set(true);
        }
    }

    fn view(item: i32) -> (Box<dyn View<i32>>, Rc<Cell<bool>>) {
        let destroyed = Rc::new(Cell::new(false));
        let context = ViewContext::new(item, Rc::new(|a: &i32, b: &i32| a == b));
        (
            Box::new(TestView {
                context,
                destroyed: destroyed.clone(),
            }),
            destroyed,
        )
    }

    fn items(container: &VecContainer<i32>) -> Vec<i32> {
        (0..container.len())
            .filter_map(|i| container.get(i).map(|v| v.context().implicit()))
            .collect()
    }

    #[test]
    fn test_insert_and_order() {
        let mut container = VecContainer::new();
        container.insert(view(1).0, 0);
        container.insert(view(3).0, 1);
        container.insert(view(2).0, 1);
        assert_eq!(items(&container), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_destroys() {
        let mut container = VecContainer::new();
        let (v, destroyed) = view(1);
        container.insert(v, 0);
        container.remove(0);
        assert!(destroyed.get(), "remove must destroy the view");
        assert_eq!(container.len(), 0);
    }

    #[test]
    fn test_get_mut_returns_refreshable_view() {
        let mut container = VecContainer::new();
        container.insert(view(5).0, 0);

        let view = container.get_mut(0).expect("view present");
        assert!(view.refresh().is_ok());
        assert!(container.get_mut(1).is_none());
    }

    #[test]
    fn test_move_view() {
        let mut container = VecContainer::new();
        for (i, item) in [1, 2, 3].into_iter().enumerate() {
            container.insert(view(item).0, i);
        }
        container.move_view(2, 0);
        assert_eq!(items(&container), vec![3, 1, 2]);
    }

    #[test]
    fn test_detach_keeps_view_alive() {
        let mut container = VecContainer::new();
        let (v, destroyed) = view(7);
        container.insert(v, 0);

        let detached = container.detach(0).expect("view present");
        assert_eq!(container.len(), 0);
        assert!(!destroyed.get(), "detach must not destroy");

        container.reattach(detached, 0);
        assert_eq!(items(&container), vec![7]);
    }

    #[test]
    fn test_clear_destroys_all() {
        let mut container = VecContainer::new();
        let (a, da) = view(1);
        let (b, db) = view(2);
        container.insert(a, 0);
        container.insert(b, 1);
        container.clear();
        assert!(da.get() && db.get());
        assert!(container.is_empty());
    }
}
