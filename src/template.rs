//! Template slots - named templates sharing one container position.
//!
//! A [`TemplateSlot`] manages a set of named templates of which at most one
//! has a live view in the container at any time. Switching away from a
//! template detaches its view into a cache instead of destroying it, so
//! switching back reattaches the same view instance with its state intact.
//! All views produced by the slot share a single [`ViewContext`], so context
//! updates are visible to whichever view is active next.
//!
//! Requesting a name with no registered template is not an error: the slot
//! logs it and reports that nothing is displayed, which lets callers fall
//! back via [`TemplateSlot::display_or`].

use std::collections::HashMap;
use std::rc::Rc;

use crate::container::{View, ViewTemplate};
use crate::context::ViewContext;
use crate::engine::ContainerHandle;
use crate::error::{ConfigError, RenderError};

/// Single-active-view multiplexer over named templates.
pub struct TemplateSlot<T> {
    container: ContainerHandle<T>,
    context: Rc<ViewContext<T>>,
    templates: HashMap<String, ViewTemplate<T>>,
    cache: HashMap<String, Box<dyn View<T>>>,
    active: Option<String>,
}

impl<T: Clone + PartialEq + 'static> TemplateSlot<T> {
    /// Create a slot rendering into `container` with `item` as the initial
    /// context value. The container is expected to be dedicated to this slot.
    pub fn new(container: ContainerHandle<T>, item: T) -> Self {
        Self {
            container,
            context: ViewContext::new(item, Rc::new(|a: &T, b: &T| a == b)),
            templates: HashMap::new(),
            cache: HashMap::new(),
            active: None,
        }
    }

    /// Register `template` under `name`. Each name binds exactly once.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        template: ViewTemplate<T>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(ConfigError::DuplicateTemplate(name));
        }
        self.templates.insert(name, template);
        Ok(())
    }

    /// Name of the currently displayed template, if any.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The shared context every view of this slot renders from.
    pub fn context(&self) -> Rc<ViewContext<T>> {
        self.context.clone()
    }

    /// Make sure a view instance exists for `name` without displaying it.
    ///
    /// Creates the view detached into the cache if needed; the active view
    /// is left untouched. Returns whether a view exists afterwards.
    pub fn get_or_create_view(&mut self, name: &str) -> Result<bool, RenderError> {
        if self.active.as_deref() == Some(name) || self.cache.contains_key(name) {
            return Ok(true);
        }
        let Some(template) = self.templates.get(name) else {
            return Ok(false);
        };
        let view = template(self.context.clone())?;
        self.cache.insert(name.to_string(), view);
        Ok(true)
    }

    /// Display the template registered under `name`.
    ///
    /// Returns `Ok(true)` when a view is showing afterwards, `Ok(false)` when
    /// `name` has no registered template (the previous view is still detached
    /// in that case). Re-displaying the active name refreshes it in place.
    pub fn display(&mut self, name: &str) -> Result<bool, RenderError> {
        if self.active.as_deref() == Some(name) {
            self.refresh_active()?;
            return Ok(true);
        }

        self.park_active();

        if let Some(view) = self.cache.remove(name) {
            self.container.borrow_mut().reattach(view, 0);
        } else if let Some(template) = self.templates.get(name) {
            let view = template(self.context.clone())?;
            self.container.borrow_mut().insert(view, 0);
        } else {
            tracing::error!(template = name, "no template registered under this name");
            return Ok(false);
        }

        self.active = Some(name.to_string());
        self.refresh_active()?;
        Ok(true)
    }

    /// Display `name`, falling back to `fallback` when `name` is unknown.
    pub fn display_or(&mut self, name: &str, fallback: &str) -> Result<bool, RenderError> {
        if self.display(name)? {
            return Ok(true);
        }
        self.display(fallback)
    }

    /// Mutate the shared context and refresh the active view, if any.
    pub fn update_context(&mut self, f: impl FnOnce(&ViewContext<T>)) -> Result<(), RenderError> {
        f(&self.context);
        self.refresh_active()
    }

    /// Destroy the active view and every cached view.
    pub fn destroy(&mut self) {
        self.active = None;
        self.container.borrow_mut().clear();
        for (_, mut view) in self.cache.drain() {
            view.destroy();
        }
    }

    /// Detach the active view into the cache without destroying it.
    fn park_active(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(view) = self.container.borrow_mut().detach(0) {
                self.cache.insert(active, view);
            }
        }
    }

    fn refresh_active(&mut self) -> Result<(), RenderError> {
        if self.active.is_none() {
            return Ok(());
        }
        match self.container.borrow_mut().get_mut(0) {
            Some(view) => view.refresh(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::VecContainer;
    use std::cell::{Cell, RefCell};

    struct TestView {
        context: Rc<ViewContext<i32>>,
        renders: Rc<Cell<usize>>,
        destroyed: Rc<Cell<bool>>,
    }

    impl View<i32> for TestView {
        fn context(&self) -> Rc<ViewContext<i32>> {
            self.context.clone()
        }

        fn refresh(&mut self) -> Result<(), RenderError> {
            self.renders.set(self.renders.get() + 1);
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.set(true);
        }
    }

    struct Counters {
        renders: Rc<Cell<usize>>,
        destroyed: Rc<Cell<bool>>,
    }

    fn template() -> (ViewTemplate<i32>, Counters) {
        let renders = Rc::new(Cell::new(0));
        let destroyed = Rc::new(Cell::new(false));
        let counters = Counters {
            renders: renders.clone(),
            destroyed: destroyed.clone(),
        };
        let template: ViewTemplate<i32> = Rc::new(move |context| {
            Ok(Box::new(TestView {
                context,
                renders: renders.clone(),
                destroyed: destroyed.clone(),
            }) as Box<dyn View<i32>>)
        });
        (template, counters)
    }

    fn slot() -> (TemplateSlot<i32>, ContainerHandle<i32>) {
        let container: ContainerHandle<i32> = Rc::new(RefCell::new(VecContainer::new()));
        (TemplateSlot::new(container.clone(), 0), container)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut slot, _) = slot();
        let (a, _) = template();
        let (b, _) = template();
        slot.add_template("main", a).expect("first registration");
        assert_eq!(
            slot.add_template("main", b).err(),
            Some(ConfigError::DuplicateTemplate("main".into()))
        );
    }

    #[test]
    fn test_display_creates_then_refreshes() {
        let (mut slot, container) = slot();
        let (tpl, counters) = template();
        slot.add_template("main", tpl).expect("registration");

        assert!(slot.display("main").expect("display"));
        assert_eq!(container.borrow().len(), 1);
        assert_eq!(counters.renders.get(), 1);
        assert_eq!(slot.active(), Some("main"));

        // same name again refreshes in place, no second view
        assert!(slot.display("main").expect("display"));
        assert_eq!(container.borrow().len(), 1);
        assert_eq!(counters.renders.get(), 2);
    }

    #[test]
    fn test_switching_caches_instead_of_destroying() {
        let (mut slot, container) = slot();
        let (first, first_counters) = template();
        let (second, _) = template();
        slot.add_template("first", first).expect("registration");
        slot.add_template("second", second).expect("registration");

        slot.display("first").expect("display");
        let first_ctx = container
            .borrow()
            .get(0)
            .map(|v| v.context())
            .expect("active view");

        slot.display("second").expect("display");
        assert_eq!(container.borrow().len(), 1, "only one view is ever attached");
        assert!(!first_counters.destroyed.get(), "switching must cache, not destroy");

        let creations_before = first_counters.renders.get();
        slot.display("first").expect("display");
        assert!(
            Rc::ptr_eq(
                &container.borrow().get(0).map(|v| v.context()).expect("view"),
                &first_ctx
            ),
            "switching back reattaches the cached instance"
        );
        assert_eq!(
            first_counters.renders.get(),
            creations_before + 1,
            "reattach refreshes the view"
        );
    }

    #[test]
    fn test_unknown_name_logs_and_reports_false() {
        let (mut slot, container) = slot();
        let (tpl, _) = template();
        slot.add_template("main", tpl).expect("registration");
        slot.display("main").expect("display");

        assert!(!slot.display("missing").expect("display"));
        assert_eq!(slot.active(), None);
        assert_eq!(container.borrow().len(), 0, "previous view is parked");
    }

    #[test]
    fn test_get_or_create_view_stays_detached() {
        let (mut slot, container) = slot();
        let (tpl, counters) = template();
        slot.add_template("main", tpl).expect("registration");

        assert!(slot.get_or_create_view("main").expect("creation"));
        assert_eq!(container.borrow().len(), 0, "precreated view is not displayed");
        assert!(!slot.get_or_create_view("missing").expect("lookup"));

        // displaying reuses the precreated instance
        assert!(slot.display("main").expect("display"));
        assert_eq!(container.borrow().len(), 1);
        assert_eq!(counters.renders.get(), 1, "only the display refresh ran");
    }

    #[test]
    fn test_display_or_falls_back() {
        let (mut slot, _) = slot();
        let (tpl, counters) = template();
        slot.add_template("fallback", tpl).expect("registration");

        assert!(slot.display_or("missing", "fallback").expect("display"));
        assert_eq!(slot.active(), Some("fallback"));
        assert_eq!(counters.renders.get(), 1);
    }

    #[test]
    fn test_shared_context_survives_switches() {
        let (mut slot, container) = slot();
        let (a, _) = template();
        let (b, _) = template();
        slot.add_template("a", a).expect("registration");
        slot.add_template("b", b).expect("registration");

        slot.display("a").expect("display");
        slot.update_context(|ctx| ctx.set_implicit(42)).expect("update");

        slot.display("b").expect("display");
        let ctx = container.borrow().get(0).map(|v| v.context()).expect("view");
        assert_eq!(ctx.implicit(), 42, "all templates render from one context");
    }

    #[test]
    fn test_destroy_tears_down_cache() {
        let (mut slot, container) = slot();
        let (a, counters_a) = template();
        let (b, counters_b) = template();
        slot.add_template("a", a).expect("registration");
        slot.add_template("b", b).expect("registration");

        slot.display("a").expect("display");
        slot.display("b").expect("display");
        slot.destroy();

        assert!(counters_a.destroyed.get(), "cached view must be destroyed");
        assert!(counters_b.destroyed.get(), "active view must be destroyed");
        assert_eq!(container.borrow().len(), 0);
        assert_eq!(slot.active(), None);
    }
}
