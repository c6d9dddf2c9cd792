//! Multicast dispatch: the primitive that lets producers (`invoke`) and consumers
//! (`add`) wire up without a hard dependency on each other.

use std::rc::Rc;

/// An ordered multicast of homogeneously-typed callables.
///
/// `Args` is the payload every subscriber receives; `()` is by far the most common
/// instantiation (the kernel's own `on_warmup` bus and every scheduled [`crate::Event`]
/// are zero-argument). Subactions are kept as [`Rc`]-shared closures rather than owned
/// `Box`es so that splicing one `Action` into another (as `Sandbox::add_child` and
/// `Sandbox::add_hour_counter` do into `on_warmup`) shares the underlying callables
/// instead of cloning them.
pub struct Action<Args = ()> {
    subactions: Vec<Rc<dyn Fn(Args)>>,
}

impl<Args> Default for Action<Args> {
    fn default() -> Self {
        Self {
            subactions: Vec::new(),
        }
    }
}

impl<Args> Clone for Action<Args> {
    fn clone(&self) -> Self {
        Self {
            subactions: self.subactions.clone(),
        }
    }
}

/// Anything that can be folded into an [`Action`]'s subaction list: a single closure,
/// a borrowed or owned `Action` (its subactions are spliced in, shared not copied), or
/// a plain collection of closures.
pub trait IntoSubactions<Args> {
    /// Produce the list of shared callables this value contributes.
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>>;
}

impl<Args, F> IntoSubactions<Args> for F
where
    F: Fn(Args) + 'static,
{
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>> {
        vec![Rc::new(self)]
    }
}

impl<Args> IntoSubactions<Args> for &Action<Args> {
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>> {
        self.subactions.clone()
    }
}

impl<Args> IntoSubactions<Args> for Action<Args> {
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>> {
        self.subactions
    }
}

/// A collection of already-erased closures, e.g. built up from distinct closure types
/// that couldn't otherwise share one `Vec<F>`.
impl<Args> IntoSubactions<Args> for Vec<Rc<dyn Fn(Args)>> {
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>> {
        self
    }
}

impl<Args> IntoSubactions<Args> for Vec<Box<dyn Fn(Args)>> {
    fn into_subactions(self) -> Vec<Rc<dyn Fn(Args)>> {
        self.into_iter().map(Rc::from).collect()
    }
}

impl<Args> Action<Args> {
    /// Construct an empty action.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of encapsulated subactions.
    pub fn len(&self) -> usize {
        self.subactions.len()
    }

    /// Whether no subactions are encapsulated.
    pub fn is_empty(&self) -> bool {
        self.subactions.is_empty()
    }

    /// Encapsulate a subaction: a closure, another `Action` (spliced, not copied), or a
    /// collection of closures.
    ///
    /// The original dynamic kernel validated a callable's residual arity against the
    /// declared arity at this point, raising `ArityMismatch` on a mismatch. Here `Args`
    /// is fixed by `Action<Args>`'s type parameter, so every value accepted by `add`
    /// already has the right shape; the check is enforced once, at compile time, by the
    /// `IntoSubactions<Args>` bound rather than on every call.
    pub fn add<T: IntoSubactions<Args>>(&mut self, item: T) -> &mut Self {
        self.subactions.extend(item.into_subactions());
        self
    }

    /// Return a new `Action` whose subactions are `self`'s followed by `other`'s.
    pub fn combine(&self, other: &Action<Args>) -> Action<Args> {
        let mut combined = Action {
            subactions: self.subactions.clone(),
        };
        combined.subactions.extend(other.subactions.clone());
        combined
    }

    /// Drop every encapsulated subaction.
    pub fn clear(&mut self) {
        self.subactions.clear();
    }
}

impl<Args: Clone> Action<Args> {
    /// Invoke every subaction, in insertion order, with a clone of `args`. Return
    /// values are ignored; there is no short-circuiting.
    pub fn invoke(&self, args: Args) {
        for subaction in &self.subactions {
            subaction(args.clone());
        }
    }
}

impl<Args> std::ops::Add<&Action<Args>> for &Action<Args> {
    type Output = Action<Args>;

    fn add(self, rhs: &Action<Args>) -> Action<Args> {
        self.combine(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn invoke_calls_subactions_in_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut action: Action<()> = Action::new();
        let l1 = log.clone();
        action.add(move |_| l1.borrow_mut().push(1));
        let l2 = log.clone();
        action.add(move |_| l2.borrow_mut().push(2));
        action.invoke(());
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn combine_invokes_exactly_a_then_b_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut a: Action<()> = Action::new();
        let la = log.clone();
        a.add(move |_| la.borrow_mut().push("a0"));
        let la = log.clone();
        a.add(move |_| la.borrow_mut().push("a1"));

        let mut b: Action<()> = Action::new();
        let lb = log.clone();
        b.add(move |_| lb.borrow_mut().push("b0"));

        let combined = a.combine(&b);
        combined.invoke(());
        assert_eq!(*log.borrow(), vec!["a0", "a1", "b0"]);
        assert_eq!(combined.len(), 3);
    }

    #[test]
    fn add_accepts_a_collection_of_closures() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut action: Action<()> = Action::new();
        let l1 = log.clone();
        let l2 = log.clone();
        let subactions: Vec<Box<dyn Fn(())>> = vec![
            Box::new(move |_| l1.borrow_mut().push(1)),
            Box::new(move |_| l2.borrow_mut().push(2)),
        ];
        action.add(subactions);
        action.invoke(());
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn add_splices_another_actions_subactions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut child: Action<()> = Action::new();
        let l = log.clone();
        child.add(move |_| l.borrow_mut().push(1));

        let mut parent: Action<()> = Action::new();
        parent.add(&child);
        parent.invoke(());
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn clear_removes_all_subactions() {
        let mut action: Action<()> = Action::new();
        action.add(|_| ());
        action.add(|_| ());
        assert_eq!(action.len(), 2);
        action.clear();
        assert_eq!(action.len(), 0);
        assert!(action.is_empty());
    }

    #[test]
    fn invoke_passes_payload_with_nonzero_arity() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut action: Action<i32> = Action::new();
        let l = log.clone();
        action.add(move |x: i32| l.borrow_mut().push(x));
        action.invoke(7);
        assert_eq!(*log.borrow(), vec![7]);
    }
}
