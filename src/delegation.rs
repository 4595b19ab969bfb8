//! The delegation tree built by `yield from`.
//!
//! A generator that yields from another one holds it as its `parent` (strong);
//! the delegate lists the delegating generators as weak `children`. The node
//! without a parent is the root and produces values for every consumer below it.
//! Consumers cache their root and the root caches the consumer driving it; both
//! caches are only ever cleared through `invalidate_leaf_cache` and
//! `invalidate_root_cache`.

use crate::generator::{Children, Generator, GeneratorId, GeneratorRef, GeneratorState};
use indexmap::IndexMap;
use std::rc::Rc;

pub(crate) fn add_child(parent: &Generator, child: &GeneratorRef) {
    let mut node = parent.node.borrow_mut();
    let weak = Rc::downgrade(child);
    node.children = match std::mem::take(&mut node.children) {
        Children::None => Children::One(child.id(), weak),
        Children::One(id, single) => {
            let mut map = IndexMap::new();
            map.insert(id, single);
            map.insert(child.id(), weak);
            Children::Many(map)
        }
        Children::Many(mut map) => {
            map.insert(child.id(), weak);
            Children::Many(map)
        }
    };
}

/// Removes a child; a map left with one entry goes back to the single slot.
pub(crate) fn remove_child(parent: &Generator, child: GeneratorId) {
    let mut node = parent.node.borrow_mut();
    node.children = match std::mem::take(&mut node.children) {
        Children::One(id, _) if id == child => Children::None,
        Children::Many(mut map) => {
            map.shift_remove(&child);
            if map.len() == 1 {
                match map.pop() {
                    Some((id, single)) => Children::One(id, single),
                    None => Children::None,
                }
            } else {
                Children::Many(map)
            }
        }
        other => {
            log::warn!("generator #{child} is not a child of #{}", parent.id());
            other
        }
    };
}

fn single_child(generator: &Generator) -> Option<GeneratorRef> {
    match &generator.node.borrow().children {
        Children::One(_, weak) => weak.upgrade(),
        _ => None,
    }
}

fn children(generator: &Generator) -> Vec<GeneratorRef> {
    match &generator.node.borrow().children {
        Children::None => Vec::new(),
        Children::One(_, weak) => weak.upgrade().into_iter().collect(),
        Children::Many(map) => map.values().filter_map(|w| w.upgrade()).collect(),
    }
}

/// Clears the root's cached leaf and the leaf's pointer back. Returns the old leaf.
pub(crate) fn invalidate_leaf_cache(root: &Generator) -> Option<GeneratorRef> {
    let leaf = root.node.borrow_mut().leaf.take()?.upgrade()?;
    leaf.node.borrow_mut().root = None;
    Some(leaf)
}

/// Clears a consumer's cached root and the root's pointer back.
pub(crate) fn invalidate_root_cache(leaf: &Generator) {
    let root = leaf.node.borrow_mut().root.take().and_then(|w| w.upgrade());
    if let Some(root) = root {
        root.node.borrow_mut().leaf = None;
    }
}

fn set_cache(root: &GeneratorRef, leaf: &GeneratorRef) {
    root.node.borrow_mut().leaf = Some(Rc::downgrade(leaf));
    leaf.node.borrow_mut().root = Some(Rc::downgrade(root));
}

pub(crate) fn cached_root(generator: &Generator) -> Option<GeneratorRef> {
    generator.node.borrow().root.as_ref().and_then(|w| w.upgrade())
}

pub(crate) fn cached_leaf(generator: &Generator) -> Option<GeneratorRef> {
    generator.node.borrow().leaf.as_ref().and_then(|w| w.upgrade())
}

/// Makes `generator` yield from `from`.
///
/// If `generator` was a root driven by some consumer, that consumer is handed to
/// `from` directly when `from` is a root without a consumer of its own, so the next
/// lookup skips the now intermediate node.
pub(crate) fn link(generator: &GeneratorRef, from: &GeneratorRef) {
    debug_assert!(generator.parent().is_none(), "already delegating");
    let leaf = invalidate_leaf_cache(generator);
    if let Some(leaf) = leaf
        && from.parent().is_none()
        && cached_leaf(from).is_none()
    {
        set_cache(from, &leaf);
    }
    generator.node.borrow_mut().parent = Some(from.clone());
    add_child(from, generator);
    generator.update_flags(|f| f.do_init = true);
    generator.set_state(GeneratorState::Delegating);
    log::debug!("generator #{} now yields from #{}", generator.id(), from.id());
}

/// Walks up to the tree root and caches it on `generator`.
pub(crate) fn update_root(generator: &GeneratorRef) -> GeneratorRef {
    let mut root = generator.clone();
    while let Some(parent) = root.parent() {
        root = parent;
    }
    invalidate_leaf_cache(&root);
    set_cache(&root, generator);
    root
}

/// Finds the generator that now produces values for `generator` after the cached
/// `root` finished.
///
/// Descends from the old root while nodes are finished with exactly one child. On
/// reaching a finished node with several children the path is ambiguous, so the
/// search restarts from the consumer and climbs while the parent is alive.
pub(crate) fn find_new_root(generator: &GeneratorRef, root: GeneratorRef) -> GeneratorRef {
    let mut root = root;
    while root.is_finished() {
        match single_child(&root) {
            Some(child) => root = child,
            None => break,
        }
    }
    if !root.is_finished() {
        return root;
    }

    let mut node = generator.clone();
    while let Some(parent) = node.parent()
        && !parent.is_finished()
    {
        node = parent;
    }
    node
}

/// Re-caches the pair after the root changed from `old_root` to `new_root`.
pub(crate) fn reroot(generator: &GeneratorRef, old_root: &GeneratorRef, new_root: &GeneratorRef) {
    invalidate_root_cache(generator);
    invalidate_leaf_cache(old_root);
    if !Rc::ptr_eq(generator, new_root) {
        invalidate_leaf_cache(new_root);
        set_cache(new_root, generator);
    }
}

/// Drops the strong edge to the delegate; the generator runs its own frame again.
pub(crate) fn release_parent(generator: &Generator) {
    let parent = generator.node.borrow_mut().parent.take();
    if generator.state() == GeneratorState::Delegating {
        generator.set_state(GeneratorState::Suspended);
    }
    drop(parent);
}

/// Takes a generator out of the tree before it is destroyed.
pub(crate) fn detach(generator: &GeneratorRef) {
    match generator.parent() {
        Some(parent) => {
            remove_child(&parent, generator.id());
            invalidate_root_cache(generator);
            release_parent(generator);
        }
        None => {
            invalidate_leaf_cache(generator);
        }
    }
}

/// True when `generator` or any generator delegating to it runs inside a fiber.
pub fn running_in_fiber(generator: &Generator) -> bool {
    if generator.flags().in_fiber {
        return true;
    }
    children(generator).iter().any(|child| running_in_fiber(child))
}

/// The path from `generator` through its delegates up to the tree root.
pub fn chain(generator: &GeneratorRef) -> Vec<GeneratorRef> {
    let mut out = vec![generator.clone()];
    while let Some(parent) = out.last().and_then(|g| g.parent()) {
        out.push(parent);
    }
    out
}

/// Topmost delegate of `generator`, following parent links only.
pub fn tree_root(generator: &GeneratorRef) -> GeneratorRef {
    let mut root = generator.clone();
    while let Some(parent) = root.parent() {
        root = parent;
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::FunctionBuilder;

    fn generator(name: &str) -> GeneratorRef {
        let mut b = FunctionBuilder::new(name);
        b.ret(None);
        Generator::new(b.finish().unwrap(), vec![], None)
    }

    #[test]
    fn children_promote_and_demote() {
        let parent = generator("p");
        let a = generator("a");
        let b = generator("b");
        let c = generator("c");
        add_child(&parent, &a);
        assert!(matches!(parent.node.borrow().children, Children::One(..)));
        add_child(&parent, &b);
        add_child(&parent, &c);
        assert_eq!(parent.children_count(), 3);
        remove_child(&parent, b.id());
        assert!(matches!(parent.node.borrow().children, Children::Many(_)));
        remove_child(&parent, a.id());
        match &parent.node.borrow().children {
            Children::One(id, _) => assert_eq!(*id, c.id()),
            other => panic!("expected single child, got {other:?}"),
        }
        remove_child(&parent, c.id());
        assert_eq!(parent.children_count(), 0);
    }

    #[test]
    fn link_hands_cached_leaf_to_new_root() {
        let a = generator("a");
        let b = generator("b");
        let c = generator("c");
        link(&a, &b);
        assert!(Rc::ptr_eq(&update_root(&a), &b));
        assert!(Rc::ptr_eq(&cached_leaf(&b).unwrap(), &a));

        link(&b, &c);
        assert!(cached_leaf(&b).is_none());
        assert!(Rc::ptr_eq(&cached_root(&a).unwrap(), &c));
        assert!(Rc::ptr_eq(&cached_leaf(&c).unwrap(), &a));
        assert_eq!(b.state(), GeneratorState::Delegating);
        assert!(b.flags().do_init);
        let names: Vec<_> = chain(&a).iter().map(|g| g.function().name.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn find_new_root_descends_single_child_path() {
        let a = generator("a");
        let b = generator("b");
        let c = generator("c");
        link(&a, &b);
        link(&b, &c);
        c.set_state(GeneratorState::Completed);
        assert!(Rc::ptr_eq(&find_new_root(&a, c.clone()), &b));
    }

    #[test]
    fn find_new_root_climbs_from_consumer_at_fan_out() {
        // a -> b -> d and x -> d; d and b finished
        let a = generator("a");
        let b = generator("b");
        let x = generator("x");
        let d = generator("d");
        link(&a, &b);
        link(&b, &d);
        link(&x, &d);
        d.set_state(GeneratorState::Closed);
        b.set_state(GeneratorState::Completed);
        let found = find_new_root(&a, d.clone());
        assert!(Rc::ptr_eq(&found, &a));
    }

    #[test]
    fn dropping_a_child_unregisters_it() {
        let parent = generator("p");
        {
            let child = generator("c");
            link(&child, &parent);
            assert_eq!(parent.children_count(), 1);
        }
        assert_eq!(parent.children_count(), 0);
    }

    #[test]
    fn detach_clears_both_caches() {
        let a = generator("a");
        let b = generator("b");
        link(&a, &b);
        update_root(&a);
        detach(&a);
        assert!(a.parent().is_none());
        assert!(cached_leaf(&b).is_none());
        assert!(cached_root(&a).is_none());
        assert_eq!(b.children_count(), 0);
        assert_eq!(a.state(), GeneratorState::Suspended);
    }
}
