//! # Predicates
//!
//! Filters deciding whether an object is relevant to a controller.

/// Filter over objects of type `K`
pub trait ResourcePredicate<K>: Send + Sync {
    fn matches(&self, obj: &K) -> bool;
}

/// Returns true if all predicates match the object
///
/// An empty predicate list matches everything.
pub fn eval_predicates<K>(obj: &K, predicates: &[&dyn ResourcePredicate<K>]) -> bool {
    predicates.iter().all(|p| p.matches(obj))
}
