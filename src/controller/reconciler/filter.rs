//! # Class Filter
//!
//! Selects the `ManagedResource`s a controller instance is responsible for
//! and names the finalizer it puts on their secrets.

use crate::constants::{DEFAULT_RESOURCE_CLASS, FINALIZER_NAME};
use crate::controller::predicate::ResourcePredicate;
use crate::crd::ManagedResource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    resource_class: String,
    finalizer_name: String,
}

impl ClassFilter {
    /// Filter for the given class; an empty class selects the default class
    ///
    /// ```rust
    /// use managed_resource_controller::controller::reconciler::ClassFilter;
    ///
    /// let filter = ClassFilter::new("seed");
    /// assert_eq!(
    ///     filter.finalizer_name(),
    ///     "resources.gardener.cloud/gardener-resource-manager-seed"
    /// );
    /// ```
    #[must_use]
    pub fn new(class: &str) -> Self {
        let resource_class = if class.is_empty() {
            DEFAULT_RESOURCE_CLASS
        } else {
            class
        };
        let finalizer_name = if resource_class == DEFAULT_RESOURCE_CLASS {
            FINALIZER_NAME.to_string()
        } else {
            format!("{FINALIZER_NAME}-{resource_class}")
        };
        Self {
            resource_class: resource_class.to_string(),
            finalizer_name,
        }
    }

    #[must_use]
    pub fn resource_class(&self) -> &str {
        &self.resource_class
    }

    #[must_use]
    pub fn finalizer_name(&self) -> &str {
        &self.finalizer_name
    }

    /// Whether a resource with the given class belongs to this filter
    ///
    /// Resources without a class belong to the default class.
    #[must_use]
    pub fn responsible(&self, class: Option<&str>) -> bool {
        match class.unwrap_or_default() {
            "" => self.resource_class == DEFAULT_RESOURCE_CLASS,
            class => class == self.resource_class,
        }
    }
}

impl Default for ClassFilter {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_CLASS)
    }
}

impl ResourcePredicate<ManagedResource> for ClassFilter {
    fn matches(&self, obj: &ManagedResource) -> bool {
        self.responsible(obj.spec.class.as_deref())
    }
}

/// Matches `ManagedResource`s that reference a secret by name
#[derive(Debug, Clone, Copy)]
pub struct ReferencesSecret<'a> {
    name: &'a str,
}

impl<'a> ReferencesSecret<'a> {
    #[must_use]
    pub fn new(name: &'a str) -> Self {
        Self { name }
    }
}

impl ResourcePredicate<ManagedResource> for ReferencesSecret<'_> {
    fn matches(&self, obj: &ManagedResource) -> bool {
        obj.spec.references_secret(self.name)
    }
}
