//! Transformations - normalize or enforce constraints on desired state

use crate::extension::Extension;
use crate::registry::Registered;
use crate::resource::Resource;
use log::debug;

/// A pure rewrite of one desired resource
///
/// Returning `None` drops the resource from the batch. Transformations
/// record what they enforced with annotations on the returned resource.
///
/// # Example
///
/// ```
/// use converge::{Extension, Resource, Transformation};
///
/// struct Cap(u32);
///
/// impl Extension for Cap {
///     fn name(&self) -> &str { "cap" }
/// }
///
/// impl Transformation<u32> for Cap {
///     fn transform(
///         &self,
///         resource: Resource<u32>,
///         _batch: &[Resource<u32>],
///     ) -> Option<Resource<u32>> {
///         if *resource.spec() <= self.0 {
///             return Some(resource);
///         }
///         Some(resource.with_spec(self.0).with_provenance(self.name()))
///     }
/// }
/// ```
pub trait Transformation<S>: Extension {
    /// Transform `resource`; `batch` is the whole desired batch as received
    fn transform(&self, resource: Resource<S>, batch: &[Resource<S>]) -> Option<Resource<S>>;
}

/// Run every applicable transformation over every resource
///
/// Transformations run in ascending priority, registration order breaking
/// ties. The output of one is the input of the next. A resource dropped by
/// any transformation is not seen by the following ones.
pub fn apply_transformations<S: Clone>(
    transformations: &[Registered<dyn Transformation<S>>],
    resources: Vec<Resource<S>>,
) -> Vec<Resource<S>> {
    let mut ordered: Vec<&Registered<dyn Transformation<S>>> = transformations.iter().collect();
    ordered.sort_by_key(|t| t.priority);

    let batch = resources;
    batch
        .iter()
        .filter_map(|resource| {
            ordered
                .iter()
                .filter(|t| t.extension.accepts(resource.kind()))
                .try_fold(resource.clone(), |current, t| {
                    let next = t.extension.transform(current, &batch);
                    if next.is_none() {
                        debug!(
                            "{} dropped {}/{}",
                            t.extension.name(),
                            resource.kind(),
                            resource.name()
                        );
                    }
                    next
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Extension;
    use std::sync::Arc;

    struct SetTo {
        name: &'static str,
        value: i64,
    }

    impl Extension for SetTo {
        fn name(&self) -> &str {
            self.name
        }
    }

    impl Transformation<i64> for SetTo {
        fn transform(
            &self,
            resource: Resource<i64>,
            _batch: &[Resource<i64>],
        ) -> Option<Resource<i64>> {
            Some(resource.with_spec(self.value).with_provenance(self.name))
        }
    }

    struct Double;

    impl Extension for Double {
        fn name(&self) -> &str {
            "double"
        }
    }

    impl Transformation<i64> for Double {
        fn transform(
            &self,
            resource: Resource<i64>,
            _batch: &[Resource<i64>],
        ) -> Option<Resource<i64>> {
            let doubled = resource.spec() * 2;
            Some(resource.with_spec(doubled))
        }
    }

    struct DropNamed(&'static str);

    impl Extension for DropNamed {
        fn name(&self) -> &str {
            "drop-named"
        }

        fn accepts(&self, kind: &str) -> bool {
            kind == "Counter"
        }
    }

    impl Transformation<i64> for DropNamed {
        fn transform(
            &self,
            resource: Resource<i64>,
            _batch: &[Resource<i64>],
        ) -> Option<Resource<i64>> {
            (resource.name() != self.0).then_some(resource)
        }
    }

    struct CountBatch;

    impl Extension for CountBatch {
        fn name(&self) -> &str {
            "count-batch"
        }
    }

    impl Transformation<i64> for CountBatch {
        fn transform(
            &self,
            resource: Resource<i64>,
            batch: &[Resource<i64>],
        ) -> Option<Resource<i64>> {
            Some(resource.with_spec(batch.len() as i64))
        }
    }

    fn registered(
        priority: i32,
        t: impl Transformation<i64> + 'static,
    ) -> Registered<dyn Transformation<i64>> {
        Registered::new(priority, Arc::new(t) as Arc<dyn Transformation<i64>>)
    }

    fn counter(name: &str, value: i64) -> Resource<i64> {
        Resource::new("Counter", "test/v1", name, value)
    }

    #[test]
    fn test_ascending_priority_chaining() {
        // Registered out of order on purpose: priority 10 must still run last.
        let transformations = vec![
            registered(10, Double),
            registered(0, SetTo { name: "set", value: 3 }),
        ];
        let out = apply_transformations(&transformations, vec![counter("c", 100)]);
        assert_eq!(*out[0].spec(), 6);
    }

    #[test]
    fn test_drop_semantics() {
        let transformations = vec![
            registered(0, DropNamed("gone")),
            registered(1, SetTo { name: "set", value: 1 }),
        ];
        let out =
            apply_transformations(&transformations, vec![counter("gone", 0), counter("kept", 0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "kept");
        assert_eq!(out[0].annotation(crate::resource::ANNOTATION_TRANSFORMED_BY), Some("set"));
    }

    #[test]
    fn test_kind_filter() {
        let transformations = vec![registered(0, DropNamed("x"))];
        let other_kind = Resource::new("Gauge", "test/v1", "x", 1);
        let out = apply_transformations(&transformations, vec![other_kind]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_no_transformations_pass_through() {
        let out = apply_transformations::<i64>(&[], vec![counter("a", 1), counter("b", 2)]);
        assert_eq!(out, vec![counter("a", 1), counter("b", 2)]);
    }

    #[test]
    fn test_transformation_sees_whole_batch() {
        let transformations = vec![registered(0, CountBatch)];
        let batch = vec![counter("a", 0), counter("b", 0), counter("c", 0)];
        let out = apply_transformations(&transformations, batch);
        assert!(out.iter().all(|r| *r.spec() == 3));
    }
}
