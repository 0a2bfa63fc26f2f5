//! Host callables and generators the interpreter can call back into.
//!
//! A bound name becomes a small remote function that forwards its
//! arguments to the host. Callables return one value per call. Generators
//! return a host iterator that the interpreter pulls one step at a time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::naming::{CALL_HOST, HOST_GENERATOR};
use crate::value::Value;
use pybridge_core::HostError;

/// Result type of host callables.
pub type HostResult<T> = Result<T, HostError>;

/// Values produced by a bound generator.
pub type HostIterator = Box<dyn Iterator<Item = HostResult<Value>> + Send>;

pub(crate) type CallableFn = Arc<dyn Fn(&[Value]) -> HostResult<Value> + Send + Sync>;
pub(crate) type GeneratorFn = Arc<dyn Fn(&[Value]) -> HostResult<HostIterator> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Binding {
    Callable(CallableFn),
    Generator(GeneratorFn),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callable(_) => f.write_str("Callable"),
            Self::Generator(_) => f.write_str("Generator"),
        }
    }
}

impl Binding {
    /// Remote definition that routes calls of `name` to the host.
    pub(crate) fn definition(&self, name: &str) -> String {
        let trampoline = match self {
            Self::Callable(_) => CALL_HOST,
            Self::Generator(_) => HOST_GENERATOR,
        };
        format!("def {name}(*args):\n    return {trampoline}('{name}', *args)\n")
    }
}

/// Name to binding table. Rebinding a name replaces the entry.
#[derive(Debug, Default)]
pub(crate) struct BindingTable {
    entries: HashMap<String, Binding>,
}

impl BindingTable {
    pub(crate) fn insert(&mut self, name: String, binding: Binding) {
        self.entries.insert(name, binding);
    }

    pub(crate) fn get(&self, name: &str) -> Option<Binding> {
        self.entries.get(name).cloned()
    }
}

/// Generators started by the interpreter, keyed by the id it assigned.
#[derive(Default)]
pub(crate) struct ActiveGenerators {
    entries: HashMap<i64, HostIterator>,
}

impl fmt::Debug for ActiveGenerators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Outcome of advancing an active generator.
pub(crate) enum Step {
    Yielded(Value),
    Exhausted,
    Failed(HostError),
}

impl ActiveGenerators {
    pub(crate) fn start(&mut self, id: i64, iterator: HostIterator) {
        self.entries.insert(id, iterator);
    }

    /// Advance generator `id`. Unknown ids read as exhausted; exhausted or
    /// failed generators are removed.
    pub(crate) fn step(&mut self, id: i64) -> Step {
        let next = self.entries.get_mut(&id).and_then(Iterator::next);
        match next {
            Some(Ok(value)) => Step::Yielded(value),
            Some(Err(error)) => {
                self.entries.remove(&id);
                Step::Failed(error)
            }
            None => {
                self.entries.remove(&id);
                Step::Exhausted
            }
        }
    }

    pub(crate) fn stop(&mut self, id: i64) {
        self.entries.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(n: i64) -> HostIterator {
        Box::new((1..=n).map(|i| Ok(Value::literal(i))))
    }

    #[test]
    fn test_definition_routes_to_trampoline() {
        let callable = Binding::Callable(Arc::new(|_: &[Value]| Ok(Value::literal(()))));
        assert_eq!(
            callable.definition("sum3"),
            "def sum3(*args):\n    return ___pye_call_host('sum3', *args)\n"
        );
        let generator = Binding::Generator(Arc::new(|_: &[Value]| Ok(counting(1))));
        assert!(generator.definition("gen").contains("___pye_host_generator('gen', *args)"));
    }

    #[test]
    fn test_generator_steps_then_exhausts() {
        let mut active = ActiveGenerators::default();
        active.start(7, counting(2));
        assert!(matches!(active.step(7), Step::Yielded(_)));
        assert!(matches!(active.step(7), Step::Yielded(_)));
        assert!(matches!(active.step(7), Step::Exhausted));
        assert_eq!(active.len(), 0);
        assert!(matches!(active.step(7), Step::Exhausted));
    }

    #[test]
    fn test_failed_generator_is_removed() {
        let mut active = ActiveGenerators::default();
        active.start(
            1,
            Box::new(std::iter::once(Err(HostError::new("IOError", "disk")))),
        );
        assert!(matches!(active.step(1), Step::Failed(e) if e.message() == "disk"));
        assert_eq!(active.len(), 0);
    }
}
