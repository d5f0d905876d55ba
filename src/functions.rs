//! # Function Registry
//!
//! A call `target.name(args...)` (or `name(args...)` with the current object as
//! target) resolves in this order:
//!
//! 1. an instance method of the target taking the single argument unevaluated,
//! 2. an instance method of the target taking the evaluated arguments,
//! 3. a function of a registered [`FunctionProvider`], in registration order,
//!    then of the built-in provider; these receive the target as an extra first
//!    parameter,
//! 4. a varargs function of the same providers, receiving all arguments as one
//!    slice.
//!
//! Resolutions are cached per target type name, function name and argument
//! count, including failed ones. Objects sharing a type name must therefore
//! expose the same methods.

pub mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::evaluator::EvalError;
use crate::value::{MethodShape, Value};

/// A provider function: `(target, args) -> result`.
pub type Function = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// A named table of functions, looked up case-insensitively by name and
/// argument count.
///
/// # Examples
///
/// ```
/// use report_expr::{FunctionProvider, Value};
///
/// let provider = FunctionProvider::new("finance")
///     .function("vat", 1, |_target, args| {
///         let net = args[0].as_f64().unwrap_or(0.0);
///         Ok(Value::from(net * 0.25))
///     });
/// ```
#[derive(Clone, Default)]
pub struct FunctionProvider {
    name: String,
    functions: HashMap<(String, usize), Function>,
    varargs: HashMap<String, Function>,
}

impl FunctionProvider {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionProvider {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a function taking exactly `arity` arguments.
    pub fn function<F>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions
            .insert((name.to_ascii_lowercase(), arity), Arc::new(f));
        self
    }

    /// Adds a function taking any number of arguments.
    pub fn varargs<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.varargs.insert(name.to_ascii_lowercase(), Arc::new(f));
        self
    }

    fn lookup(&self, name: &str, arity: usize) -> Option<&Function> {
        self.functions.get(&(name.to_string(), arity))
    }

    fn lookup_varargs(&self, name: &str) -> Option<&Function> {
        self.varargs.get(name)
    }

    /// Names of all functions, sorted, with their fixed arities (`None` for varargs).
    pub fn signatures(&self) -> Vec<(String, Option<usize>)> {
        let mut signatures: Vec<_> = self
            .functions
            .keys()
            .map(|(name, arity)| (name.clone(), Some(*arity)))
            .chain(self.varargs.keys().map(|name| (name.clone(), None)))
            .collect();
        signatures.sort();
        signatures
    }
}

impl fmt::Debug for FunctionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionProvider")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("varargs", &self.varargs.len())
            .finish()
    }
}

/// How a call was resolved.
#[derive(Clone)]
pub enum Resolution {
    /// Instance method receiving the unevaluated argument
    RawMethod,
    /// Instance method receiving the evaluated arguments
    Method,
    /// Provider function
    Function(Function),
    /// Provider function receiving all arguments as one slice
    Varargs(Function),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolution::RawMethod => "RawMethod",
            Resolution::Method => "Method",
            Resolution::Function(_) => "Function",
            Resolution::Varargs(_) => "Varargs",
        })
    }
}

type CacheKey = (String, String, usize);

/// Resolves function calls; see the [module documentation](self).
pub struct FunctionRegistry {
    providers: RwLock<Vec<Arc<FunctionProvider>>>,
    builtins: FunctionProvider,
    cache: Mutex<HashMap<CacheKey, Option<Resolution>>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("providers", &self.providers.read().unwrap_or_else(PoisonError::into_inner).len())
            .field("builtins", &self.builtins)
            .finish()
    }
}

impl FunctionRegistry {
    /// A registry with only the built-in functions.
    pub fn new() -> Self {
        FunctionRegistry {
            providers: RwLock::new(Vec::new()),
            builtins: builtins::provider(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a provider after the ones already registered, ahead of the built-ins.
    pub fn register(&self, provider: FunctionProvider) {
        debug!(provider = provider.name(), "registering function provider");
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(provider));
        self.cache().clear();
    }

    pub fn builtins(&self) -> &FunctionProvider {
        &self.builtins
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<CacheKey, Option<Resolution>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves `name` called on `target` with `argc` arguments.
    pub fn resolve(&self, target: &Value, name: &str, argc: usize) -> Option<Resolution> {
        let key = (target.type_name().to_string(), name.to_string(), argc);
        if let Some(cached) = self.cache().get(&key) {
            return cached.clone();
        }

        let resolution = self.lookup(target, name, argc);
        if resolution.is_none() {
            debug!(function = name, argc, receiver = target.type_name(), "unresolved function");
        }
        self.cache().insert(key, resolution.clone());
        resolution
    }

    fn lookup(&self, target: &Value, name: &str, argc: usize) -> Option<Resolution> {
        if let Value::Object(record) = target {
            if argc == 1 && record.responds_to(name, MethodShape::Raw) {
                return Some(Resolution::RawMethod);
            }
            if record.responds_to(name, MethodShape::Values(argc)) {
                return Some(Resolution::Method);
            }
        }

        let lower = name.to_ascii_lowercase();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let search = || providers.iter().map(|p| &**p).chain(std::iter::once(&self.builtins));

        if let Some(f) = search().find_map(|p| p.lookup(&lower, argc)) {
            return Some(Resolution::Function(f.clone()));
        }
        search()
            .find_map(|p| p.lookup_varargs(&lower))
            .map(|f| Resolution::Varargs(f.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_provider_shadows_builtin() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.resolve(&Value::from("x"), "upper", 0),
            Some(Resolution::Function(_))
        ));

        registry.register(FunctionProvider::new("custom").function("upper", 0, |_, _| Ok(Value::from("custom"))));
        let Some(Resolution::Function(f)) = registry.resolve(&Value::from("x"), "upper", 0) else {
            panic!("upper did not resolve");
        };
        assert_eq!(f(&Value::from("x"), &[]).unwrap(), Value::from("custom"));
    }

    #[test]
    fn test_misses_are_cached() {
        let registry = FunctionRegistry::new();
        assert!(registry.resolve(&Value::Null, "nope", 2).is_none());
        assert!(registry.cache().contains_key(&("null".to_string(), "nope".to_string(), 2)));
    }

    #[test]
    fn test_varargs_fallback() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.resolve(&Value::Null, "list", 5),
            Some(Resolution::Varargs(_))
        ));
    }
}
