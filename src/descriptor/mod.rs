//! Capability descriptors and their lookup cache
//!
//! A descriptor names a step, agent, option, trigger, parameter, tool,
//! when-condition or build-condition implementation together with the
//! parameters it accepts. The validator and lowering resolve names through a
//! [`DescriptorLookup`]; the default implementation is a [`DescriptorCache`]
//! in front of any [`DescriptorSource`], such as the [`BuiltinCatalog`].

mod catalog;

pub use catalog::BuiltinCatalog;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Catalog a capability name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DescriptorKind {
    /// Pipeline step
    Step,
    /// Agent type
    Agent,
    /// Pipeline or stage option
    Option,
    /// Build trigger
    Trigger,
    /// Build parameter type
    Parameter,
    /// Tool type
    Tool,
    /// `when` condition
    WhenCondition,
    /// `post` condition
    BuildCondition,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Step => "step",
            Self::Agent => "agent type",
            Self::Option => "option",
            Self::Trigger => "trigger",
            Self::Parameter => "parameter type",
            Self::Tool => "tool type",
            Self::WhenCondition => "when condition",
            Self::BuildCondition => "build condition",
        };
        write!(f, "{name}")
    }
}

/// Accepted type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// String literal
    String,
    /// Integer literal
    Integer,
    /// Any numeric literal
    Number,
    /// Boolean literal
    Boolean,
    /// Anything, including nested calls
    #[default]
    Any,
}

impl ParamType {
    /// Returns true if a literal of this runtime type is acceptable
    #[must_use]
    pub fn accepts(self, literal: &crate::ast::Literal) -> bool {
        use crate::ast::Literal;
        match (self, literal) {
            (Self::Any, _)
            | (Self::String, Literal::String(_))
            | (Self::Boolean, Literal::Boolean(_))
            | (Self::Number, Literal::Number(_)) => true,
            (Self::Integer, Literal::Number(n)) => n.is_i64() || n.is_u64(),
            // Numbers and booleans are coerced to strings.
            (Self::String, Literal::Number(_) | Literal::Boolean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Integer => "int",
            Self::Number => "BigDecimal",
            Self::Boolean => "boolean",
            Self::Any => "Object",
        };
        write!(f, "{name}")
    }
}

/// One parameter of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterModel {
    /// Parameter name
    pub name: String,
    /// Accepted type
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    /// Whether the parameter must be supplied
    #[serde(default)]
    pub required: bool,
}

impl ParameterModel {
    /// Creates a parameter
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: ParamType, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type,
            required,
        }
    }
}

/// Capability descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Capability name
    pub name: String,
    /// Catalog
    pub kind: DescriptorKind,
    /// Accepted parameters
    #[serde(default)]
    pub parameters: Vec<ParameterModel>,
    /// Takes a block of nested steps
    #[serde(default)]
    pub takes_block: bool,
    /// Option usable inside a stage
    #[serde(default)]
    pub stage_allowed: bool,
}

impl Descriptor {
    /// Creates a descriptor without parameters
    #[must_use]
    pub fn new(kind: DescriptorKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: Vec::new(),
            takes_block: false,
            stage_allowed: false,
        }
    }

    /// Adds a parameter
    #[must_use]
    pub fn param(mut self, name: &str, param_type: ParamType, required: bool) -> Self {
        self.parameters.push(ParameterModel::new(name, param_type, required));
        self
    }

    /// Marks the capability as block-taking
    #[must_use]
    pub fn block(mut self) -> Self {
        self.takes_block = true;
        self
    }

    /// Marks an option as usable inside a stage
    #[must_use]
    pub fn stage(mut self) -> Self {
        self.stage_allowed = true;
        self
    }

    /// Looks up a parameter by name
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterModel> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameter receiving a single unnamed argument
    ///
    /// The only parameter if there is one, otherwise the only required one.
    /// With no required parameters the first declared one takes it.
    #[must_use]
    pub fn single_argument_target(&self) -> Option<&ParameterModel> {
        if let [only] = self.parameters.as_slice() {
            return Some(only);
        }
        let mut required = self.parameters.iter().filter(|p| p.required);
        match (required.next(), required.next()) {
            (Some(target), None) => Some(target),
            (None, _) => self.parameters.first(),
            _ => None,
        }
    }
}

/// Backing store of descriptors, e.g. a plugin registry
pub trait DescriptorSource: Send + Sync {
    /// Finds a descriptor by kind and name
    fn find(&self, kind: DescriptorKind, name: &str) -> Option<Descriptor>;

    /// All names registered for a kind
    fn names(&self, kind: DescriptorKind) -> Vec<String>;
}

/// Name to descriptor resolution used by validation and lowering
pub trait DescriptorLookup: Send + Sync {
    /// Resolves a descriptor
    fn lookup(&self, kind: DescriptorKind, name: &str) -> Option<Arc<Descriptor>>;

    /// Parameter model of a descriptor
    fn model_for(&self, kind: DescriptorKind, name: &str) -> Option<Vec<ParameterModel>> {
        self.lookup(kind, name).map(|d| d.parameters.clone())
    }

    /// Sorted names registered for a kind
    fn names(&self, kind: DescriptorKind) -> Vec<String>;

    /// Drops every cached entry
    fn invalidate_all(&self);
}

type CacheKey = (DescriptorKind, String);

/// Concurrently readable cache in front of a [`DescriptorSource`]
///
/// Misses are cached too. A result computed while an invalidation happened
/// is returned but not stored.
pub struct DescriptorCache {
    source: Arc<dyn DescriptorSource>,
    entries: RwLock<AHashMap<CacheKey, Option<Arc<Descriptor>>>>,
    names: RwLock<AHashMap<DescriptorKind, Vec<String>>>,
    generation: AtomicU64,
}

impl DescriptorCache {
    /// Creates a cache over a source
    #[must_use]
    pub fn new(source: Arc<dyn DescriptorSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(AHashMap::new()),
            names: RwLock::new(AHashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cache over the built-in catalog
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinCatalog::new()))
    }

    /// Number of cached entries, hits and misses alike
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.entries.read().len()
    }

    /// Current invalidation generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("cached", &self.cached_len())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl DescriptorLookup for DescriptorCache {
    fn lookup(&self, kind: DescriptorKind, name: &str) -> Option<Arc<Descriptor>> {
        let key = (kind, name.to_string());
        if let Some(hit) = self.entries.read().get(&key) {
            return hit.clone();
        }

        let observed = self.generation();
        let resolved = self.source.find(kind, name).map(Arc::new);

        let mut entries = self.entries.write();
        if self.generation() == observed {
            entries.insert(key, resolved.clone());
        }
        resolved
    }

    fn names(&self, kind: DescriptorKind) -> Vec<String> {
        if let Some(names) = self.names.read().get(&kind) {
            return names.clone();
        }

        let observed = self.generation();
        let mut names = self.source.names(kind);
        names.sort();
        names.dedup();

        let mut cached = self.names.write();
        if self.generation() == observed {
            cached.insert(kind, names.clone());
        }
        names
    }

    fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        let mut names = self.names.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        names.clear();
        tracing::debug!(generation = self.generation(), "descriptor cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        inner: BuiltinCatalog,
        finds: AtomicUsize,
    }

    impl DescriptorSource for CountingSource {
        fn find(&self, kind: DescriptorKind, name: &str) -> Option<Descriptor> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(kind, name)
        }

        fn names(&self, kind: DescriptorKind) -> Vec<String> {
            self.inner.names(kind)
        }
    }

    fn counting() -> (Arc<CountingSource>, DescriptorCache) {
        let source = Arc::new(CountingSource {
            inner: BuiltinCatalog::new(),
            finds: AtomicUsize::new(0),
        });
        let cache = DescriptorCache::new(source.clone());
        (source, cache)
    }

    #[test]
    fn test_lookup_is_cached() {
        let (source, cache) = counting();
        let echo = cache.lookup(DescriptorKind::Step, "echo").unwrap();
        assert_eq!(echo.name, "echo");
        cache.lookup(DescriptorKind::Step, "echo");
        assert!(cache.lookup(DescriptorKind::Step, "noSuchStep").is_none());
        cache.lookup(DescriptorKind::Step, "noSuchStep");
        assert_eq!(source.finds.load(Ordering::SeqCst), 2);
        assert_eq!(cache.cached_len(), 2);
    }

    #[test]
    fn test_invalidate_all_clears_entries() {
        let (source, cache) = counting();
        cache.lookup(DescriptorKind::Step, "sh");
        cache.invalidate_all();
        assert_eq!(cache.cached_len(), 0);
        assert_eq!(cache.generation(), 1);
        cache.lookup(DescriptorKind::Step, "sh");
        assert_eq!(source.finds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_reads() {
        let cache = Arc::new(DescriptorCache::builtin());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(cache.lookup(DescriptorKind::Step, "echo").is_some());
                        if i == 0 {
                            cache.invalidate_all();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.lookup(DescriptorKind::Agent, "docker").is_some());
    }

    #[test]
    fn test_model_for_and_names() {
        let cache = DescriptorCache::builtin();
        let model = cache.model_for(DescriptorKind::Step, "timeout").unwrap();
        assert!(model.iter().any(|p| p.name == "time" && p.required));
        let names = cache.names(DescriptorKind::BuildCondition);
        assert!(names.contains(&"always".to_string()));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_single_argument_target() {
        let echo = Descriptor::new(DescriptorKind::Step, "echo").param("message", ParamType::String, true);
        assert_eq!(echo.single_argument_target().unwrap().name, "message");

        let sh = Descriptor::new(DescriptorKind::Step, "sh")
            .param("script", ParamType::String, true)
            .param("returnStdout", ParamType::Boolean, false);
        assert_eq!(sh.single_argument_target().unwrap().name, "script");

        let mail = Descriptor::new(DescriptorKind::Step, "mail")
            .param("to", ParamType::String, true)
            .param("subject", ParamType::String, true);
        assert!(mail.single_argument_target().is_none());

        let lock = Descriptor::new(DescriptorKind::Step, "lock")
            .param("resource", ParamType::String, false)
            .param("label", ParamType::String, false);
        assert_eq!(lock.single_argument_target().unwrap().name, "resource");
    }

    #[test]
    fn test_param_type_accepts() {
        use crate::ast::Literal;
        assert!(ParamType::Integer.accepts(&Literal::from(5_i64)));
        assert!(!ParamType::Integer.accepts(&Literal::from("five")));
        assert!(!ParamType::Boolean.accepts(&Literal::from("true")));
        assert!(ParamType::String.accepts(&Literal::from(true)));
    }

    #[test]
    fn test_descriptor_yaml() {
        let yaml = "name: deploy\nkind: step\nparameters:\n  - name: target\n    type: string\n    required: true\n";
        let descriptor: Descriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.kind, DescriptorKind::Step);
        assert_eq!(descriptor.parameters[0].param_type, ParamType::String);
        assert!(!descriptor.takes_block);
    }
}
