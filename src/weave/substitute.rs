use crate::jvm::class_file::{ClassFile, Version};
use crate::jvm::model::{MethodShape, MethodSignature};
use crate::jvm::names::{Name, QualifiedName, UnqualifiedName};
use crate::jvm::{ClassAccessFlags, Error};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A class definition produced by name resolution
///
/// Carries the validated metadata alongside the exact bytes the definition came from. Two
/// resolutions of the same substituted name observe the same `Arc`, which is what makes
/// definition observably at-most-once.
#[derive(Debug)]
pub struct ResolvedClass {
    pub name: QualifiedName,
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodShape>,
    pub bytes: Vec<u8>,
}

impl ResolvedClass {
    /// Define a class from bytes, validating them and the declared name against `expected`
    pub fn define(expected: &str, bytes: Vec<u8>) -> Result<ResolvedClass, Error> {
        let class = ClassFile::parse(&bytes)?;

        let declared = class.this_class_name()?.replace('/', ".");
        if declared != expected {
            return Err(Error::NameMismatch {
                expected: expected.to_string(),
                actual: declared,
            });
        }
        let name = QualifiedName::from_string(declared).map_err(Error::InvalidClassName)?;

        let super_name = class.super_class_name()?.map(str::to_string);
        let interfaces = class
            .interfaces
            .iter()
            .map(|&index| Ok(class.constants.class_name_at(index)?.to_string()))
            .collect::<Result<Vec<String>, Error>>()?;

        let methods = class
            .methods
            .iter()
            .map(|method| {
                let method_name = class.constants.utf8_at(method.name_index)?.to_string();
                let descriptor = class.constants.utf8_at(method.descriptor_index)?.to_string();
                Ok(MethodShape::new(
                    method.access_flags,
                    UnqualifiedName::from_string(method_name).map_err(Error::InvalidName)?,
                    MethodSignature::Raw(descriptor),
                ))
            })
            .collect::<Result<Vec<MethodShape>, Error>>()?;

        Ok(ResolvedClass {
            name,
            version: class.version,
            access_flags: class.access_flags,
            super_name,
            interfaces,
            methods,
            bytes,
        })
    }
}

/// Resolves fully qualified (dotted) class names to defined classes
pub trait ClassResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<ResolvedClass>, Error>;
}

/// The end of every resolver chain: knows no classes at all
#[derive(Debug, Default)]
pub struct BootstrapResolver;

impl ClassResolver for BootstrapResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ResolvedClass>, Error> {
        Err(Error::ClassNotFound(name.to_string()))
    }
}

/// Swaps in replacement class bytes at name-resolution time
///
/// Names present in the substitution table are defined from the mapped bytes instead of
/// whatever the fallback would produce; every other name passes straight through. Each mapped
/// name is defined at most once, even under concurrent resolution, and a failed definition
/// leaves no cache entry behind so a later attempt re-runs it.
pub struct ClassSubstitutor {
    replacements: HashMap<String, Vec<u8>>,
    cache: Mutex<HashMap<String, Arc<ResolvedClass>>>,
    fallback: Box<dyn ClassResolver>,
}

impl std::fmt::Debug for ClassSubstitutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassSubstitutor")
            .field("replacements", &self.replacements)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ClassSubstitutor {
    /// Build a substitutor, validating every mapped name up front
    ///
    /// The byte map is copied in, so later mutation of the caller's map cannot affect
    /// resolutions already in flight.
    pub fn new(
        replacements: &HashMap<String, Vec<u8>>,
        fallback: Box<dyn ClassResolver>,
    ) -> Result<ClassSubstitutor, Error> {
        for name in replacements.keys() {
            QualifiedName::check_valid(name)
                .map_err(|_| Error::InvalidClassName(name.clone()))?;
        }
        Ok(ClassSubstitutor {
            replacements: replacements.clone(),
            cache: Mutex::new(HashMap::new()),
            fallback,
        })
    }

    /// Substitutor with no fallback: anything outside the table is not found
    pub fn standalone(replacements: &HashMap<String, Vec<u8>>) -> Result<ClassSubstitutor, Error> {
        ClassSubstitutor::new(replacements, Box::new(BootstrapResolver))
    }
}

impl ClassResolver for ClassSubstitutor {
    fn resolve(&self, name: &str) -> Result<Arc<ResolvedClass>, Error> {
        let bytes = match self.replacements.get(name) {
            None => return self.fallback.resolve(name),
            Some(bytes) => bytes,
        };

        // The lock is held across the definition so a concurrent resolve of the same name
        // waits for the winner instead of defining a second copy
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(defined) = cache.get(name) {
            return Ok(Arc::clone(defined));
        }

        debug!("substituting class definition for {}", name);
        let defined = ResolvedClass::define(name, bytes.clone()).map_err(|cause| {
            Error::DefinitionFailure {
                name: name.to_string(),
                cause: Box::new(cause),
            }
        })?;
        let defined = Arc::new(defined);
        cache.insert(name.to_string(), Arc::clone(&defined));
        Ok(defined)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bootstrap_knows_nothing() {
        let err = BootstrapResolver.resolve("java.lang.Object").unwrap_err();
        assert!(matches!(err, Error::ClassNotFound(name) if name == "java.lang.Object"));
    }

    #[test]
    fn invalid_keys_are_rejected_up_front() {
        let mut replacements = HashMap::new();
        replacements.insert("1.bad.Name".to_string(), vec![]);
        let err = ClassSubstitutor::standalone(&replacements).unwrap_err();
        assert!(matches!(err, Error::InvalidClassName(name) if name == "1.bad.Name"));
    }

    #[test]
    fn garbage_bytes_fail_definition_but_not_construction() {
        let mut replacements = HashMap::new();
        replacements.insert("com.example.Broken".to_string(), vec![0, 1, 2, 3]);
        let substitutor = ClassSubstitutor::standalone(&replacements).unwrap();

        let err = substitutor.resolve("com.example.Broken").unwrap_err();
        assert!(matches!(err, Error::DefinitionFailure { name, .. } if name == "com.example.Broken"));

        // the failure left no cache entry, so the next attempt runs the definition again
        let err = substitutor.resolve("com.example.Broken").unwrap_err();
        assert!(matches!(err, Error::DefinitionFailure { .. }));
    }
}
