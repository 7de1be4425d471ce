//! Classpath linking.
//!
//! A classpath names jar-store transactions already in the store. Linking
//! walks it depth first (dependencies of recursive entries before the entry
//! itself, each unit at most once), decodes every installed unit and builds
//! a single class table. Units are read from the uncommitted view, so a
//! batch of transactions can use code installed earlier in the same batch.
//!
//! Linking is bounded by [`ClasspathLimits`]. Every problem with the
//! classpath is a [`ClasspathError`]: the builders turn it into a
//! rejection, since nothing has been paid yet when classpaths are linked.
//!
//! The loaded units are reported through
//! [`LoadedClasspath::lengths_of_loaded_units`] and
//! [`LoadedClasspath::transactions_of_loaded_units`] so that their loading
//! can be charged.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::trace;

use ledger_sandbox_store::Store;
use ledger_sandbox_types::{
    Classpath, ConstructorSignature, FieldSignature, MethodSignature, TransactionReference,
};

use super::code::{ClassDef, CodeUnit, ConstructorDef, MethodDef};
use crate::config::NodeConfig;

/// Bounds on the size of a classpath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClasspathLimits {
    /// Maximal number of code units.
    pub max_dependencies: usize,
    /// Maximal cumulative size of the code units, in bytes.
    pub max_dependencies_size: u64,
}

impl ClasspathLimits {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            max_dependencies: config.max_dependencies,
            max_dependencies_size: config.max_dependencies_size,
        }
    }
}

/// Why a classpath could not be linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathError {
    /// No response at the reference.
    UnknownJar(TransactionReference),
    /// The response at the reference did not install code.
    NotAJar(TransactionReference),
    /// The installed bytes are not a code unit. `jar` is `None` for a unit
    /// being installed.
    Undecodable {
        jar: Option<TransactionReference>,
        message: String,
    },
    DuplicateClass { name: String },
    UnknownSuperclass { class: String, superclass: String },
    CyclicHierarchy { class: String },
    TooManyDependencies { count: usize, max: usize },
    DependenciesTooLarge { size: u64, max: u64 },
}

impl std::fmt::Display for ClasspathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClasspathError::UnknownJar(jar) => write!(f, "unknown jar {}", jar),
            ClasspathError::NotAJar(jar) => {
                write!(f, "transaction {} did not install a jar", jar)
            }
            ClasspathError::Undecodable { jar: Some(jar), message } => {
                write!(f, "jar {} cannot be decoded: {}", jar, message)
            }
            ClasspathError::Undecodable { jar: None, message } => {
                write!(f, "the jar cannot be decoded: {}", message)
            }
            ClasspathError::DuplicateClass { name } => {
                write!(f, "class {} is defined more than once", name)
            }
            ClasspathError::UnknownSuperclass { class, superclass } => {
                write!(f, "class {} extends unknown class {}", class, superclass)
            }
            ClasspathError::CyclicHierarchy { class } => {
                write!(f, "the hierarchy of class {} is cyclic", class)
            }
            ClasspathError::TooManyDependencies { count, max } => write!(
                f,
                "too many dependencies in classpath: {} units, at most {} allowed",
                count, max
            ),
            ClasspathError::DependenciesTooLarge { size, max } => write!(
                f,
                "too large cumulative size of dependencies in classpath: {} bytes, at most {} allowed",
                size, max
            ),
        }
    }
}

impl std::error::Error for ClasspathError {}

#[derive(Debug, Clone)]
struct LoadedClass {
    def: ClassDef,
    /// The jar that installed the class, `None` while being installed.
    jar: Option<TransactionReference>,
}

/// The classes of a linked classpath.
#[derive(Debug, Clone, Default)]
pub struct LoadedClasspath {
    classes: HashMap<String, LoadedClass>,
    lengths: Vec<u64>,
    transactions: Vec<TransactionReference>,
}

impl LoadedClasspath {
    /// Links the given classpaths, in order.
    ///
    /// Classpath problems are returned as a [`ClasspathError`] inside the
    /// `anyhow::Error`; any other error comes from the store.
    pub fn link(
        store: &dyn Store,
        classpaths: &[Classpath],
        limits: &ClasspathLimits,
    ) -> Result<Self> {
        let mut loaded = Self::default();
        let mut visited = HashSet::new();
        for classpath in classpaths {
            loaded.visit(store, *classpath, limits, &mut visited)?;
        }
        trace!(
            units = loaded.lengths.len(),
            classes = loaded.classes.len(),
            "linked classpath"
        );
        Ok(loaded)
    }

    fn visit(
        &mut self,
        store: &dyn Store,
        classpath: Classpath,
        limits: &ClasspathLimits,
        visited: &mut HashSet<TransactionReference>,
    ) -> Result<()> {
        if !visited.insert(classpath.jar) {
            return Ok(());
        }

        let response = store
            .get_response_uncommitted(classpath.jar)?
            .ok_or(ClasspathError::UnknownJar(classpath.jar))?;
        let (bytes, dependencies) = response
            .installed_jar()
            .ok_or(ClasspathError::NotAJar(classpath.jar))?;

        if classpath.recursive {
            for dependency in dependencies {
                self.visit(store, *dependency, limits, visited)?;
            }
        }

        self.check_limits(Some(bytes.len() as u64), limits)?;
        let unit = CodeUnit::from_bytes(bytes).map_err(|e| ClasspathError::Undecodable {
            jar: Some(classpath.jar),
            message: format!("{:#}", e),
        })?;
        self.add_unit(unit, Some(classpath.jar))?;
        self.lengths.push(bytes.len() as u64);
        self.transactions.push(classpath.jar);
        Ok(())
    }

    /// Checks the limits, counting an additional unit of `extra` bytes if
    /// given.
    pub fn check_limits(
        &self,
        extra: Option<u64>,
        limits: &ClasspathLimits,
    ) -> Result<(), ClasspathError> {
        let count = self.lengths.len() + usize::from(extra.is_some());
        if count > limits.max_dependencies {
            return Err(ClasspathError::TooManyDependencies {
                count,
                max: limits.max_dependencies,
            });
        }

        let size = self
            .lengths
            .iter()
            .chain(extra.iter())
            .fold(0u64, |total, length| total.saturating_add(*length));
        if size > limits.max_dependencies_size {
            return Err(ClasspathError::DependenciesTooLarge {
                size,
                max: limits.max_dependencies_size,
            });
        }
        Ok(())
    }

    /// This classpath plus a unit being installed. The unit is reported
    /// among the loaded lengths but has no transaction.
    pub fn extended(&self, jar: &[u8]) -> Result<Self, ClasspathError> {
        let unit = CodeUnit::from_bytes(jar).map_err(|e| ClasspathError::Undecodable {
            jar: None,
            message: format!("{:#}", e),
        })?;
        let mut extended = self.clone();
        extended.add_unit(unit, None)?;
        extended.lengths.push(jar.len() as u64);
        Ok(extended)
    }

    fn add_unit(
        &mut self,
        unit: CodeUnit,
        jar: Option<TransactionReference>,
    ) -> Result<(), ClasspathError> {
        let names: Vec<String> = unit.classes.iter().map(|c| c.name.clone()).collect();
        for def in unit.classes {
            if self.classes.contains_key(&def.name) {
                return Err(ClasspathError::DuplicateClass { name: def.name });
            }
            self.classes
                .insert(def.name.clone(), LoadedClass { def, jar });
        }

        for name in &names {
            self.check_hierarchy(name)?;
        }
        Ok(())
    }

    fn check_hierarchy(&self, class: &str) -> Result<(), ClasspathError> {
        let mut current = class;
        for _ in 0..=self.classes.len() {
            let Some(loaded) = self.classes.get(current) else {
                return Ok(());
            };
            match &loaded.def.superclass {
                None => return Ok(()),
                Some(superclass) if !self.classes.contains_key(superclass) => {
                    return Err(ClasspathError::UnknownSuperclass {
                        class: current.to_string(),
                        superclass: superclass.clone(),
                    })
                }
                Some(superclass) => current = superclass,
            }
        }
        Err(ClasspathError::CyclicHierarchy {
            class: class.to_string(),
        })
    }

    // ===== Loaded units =====

    /// Sizes of the loaded units, in loading order.
    pub fn lengths_of_loaded_units(&self) -> &[u64] {
        &self.lengths
    }

    /// The jar-store transactions of the loaded units, in loading order.
    pub fn transactions_of_loaded_units(&self) -> &[TransactionReference] {
        &self.transactions
    }

    // ===== Introspection =====

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name).map(|loaded| &loaded.def)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// The jar that installed a class. `None` for unknown classes and for
    /// classes of a unit being installed.
    pub fn jar_of(&self, name: &str) -> Option<TransactionReference> {
        self.classes.get(name).and_then(|loaded| loaded.jar)
    }

    /// The class and its superclasses, most specific first.
    fn ancestors<'a>(&'a self, class: &str) -> impl Iterator<Item = &'a ClassDef> + 'a {
        let mut next = self.class(class);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .superclass
                .as_deref()
                .and_then(|superclass| self.class(superclass));
            Some(current)
        })
    }

    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        self.ancestors(class).any(|def| def.name == ancestor)
    }

    /// Every field of an instance of `class`, inherited fields first.
    pub fn fields_of(&self, class: &str) -> Vec<FieldSignature> {
        let mut chain: Vec<&ClassDef> = self.ancestors(class).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|def| {
                def.fields.iter().map(move |field| {
                    FieldSignature::new(def.name.clone(), field.name.clone(), field.ty.clone())
                })
            })
            .collect()
    }

    pub fn has_field(&self, class: &str, field: &FieldSignature) -> bool {
        self.is_subclass_of(class, &field.defining_class)
            && self
                .class(&field.defining_class)
                .and_then(|def| def.fields.iter().find(|f| f.name == field.name))
                .is_some_and(|f| f.ty == field.ty)
    }

    /// The implementation of a method for an instance of `class`: the first
    /// declaration found walking up from `class`.
    pub fn resolve_method(
        &self,
        class: &str,
        signature: &MethodSignature,
    ) -> Option<(&ClassDef, &MethodDef)> {
        self.ancestors(class)
            .find_map(|def| def.method(signature).map(|method| (def, method)))
    }

    pub fn resolve_constructor(&self, signature: &ConstructorSignature) -> Option<&ConstructorDef> {
        self.class(&signature.defining_class)?
            .constructor(&signature.formals)
    }
}
