//! Registry mapping each reference type to its checker.
//!
//! Content and reference types differ per checker, so entries are stored
//! type-erased and recovered with a typed lookup. The registry is built once
//! at startup and is read-only afterwards.

use std::{
  any::Any,
  collections::HashMap,
  sync::Arc,
};

use super::Checker;
use crate::{Error, Result, reference::ReferenceType};

type Entry = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct CheckerRegistry {
  checkers: HashMap<ReferenceType, Entry>,
}

impl CheckerRegistry {
  pub fn builder() -> CheckerRegistryBuilder { CheckerRegistryBuilder::default() }

  /// The checker for `reference_type` over content `C` and references `R`.
  pub fn get<C: 'static, R: 'static>(
    &self,
    reference_type: ReferenceType,
  ) -> Result<Arc<dyn Checker<C, R>>> {
    let entry = self
      .checkers
      .get(&reference_type)
      .ok_or(Error::CheckerNotRegistered(reference_type))?;
    entry
      .downcast_ref::<Arc<dyn Checker<C, R>>>()
      .cloned()
      .ok_or(Error::CheckerTypeMismatch(reference_type))
  }

  pub fn contains(&self, reference_type: ReferenceType) -> bool {
    self.checkers.contains_key(&reference_type)
  }

  pub fn reference_types(&self) -> Vec<ReferenceType> {
    let mut types: Vec<_> = self.checkers.keys().copied().collect();
    types.sort();
    types
  }
}

impl std::fmt::Debug for CheckerRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CheckerRegistry")
      .field("reference_types", &self.reference_types())
      .finish()
  }
}

#[derive(Default)]
pub struct CheckerRegistryBuilder {
  checkers: HashMap<ReferenceType, Entry>,
}

impl CheckerRegistryBuilder {
  /// Register `checker` under its own reference type. Each reference type
  /// takes exactly one checker.
  pub fn register<C: 'static, R: 'static>(
    mut self,
    checker: impl Checker<C, R> + 'static,
  ) -> Result<Self> {
    let reference_type = checker.reference_type();
    if self.checkers.contains_key(&reference_type) {
      return Err(Error::DuplicateChecker(reference_type));
    }
    let checker: Arc<dyn Checker<C, R>> = Arc::new(checker);
    self.checkers.insert(reference_type, Box::new(checker));
    Ok(self)
  }

  pub fn build(self) -> CheckerRegistry { CheckerRegistry { checkers: self.checkers } }
}
