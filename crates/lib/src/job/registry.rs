use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ImportJob, Job, JobDescriptor, JobError, TestJob};
use crate::construct::{ConstructorRegistry, RegistryError};
use crate::store::{Piece, PieceCodec};

/// Builds a job from a descriptor piece.
pub type JobFactory = Box<dyn Fn(&Piece) -> Result<Box<dyn Job>, JobError> + Send + Sync>;

/// Descriptor kind tag to job factory.
#[derive(Default)]
pub struct JobRegistry {
  factories: BTreeMap<String, JobFactory>,
}

impl std::fmt::Debug for JobRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("JobRegistry")
      .field("kinds", &self.factories.keys().collect::<Vec<_>>())
      .finish()
  }
}

fn decode(kind: &str, piece: &Piece) -> Result<JobDescriptor, JobError> {
  JobDescriptor::from_piece(piece).map_err(|source| JobError::Decode {
    kind: kind.to_string(),
    source,
  })
}

impl JobRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry resolving `import` and `test` descriptors.
  pub fn with_defaults(constructors: Arc<ConstructorRegistry>) -> Self {
    let mut factories: BTreeMap<String, JobFactory> = BTreeMap::new();

    factories.insert(
      "import".to_string(),
      Box::new(move |piece: &Piece| -> Result<Box<dyn Job>, JobError> {
        match decode("import", piece)? {
          JobDescriptor::Import {
            module,
            custom_types,
            provided,
          } => Ok(Box::new(ImportJob::new(module, custom_types, provided, constructors.clone()))),
          other => Err(JobError::UnknownKind(other.kind().to_string())),
        }
      }),
    );
    factories.insert(
      "test".to_string(),
      Box::new(|piece: &Piece| -> Result<Box<dyn Job>, JobError> {
        match decode("test", piece)? {
          JobDescriptor::Test { module, test, provided } => Ok(Box::new(TestJob::new(module, test, provided))),
          other => Err(JobError::UnknownKind(other.kind().to_string())),
        }
      }),
    );

    Self { factories }
  }

  pub fn register(&mut self, kind: impl Into<String>, factory: JobFactory) -> Result<(), RegistryError> {
    let kind = kind.into();
    if self.factories.contains_key(&kind) {
      return Err(RegistryError::DuplicateKind(kind));
    }
    self.factories.insert(kind, factory);
    Ok(())
  }

  pub fn kinds(&self) -> impl Iterator<Item = &str> {
    self.factories.keys().map(String::as_str)
  }

  /// Resolve a descriptor piece into exactly one job.
  pub fn resolve(&self, piece: &Piece) -> Result<Box<dyn Job>, JobError> {
    let kind = piece.get("kind").and_then(Piece::as_str).ok_or(JobError::MissingKind)?;
    let factory = self
      .factories
      .get(kind)
      .ok_or_else(|| JobError::UnknownKind(kind.to_string()))?;
    factory(piece)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::job::{JobResult, JobStatus};
  use crate::manifest::ModuleDecl;

  struct Constant(JobResult);

  impl Job for Constant {
    fn run(&self) -> JobResult {
      self.0.clone()
    }
  }

  fn registry() -> JobRegistry {
    JobRegistry::with_defaults(Arc::new(ConstructorRegistry::with_defaults()))
  }

  #[test]
  fn resolves_import_descriptor() {
    let descriptor = JobDescriptor::Import {
      module: ModuleDecl::new("lib").with_attribute("db", "service", json!({})),
      custom_types: Default::default(),
      provided: vec![],
    };
    let job = registry().resolve(&descriptor.piece().unwrap()).unwrap();
    let result = job.run();

    assert_eq!(result.status, JobStatus::Ok);
    assert_eq!(result.output.len(), 4);
  }

  #[test]
  fn unknown_and_missing_kinds() {
    assert!(matches!(
      registry().resolve(&json!({"kind": "deploy"})),
      Err(JobError::UnknownKind(kind)) if kind == "deploy"
    ));
    assert!(matches!(registry().resolve(&json!({})), Err(JobError::MissingKind)));
  }

  #[test]
  fn malformed_descriptor_is_decode_error() {
    assert!(matches!(
      registry().resolve(&json!({"kind": "import", "module": 3})),
      Err(JobError::Decode { .. })
    ));
  }

  #[test]
  fn custom_factories_register_once() {
    let mut jobs = JobRegistry::new();
    jobs
      .register(
        "noop",
        Box::new(|_: &Piece| -> Result<Box<dyn Job>, JobError> {
          Ok(Box::new(Constant(JobResult::ok(vec![], vec![]))) as Box<dyn Job>)
        }),
      )
      .unwrap();

    let err = jobs
      .register(
        "noop",
        Box::new(|_: &Piece| -> Result<Box<dyn Job>, JobError> { Err(JobError::MissingKind) }),
      )
      .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateKind("noop".to_string()));
    assert_eq!(jobs.resolve(&json!({"kind": "noop"})).unwrap().run().status, JobStatus::Ok);
  }
}
