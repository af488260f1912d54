//! Serialization, construction and application order of resources.

use std::collections::BTreeMap;

use serde_json::json;

use kiln_lib::construct::{ConstructorRegistry, NameToResource};
use kiln_lib::manifest::ModuleDecl;
use kiln_lib::requirement::Requirement;
use kiln_lib::resource::apply::{apply_resources, order_resources};
use kiln_lib::resource::{CtlKind, ImportRecord, Resource};
use kiln_lib::store::PieceCodec;
use kiln_lib::system::{ApplyError, System};
use kiln_lib::util::hash::ObjectHash;

fn every_resource() -> Vec<Resource> {
  vec![
    Resource::Module {
      name: "app".to_string(),
      source_hash: "abc".to_string(),
      imports: vec![ImportRecord {
        module: "lib".to_string(),
        source_hash: "def".to_string(),
      }],
      recorders: BTreeMap::from([("log".to_string(), "stream".to_string())]),
    },
    Resource::AttributeBinding {
      module: "app".to_string(),
      name: "server".to_string(),
    },
    Resource::Call {
      module: "app".to_string(),
      name: "server".to_string(),
    },
    Resource::Service {
      name: "server".to_string(),
      module: "app".to_string(),
      attr: "server".to_string(),
      params: vec!["db".to_string()],
      markers: vec!["http".to_string()],
    },
    Resource::Parameter {
      service: "db".to_string(),
      name: "port".to_string(),
      module: "lib".to_string(),
      attr: "db_port".to_string(),
      type_hash: Some(ObjectHash("0123456789abcdef0123".to_string())),
    },
    Resource::Parameter {
      service: "db".to_string(),
      name: "host".to_string(),
      module: "lib".to_string(),
      attr: "db_host".to_string(),
      type_hash: None,
    },
    Resource::Marker {
      marker: "http".to_string(),
      module: "app".to_string(),
      attr: "index".to_string(),
    },
    Resource::InitHook {
      module: "app".to_string(),
      attr: "setup".to_string(),
    },
    Resource::ConfigCtl {
      service: "views".to_string(),
      ctl: CtlKind::List,
    },
    Resource::ConfigItem {
      service: "views".to_string(),
      key: "index".to_string(),
      module: "app".to_string(),
      attr: "index".to_string(),
    },
    Resource::Fixture {
      service: "db".to_string(),
      module: "fixtures".to_string(),
      attr: "fake_db".to_string(),
      params: vec!["tmpdir".to_string()],
    },
  ]
}

fn every_requirement() -> Vec<Requirement> {
  vec![
    Requirement::Module { name: "lib".to_string() },
    Requirement::Service { name: "db".to_string() },
    Requirement::ConfigCtl {
      service: "views".to_string(),
    },
    Requirement::Marker { name: "http".to_string() },
    Requirement::Fixture {
      service: "db".to_string(),
    },
  ]
}

#[test]
fn pieces_round_trip() {
  for resource in every_resource() {
    let piece = resource.piece().unwrap();
    let decoded = Resource::from_piece(&piece).unwrap();
    assert_eq!(decoded, resource);
    assert_eq!(decoded.piece().unwrap(), piece);
  }
  for requirement in every_requirement() {
    let piece = requirement.piece().unwrap();
    assert_eq!(Requirement::from_piece(&piece).unwrap(), requirement);
  }
}

#[test]
fn construction_is_deterministic() {
  let registry = ConstructorRegistry::with_defaults();
  let module = ModuleDecl::new("app")
    .with_attribute("server", "service", json!({"params": ["db"], "markers": ["http"]}))
    .with_attribute("index", "config_item", json!({"service": "views"}))
    .with_attribute("fake_db", "fixture", json!({"service": "db", "params": ["tmpdir"]}));
  let module_resource = Resource::Module {
    name: "app".to_string(),
    source_hash: module.source_hash(),
    imports: vec![],
    recorders: BTreeMap::new(),
  };

  let discover = || {
    let mut names = NameToResource::new();
    let mut resources = Vec::new();
    for attribute in module.feed() {
      let constructor = registry
        .construct(&attribute.directive(), &Default::default(), &mut names, &module_resource, &attribute)
        .unwrap();
      resources.push(constructor.get_component(&names).unwrap());
    }
    (names, resources)
  };

  let (first_names, first) = discover();
  let (second_names, second) = discover();

  assert_eq!(first, second);
  assert_eq!(first_names, second_names);
  assert!(first_names.contains_key("server.call"));
}

#[test]
fn system_resources_apply_first() {
  let resources = every_resource();
  let ordered = order_resources(resources.clone());

  let first_ordinary = ordered.iter().position(|r| !r.is_system_resource()).unwrap();
  assert!(ordered[..first_ordinary].iter().all(Resource::is_system_resource));
  assert!(ordered[first_ordinary..].iter().all(|r| !r.is_system_resource()));

  // Within the ordinary class, discovery order is kept.
  let ordinary: Vec<_> = resources.iter().filter(|r| !r.is_system_resource()).collect();
  let kept: Vec<_> = ordered[first_ordinary..].iter().collect();
  assert_eq!(kept, ordinary);
}

#[test]
fn config_items_resolve_through_their_control() {
  let item = Resource::ConfigItem {
    service: "views".to_string(),
    key: "index".to_string(),
    module: "app".to_string(),
    attr: "index".to_string(),
  };
  let ctl = Resource::ConfigCtl {
    service: "views".to_string(),
    ctl: CtlKind::Dict,
  };

  let mut system = System::new();
  apply_resources(&mut system, &[item.clone(), ctl]).unwrap();
  assert!(system.config.contains_key("views"));

  let mut bare = System::new();
  let err = item.configure_system(&mut bare).unwrap_err();
  assert_eq!(
    err,
    ApplyError::ConfigCtlMissing {
      service: "views".to_string(),
      key: "index".to_string(),
    }
  );
}
