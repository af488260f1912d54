//! Applying built resources to a [`System`].

use tracing::{debug, instrument};

use super::Resource;
use crate::system::{ApplyError, System};

/// Order resources for application.
///
/// System resources come first, and config controls precede the other
/// resources of their class. The sort is stable, so discovery order is kept
/// within each class.
pub fn order_resources(mut resources: Vec<Resource>) -> Vec<Resource> {
  resources.sort_by_key(|r| (!r.is_system_resource(), !r.is_config_ctl_creg_item()));
  resources
}

/// Apply `resources` to `system` in [`order_resources`] order.
#[instrument(skip_all, fields(resources = resources.len()))]
pub fn apply_resources(system: &mut System, resources: &[Resource]) -> Result<(), ApplyError> {
  for resource in order_resources(resources.to_vec()) {
    debug!(resource = %resource.key(), "applying resource");
    resource.configure_system(system)?;
  }
  Ok(())
}
