use crate::context::Context;
use crate::spec::SpecRegistry;
use crate::types::Policy;
use crate::RegistryError;

/// Check that every chain a policy names is a known, enabled spec and that
/// every API the policy allows is declared by that spec.
///
/// Stops at the first violation. Never writes.
pub fn validate_chain_policies<R: SpecRegistry + ?Sized>(
    ctx: &Context<'_>,
    specs: &R,
    policy: &Policy,
) -> Result<(), RegistryError> {
    for chain_policy in &policy.chain_policies {
        let Some(spec) = specs.get_spec(&chain_policy.chain_id) else {
            return Err(ctx.fail(
                "validate_chain_policies_spec_not_found",
                RegistryError::SpecNotFound(chain_policy.chain_id.clone()),
            ));
        };
        if !spec.enabled {
            return Err(ctx.fail(
                "validate_chain_policies_spec_not_enabled",
                RegistryError::SpecDisabled(spec.index),
            ));
        }

        if let Some(api) = chain_policy.apis.iter().find(|api| !spec.has_api(api)) {
            return Err(ctx.fail(
                "validate_chain_policies_chain_policy_api_not_found",
                RegistryError::ApiNotFound {
                    spec: spec.index.clone(),
                    api: api.clone(),
                },
            ));
        }
    }
    Ok(())
}
