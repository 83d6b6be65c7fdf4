//! [`PolicyEvaluator`] backed by the Cedar policy engine.

use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use cedar_policy::{Authorizer, Context, Entities, EntityUid, PolicySet, Request};

use crate::engine::PolicyEvaluator;
use crate::errors::EngineFailure;
use crate::model::{AuthorizationRequest, Decision};

pub struct CedarEvaluator {
    authorizer: Authorizer,
    policies: ArcSwap<PolicySet>,
    entities: Entities,
}

impl CedarEvaluator {
    pub fn new(policy_src: &str) -> Result<Self, EngineFailure> {
        Ok(Self::from_policy_set(parse_policies(policy_src)?))
    }

    pub fn from_policy_set(policies: PolicySet) -> Self {
        Self {
            authorizer: Authorizer::new(),
            policies: ArcSwap::from_pointee(policies),
            entities: Entities::empty(),
        }
    }

    pub fn with_entities_json(mut self, entities: serde_json::Value) -> Result<Self, EngineFailure> {
        self.entities = Entities::from_json_value(entities, None)
            .map_err(|err| EngineFailure::new(format!("entities: {err}")))?;
        Ok(self)
    }

    /// Swaps in a new policy set. Call `PolicyNotifier::notify_replaced`
    /// only after this returns: notifying first lets an evaluation against
    /// the old set be stored under the new version's key.
    pub fn replace_policies(&self, policy_src: &str) -> Result<(), EngineFailure> {
        self.policies.store(Arc::new(parse_policies(policy_src)?));
        Ok(())
    }

    pub fn policy_count(&self) -> usize {
        self.policies.load().policies().count()
    }

    fn build_request(&self, request: &AuthorizationRequest) -> Result<Request, EngineFailure> {
        let principal = parse_uid("principal", request.principal())?;
        let action = parse_uid("action", request.action())?;
        let resource = parse_uid("resource", request.resource())?;
        let context = Context::from_json_value(request.context().to_json(), None)
            .map_err(|err| EngineFailure::new(format!("context: {err}")))?;
        Request::new(principal, action, resource, context, None)
            .map_err(|err| EngineFailure::new(format!("request: {err}")))
    }
}

impl PolicyEvaluator for CedarEvaluator {
    fn evaluate(&self, request: &AuthorizationRequest) -> Result<Decision, EngineFailure> {
        let cedar_request = self.build_request(request)?;
        let policies = self.policies.load();
        let response = self
            .authorizer
            .is_authorized(&cedar_request, &policies, &self.entities);

        let mut decision_ids: Vec<String> = response
            .diagnostics()
            .reason()
            .map(|id| id.to_string())
            .collect();
        decision_ids.sort();
        let errors = response
            .diagnostics()
            .errors()
            .map(|err| err.to_string())
            .collect();

        Ok(Decision {
            allowed: response.decision() == cedar_policy::Decision::Allow,
            decision_ids,
            errors,
        })
    }
}

fn parse_policies(src: &str) -> Result<PolicySet, EngineFailure> {
    PolicySet::from_str(src).map_err(|err| EngineFailure::new(format!("policies: {err}")))
}

fn parse_uid(field: &str, raw: &str) -> Result<EntityUid, EngineFailure> {
    EntityUid::from_str(raw).map_err(|err| EngineFailure::new(format!("{field} `{raw}`: {err}")))
}
