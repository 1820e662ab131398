//! Token validation.
//!
//! Validation is read-mostly: digest the presented secret, look the
//! token up, then run the cheap checks in a fixed order. The outcome is
//! a typed enum, not an error — every branch here is an expected,
//! frequent result callers must handle.
//!
//! A wrong secret and a wrong expected tenant collapse into the same
//! `NotFound` outcome; validation must not leak whether a token exists
//! under a different tenant.

use chrono::Utc;
use keymint_audit::{ActorIdentity, AuditEvent, AuditEventType, AuditSink};
use keymint_core::TokenSummary;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::policy::PolicyHookRegistry;
use crate::secret::{digest_secret, MIN_SECRET_LEN};
use crate::store::TokenStore;

/// A request to validate a presented secret.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    pub plugin_id: String,
    /// Restrict lookup to one token kind.
    pub kind: Option<String>,
    /// The presented plaintext secret.
    pub secret: String,
    /// If set, the token must belong to this tenant.
    pub expected_tenant_id: Option<Uuid>,
    /// Scopes the token must hold (exact-match superset check).
    pub required_scopes: Vec<String>,
    /// Request origin, forwarded to the usage policy.
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Terminal validation states.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    /// The token is valid; public fields returned.
    Valid { token: TokenSummary },
    /// The secret is missing or too short to be a real secret.
    InvalidFormat,
    /// No matching token. Also returned on tenant mismatch.
    NotFound,
    /// The token's expiry is in the past.
    Expired,
    /// An external usage policy denied the request.
    PolicyDenied { message: String },
    /// The token lacks a required scope.
    MissingScope { scope: String },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Resolves presented secrets to token claims.
pub struct TokenValidator {
    store: Arc<dyn TokenStore>,
    policy: Arc<PolicyHookRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl TokenValidator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        policy: Arc<PolicyHookRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            policy,
            audit,
        }
    }

    /// Validate a presented secret.
    ///
    /// On success a detached task stamps `last_used_at`; a failure of
    /// that stamp is logged and never affects the returned outcome.
    pub async fn validate(
        &self,
        request: ValidateRequest,
    ) -> Result<ValidationOutcome, EngineError> {
        // Cheap rejection before any digest or store work.
        if request.secret.len() < MIN_SECRET_LEN {
            return Ok(ValidationOutcome::InvalidFormat);
        }

        let digest = digest_secret(&request.secret);
        let token = match self
            .store
            .find_by_digest(&request.plugin_id, request.kind.as_deref(), &digest)
            .await?
        {
            Some(token) => token,
            None => return Ok(ValidationOutcome::NotFound),
        };

        // Tenant confusion must not leak existence information: same
        // generic outcome as an unknown secret.
        if let Some(expected) = request.expected_tenant_id {
            if token.tenant_id != expected {
                return Ok(ValidationOutcome::NotFound);
            }
        }

        if token.is_expired(Utc::now()) {
            return Ok(ValidationOutcome::Expired);
        }

        if let Some(violation) = self
            .policy
            .check_usage_policy(token.tenant_id, request.client_ip.as_deref())
            .await
        {
            let event = AuditEvent::new(
                AuditEventType::UsageDeniedPolicy,
                token.tenant_id,
                token.id.to_string(),
            )
            .with_actor(ActorIdentity {
                user_id: Some(token.user_id),
                ip: request.client_ip.clone(),
                user_agent: request.user_agent.clone(),
            })
            .with_meta(json!({ "rule": violation.rule, "metadata": violation.metadata }));
            if let Err(err) = self.audit.emit(event).await {
                tracing::warn!(error = %err, "failed to emit audit event");
            }
            return Ok(ValidationOutcome::PolicyDenied {
                message: violation.message,
            });
        }

        let summary = token.summary();
        if let Some(scope) = summary.missing_scope(&request.required_scopes) {
            return Ok(ValidationOutcome::MissingScope {
                scope: scope.to_string(),
            });
        }

        // Fire-and-forget last-used stamp. Allowed to race and lose
        // updates under concurrent validations.
        let store = Arc::clone(&self.store);
        let token_id = token.id;
        tokio::spawn(async move {
            if let Err(err) = store.touch_last_used(token_id, Utc::now()).await {
                tracing::warn!(token_id = %token_id, error = %err, "failed to stamp last_used_at");
            }
        });

        Ok(ValidationOutcome::Valid { token: summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{IssueRequest, TokenIssuer};
    use crate::lock::IssuanceLocks;
    use crate::membership::{MemoryMembership, TenantRole};
    use crate::quota::QuotaEnforcer;
    use crate::store::MemoryTokenStore;
    use chrono::Duration;
    use keymint_audit::MemorySink;

    struct Fixture {
        validator: TokenValidator,
        store: Arc<MemoryTokenStore>,
        audit: Arc<MemorySink>,
        tenant: Uuid,
        secret: String,
    }

    async fn issue_fixture(expires_at: Option<chrono::DateTime<Utc>>) -> Fixture {
        let store = Arc::new(MemoryTokenStore::new());
        let membership = Arc::new(MemoryMembership::new());
        let audit = Arc::new(MemorySink::new());
        let policy = Arc::new(PolicyHookRegistry::disabled());
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        membership.add_member(tenant, user, TenantRole::Member);

        let issuer = TokenIssuer::new(
            store.clone(),
            membership,
            QuotaEnforcer::unlimited(),
            policy.clone(),
            Arc::new(IssuanceLocks::new()),
            audit.clone(),
        );
        let issued = issuer
            .issue(IssueRequest {
                tenant_id: tenant,
                user_id: user,
                actor_id: user,
                plugin_id: "crm".to_string(),
                kind: "pat".to_string(),
                name: "ci bot".to_string(),
                scopes: vec!["read".to_string(), "write".to_string()],
                metadata: None,
                expires_at,
            })
            .await
            .unwrap();

        Fixture {
            validator: TokenValidator::new(store.clone(), policy, audit.clone()),
            store,
            audit,
            tenant,
            secret: issued.secret,
        }
    }

    fn validate_request(fixture: &Fixture) -> ValidateRequest {
        ValidateRequest {
            plugin_id: "crm".to_string(),
            kind: Some("pat".to_string()),
            secret: fixture.secret.clone(),
            expected_tenant_id: None,
            required_scopes: vec![],
            client_ip: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_required_scopes() {
        let fixture = issue_fixture(None).await;

        let mut req = validate_request(&fixture);
        req.required_scopes = vec!["read".to_string()];
        let outcome = fixture.validator.validate(req).await.unwrap();
        assert!(outcome.is_valid());

        let mut req = validate_request(&fixture);
        req.required_scopes = vec!["admin".to_string()];
        match fixture.validator.validate(req).await.unwrap() {
            ValidationOutcome::MissingScope { scope } => assert_eq!(scope, "admin"),
            other => panic!("expected MissingScope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_secret_is_invalid_format() {
        let fixture = issue_fixture(None).await;
        let mut req = validate_request(&fixture);
        req.secret = "too-short".to_string();
        assert!(matches!(
            fixture.validator.validate(req).await.unwrap(),
            ValidationOutcome::InvalidFormat
        ));
    }

    #[tokio::test]
    async fn test_unknown_secret_is_not_found() {
        let fixture = issue_fixture(None).await;
        let mut req = validate_request(&fixture);
        req.secret = "f".repeat(MIN_SECRET_LEN);
        assert!(matches!(
            fixture.validator.validate(req).await.unwrap(),
            ValidationOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_tenant_mismatch_indistinguishable_from_not_found() {
        let fixture = issue_fixture(None).await;
        let mut req = validate_request(&fixture);
        req.expected_tenant_id = Some(Uuid::new_v4());
        assert!(matches!(
            fixture.validator.validate(req).await.unwrap(),
            ValidationOutcome::NotFound
        ));

        // The right tenant still validates.
        let mut req = validate_request(&fixture);
        req.expected_tenant_id = Some(fixture.tenant);
        assert!(fixture.validator.validate(req).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_expired_token_never_validates() {
        // Seed an already-expired token directly; the issuer refuses to
        // create one.
        let fixture = issue_fixture(None).await;
        let secret = crate::secret::generate_secret();
        fixture
            .store
            .insert(&keymint_core::Token {
                id: Uuid::new_v4(),
                tenant_id: fixture.tenant,
                user_id: Uuid::new_v4(),
                plugin_id: "crm".to_string(),
                kind: "pat".to_string(),
                name: "stale".to_string(),
                secret_digest: digest_secret(&secret),
                scopes: std::collections::BTreeSet::from(["read".to_string()]),
                metadata: None,
                expires_at: Some(Utc::now() - Duration::hours(1)),
                last_used_at: None,
                created_at: Utc::now() - Duration::days(30),
            })
            .await
            .unwrap();

        let mut req = validate_request(&fixture);
        req.secret = secret;
        req.required_scopes = vec!["read".to_string()];
        assert!(matches!(
            fixture.validator.validate(req).await.unwrap(),
            ValidationOutcome::Expired
        ));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_not_found() {
        let fixture = issue_fixture(None).await;
        let mut req = validate_request(&fixture);
        req.kind = Some("service-account".to_string());
        assert!(matches!(
            fixture.validator.validate(req).await.unwrap(),
            ValidationOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_usage_policy_denial_emits_audit_event() {
        use crate::policy::{IssuancePolicyContext, PolicyHooks, PolicyViolation};
        use async_trait::async_trait;

        struct IpAllowlist;

        #[async_trait]
        impl PolicyHooks for IpAllowlist {
            async fn check_issuance_policy(
                &self,
                _ctx: &IssuancePolicyContext<'_>,
            ) -> Option<PolicyViolation> {
                None
            }

            async fn check_usage_policy(
                &self,
                _tenant_id: Uuid,
                request_ip: Option<&str>,
            ) -> Option<PolicyViolation> {
                match request_ip {
                    Some("192.0.2.1") => None,
                    _ => Some(PolicyViolation::new(
                        "ip-allowlist",
                        "request IP is not allowlisted",
                    )),
                }
            }
        }

        let mut fixture = issue_fixture(None).await;
        fixture.validator.policy =
            Arc::new(PolicyHookRegistry::with_hooks(Arc::new(IpAllowlist)));

        let mut req = validate_request(&fixture);
        req.client_ip = Some("203.0.113.9".to_string());
        match fixture.validator.validate(req).await.unwrap() {
            ValidationOutcome::PolicyDenied { message } => {
                assert_eq!(message, "request IP is not allowlisted");
            }
            other => panic!("expected PolicyDenied, got {other:?}"),
        }

        let events = fixture.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::UsageDeniedPolicy);
        assert_eq!(events[0].actor.ip.as_deref(), Some("203.0.113.9"));

        let mut req = validate_request(&fixture);
        req.client_ip = Some("192.0.2.1".to_string());
        assert!(fixture.validator.validate(req).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_last_used_stamped_after_validation() {
        let fixture = issue_fixture(None).await;
        let outcome = fixture
            .validator
            .validate(validate_request(&fixture))
            .await
            .unwrap();
        let token_id = match outcome {
            ValidationOutcome::Valid { token } => token.id,
            other => panic!("expected Valid, got {other:?}"),
        };

        // The stamp runs on a detached task; give it a moment.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let stored = fixture
            .store
            .find_by_digest("crm", None, &digest_secret(&fixture.secret))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, token_id);
        assert!(stored.last_used_at.is_some());
    }
}
