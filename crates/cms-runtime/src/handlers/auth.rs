//! # Auth Handlers
//!
//! The `auth` module's side of the token calls. Each handler unpacks its
//! typed payload, checks what the dispatcher cannot know (who may act on
//! whose credentials), and answers through the call's [`Completion`].
//!
//! Calls that only touch in-memory state complete inline. Calls that reach
//! the user directory or the refresh store complete from a spawned task.
//!
//! ## Privileged Calls
//!
//! | Call | Passes when |
//! |------|-------------|
//! | `issueUserToken`, `issueRefreshToken` | bootstrap, core module credential, or `auth.tokens.issue` |
//! | `revokeToken` | core module credential, or `auth.tokens.revoke` |
//! | `revokeAllTokensForUser` | as `revokeToken`, or a user revoking their own credentials |
//! | `setTierOverride` | core module credential, or `auth.tiers.manage` |

use super::spawn_completion;
use crate::container::{ServiceContainer, SharedTokenService};
use cms_telemetry::{metric_inc, CmsMetrics};
use serde_json::{json, Value};
use shared_bus::{
    AuthorizedCall, BusError, Call, CallError, CallKind, CallResult, Completion, Dispatcher,
    ModuleRegistry, OverrideTarget, SubscriptionId, AUTH_MODULE,
};
use shared_crypto::TrustTierPolicy;
use shared_types::ModuleKind;
use std::sync::Arc;
use token_service::{TokenError, TokenServiceApi};
use tracing::{info, warn};

pub const PERMISSION_ISSUE: &str = "auth.tokens.issue";
pub const PERMISSION_REVOKE: &str = "auth.tokens.revoke";
pub const PERMISSION_MANAGE_TIERS: &str = "auth.tiers.manage";

/// What the auth handlers share.
#[derive(Clone)]
pub struct AuthContext {
    pub tokens: SharedTokenService,
    pub policy: Arc<TrustTierPolicy>,
    pub modules: Arc<ModuleRegistry>,
    pub metrics: CmsMetrics,
}

impl AuthContext {
    pub fn from_container(container: &ServiceContainer) -> Self {
        Self {
            tokens: Arc::clone(&container.tokens),
            policy: Arc::clone(&container.policy),
            modules: Arc::clone(&container.modules),
            metrics: container.metrics.clone(),
        }
    }

    /// Bootstrap calls, core module credentials and holders of `path` pass.
    fn require_privileged(&self, call: &AuthorizedCall, path: &str) -> Result<(), CallError> {
        if call.is_bootstrap() || self.is_core_module(call) {
            return Ok(());
        }
        call.require_permission(path)
    }

    fn is_core_module(&self, call: &AuthorizedCall) -> bool {
        call.claims.as_ref().is_some_and(|claims| claims.is_module())
            && self.modules.kind_of(call.module_name()) == ModuleKind::Core
    }

    fn issued(&self, kind: &str, result: Result<String, TokenError>, field: &str) -> CallResult {
        let token = result.map_err(service_error)?;
        metric_inc!(self.metrics.tokens_issued, &[kind]);
        Ok(json!({ field: token }))
    }
}

type AuthHandler = fn(&AuthContext, Arc<AuthorizedCall>, Completion);

/// Subscribe every token call under the `auth` module.
pub fn register_auth_handlers(
    bus: &Dispatcher,
    ctx: AuthContext,
) -> Result<Vec<SubscriptionId>, BusError> {
    let routes: [(CallKind, AuthHandler); 10] = [
        (CallKind::IssuePublicToken, issue_public_token),
        (CallKind::IssueModuleToken, issue_module_token),
        (CallKind::IssueUserToken, issue_user_token),
        (CallKind::ValidateToken, validate_token),
        (CallKind::RevokeToken, revoke_token),
        (CallKind::RevokeAllTokensForUser, revoke_all_tokens_for_user),
        (CallKind::IssueRefreshToken, issue_refresh_token),
        (CallKind::RefreshAccessToken, refresh_access_token),
        (CallKind::RevokeRefreshToken, revoke_refresh_token),
        (CallKind::SetTierOverride, set_tier_override),
    ];

    let mut ids = Vec::with_capacity(routes.len());
    for (kind, handler) in routes {
        let ctx = ctx.clone();
        ids.push(bus.subscribe(kind, AUTH_MODULE, move |call, completion| {
            handler(&ctx, call, completion)
        })?);
    }
    info!(handlers = ids.len(), "Auth handlers registered");
    Ok(ids)
}

fn service_error(err: TokenError) -> CallError {
    CallError::service(err.code(), err)
}

fn unexpected(call: &AuthorizedCall, completion: Completion) {
    warn!(call = %call.call().key(), "Handler received a payload it does not serve");
    completion.fail(CallError::InvalidPayload(format!(
        "unexpected payload for {}",
        call.call().key()
    )));
}

fn issue_public_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::IssuePublicToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    let result = ctx.tokens.issue_public_token(&request.purpose);
    completion.complete(ctx.issued("public", result, "token"));
}

fn issue_module_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::IssueModuleToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    // Minting as another module is a bootstrap privilege.
    let sign_as = if call.is_bootstrap() {
        request.sign_as_module.as_deref()
    } else {
        None
    };
    let result = ctx
        .tokens
        .issue_module_token(&request.module_name, request.trust_tier, sign_as);
    completion.complete(ctx.issued("module", result, "token"));
}

fn issue_user_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::IssueUserToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    if let Err(denied) = ctx.require_privileged(&call, PERMISSION_ISSUE) {
        completion.fail(denied);
        return;
    }

    let ctx = ctx.clone();
    let request = request.clone();
    spawn_completion(completion, async move {
        let result = ctx
            .tokens
            .issue_user_token(
                &request.user_id,
                request.role.as_deref(),
                request.custom_permissions,
                request.custom_roles,
            )
            .await;
        ctx.issued("user", result, "token")
    });
}

fn validate_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::ValidateToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    let tokens = Arc::clone(&ctx.tokens);
    let token = request.token.clone();
    spawn_completion(completion, async move {
        let claims = tokens.validate_token(&token).await.map_err(service_error)?;
        serde_json::to_value(claims).map_err(|e| CallError::service("SERIALIZATION_FAILED", e))
    });
}

fn revoke_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::RevokeToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    if let Err(denied) = ctx.require_privileged(&call, PERMISSION_REVOKE) {
        completion.fail(denied);
        return;
    }
    ctx.tokens.revoke_token(&request.jti);
    completion.ok(json!({ "revoked": request.jti }));
}

fn revoke_all_tokens_for_user(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::RevokeAllTokensForUser(request) = call.call() else {
        return unexpected(&call, completion);
    };
    let own = call
        .claims
        .as_ref()
        .and_then(|claims| claims.user_id.as_deref())
        .is_some_and(|user_id| user_id == request.user_id);
    if !own {
        if let Err(denied) = ctx.require_privileged(&call, PERMISSION_REVOKE) {
            completion.fail(denied);
            return;
        }
    }
    let revoked = ctx.tokens.revoke_all_tokens_for_user(&request.user_id);
    completion.ok(json!({ "userId": request.user_id, "revoked": revoked }));
}

fn issue_refresh_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::IssueRefreshToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    if let Err(denied) = ctx.require_privileged(&call, PERMISSION_ISSUE) {
        completion.fail(denied);
        return;
    }

    let ctx = ctx.clone();
    let user_id = request.user_id.clone();
    spawn_completion(completion, async move {
        let result = ctx.tokens.issue_refresh_token(&user_id).await;
        ctx.issued("refresh", result, "refreshToken")
    });
}

fn refresh_access_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::RefreshAccessToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    let ctx = ctx.clone();
    let refresh_token = request.refresh_token.clone();
    spawn_completion(completion, async move {
        let result = ctx.tokens.refresh_access_token(&refresh_token).await;
        ctx.issued("user", result, "token")
    });
}

fn revoke_refresh_token(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::RevokeRefreshToken(request) = call.call() else {
        return unexpected(&call, completion);
    };
    let tokens = Arc::clone(&ctx.tokens);
    let refresh_token = request.refresh_token.clone();
    spawn_completion(completion, async move {
        tokens
            .revoke_refresh_token(&refresh_token)
            .await
            .map_err(service_error)?;
        Ok(json!({ "revoked": true }))
    });
}

fn set_tier_override(ctx: &AuthContext, call: Arc<AuthorizedCall>, completion: Completion) {
    let Call::SetTierOverride(request) = call.call() else {
        return unexpected(&call, completion);
    };
    if let Err(denied) = ctx.require_privileged(&call, PERMISSION_MANAGE_TIERS) {
        completion.fail(denied);
        return;
    }

    let previous = match (&request.target, request.tier) {
        (OverrideTarget::Module(name), Some(tier)) => {
            let previous = ctx.policy.remove_module_override(name);
            ctx.policy.set_module_override(name.as_str(), tier);
            previous
        }
        (OverrideTarget::Module(name), None) => ctx.policy.remove_module_override(name),
        (OverrideTarget::Role(role), Some(tier)) => {
            let previous = ctx.policy.remove_role_override(role);
            ctx.policy.set_role_override(role.as_str(), tier);
            previous
        }
        (OverrideTarget::Role(role), None) => ctx.policy.remove_role_override(role),
    };
    info!(
        caller = call.module_name(),
        target = ?request.target,
        tier = ?request.tier,
        "Trust tier override updated"
    );
    completion.ok(json!({
        "target": request.target,
        "tier": request.tier,
        "previous": previous,
    }));
}
