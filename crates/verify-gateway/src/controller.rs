//! # Verification Controller
//!
//! Drives one request through the pipeline:
//!
//! ```text
//! [Start] ──validate──→ [Validated] ──check_store──→ [StoreChecked] ──notify──→ [Notified]
//!    │                      │                             │                        │
//!    └──────────────────────┴─────────── Err(outcome) ────┘                        └── finish → Verified
//! ```
//!
//! Each transition consumes the previous state, so a stage cannot be skipped
//! or run twice. A failing stage logs its internal error and yields the
//! generic [`GatewayOutcome`]; later stages never run.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::config::{FlowsConfig, GatewayConfig};
use crate::domain::{
    Flow, GatewayOutcome, InputValidator, MatchedRecord, NotificationPayload, QueryParams,
    SessionToken, ValidationError, VerificationRequest,
};
use crate::ports::{DownstreamNotifier, VerificationStore};

// =============================================================================
// STATES
// =============================================================================

/// Nothing checked yet.
#[derive(Debug, Clone, Copy)]
pub struct Start;

/// Both identifiers passed their shape check.
#[derive(Debug, Clone)]
pub struct Validated {
    request: VerificationRequest,
}

/// The store confirmed an eligible record.
#[derive(Debug, Clone)]
pub struct StoreChecked {
    flow: Flow,
    primary_id: String,
    handoff: Handoff,
}

/// The downstream worker accepted the hand-off.
#[derive(Debug, Clone, Copy)]
pub struct Notified;

/// What the store stage hands to the notify stage.
#[derive(Debug, Clone)]
enum Handoff {
    Token(SessionToken),
    Record(MatchedRecord),
}

// =============================================================================
// SHARED DEPENDENCIES
// =============================================================================

/// Long-lived dependencies shared by every request.
#[derive(Clone)]
pub struct GatewayController {
    validator: InputValidator,
    flows: FlowsConfig,
    store: Arc<dyn VerificationStore>,
    notifier: Arc<dyn DownstreamNotifier>,
}

impl GatewayController {
    pub fn new(
        config: &GatewayConfig,
        store: Arc<dyn VerificationStore>,
        notifier: Arc<dyn DownstreamNotifier>,
    ) -> Self {
        Self {
            validator: InputValidator::new(&config.flows),
            flows: config.flows.clone(),
            store,
            notifier,
        }
    }

    /// Run the full pipeline for one raw query string.
    pub async fn handle(&self, raw_query: Option<&str>) -> GatewayOutcome {
        match self.drive(raw_query).await {
            Ok(outcome) | Err(outcome) => outcome,
        }
    }

    async fn drive(&self, raw_query: Option<&str>) -> Result<GatewayOutcome, GatewayOutcome> {
        let params = QueryParams::parse(raw_query);
        let done = Verification::start(self)
            .validate(params)?
            .check_store()
            .await?
            .notify()
            .await?;
        Ok(done.finish())
    }
}

impl std::fmt::Debug for GatewayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayController")
            .field("validator", &self.validator)
            .field("flows", &self.flows)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TYPE-STATE VERIFICATION
// =============================================================================

/// One request's progress through the pipeline. New per request.
#[derive(Debug)]
pub struct Verification<'a, S> {
    controller: &'a GatewayController,
    state: S,
}

impl<'a, S> Verification<'a, S> {
    fn advance<T>(self, state: T) -> Verification<'a, T> {
        Verification {
            controller: self.controller,
            state,
        }
    }
}

impl<'a> Verification<'a, Start> {
    pub fn start(controller: &'a GatewayController) -> Self {
        Self {
            controller,
            state: Start,
        }
    }

    /// Shape-check the query. No I/O.
    pub fn validate(
        self,
        params: Result<QueryParams, ValidationError>,
    ) -> Result<Verification<'a, Validated>, GatewayOutcome> {
        match params.and_then(|p| self.controller.validator.validate(&p)) {
            Ok(request) => {
                debug!(flow = %request.flow(), id = %request.primary_id(), "Request validated");
                Ok(self.advance(Validated { request }))
            }
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                Err(e.outcome())
            }
        }
    }
}

impl<'a> Verification<'a, Validated> {
    /// One store round trip: update mode for sessions, lookup mode for users.
    pub async fn check_store(self) -> Result<Verification<'a, StoreChecked>, GatewayOutcome> {
        let request = &self.state.request;
        let store = &self.controller.store;
        let flow = request.flow();
        let primary_id = request.primary_id().to_string();

        let handoff = match request {
            VerificationRequest::Session { state, code } => store
                .mark_code_received(state, code)
                .await
                .map(|rows| (rows > 0).then(|| Handoff::Token(state.clone()))),
            VerificationRequest::User { user, code } => store
                .find_fresh_record(user, code)
                .await
                .map(|record| record.map(Handoff::Record)),
        };

        match handoff {
            Ok(Some(handoff)) => {
                debug!(flow = %flow, id = %primary_id, "Store record eligible");
                Ok(self.advance(StoreChecked {
                    flow,
                    primary_id,
                    handoff,
                }))
            }
            Ok(None) => {
                info!(flow = %flow, id = %primary_id, "No eligible record");
                Err(GatewayOutcome::RecordNotFoundOrExpired)
            }
            Err(e) => {
                error!(flow = %flow, id = %primary_id, error = %e, "Store unavailable");
                Err(e.outcome())
            }
        }
    }
}

impl<'a> Verification<'a, StoreChecked> {
    /// Hand the payload to the downstream worker.
    ///
    /// A failure here can leave the record consumed while the worker never
    /// saw it, so it is logged with the identifier for reconciliation.
    pub async fn notify(self) -> Result<Verification<'a, Notified>, GatewayOutcome> {
        let StoreChecked {
            flow,
            primary_id,
            handoff,
        } = &self.state;
        let await_ack = self.controller.flows.awaits_ack(*flow);

        let payload = match handoff {
            Handoff::Token(token) => Ok(NotificationPayload::Token(token.clone())),
            Handoff::Record(record) => NotificationPayload::from_record(record.clone()),
        };
        let result = match payload {
            Ok(payload) => self.controller.notifier.notify(&payload, await_ack).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(flow = %flow, id = %primary_id, await_ack, "Verification handed off");
                Ok(self.advance(Notified))
            }
            Err(e) => {
                error!(
                    flow = %flow,
                    id = %primary_id,
                    error = %e,
                    timeout = e.is_timeout(),
                    "Downstream hand-off failed, record needs reconciliation"
                );
                Err(e.outcome())
            }
        }
    }
}

impl Verification<'_, Notified> {
    pub fn finish(self) -> GatewayOutcome {
        GatewayOutcome::Verified
    }
}
